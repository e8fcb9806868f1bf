//! # config
//!
//! why: keep timing and batching knobs in one validated, serializable struct
//! relations: consumed by node.rs and timer.rs
//! what: RaftConfig with defaults, json loading and validation

use serde::{Deserialize, Serialize};

use crate::error::{RaftError, Result};

/// Configuration for a Raft node
///
/// All durations are logical ticks; the caller decides how long a tick is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    /// Minimum election timeout in ticks
    pub election_timeout_min: u64,
    /// Maximum election timeout in ticks
    pub election_timeout_max: u64,
    /// Ticks between leader heartbeats
    pub heartbeat_interval: u64,
    /// Maximum entries carried by a single AppendEntries request
    pub max_append_entries: usize,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 10,
            election_timeout_max: 20,
            heartbeat_interval: 3,
            max_append_entries: 64,
        }
    }
}

impl RaftConfig {
    /// Parse a config from json, filling missing fields with defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| RaftError::Config {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the timing relationships the election protocol relies on.
    pub fn validate(&self) -> Result<()> {
        if self.election_timeout_min == 0 {
            return Err(config_error("election_timeout_min must be positive"));
        }
        if self.election_timeout_min > self.election_timeout_max {
            return Err(config_error(
                "election_timeout_min must not exceed election_timeout_max",
            ));
        }
        if self.heartbeat_interval == 0 || self.heartbeat_interval >= self.election_timeout_min {
            return Err(config_error(
                "heartbeat_interval must be positive and below election_timeout_min",
            ));
        }
        if self.max_append_entries == 0 {
            return Err(config_error("max_append_entries must be positive"));
        }
        Ok(())
    }
}

fn config_error(reason: &str) -> RaftError {
    RaftError::Config {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RaftConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.election_timeout_min, 10);
        assert_eq!(config.election_timeout_max, 20);
        assert_eq!(config.heartbeat_interval, 3);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = RaftConfig::from_json(r#"{ "heartbeat_interval": 2 }"#).unwrap();
        assert_eq!(config.heartbeat_interval, 2);
        assert_eq!(config.max_append_entries, 64);
    }

    #[test]
    fn inverted_timeouts_are_rejected() {
        let config = RaftConfig {
            election_timeout_min: 30,
            election_timeout_max: 20,
            ..RaftConfig::default()
        };
        assert!(matches!(config.validate(), Err(RaftError::Config { .. })));
    }

    #[test]
    fn heartbeat_must_beat_election_timeout() {
        let json = r#"{ "election_timeout_min": 5, "election_timeout_max": 8, "heartbeat_interval": 5 }"#;
        assert!(RaftConfig::from_json(json).is_err());
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        assert!(matches!(
            RaftConfig::from_json("{ not json"),
            Err(RaftError::Config { .. })
        ));
    }
}
