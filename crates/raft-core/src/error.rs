//! # error
//!
//! why: separate protocol-level rejections (encoded in responses) from real faults
//! relations: returned by log.rs implementations and by every RaftNode handler
//! what: LogError for the durable log contract, RaftError for the engine

use std::io;

use thiserror::Error;

use crate::types::{LogIndex, MemberId};

/// Failures of the durable log contract
#[derive(Error, Debug)]
pub enum LogError {
    /// Read of an index outside `[0, last_index]`.
    #[error("no log entry at index {index}")]
    NotFound { index: LogIndex },

    /// Mutation at an index the log cannot accept.
    #[error("invalid log index {index} (last index {last_index})")]
    InvalidIndex { index: LogIndex, last_index: LogIndex },

    /// The change could not be made durable.
    #[error("log durability failure: {source}")]
    Durability {
        #[from]
        source: io::Error,
    },
}

impl LogError {
    /// Whether this error came from the storage layer rather than a broken invariant.
    pub fn is_durability(&self) -> bool {
        matches!(self, Self::Durability { .. })
    }
}

/// Errors surfaced by the consensus engine
///
/// Stale terms and log inconsistencies are not errors: they are answered
/// with a negative response. Everything here is a fault the caller must see.
#[derive(Error, Debug)]
pub enum RaftError {
    /// The durable log failed or was used outside its contract.
    #[error(transparent)]
    Log(#[from] LogError),

    /// Term/vote record could not be persisted or loaded.
    #[error("term/vote durability failure: {0}")]
    Durability(#[source] io::Error),

    /// Proposal made on a node that is not the leader.
    #[error("not leader (last known leader: {leader:?})")]
    NotLeader { leader: Option<MemberId> },

    /// Local member missing from the member set.
    #[error("{member} is not part of the member set")]
    UnknownMember { member: MemberId },

    /// Invalid configuration.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, RaftError>;
