//! # log
//!
//! why: define the durable, append-only, truncatable log raft replicates
//! relations: driven by node.rs during replication, implemented on disk by raft-storage
//! what: LogEntry, the RaftLog contract, InMemoryLog for tests and simulations

use serde::{Deserialize, Serialize};

use crate::error::LogError;
use crate::types::{LogIndex, Term, NO_INDEX, NO_TERM};

/// A single entry in the replicated log
///
/// The content is opaque to the engine and only passed through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The term when this entry was created by a leader
    pub term: Term,
    /// The command to be applied to the state machine
    pub content: Vec<u8>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(term: Term, content: impl Into<Vec<u8>>) -> Self {
        Self {
            term,
            content: content.into(),
        }
    }
}

/// Contract for the durable log
///
/// Entries are contiguous from index 0. Every mutating call must be durable
/// before it returns `Ok`; the engine acknowledges peers only afterwards.
pub trait RaftLog {
    /// Append one entry after the last one and return its index.
    fn append(&mut self, entry: LogEntry) -> Result<LogIndex, LogError>;

    /// Write a contiguous run of entries starting at `starting_at`.
    ///
    /// `starting_at` must be in `[0, last_index + 1]`. When it is at or below
    /// `last_index`, the existing suffix from `starting_at` is replaced as part
    /// of the same durable write, so a restart never observes the log
    /// truncated without the new entries. Returns the new last index.
    fn append_batch(
        &mut self,
        starting_at: LogIndex,
        entries: &[LogEntry],
    ) -> Result<LogIndex, LogError>;

    /// Remove every entry at or after `index`. No-op past the end.
    fn truncate_from(&mut self, index: LogIndex) -> Result<(), LogError>;

    /// Entry at `index`, or `NotFound` outside `[0, last_index]`.
    fn entry_at(&self, index: LogIndex) -> Result<LogEntry, LogError>;

    /// Index of the last entry, `-1` when empty.
    fn last_index(&self) -> LogIndex;

    /// Term of the entry at `index`; `term_at(-1)` is the sentinel `-1`.
    fn term_at(&self, index: LogIndex) -> Result<Term, LogError> {
        if index == NO_INDEX {
            return Ok(NO_TERM);
        }
        self.entry_at(index).map(|entry| entry.term)
    }

    /// Term of the last entry, `-1` when empty.
    fn last_term(&self) -> Result<Term, LogError> {
        self.term_at(self.last_index())
    }

    /// Up to `max` entries starting at `from`, stopping at the end of the log.
    fn entries_from(&self, from: LogIndex, max: usize) -> Result<Vec<LogEntry>, LogError> {
        if from < 0 {
            return Err(LogError::InvalidIndex {
                index: from,
                last_index: self.last_index(),
            });
        }
        let max = LogIndex::try_from(max).unwrap_or(LogIndex::MAX);
        let end = self.last_index().min(from.saturating_add(max) - 1);
        (from..=end).map(|index| self.entry_at(index)).collect()
    }
}

/// Check that a batch may start at `starting_at` given the current last index.
pub fn check_batch_start(starting_at: LogIndex, last_index: LogIndex) -> Result<(), LogError> {
    if starting_at < 0 || starting_at > last_index + 1 {
        return Err(LogError::InvalidIndex {
            index: starting_at,
            last_index,
        });
    }
    Ok(())
}

// -- in-memory implementation --

/// In-memory log
///
/// "Durable" for the lifetime of the value only; used for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLog {
    entries: Vec<LogEntry>,
}

impl InMemoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    fn position(&self, index: LogIndex) -> Option<usize> {
        usize::try_from(index)
            .ok()
            .filter(|&pos| pos < self.entries.len())
    }
}

impl RaftLog for InMemoryLog {
    fn append(&mut self, entry: LogEntry) -> Result<LogIndex, LogError> {
        self.entries.push(entry);
        Ok(self.last_index())
    }

    fn append_batch(
        &mut self,
        starting_at: LogIndex,
        entries: &[LogEntry],
    ) -> Result<LogIndex, LogError> {
        check_batch_start(starting_at, self.last_index())?;
        self.entries.truncate(starting_at as usize);
        self.entries.extend_from_slice(entries);
        Ok(self.last_index())
    }

    fn truncate_from(&mut self, index: LogIndex) -> Result<(), LogError> {
        if index < 0 {
            return Err(LogError::InvalidIndex {
                index,
                last_index: self.last_index(),
            });
        }
        if let Ok(pos) = usize::try_from(index) {
            self.entries.truncate(pos);
        }
        Ok(())
    }

    fn entry_at(&self, index: LogIndex) -> Result<LogEntry, LogError> {
        self.position(index)
            .map(|pos| self.entries[pos].clone())
            .ok_or(LogError::NotFound { index })
    }

    fn last_index(&self) -> LogIndex {
        self.entries.len() as LogIndex - 1
    }

    fn term_at(&self, index: LogIndex) -> Result<Term, LogError> {
        if index == NO_INDEX {
            return Ok(NO_TERM);
        }
        self.position(index)
            .map(|pos| self.entries[pos].term)
            .ok_or(LogError::NotFound { index })
    }
}
