//! # types
//!
//! why: give terms, log positions and member identities a single definition
//! relations: used by every other module in raft-core and by raft-storage
//! what: Term, LogIndex, MemberId and the "no entry" sentinels

use std::fmt;

use serde::{Deserialize, Serialize};

/// Election epoch. Signed so that `-1` can stand for "before any term".
pub type Term = i64;

/// Zero-based position in the log. `-1` means "no entry".
pub type LogIndex = i64;

/// Index reported when there is no entry (empty log, before the first entry).
pub const NO_INDEX: LogIndex = -1;

/// Term reported for [`NO_INDEX`].
pub const NO_TERM: Term = -1;

/// Stable identity of a cluster member
///
/// Only compared for equality and ordering; never interpreted otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub u64);

impl From<u64> for MemberId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member-{}", self.0)
    }
}
