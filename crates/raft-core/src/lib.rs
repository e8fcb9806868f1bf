//! # raft-core
//!
//! why: implement the core raft consensus algorithm in pure, portable rust
//! relations: raft-storage provides the on-disk RaftLog and StateStore
//! what: state machine, election logic, log contract, message types, leader progress

pub mod config;
pub mod error;
pub mod log;
pub mod message;
pub mod node;
pub mod outbound;
pub mod progress;
pub mod store;
pub mod timer;
pub mod types;

pub use config::RaftConfig;
pub use error::{LogError, RaftError, Result};
pub use crate::log::{InMemoryLog, LogEntry, RaftLog};
pub use message::{
    AppendEntriesRequest, AppendEntriesResponse, RaftMessage, RequestVoteRequest,
    RequestVoteResponse,
};
pub use node::{NodeState, RaftNode};
pub use outbound::{Envelope, Outbound, Outbox};
pub use progress::{FollowerProgress, ReplicationProgress};
pub use store::{InMemoryStateStore, StateStore};
pub use types::{LogIndex, MemberId, Term, NO_INDEX, NO_TERM};
