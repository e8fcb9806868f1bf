//! # message
//!
//! why: define all raft rpc message types for node communication
//! relations: consumed and produced by node.rs, carried by the outbound channel
//! what: AppendEntries and RequestVote requests/responses, the RaftMessage envelope enum

use serde::{Deserialize, Serialize};

use crate::log::LogEntry;
use crate::types::{LogIndex, MemberId, Term};

/// Replicate log entries (also serves as heartbeat when entries is empty)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub leader_term: Term,
    pub leader_id: MemberId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

impl AppendEntriesRequest {
    /// Whether this request carries no entries
    pub fn is_heartbeat(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Response to AppendEntries
///
/// `match_index` is the highest index confirmed to match the leader's log;
/// `append_index` is the responder's last index after processing, used by the
/// leader to resynchronize after a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub from: MemberId,
    pub term: Term,
    pub success: bool,
    pub match_index: LogIndex,
    pub append_index: LogIndex,
}

/// Request a vote during leader election
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub candidate_term: Term,
    pub candidate_id: MemberId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

/// Response to a vote request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub from: MemberId,
    pub term: Term,
    pub vote_granted: bool,
}

/// All possible Raft messages between nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaftMessage {
    AppendEntries(AppendEntriesRequest),
    AppendEntriesResponse(AppendEntriesResponse),
    RequestVote(RequestVoteRequest),
    RequestVoteResponse(RequestVoteResponse),
}

impl RaftMessage {
    /// Member that produced the message
    pub fn sender(&self) -> MemberId {
        match self {
            Self::AppendEntries(req) => req.leader_id,
            Self::AppendEntriesResponse(resp) => resp.from,
            Self::RequestVote(req) => req.candidate_id,
            Self::RequestVoteResponse(resp) => resp.from,
        }
    }

    /// Term carried by the message
    pub fn term(&self) -> Term {
        match self {
            Self::AppendEntries(req) => req.leader_term,
            Self::AppendEntriesResponse(resp) => resp.term,
            Self::RequestVote(req) => req.candidate_term,
            Self::RequestVoteResponse(resp) => resp.term,
        }
    }
}

impl From<AppendEntriesRequest> for RaftMessage {
    fn from(req: AppendEntriesRequest) -> Self {
        Self::AppendEntries(req)
    }
}

impl From<AppendEntriesResponse> for RaftMessage {
    fn from(resp: AppendEntriesResponse) -> Self {
        Self::AppendEntriesResponse(resp)
    }
}

impl From<RequestVoteRequest> for RaftMessage {
    fn from(req: RequestVoteRequest) -> Self {
        Self::RequestVote(req)
    }
}

impl From<RequestVoteResponse> for RaftMessage {
    fn from(resp: RequestVoteResponse) -> Self {
        Self::RequestVoteResponse(resp)
    }
}
