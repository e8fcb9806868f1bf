//! # node
//!
//! why: define the raft node state machine and state transitions
//! relations: uses message.rs for rpc types, log.rs and store.rs for durability,
//!            progress.rs for leader bookkeeping, timer.rs for elections
//! what: NodeState enum, RaftNode engine with append/vote handling, ticks and proposals

use std::collections::BTreeSet;

use ::log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::RaftConfig;
use crate::error::{RaftError, Result};
use crate::log::{LogEntry, RaftLog};
use crate::message::{
    AppendEntriesRequest, AppendEntriesResponse, RaftMessage, RequestVoteRequest,
    RequestVoteResponse,
};
use crate::outbound::Outbound;
use crate::progress::ReplicationProgress;
use crate::store::StateStore;
use crate::timer::ElectionTimer;
use crate::types::{LogIndex, MemberId, Term, NO_INDEX};

/// The three possible states a Raft node can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    /// Passive state - listens for heartbeats, votes when asked
    Follower,
    /// Transitional state - requesting votes to become leader
    Candidate,
    /// Active state - manages log replication, sends heartbeats
    Leader,
}

impl Default for NodeState {
    fn default() -> Self {
        Self::Follower
    }
}

/// Role together with the data only that role needs
#[derive(Debug)]
enum Role {
    Follower,
    Candidate {
        votes: BTreeSet<MemberId>,
    },
    Leader {
        progress: ReplicationProgress,
        heartbeat_elapsed: u64,
    },
}

impl Role {
    fn state(&self) -> NodeState {
        match self {
            Self::Follower => NodeState::Follower,
            Self::Candidate { .. } => NodeState::Candidate,
            Self::Leader { .. } => NodeState::Leader,
        }
    }
}

/// A single Raft node in the cluster
///
/// Owns its log and term/vote store. Every event (inbound message, tick,
/// timeout, proposal) is processed to completion through `&mut self`, so the
/// caller serializes events simply by owning the node. Outbound messages are
/// handed to the given [`Outbound`] and never awaited.
#[derive(Debug)]
pub struct RaftNode<L, S> {
    id: MemberId,
    members: Vec<MemberId>,
    config: RaftConfig,
    log: L,
    store: S,
    current_term: Term,
    voted_for: Option<MemberId>,
    commit_index: LogIndex,
    last_applied: LogIndex,
    leader_id: Option<MemberId>,
    role: Role,
    election_timer: ElectionTimer,
}

impl<L: RaftLog, S: StateStore> RaftNode<L, S> {
    /// Create a follower, restoring term and vote from `store`.
    ///
    /// `members` is the full member set and must include `id`.
    pub fn new(
        id: MemberId,
        members: impl IntoIterator<Item = MemberId>,
        config: RaftConfig,
        log: L,
        store: S,
    ) -> Result<Self> {
        config.validate()?;

        let members: Vec<MemberId> = members
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !members.contains(&id) {
            return Err(RaftError::UnknownMember { member: id });
        }

        let (current_term, voted_for) = store.load_term_and_vote().map_err(RaftError::Durability)?;
        let election_timer =
            ElectionTimer::new(config.election_timeout_min, config.election_timeout_max);

        info!(
            "{id}: starting as follower in term {current_term} with {} log entries",
            log.last_index() + 1
        );

        Ok(Self {
            id,
            members,
            config,
            log,
            store,
            current_term,
            voted_for,
            commit_index: NO_INDEX,
            last_applied: NO_INDEX,
            leader_id: None,
            role: Role::Follower,
            election_timer,
        })
    }

    /// Use a deterministic election timer (simulations and tests)
    pub fn with_timer_seed(mut self, seed: u64) -> Self {
        self.election_timer = ElectionTimer::seeded(
            self.config.election_timeout_min,
            self.config.election_timeout_max,
            seed,
        );
        self
    }

    // -- accessors --

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn members(&self) -> &[MemberId] {
        &self.members
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        self.role.state()
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.role, Role::Leader { .. })
    }

    pub fn current_term(&self) -> Term {
        self.current_term
    }

    pub fn voted_for(&self) -> Option<MemberId> {
        self.voted_for
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    /// Leader accepted in the current term, if any
    pub fn leader_id(&self) -> Option<MemberId> {
        self.leader_id
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Replication progress, only while leader
    pub fn progress(&self) -> Option<&ReplicationProgress> {
        match &self.role {
            Role::Leader { progress, .. } => Some(progress),
            _ => None,
        }
    }

    /// Votes collected, only while candidate
    pub fn votes_received(&self) -> Option<&BTreeSet<MemberId>> {
        match &self.role {
            Role::Candidate { votes } => Some(votes),
            _ => None,
        }
    }

    /// Strict majority of the member set
    pub fn quorum_size(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Give back the durable parts, e.g. to restart the node
    pub fn into_parts(self) -> (L, S) {
        (self.log, self.store)
    }

    fn peers(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.members.iter().copied().filter(move |m| *m != self.id)
    }

    // -- event entry points --

    /// Process one inbound message, sending any reply through `outbound`.
    pub fn handle(&mut self, message: RaftMessage, outbound: &mut impl Outbound) -> Result<()> {
        let result = match message {
            RaftMessage::AppendEntries(req) => {
                let leader = req.leader_id;
                self.handle_append_entries(req)
                    .map(|resp| outbound.send(leader, resp.into()))
            }
            RaftMessage::AppendEntriesResponse(resp) => {
                self.handle_append_entries_response(resp, outbound)
            }
            RaftMessage::RequestVote(req) => {
                let candidate = req.candidate_id;
                self.handle_request_vote(req)
                    .map(|resp| outbound.send(candidate, resp.into()))
            }
            RaftMessage::RequestVoteResponse(resp) => {
                self.handle_request_vote_response(resp, outbound)
            }
        };
        self.step_down_on_error(result)
    }

    /// Advance logical time by one tick.
    ///
    /// Followers and candidates start an election when the election timer
    /// expires; leaders broadcast AppendEntries every `heartbeat_interval` ticks.
    pub fn tick(&mut self, outbound: &mut impl Outbound) -> Result<()> {
        let heartbeat_due = match &mut self.role {
            Role::Leader {
                heartbeat_elapsed, ..
            } => {
                *heartbeat_elapsed += 1;
                let due = *heartbeat_elapsed >= self.config.heartbeat_interval;
                if due {
                    *heartbeat_elapsed = 0;
                }
                Some(due)
            }
            _ => None,
        };

        let result = match heartbeat_due {
            Some(true) => self.broadcast_append(outbound),
            Some(false) => Ok(()),
            None if self.election_timer.tick() => self.start_election(outbound),
            None => Ok(()),
        };
        self.step_down_on_error(result)
    }

    /// Election timeout fired; a leader ignores it.
    pub fn on_election_timeout(&mut self, outbound: &mut impl Outbound) -> Result<()> {
        if self.is_leader() {
            return Ok(());
        }
        let result = self.start_election(outbound);
        self.step_down_on_error(result)
    }

    /// Append a new command on the leader and start replicating it.
    pub fn propose(
        &mut self,
        content: impl Into<Vec<u8>>,
        outbound: &mut impl Outbound,
    ) -> Result<LogIndex> {
        if !self.is_leader() {
            return Err(RaftError::NotLeader {
                leader: self.leader_id,
            });
        }
        let result = self.append_and_replicate(content.into(), outbound);
        self.step_down_on_error(result)
    }

    /// Committed entries not handed out before, in log order.
    pub fn entries_to_apply(&mut self) -> Result<Vec<(LogIndex, LogEntry)>> {
        if self.last_applied >= self.commit_index {
            return Ok(Vec::new());
        }
        let from = self.last_applied + 1;
        let count = (self.commit_index - self.last_applied) as usize;
        let entries = self.log.entries_from(from, count)?;
        self.last_applied += entries.len() as LogIndex;
        Ok((from..).zip(entries).collect())
    }

    // -- append entries --

    /// Follower side of log replication; returns the response for the leader.
    pub fn handle_append_entries(
        &mut self,
        req: AppendEntriesRequest,
    ) -> Result<AppendEntriesResponse> {
        if req.leader_term < self.current_term {
            debug!(
                "{}: rejecting append from {} with stale term {} (current {})",
                self.id, req.leader_id, req.leader_term, self.current_term
            );
            return Ok(self.append_response(false, NO_INDEX, NO_INDEX));
        }

        self.observe_term(req.leader_term)?;
        match self.role {
            Role::Follower => {}
            Role::Candidate { .. } => {
                info!(
                    "{}: {} won the election for term {}",
                    self.id, req.leader_id, self.current_term
                );
                self.become_follower();
            }
            Role::Leader { .. } => {
                warn!(
                    "{}: second leader {} seen in term {}",
                    self.id, req.leader_id, self.current_term
                );
                self.become_follower();
            }
        }
        self.leader_id = Some(req.leader_id);
        self.election_timer.reset();

        if !self.prev_entry_matches(req.prev_log_index, req.prev_log_term)? {
            debug!(
                "{}: log mismatch at prev index {} (prev term {})",
                self.id, req.prev_log_index, req.prev_log_term
            );
            let last_index = self.log.last_index();
            return Ok(self.append_response(false, NO_INDEX, last_index));
        }

        let last_new = self.merge_entries(req.prev_log_index, &req.entries)?;

        let commit = req.leader_commit.min(last_new);
        if commit > self.commit_index {
            debug!("{}: commit index {} -> {}", self.id, self.commit_index, commit);
            self.commit_index = commit;
        }

        Ok(self.append_response(true, last_new, last_new))
    }

    fn prev_entry_matches(&self, prev_log_index: LogIndex, prev_log_term: Term) -> Result<bool> {
        if prev_log_index == NO_INDEX {
            return Ok(true);
        }
        if prev_log_index < NO_INDEX || prev_log_index > self.log.last_index() {
            return Ok(false);
        }
        Ok(self.log.term_at(prev_log_index)? == prev_log_term)
    }

    /// Write `entries` after `prev_log_index`, skipping the ones already present
    /// and replacing the log from the first term mismatch. Returns the index of
    /// the last entry covered by the request.
    fn merge_entries(&mut self, prev_log_index: LogIndex, entries: &[LogEntry]) -> Result<LogIndex> {
        for (offset, entry) in entries.iter().enumerate() {
            let index = prev_log_index + 1 + offset as LogIndex;
            if index > self.log.last_index() {
                self.log.append_batch(index, &entries[offset..])?;
                break;
            }
            let existing = self.log.term_at(index)?;
            if existing != entry.term {
                warn!(
                    "{}: discarding entries from index {index} (local term {existing}, leader term {})",
                    self.id, entry.term
                );
                self.log.append_batch(index, &entries[offset..])?;
                break;
            }
        }
        Ok(prev_log_index + entries.len() as LogIndex)
    }

    fn append_response(
        &self,
        success: bool,
        match_index: LogIndex,
        append_index: LogIndex,
    ) -> AppendEntriesResponse {
        AppendEntriesResponse {
            from: self.id,
            term: self.current_term,
            success,
            match_index,
            append_index,
        }
    }

    /// Leader side: update follower progress and keep replicating.
    pub fn handle_append_entries_response(
        &mut self,
        resp: AppendEntriesResponse,
        outbound: &mut impl Outbound,
    ) -> Result<()> {
        self.observe_term(resp.term)?;
        if resp.term < self.current_term {
            debug!("{}: ignoring stale append response from {}", self.id, resp.from);
            return Ok(());
        }

        let last_index = self.log.last_index();
        let Role::Leader { progress, .. } = &mut self.role else {
            return Ok(());
        };

        if resp.success {
            let advanced = progress.record_success(resp.from, resp.match_index.min(last_index));
            let behind = progress
                .get(resp.from)
                .map_or(false, |f| f.next_index <= last_index);
            if advanced {
                self.advance_leader_commit()?;
            }
            if behind {
                self.send_append(resp.from, outbound)?;
            }
        } else if progress.record_rejection(resp.from, resp.append_index).is_some() {
            self.send_append(resp.from, outbound)?;
        }
        Ok(())
    }

    fn advance_leader_commit(&mut self) -> Result<()> {
        let Role::Leader { progress, .. } = &self.role else {
            return Ok(());
        };
        let candidate = progress.quorum_match_index(self.log.last_index(), self.quorum_size());
        // only entries from the current term are committed by counting replicas
        if candidate > self.commit_index && self.log.term_at(candidate)? == self.current_term {
            debug!("{}: commit index {} -> {}", self.id, self.commit_index, candidate);
            self.commit_index = candidate;
        }
        Ok(())
    }

    fn send_append(&self, to: MemberId, outbound: &mut impl Outbound) -> Result<()> {
        let Some(follower) = self.progress().and_then(|p| p.get(to)) else {
            return Ok(());
        };
        let prev_log_index = follower.next_index - 1;
        let req = AppendEntriesRequest {
            leader_term: self.current_term,
            leader_id: self.id,
            prev_log_index,
            prev_log_term: self.log.term_at(prev_log_index)?,
            entries: self
                .log
                .entries_from(follower.next_index, self.config.max_append_entries)?,
            leader_commit: self.commit_index,
        };
        outbound.send(to, req.into());
        Ok(())
    }

    fn broadcast_append(&self, outbound: &mut impl Outbound) -> Result<()> {
        for peer in self.peers() {
            self.send_append(peer, outbound)?;
        }
        Ok(())
    }

    fn append_and_replicate(
        &mut self,
        content: Vec<u8>,
        outbound: &mut impl Outbound,
    ) -> Result<LogIndex> {
        let index = self.log.append(LogEntry::new(self.current_term, content))?;
        debug!("{}: appended entry {index} in term {}", self.id, self.current_term);
        self.advance_leader_commit()?;
        self.broadcast_append(outbound)?;
        Ok(index)
    }

    // -- elections --

    /// Decide a vote; the vote is durable before the response is returned.
    pub fn handle_request_vote(&mut self, req: RequestVoteRequest) -> Result<RequestVoteResponse> {
        if req.candidate_term < self.current_term {
            debug!(
                "{}: rejecting vote for {} with stale term {}",
                self.id, req.candidate_id, req.candidate_term
            );
            return Ok(self.vote_response(false));
        }
        self.observe_term(req.candidate_term)?;

        let free_to_vote = self.voted_for.map_or(true, |v| v == req.candidate_id);
        let ours = (self.log.last_term()?, self.log.last_index());
        let up_to_date = (req.last_log_term, req.last_log_index) >= ours;

        let granted = free_to_vote && up_to_date;
        if granted {
            if self.voted_for.is_none() {
                self.set_term_and_vote(self.current_term, Some(req.candidate_id))?;
            }
            self.election_timer.reset();
            debug!(
                "{}: voted for {} in term {}",
                self.id, req.candidate_id, self.current_term
            );
        } else {
            debug!(
                "{}: denied vote to {} in term {} (voted for {:?}, up to date {up_to_date})",
                self.id, req.candidate_id, self.current_term, self.voted_for
            );
        }
        Ok(self.vote_response(granted))
    }

    fn vote_response(&self, vote_granted: bool) -> RequestVoteResponse {
        RequestVoteResponse {
            from: self.id,
            term: self.current_term,
            vote_granted,
        }
    }

    /// Count a vote; a candidate reaching quorum becomes leader.
    pub fn handle_request_vote_response(
        &mut self,
        resp: RequestVoteResponse,
        outbound: &mut impl Outbound,
    ) -> Result<()> {
        self.observe_term(resp.term)?;
        if resp.term < self.current_term || !resp.vote_granted {
            return Ok(());
        }
        if !self.members.contains(&resp.from) {
            warn!("{}: vote from unknown member {}", self.id, resp.from);
            return Ok(());
        }

        let quorum = self.quorum_size();
        let won = match &mut self.role {
            Role::Candidate { votes } => {
                votes.insert(resp.from);
                votes.len() >= quorum
            }
            _ => false,
        };
        if won {
            self.become_leader(outbound)?;
        }
        Ok(())
    }

    fn start_election(&mut self, outbound: &mut impl Outbound) -> Result<()> {
        let term = self.current_term + 1;
        self.set_term_and_vote(term, Some(self.id))?;
        self.leader_id = None;
        self.role = Role::Candidate {
            votes: BTreeSet::from([self.id]),
        };
        self.election_timer.reset();
        info!("{}: starting election for term {term}", self.id);

        if self.quorum_size() == 1 {
            return self.become_leader(outbound);
        }

        let req = RequestVoteRequest {
            candidate_term: term,
            candidate_id: self.id,
            last_log_index: self.log.last_index(),
            last_log_term: self.log.last_term()?,
        };
        for peer in self.peers() {
            outbound.send(peer, req.clone().into());
        }
        Ok(())
    }

    fn become_leader(&mut self, outbound: &mut impl Outbound) -> Result<()> {
        info!("{}: became leader for term {}", self.id, self.current_term);
        self.role = Role::Leader {
            progress: ReplicationProgress::new(self.peers(), self.log.last_index()),
            heartbeat_elapsed: 0,
        };
        self.leader_id = Some(self.id);
        self.advance_leader_commit()?;
        self.broadcast_append(outbound)
    }

    fn become_follower(&mut self) {
        if !matches!(self.role, Role::Follower) {
            info!(
                "{}: {:?} -> Follower in term {}",
                self.id,
                self.role.state(),
                self.current_term
            );
            self.role = Role::Follower;
            self.election_timer.reset();
        }
    }

    /// Adopt a higher term seen on any message, stepping down.
    fn observe_term(&mut self, term: Term) -> Result<()> {
        if term > self.current_term {
            info!("{}: adopting term {term} (was {})", self.id, self.current_term);
            self.set_term_and_vote(term, None)?;
            self.leader_id = None;
            self.become_follower();
        }
        Ok(())
    }

    /// Persist first; in-memory state only changes once the store succeeded.
    fn set_term_and_vote(&mut self, term: Term, voted_for: Option<MemberId>) -> Result<()> {
        self.store
            .save_term_and_vote(term, voted_for)
            .map_err(RaftError::Durability)?;
        self.current_term = term;
        self.voted_for = voted_for;
        Ok(())
    }

    fn step_down_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            warn!("{}: stepping down after failure: {err}", self.id);
            self.become_follower();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::InMemoryLog;
    use crate::outbound::Outbox;
    use crate::store::InMemoryStateStore;

    fn node(id: u64, members: &[u64]) -> RaftNode<InMemoryLog, InMemoryStateStore> {
        RaftNode::new(
            MemberId(id),
            members.iter().copied().map(MemberId),
            RaftConfig::default(),
            InMemoryLog::new(),
            InMemoryStateStore::new(),
        )
        .unwrap()
        .with_timer_seed(id)
    }

    #[test]
    fn new_node_starts_as_follower() {
        let node = node(1, &[1, 2, 3]);
        assert_eq!(node.state(), NodeState::Follower);
        assert_eq!(node.current_term(), 0);
        assert_eq!(node.voted_for(), None);
        assert_eq!(node.commit_index(), -1);
    }

    #[test]
    fn own_id_must_be_a_member() {
        let result = RaftNode::new(
            MemberId(9),
            [MemberId(1), MemberId(2)],
            RaftConfig::default(),
            InMemoryLog::new(),
            InMemoryStateStore::new(),
        );
        assert!(matches!(
            result,
            Err(RaftError::UnknownMember { member: MemberId(9) })
        ));
    }

    #[test]
    fn duplicate_members_are_collapsed() {
        let node = node(1, &[1, 2, 2, 3, 3]);
        assert_eq!(node.members().len(), 3);
        assert_eq!(node.quorum_size(), 2);
    }

    #[test]
    fn single_member_elects_itself() {
        let mut node = node(1, &[1]);
        let mut outbox = Outbox::new();
        node.on_election_timeout(&mut outbox).unwrap();
        assert!(node.is_leader());
        assert!(outbox.is_empty());
    }
}
