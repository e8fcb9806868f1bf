//! # progress
//!
//! why: the leader must know how far each follower's log matches its own
//! relations: owned by the leader role in node.rs, fed by AppendEntries responses
//! what: per-follower next/match index tracking and majority match computation

use std::collections::BTreeMap;

use crate::types::{LogIndex, MemberId, NO_INDEX};

/// Replication state of a single follower
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerProgress {
    /// Next index the leader will send
    pub next_index: LogIndex,
    /// Highest index known to match the leader's log
    pub match_index: LogIndex,
}

/// Leader-side replication tracker
///
/// Responses may arrive duplicated or out of order, so `match_index` only
/// ever moves forward and `next_index` never drops below `match_index + 1`.
#[derive(Debug, Clone, Default)]
pub struct ReplicationProgress {
    followers: BTreeMap<MemberId, FollowerProgress>,
}

impl ReplicationProgress {
    /// Start tracking `followers`, optimistically assuming they match `last_index`
    pub fn new(followers: impl IntoIterator<Item = MemberId>, last_index: LogIndex) -> Self {
        let followers = followers
            .into_iter()
            .map(|id| {
                (
                    id,
                    FollowerProgress {
                        next_index: last_index + 1,
                        match_index: NO_INDEX,
                    },
                )
            })
            .collect();
        Self { followers }
    }

    pub fn get(&self, id: MemberId) -> Option<FollowerProgress> {
        self.followers.get(&id).copied()
    }

    pub fn followers(&self) -> impl Iterator<Item = (MemberId, FollowerProgress)> + '_ {
        self.followers.iter().map(|(id, progress)| (*id, *progress))
    }

    /// Apply a successful response. Returns true if `match_index` advanced.
    pub fn record_success(&mut self, id: MemberId, match_index: LogIndex) -> bool {
        let Some(progress) = self.followers.get_mut(&id) else {
            return false;
        };
        let advanced = match_index > progress.match_index;
        if advanced {
            progress.match_index = match_index;
        }
        progress.next_index = progress.next_index.max(progress.match_index + 1);
        advanced
    }

    /// Apply a rejection carrying the follower's `append_index` hint.
    ///
    /// Returns the new `next_index`, or `None` for an unknown member.
    pub fn record_rejection(&mut self, id: MemberId, append_index: LogIndex) -> Option<LogIndex> {
        let progress = self.followers.get_mut(&id)?;
        let hinted = (progress.next_index - 1).min(append_index + 1);
        progress.next_index = hinted.max(progress.match_index + 1).max(0);
        Some(progress.next_index)
    }

    /// Highest index present on a quorum, counting the leader's own `leader_last_index`.
    pub fn quorum_match_index(&self, leader_last_index: LogIndex, quorum: usize) -> LogIndex {
        let mut matched: Vec<LogIndex> = self
            .followers
            .values()
            .map(|progress| progress.match_index)
            .chain(std::iter::once(leader_last_index))
            .collect();
        matched.sort_unstable_by(|a, b| b.cmp(a));
        quorum
            .checked_sub(1)
            .and_then(|pos| matched.get(pos).copied())
            .unwrap_or(NO_INDEX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress() -> ReplicationProgress {
        ReplicationProgress::new([MemberId(2), MemberId(3)], 4)
    }

    #[test]
    fn new_followers_start_after_leader_log() {
        let p = progress();
        let f = p.get(MemberId(2)).unwrap();
        assert_eq!(f.next_index, 5);
        assert_eq!(f.match_index, -1);
    }

    #[test]
    fn stale_success_does_not_regress_match() {
        let mut p = progress();
        assert!(p.record_success(MemberId(2), 4));
        assert!(!p.record_success(MemberId(2), 2));
        assert_eq!(p.get(MemberId(2)).unwrap().match_index, 4);
        assert_eq!(p.get(MemberId(2)).unwrap().next_index, 5);
    }

    #[test]
    fn rejection_jumps_back_to_follower_log_end() {
        let mut p = ReplicationProgress::new([MemberId(2)], 9);
        assert_eq!(p.record_rejection(MemberId(2), 1), Some(2));
    }

    #[test]
    fn rejection_with_long_follower_log_steps_back_one() {
        let mut p = progress();
        assert_eq!(p.record_rejection(MemberId(2), 7), Some(4));
        assert_eq!(p.record_rejection(MemberId(2), 7), Some(3));
    }

    #[test]
    fn rejection_never_goes_below_match() {
        let mut p = progress();
        p.record_success(MemberId(2), 3);
        assert_eq!(p.record_rejection(MemberId(2), -1), Some(4));
    }

    #[test]
    fn rejection_never_goes_negative() {
        let mut p = ReplicationProgress::new([MemberId(2)], -1);
        assert_eq!(p.record_rejection(MemberId(2), -1), Some(0));
    }

    #[test]
    fn unknown_member_is_ignored() {
        let mut p = progress();
        assert!(!p.record_success(MemberId(9), 3));
        assert_eq!(p.record_rejection(MemberId(9), 3), None);
    }

    #[test]
    fn quorum_match_counts_leader() {
        let mut p = progress();
        assert_eq!(p.quorum_match_index(4, 2), -1);
        p.record_success(MemberId(3), 2);
        assert_eq!(p.quorum_match_index(4, 2), 2);

        let mut p5 = ReplicationProgress::new([MemberId(2), MemberId(3), MemberId(4), MemberId(5)], 4);
        assert_eq!(p5.quorum_match_index(4, 3), -1);
        p5.record_success(MemberId(2), 3);
        p5.record_success(MemberId(3), 1);
        assert_eq!(p5.quorum_match_index(4, 3), 1);
    }
}
