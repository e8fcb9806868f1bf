//! # store
//!
//! why: the vote record must survive restarts so a node never votes twice in a term
//! relations: written by node.rs before any vote or term change is acknowledged
//! what: StateStore trait, InMemoryStateStore for testing

use std::io;

use crate::types::{MemberId, Term};

/// Durable storage for the current term and vote
pub trait StateStore {
    /// persist the current term and voted_for
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<MemberId>) -> io::Result<()>;

    /// load the persisted term and voted_for, `(0, None)` for a fresh node
    fn load_term_and_vote(&self) -> io::Result<(Term, Option<MemberId>)>;
}

/// in-memory term/vote store
///
/// survives as long as the value does; tests move it between node incarnations
/// to simulate a restart
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateStore {
    term: Term,
    voted_for: Option<MemberId>,
}

impl InMemoryStateStore {
    /// create a store with term 0 and no vote
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn save_term_and_vote(&mut self, term: Term, voted_for: Option<MemberId>) -> io::Result<()> {
        self.term = term;
        self.voted_for = voted_for;
        Ok(())
    }

    fn load_term_and_vote(&self) -> io::Result<(Term, Option<MemberId>)> {
        Ok((self.term, self.voted_for))
    }
}
