//! # outbound
//!
//! why: the engine emits messages but never owns a transport
//! relations: passed into every RaftNode handler; transports implement it
//! what: Outbound trait, Envelope, Outbox collector, mpsc sender adapter

use std::collections::VecDeque;
use std::sync::mpsc;

use crate::message::RaftMessage;
use crate::types::MemberId;

/// A message addressed to a member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub to: MemberId,
    pub message: RaftMessage,
}

/// Fire-and-forget send to a named member
///
/// No ordering or delivery guarantee is assumed; delivery may duplicate.
pub trait Outbound {
    fn send(&mut self, to: MemberId, message: RaftMessage);
}

/// Collects outbound messages in send order
#[derive(Debug, Default)]
pub struct Outbox {
    queue: VecDeque<Envelope>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued message, oldest first
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Outbound for Outbox {
    fn send(&mut self, to: MemberId, message: RaftMessage) {
        self.queue.push_back(Envelope { to, message });
    }
}

impl Outbound for mpsc::Sender<Envelope> {
    fn send(&mut self, to: MemberId, message: RaftMessage) {
        // a closed receiver is indistinguishable from a lost message
        if mpsc::Sender::send(self, Envelope { to, message }).is_err() {
            ::log::debug!("outbound channel closed, dropping message to {to}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RequestVoteResponse;

    fn vote(from: u64) -> RaftMessage {
        RequestVoteResponse {
            from: MemberId(from),
            term: 1,
            vote_granted: true,
        }
        .into()
    }

    #[test]
    fn outbox_drains_in_order() {
        let mut outbox = Outbox::new();
        outbox.send(MemberId(2), vote(1));
        outbox.send(MemberId(3), vote(1));

        let sent = outbox.drain();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, MemberId(2));
        assert!(outbox.is_empty());
    }

    #[test]
    fn sender_ignores_closed_receiver() {
        let (mut tx, rx) = mpsc::channel::<Envelope>();
        Outbound::send(&mut tx, MemberId(2), vote(1));
        assert_eq!(rx.recv().unwrap().to, MemberId(2));

        drop(rx);
        Outbound::send(&mut tx, MemberId(2), vote(1));
    }
}
