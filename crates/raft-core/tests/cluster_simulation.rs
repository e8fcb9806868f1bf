//! # cluster simulation tests
//!
//! why: safety must hold under any interleaving, loss, duplication and reordering
//! relations: drives several raft-core nodes through an in-process lossy network
//! what: seeded random runs checking term/commit monotonicity, single leader per term,
//!       log matching, committed prefix agreement, and progress once the network heals

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use raft_core::{
    Envelope, InMemoryLog, InMemoryStateStore, LogIndex, MemberId, Outbox, RaftConfig, RaftLog,
    RaftNode, Term,
};

type SimNode = RaftNode<InMemoryLog, InMemoryStateStore>;

struct Cluster {
    nodes: Vec<SimNode>,
    network: Vec<Envelope>,
    rng: StdRng,
    leaders: HashMap<Term, MemberId>,
    last_terms: Vec<Term>,
    last_commits: Vec<LogIndex>,
    proposals: u8,
}

impl Cluster {
    fn new(size: u64, seed: u64) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let members: Vec<MemberId> = (0..size).map(MemberId).collect();
        let config = RaftConfig {
            election_timeout_min: 10,
            election_timeout_max: 20,
            heartbeat_interval: 3,
            max_append_entries: 4,
        };
        let nodes: Vec<SimNode> = members
            .iter()
            .map(|id| {
                RaftNode::new(
                    *id,
                    members.clone(),
                    config.clone(),
                    InMemoryLog::new(),
                    InMemoryStateStore::new(),
                )
                .unwrap()
                .with_timer_seed(seed.wrapping_mul(31).wrapping_add(id.0))
            })
            .collect();

        Self {
            last_terms: vec![0; nodes.len()],
            last_commits: vec![-1; nodes.len()],
            nodes,
            network: Vec::new(),
            rng: StdRng::seed_from_u64(seed),
            leaders: HashMap::new(),
            proposals: 0,
        }
    }

    fn absorb(&mut self, mut outbox: Outbox) {
        self.network.extend(outbox.drain());
    }

    /// one random step on a lossy, duplicating, reordering network
    fn chaos_step(&mut self) {
        match self.rng.gen_range(0..10) {
            0..=2 => {
                let i = self.rng.gen_range(0..self.nodes.len());
                let mut outbox = Outbox::new();
                self.nodes[i].tick(&mut outbox).unwrap();
                self.absorb(outbox);
            }
            3 => self.propose(),
            _ if !self.network.is_empty() => {
                let pick = self.rng.gen_range(0..self.network.len());
                let envelope = if self.rng.gen_bool(0.15) {
                    self.network[pick].clone()
                } else {
                    self.network.swap_remove(pick)
                };
                if !self.rng.gen_bool(0.1) {
                    self.deliver(envelope);
                }
            }
            _ => {}
        }
        self.check_invariants();
    }

    /// tick everyone, then deliver everything in order until the network is quiet
    fn calm_round(&mut self) {
        for i in 0..self.nodes.len() {
            let mut outbox = Outbox::new();
            self.nodes[i].tick(&mut outbox).unwrap();
            self.absorb(outbox);
        }
        while !self.network.is_empty() {
            let envelope = self.network.remove(0);
            self.deliver(envelope);
        }
        self.check_invariants();
    }

    fn deliver(&mut self, envelope: Envelope) {
        let mut outbox = Outbox::new();
        self.nodes[envelope.to.0 as usize]
            .handle(envelope.message, &mut outbox)
            .unwrap();
        self.absorb(outbox);
    }

    fn propose(&mut self) {
        let leader = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].is_leader())
            .max_by_key(|&i| self.nodes[i].current_term());
        if let Some(i) = leader {
            let mut outbox = Outbox::new();
            self.proposals = self.proposals.wrapping_add(1);
            self.nodes[i]
                .propose(vec![self.proposals], &mut outbox)
                .unwrap();
            self.absorb(outbox);
        }
    }

    fn check_invariants(&mut self) {
        for (i, node) in self.nodes.iter().enumerate() {
            assert!(node.current_term() >= self.last_terms[i], "term went backwards");
            assert!(node.commit_index() >= self.last_commits[i], "commit went backwards");
            self.last_terms[i] = node.current_term();
            self.last_commits[i] = node.commit_index();

            if node.is_leader() {
                let previous = self.leaders.insert(node.current_term(), node.id());
                if let Some(other) = previous {
                    assert_eq!(other, node.id(), "two leaders in term {}", node.current_term());
                }
            }
        }
        self.check_log_matching();
        self.check_committed_prefixes();
    }

    fn check_log_matching(&self) {
        for a in &self.nodes {
            for b in &self.nodes {
                let (la, lb) = (a.log().entries(), b.log().entries());
                let shared = la.len().min(lb.len());
                if let Some(last_same) = (0..shared).rev().find(|&i| la[i].term == lb[i].term) {
                    assert_eq!(
                        la[..=last_same],
                        lb[..=last_same],
                        "log matching violated between {} and {}",
                        a.id(),
                        b.id()
                    );
                }
            }
        }
    }

    fn check_committed_prefixes(&self) {
        let longest = self
            .nodes
            .iter()
            .max_by_key(|n| n.commit_index())
            .expect("cluster is not empty");
        let reference = &longest.log().entries()[..(longest.commit_index() + 1) as usize];
        for node in &self.nodes {
            let committed = (node.commit_index() + 1) as usize;
            assert_eq!(
                node.log().entries()[..committed],
                reference[..committed],
                "{} committed a different prefix",
                node.id()
            );
        }
    }

    /// a leader whose term nobody has moved past
    fn stable_leader(&self) -> Option<&SimNode> {
        let max_term = self.nodes.iter().map(|n| n.current_term()).max()?;
        self.nodes
            .iter()
            .find(|n| n.is_leader() && n.current_term() == max_term)
    }

    fn max_commit(&self) -> LogIndex {
        self.nodes.iter().map(|n| n.commit_index()).max().unwrap_or(-1)
    }
}

fn run(size: u64, seed: u64) {
    let mut cluster = Cluster::new(size, seed);
    for _ in 0..4_000 {
        cluster.chaos_step();
    }

    // once the network heals a leader emerges and new proposals commit everywhere
    let mut rounds = 0;
    while cluster.stable_leader().is_none() {
        cluster.calm_round();
        rounds += 1;
        assert!(rounds < 500, "no leader after the network healed (seed {seed})");
    }
    cluster.propose();
    let target = cluster
        .stable_leader()
        .map(|n| n.log().last_index())
        .unwrap_or(-1);
    for _ in 0..50 {
        cluster.calm_round();
    }
    assert!(cluster.max_commit() >= target, "proposal never committed (seed {seed})");
}

#[test]
fn three_members_stay_safe_under_chaos() {
    for seed in 0..8 {
        run(3, seed);
    }
}

#[test]
fn five_members_stay_safe_under_chaos() {
    for seed in 100..104 {
        run(5, seed);
    }
}

#[test]
fn restarted_member_keeps_its_vote() {
    let mut cluster = Cluster::new(3, 7);
    while cluster.stable_leader().is_none() {
        cluster.calm_round();
    }
    for _ in 0..5 {
        cluster.propose();
        cluster.calm_round();
    }

    let node = cluster.nodes.remove(2);
    let term = node.current_term();
    let voted_for = node.voted_for();
    let last_index = node.log().last_index();
    let (log, store) = node.into_parts();
    let members: Vec<MemberId> = (0..3).map(MemberId).collect();
    let restarted = RaftNode::new(MemberId(2), members, RaftConfig::default(), log, store).unwrap();

    assert_eq!(restarted.current_term(), term);
    assert_eq!(restarted.voted_for(), voted_for);
    assert_eq!(restarted.log().last_index(), last_index);
    assert!(last_index >= 4);
}
