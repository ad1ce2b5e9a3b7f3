//! The Raft Node (§4.1): the protocol engine driving elections, heartbeats,
//! replication, and client submissions.

use crate::config::{NodeConfig, ELECTION_TIMEOUT_MAX, ELECTION_TIMEOUT_MIN, HEARTBEAT_INTERVAL, SUBMIT_DEADLINE};
use crate::log::{ApplyChannel, Log};
use crate::rpc::RaftMessage;
use crate::state_machine::StateMachine;
use crate::transport::PeerTransport;
use crate::types::{LogEntry, NodeId, Role, Term};
use log::{debug, error, info};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// The outcome of a `SubmitOperation` call (§4.1), mirroring the wire
/// response shape exactly — unlike `CoreError`, this always carries a value
/// even on failure, the way the peer RPC always returns a response tuple.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub success: bool,
    pub result: String,
    pub leader_id: String,
}

/// Everything mutated under the node's single mutex (§5): role/term/vote/log
/// /commit, leader-only replication bookkeeping, and the apply channel. The
/// lock is always released before an outbound RPC and its term/role are
/// re-validated on reacquisition, so no lock is ever held across an await on
/// the network.
struct NodeState {
    current_term: Term,
    voted_for: Option<NodeId>,
    role: Role,
    leader_id: Option<NodeId>,
    log: Log,
    commit_index: u64,
    last_applied: u64,
    apply_channel: ApplyChannel,

    // Leader-only volatile state (§3 PeerDirectory-adjacent bookkeeping).
    next_index: HashMap<NodeId, u64>,
    match_index: HashMap<NodeId, u64>,

    last_heartbeat: Instant,
    election_timeout: Duration,
}

impl NodeState {
    fn new() -> Self {
        NodeState {
            current_term: Term::ZERO,
            voted_for: None,
            role: Role::Follower,
            leader_id: None,
            log: Log::new(),
            commit_index: 0,
            last_applied: 0,
            apply_channel: ApplyChannel::new(),
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            last_heartbeat: Instant::now(),
            election_timeout: random_election_timeout(),
        }
    }

    fn reset_timer(&mut self) {
        self.last_heartbeat = Instant::now();
        self.election_timeout = random_election_timeout();
    }

    /// Become a follower of `term`, clearing vote and (optionally) leader.
    fn step_down(&mut self, term: Term, clear_leader: bool) {
        self.current_term = term;
        self.role = Role::Follower;
        self.voted_for = None;
        if clear_leader {
            self.leader_id = None;
        }
    }
}

fn random_election_timeout() -> Duration {
    let mut rng = rand::thread_rng();
    let min = ELECTION_TIMEOUT_MIN.as_millis() as u64;
    let max = ELECTION_TIMEOUT_MAX.as_millis() as u64;
    Duration::from_millis(rng.gen_range(min..=max))
}

pub struct RaftNode {
    pub node_id: NodeId,
    config: NodeConfig,
    state: Mutex<NodeState>,
    transport: PeerTransport,
    state_machine: Arc<dyn StateMachine>,
    id_to_address: HashMap<NodeId, String>,
    stop: AtomicBool,
}

impl RaftNode {
    pub fn new(config: NodeConfig, state_machine: Arc<dyn StateMachine>) -> Arc<Self> {
        let id_to_address = config.id_to_address();
        let transport = PeerTransport::new(config.rpc_timeout);
        Arc::new(RaftNode {
            node_id: config.node_id.clone(),
            config,
            state: Mutex::new(NodeState::new()),
            transport,
            state_machine,
            id_to_address,
            stop: AtomicBool::new(false),
        })
    }

    fn majority(&self) -> usize {
        (self.config.peers.len() + 1) / 2 + 1
    }

    /// Cooperative shutdown (§5): the timer loop exits at its next tick.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub async fn is_leader(&self) -> bool {
        self.state.lock().await.role == Role::Leader
    }

    pub async fn current_leader_id(&self) -> Option<NodeId> {
        self.state.lock().await.leader_id.clone()
    }

    /// Highest committed log index this node has observed (§4.3), exposed
    /// for embedders that want to watch replication catch-up progress.
    pub async fn committed_index(&self) -> u64 {
        self.state.lock().await.commit_index
    }

    fn leader_address(&self, leader_id: &str) -> Option<String> {
        self.id_to_address.get(leader_id).cloned()
    }

    /// Spawn the node's single timer loop (§5: "one timer loop per node,
    /// 100ms tick"). Mirrors the reference implementation's polling loop:
    /// each tick checks whether to fire an election or a heartbeat.
    pub fn start(self: &Arc<Self>) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            node.run_timer_loop().await;
        });
    }

    async fn run_timer_loop(self: Arc<Self>) {
        let mut last_heartbeat_sent: Option<Instant> = None;
        while !self.stop.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(100)).await;

            let (should_heartbeat, should_elect, term, commit_index) = {
                let state = self.state.lock().await;
                let now = Instant::now();
                let should_heartbeat = state.role == Role::Leader
                    && last_heartbeat_sent
                        .map(|t| now.duration_since(t) >= HEARTBEAT_INTERVAL)
                        .unwrap_or(true);
                let should_elect =
                    state.role != Role::Leader && now.duration_since(state.last_heartbeat) >= state.election_timeout;
                (should_heartbeat, should_elect, state.current_term, state.commit_index)
            };

            if should_heartbeat {
                last_heartbeat_sent = Some(Instant::now());
                self.broadcast_append_entries(term, commit_index).await;
            }

            if should_elect {
                self.start_election().await;
            }
        }
    }

    /// Begin a new election (§4.1): become candidate, vote for self, and
    /// request votes from every peer.
    pub async fn start_election(self: &Arc<Self>) {
        let (term, last_log_index, last_log_term) = {
            let mut state = self.state.lock().await;
            if state.role == Role::Leader {
                return;
            }
            state.role = Role::Candidate;
            state.current_term = state.current_term.next();
            state.voted_for = Some(self.node_id.clone());
            state.leader_id = None;
            state.reset_timer();
            info!("[{}] starting election for term {}", self.node_id, state.current_term);
            (state.current_term, state.log.last_index(), state.log.last_term())
        };

        let mut votes = 1usize; // self
        let majority = self.majority();

        if votes >= majority {
            // Single-node cluster: no peers to canvass, win immediately.
            self.become_leader(term).await;
            return;
        }

        for peer in self.config.peers.clone() {
            let request = RaftMessage::RequestVote {
                term,
                candidate_id: self.node_id.clone(),
                last_log_index,
                last_log_term,
            };
            println!("Node {} sends RPC RequestVote to Node {}", self.node_id, peer.id);

            let response = match self.transport.call(&peer.address, &request).await {
                Ok(r) => r,
                Err(e) => {
                    debug!("[{}] RequestVote to {} failed: {}", self.node_id, peer.id, e);
                    continue;
                }
            };

            let (resp_term, vote_granted) = match response {
                RaftMessage::RequestVoteResponse { term, vote_granted, .. } => (term, vote_granted),
                _ => continue,
            };

            let mut state = self.state.lock().await;
            if resp_term > state.current_term {
                info!("[{}] stepping down: saw higher term {}", self.node_id, resp_term);
                state.step_down(resp_term, true);
                state.reset_timer();
                return;
            }
            if state.role != Role::Candidate || term != state.current_term {
                return; // a concurrent event already moved us on
            }
            drop(state);

            if vote_granted {
                votes += 1;
                if votes >= majority {
                    self.become_leader(term).await;
                    return;
                }
            }
        }

        let mut state = self.state.lock().await;
        if state.role == Role::Candidate && state.current_term == term {
            info!("[{}] election for term {} failed, reverting to follower", self.node_id, term);
            state.role = Role::Follower;
        }
    }

    async fn become_leader(self: &Arc<Self>, term: Term) {
        let commit_index = {
            let mut state = self.state.lock().await;
            if state.role != Role::Candidate || state.current_term != term {
                return;
            }
            state.role = Role::Leader;
            state.leader_id = Some(self.node_id.clone());
            let last_index = state.log.last_index();
            for peer in &self.config.peers {
                state.next_index.insert(peer.id.clone(), last_index + 1);
                state.match_index.insert(peer.id.clone(), 0);
            }
            state.match_index.insert(self.node_id.clone(), last_index);
            info!("Node {} become the new leader", self.node_id);
            state.commit_index
        };

        self.broadcast_append_entries(term, commit_index).await;
    }

    /// Broadcast `AppendEntries` to every peer, sending each follower only
    /// the entries it still needs per its tracked `next_index` (§4.1
    /// heartbeat/replication).
    async fn broadcast_append_entries(self: &Arc<Self>, term: Term, _leader_commit_hint: u64) {
        let peers = self.config.peers.clone();
        let mut success_count = 1usize; // self

        for peer in peers {
            let (prev_log_index, prev_log_term, entries, leader_commit) = {
                let state = self.state.lock().await;
                if state.role != Role::Leader || state.current_term != term {
                    return;
                }
                let next_index = *state.next_index.get(&peer.id).unwrap_or(&(state.log.last_index() + 1));
                let prev_log_index = next_index.saturating_sub(1);
                let prev_log_term = state.log.term_at(prev_log_index).unwrap_or(Term::ZERO);
                let entries = state.log.entries_from(next_index);
                (prev_log_index, prev_log_term, entries, state.commit_index)
            };

            let request = RaftMessage::AppendEntries {
                term,
                leader_id: self.node_id.clone(),
                prev_log_index,
                prev_log_term,
                entries,
                leader_commit,
            };
            println!("Node {} sends RPC AppendEntries to Node {}", self.node_id, peer.id);

            let response = match self.transport.call(&peer.address, &request).await {
                Ok(r) => r,
                Err(e) => {
                    debug!("[{}] AppendEntries to {} failed: {}", self.node_id, peer.id, e);
                    continue;
                }
            };

            let (resp_term, success, follower_last_index) = match response {
                RaftMessage::AppendEntriesResponse { term, success, last_log_index, .. } => {
                    (term, success, last_log_index)
                }
                _ => continue,
            };

            let mut state = self.state.lock().await;
            if resp_term > state.current_term {
                info!("[{}] stepping down: saw higher term {} in AppendEntries response", self.node_id, resp_term);
                state.step_down(resp_term, true);
                state.reset_timer();
                return;
            }
            if state.role != Role::Leader || state.current_term != term {
                return;
            }

            if success {
                success_count += 1;
                let new_match = follower_last_index;
                let cur_match = *state.match_index.get(&peer.id).unwrap_or(&0);
                if new_match > cur_match {
                    state.match_index.insert(peer.id.clone(), new_match);
                }
                let desired_next = new_match + 1;
                let cur_next = *state.next_index.get(&peer.id).unwrap_or(&1);
                if desired_next > cur_next {
                    state.next_index.insert(peer.id.clone(), desired_next);
                }
            } else {
                let suggested = follower_last_index.saturating_add(1).max(1);
                let cur_next = *state.next_index.get(&peer.id).unwrap_or(&1);
                if suggested < cur_next {
                    state.next_index.insert(peer.id.clone(), suggested);
                }
            }
        }

        self.try_advance_commit_index(term, success_count).await;
    }

    async fn try_advance_commit_index(&self, term: Term, success_count: usize) {
        if success_count < self.majority() {
            return;
        }

        let mut state = self.state.lock().await;
        if state.role != Role::Leader || state.current_term != term {
            return;
        }

        let last_index = state.log.last_index();
        let mut new_commit = state.commit_index;
        for n in (state.commit_index + 1)..=last_index {
            let replicated = 1 + state
                .match_index
                .iter()
                .filter(|(id, &m)| id.as_str() != self.node_id && m >= n)
                .count();
            if replicated >= self.majority() && state.log.term_at(n) == Some(state.current_term) {
                new_commit = n;
            }
        }

        if new_commit > state.commit_index {
            state.commit_index = new_commit;
            info!("[{}] advanced commit_index to {}", self.node_id, new_commit);
            let last_applied = state.last_applied;
            let NodeState { ref log, ref mut apply_channel, .. } = *state;
            state.last_applied =
                apply_channel.apply_committed(log, last_applied, new_commit, self.state_machine.as_ref());
        }
    }

    /// Handle an incoming `RequestVote` RPC (§4.1).
    pub async fn handle_request_vote(
        &self,
        term: Term,
        candidate_id: NodeId,
        last_log_index: u64,
        last_log_term: Term,
    ) -> (Term, bool) {
        println!("Node {} runs RPC RequestVote called by Node {}", self.node_id, candidate_id);

        let mut state = self.state.lock().await;

        if term < state.current_term {
            return (state.current_term, false);
        }

        if term > state.current_term {
            state.step_down(term, true);
        }

        let mut vote_granted = false;
        let already_voted_for_other =
            matches!(&state.voted_for, Some(existing) if existing != &candidate_id);

        if !already_voted_for_other {
            let log_is_up_to_date = last_log_term > state.log.last_term()
                || (last_log_term == state.log.last_term() && last_log_index >= state.log.last_index());

            if log_is_up_to_date {
                state.voted_for = Some(candidate_id.clone());
                state.reset_timer();
                vote_granted = true;
                info!("[{}] granted vote to {} for term {}", self.node_id, candidate_id, term);
            } else {
                debug!(
                    "[{}] denied vote to {}: log not up to date (candidate T={} I={}, ours T={} I={})",
                    self.node_id, candidate_id, last_log_term, last_log_index, state.log.last_term(), state.log.last_index()
                );
            }
        }

        (state.current_term, vote_granted)
    }

    /// Handle an incoming `AppendEntries` RPC (§4.1). Returns
    /// `(term, success, last_log_index)`; `last_log_index` lets the leader
    /// adjust `next_index` on rejection.
    pub async fn handle_append_entries(
        &self,
        term: Term,
        leader_id: NodeId,
        prev_log_index: u64,
        prev_log_term: Term,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    ) -> (Term, bool, u64) {
        println!("Node {} runs RPC AppendEntries called by Node {}", self.node_id, leader_id);

        let mut state = self.state.lock().await;

        if term < state.current_term {
            return (state.current_term, false, state.log.last_index());
        }

        state.current_term = term;
        state.role = Role::Follower;
        state.leader_id = Some(leader_id);
        state.voted_for = None;
        state.reset_timer();

        let accepted = state.log.accept_from_leader(prev_log_index, prev_log_term, &entries);

        let success = match accepted {
            Ok(last_new_index) => {
                if leader_commit > state.commit_index {
                    let new_commit = leader_commit.min(last_new_index);
                    state.commit_index = new_commit;

                    let last_applied = state.last_applied;
                    let NodeState { ref log, ref mut apply_channel, .. } = *state;
                    state.last_applied =
                        apply_channel.apply_committed(log, last_applied, new_commit, self.state_machine.as_ref());
                }
                true
            }
            Err(()) => {
                error!(
                    "[{}] AppendEntries rejected: log mismatch at index {} (expected term {})",
                    self.node_id, prev_log_index, prev_log_term
                );
                false
            }
        };

        (state.current_term, success, state.log.last_index())
    }

    /// Handle `SubmitOperation` (§4.1): serve locally if leader, forward to
    /// the known leader otherwise, or fail with `NoLeader`.
    pub async fn submit_operation(self: &Arc<Self>, operation: String, source_id: NodeId) -> SubmitOutcome {
        println!("Node {} runs RPC SubmitOperation called by Node {}", self.node_id, source_id);

        let (is_self_leader, leader_id) = {
            let state = self.state.lock().await;
            (state.role == Role::Leader && state.leader_id.as_deref() == Some(self.node_id.as_str()), state.leader_id.clone())
        };

        if !is_self_leader {
            return self.forward_submit(operation, source_id, leader_id).await;
        }

        let (term, index, rx) = {
            let mut state = self.state.lock().await;
            let term = state.current_term;
            let index = state.log.append(term, operation);
            let rx = state.apply_channel.register(index);
            (term, index, rx)
        };

        self.broadcast_append_entries(term, 0).await;

        match tokio::time::timeout(SUBMIT_DEADLINE, rx).await {
            Ok(Ok(result)) => SubmitOutcome { success: true, result, leader_id: self.node_id.clone() },
            Ok(Err(_)) | Err(_) => {
                self.state.lock().await.apply_channel.cancel(index);
                SubmitOutcome {
                    success: false,
                    result: "Commit timeout".to_string(),
                    leader_id: self.node_id.clone(),
                }
            }
        }
    }

    async fn forward_submit(&self, operation: String, source_id: NodeId, leader_id: Option<NodeId>) -> SubmitOutcome {
        let leader_id = match leader_id {
            Some(id) => id,
            None => {
                return SubmitOutcome { success: false, result: "No known leader".to_string(), leader_id: String::new() };
            }
        };

        let address = match self.leader_address(&leader_id) {
            Some(a) => a,
            None => {
                return SubmitOutcome { success: false, result: "No known leader".to_string(), leader_id: leader_id.clone() };
            }
        };

        println!("Node {} sends RPC SubmitOperation to Node {}", self.node_id, leader_id);
        let request = RaftMessage::SubmitOperation { operation, source_id };

        match self.transport.call(&address, &request).await {
            Ok(RaftMessage::SubmitOperationResponse { success, result, leader_id }) => {
                SubmitOutcome { success, result, leader_id }
            }
            Ok(_) => SubmitOutcome { success: false, result: "unexpected response".to_string(), leader_id },
            Err(e) => {
                error!("[{}] forward SubmitOperation to {} failed: {}", self.node_id, leader_id, e);
                SubmitOutcome { success: false, result: e.to_string(), leader_id }
            }
        }
    }
}
