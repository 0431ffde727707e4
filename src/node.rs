//! `Node`: wires the consensus module, the persistent store, the wire
//! transport, and the apply pipeline together as four cooperating `tokio`
//! tasks (cycle loop, per-RPC send, RPC server, apply worker) around a
//! `std::sync::Mutex<ConsensusModule>`, since every critical section here is
//! synchronous, CPU-only work and a blocking mutex is the right tool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};
use tracing::{error, warn};

use crate::apply::{self, ApplyOutcome, ApplyWorker, Completions, StateMachine};
use crate::config::{ClusterConfig, RaftConfig};
use crate::consensus::{ConsensusModule, Message, Tick};
use crate::errors::*;
use crate::protos::{
    AppendEntriesRequest, AppendEntriesResponse, Proposal, RequestVoteRequest,
    RequestVoteResponse, ServerId, Status,
};
use crate::store::PersistentStore;
use crate::timer::ElectionTimer;
use crate::transport::{RpcHandler, Transport};

/// Per-call RPC timeout (§5 "Cancellation and timeouts").
const RPC_TIMEOUT: Duration = Duration::from_secs(2);

/// Handles for the two background tasks [`Node::run`] spawns. Aborting both
/// stops the node as cleanly as killing the process would (no graceful
/// shutdown is specified beyond closing the persistent store, per §5).
pub struct NodeHandles {
    pub cycle: tokio::task::JoinHandle<()>,
    pub apply: tokio::task::JoinHandle<()>,
}

impl NodeHandles {
    pub fn abort(&self) {
        self.cycle.abort();
        self.apply.abort();
    }
}

/// One running node: the `ConsensusModule` plus everything needed to drive
/// it (transport, store, state machine, apply pipeline).
pub struct Node {
    id: ServerId,
    consensus: Arc<Mutex<ConsensusModule>>,
    transport: Arc<dyn Transport>,
    state_machine: Arc<dyn StateMachine>,
    apply_notify: Arc<Notify>,
    completions: Completions,
}

impl Node {
    /// Loads persistent state from `store`, builds a fresh
    /// `ConsensusModule` from it, and returns the node ready for
    /// [`Node::run`]. Volatile state always starts as `Follower` with
    /// `commitIndex = lastApplied = 0` (§3 "Ownership and lifecycles").
    pub fn open(
        id: ServerId,
        cluster: &ClusterConfig,
        store: Arc<dyn PersistentStore>,
        transport: Arc<dyn Transport>,
        state_machine: Arc<dyn StateMachine>,
        config: RaftConfig,
    ) -> Result<Arc<Self>> {
        let (meta, entries) = store.load()?;
        let peers: Vec<ServerId> = cluster.peers_of(&id).cloned().collect();
        let log = crate::log::Log::new(entries, store);
        let consensus = ConsensusModule::new(id.clone(), peers, meta, log, config);

        Ok(Arc::new(Node {
            id,
            consensus: Arc::new(Mutex::new(consensus)),
            transport,
            state_machine,
            apply_notify: Arc::new(Notify::new()),
            completions: Arc::new(Mutex::new(HashMap::new())),
        }))
    }

    pub fn id(&self) -> &ServerId {
        &self.id
    }

    pub fn is_leader(&self) -> bool {
        self.consensus.lock().unwrap().is_leader()
    }

    pub fn leader_id(&self) -> Option<ServerId> {
        self.consensus.lock().unwrap().leader_hint()
    }

    pub fn status(&self) -> Status {
        self.consensus.lock().unwrap().status()
    }

    /// Spawns the cycle loop and the apply worker, returning their join
    /// handles so a caller simulating a node restart/crash (the scenario
    /// harness; real deployments just let the process exit) can abort them.
    /// The RPC server task is spawned separately by the embedding binary (it
    /// needs the bound listener); it dispatches into [`Node`] via the
    /// [`RpcHandler`] impl below.
    pub fn run(self: &Arc<Self>) -> NodeHandles {
        let cycle_node = self.clone();
        let cycle_handle = tokio::spawn(async move { cycle_node.cycle_loop().await });

        let apply_worker = ApplyWorker::new(
            self.consensus.clone(),
            self.state_machine.clone(),
            self.apply_notify.clone(),
            self.completions.clone(),
        );
        let apply_handle = tokio::spawn(apply_worker.run());

        NodeHandles {
            cycle: cycle_handle,
            apply: apply_handle,
        }
    }

    /// The sole time-based driver (§5.1): wakes on `tick.next_tick`, takes
    /// the lock, advances the state machine, and dispatches anything the
    /// tick produced after releasing it.
    async fn cycle_loop(self: Arc<Self>) {
        let mut timer = ElectionTimer::new(Duration::from_millis(50));
        loop {
            let tick = {
                let mut cm = self.consensus.lock().unwrap();
                let mut tick = Tick::default();
                cm.cycle(&mut tick);
                if let Err(err) = self.persist_if_needed(&cm, &tick) {
                    error!(error = %err, "durable save failed, node is halting");
                    return;
                }
                tick
            };
            // Rearm before dispatching: a reply that arrives mid-dispatch and
            // wants an earlier recheck (e.g. a fresh election) still finds a
            // timer armed for *this* tick's duration, never one left over
            // from the previous one (§4.3 "stop-then-drain-then-start").
            timer.reset(tick.next_tick.unwrap_or(Duration::from_millis(50)));
            self.handle_tick(tick).await;
            timer.wait().await;
        }
    }

    fn persist_if_needed(&self, cm: &ConsensusModule, tick: &Tick) -> Result<()> {
        if tick.meta_dirty || tick.new_entries {
            cm.persist()?;
        }
        Ok(())
    }

    /// Dispatches everything a `Tick` produced: outbound RPCs (one spawned
    /// task per message, never awaited while holding the consensus lock),
    /// the reconciliation hook for discarded entries, and a wake-up for the
    /// apply worker if the commit index moved.
    async fn handle_tick(self: &Arc<Self>, tick: Tick) {
        for (peer, message) in tick.messages {
            let node = self.clone();
            tokio::spawn(async move { node.send_message(peer, message).await });
        }

        if !tick.reconcile.is_empty() {
            apply::reconcile_discarded(self.state_machine.as_ref(), tick.reconcile).await;
        }

        if tick.commit_advanced {
            self.apply_notify.notify_one();
        }
    }

    async fn send_message(self: Arc<Self>, peer: ServerId, message: Message) {
        match message {
            Message::RequestVote(req) => self.send_request_vote(peer, req).await,
            Message::AppendEntries(req) => self.send_append_entries(peer, req).await,
        }
    }

    async fn send_request_vote(self: Arc<Self>, peer: ServerId, req: RequestVoteRequest) {
        let sent_term = req.term;
        let result = tokio::time::timeout(RPC_TIMEOUT, self.transport.send_request_vote(&peer, req)).await;

        let mut cm = self.consensus.lock().unwrap();
        let mut tick = Tick::default();
        match result {
            Ok(Ok(resp)) => cm.handle_request_vote_response(peer, sent_term, resp, &mut tick),
            Ok(Err(err)) => warn!(%peer, error = %err, "RequestVote transport error"),
            Err(_) => warn!(%peer, "RequestVote timed out"),
        }
        let _ = self.persist_if_needed(&cm, &tick);
        drop(cm);
        self.handle_tick(tick).await;
    }

    async fn send_append_entries(self: Arc<Self>, peer: ServerId, req: AppendEntriesRequest) {
        let sent_term = req.term;
        let sent_prev_log_index = req.prev_log_index;
        let sent_num_entries = req.entries.len();
        let result = tokio::time::timeout(RPC_TIMEOUT, self.transport.send_append_entries(&peer, req)).await;

        let mut cm = self.consensus.lock().unwrap();
        let mut tick = Tick::default();
        match result {
            Ok(Ok(resp)) => cm.handle_append_entries_response(
                peer,
                sent_term,
                sent_prev_log_index,
                sent_num_entries,
                resp,
                &mut tick,
            ),
            Ok(Err(err)) => {
                warn!(%peer, error = %err, "AppendEntries transport error");
                cm.handle_append_entries_no_response(&peer);
            }
            Err(_) => {
                warn!(%peer, "AppendEntries timed out");
                cm.handle_append_entries_no_response(&peer);
            }
        }
        let _ = self.persist_if_needed(&cm, &tick);
        drop(cm);
        self.handle_tick(tick).await;
    }

    /// `Propose` (§4.5, §6): appends `command` to the leader's log and
    /// returns a receiver that resolves once the entry is committed and
    /// applied. Fails immediately with `NotLeader` otherwise.
    pub async fn propose(self: &Arc<Self>, command: Vec<u8>) -> Result<oneshot::Receiver<ApplyOutcome>> {
        let (tx, rx) = oneshot::channel();
        let tick = {
            let mut cm = self.consensus.lock().unwrap();
            let mut tick = Tick::default();
            let proposal: Proposal = cm.propose(command, &mut tick)?;
            self.completions.lock().unwrap().insert(proposal.index, tx);
            self.persist_if_needed(&cm, &tick)?;
            tick
        };
        self.handle_tick(tick).await;
        Ok(rx)
    }
}

/// Dispatches inbound RPCs into the consensus module under the lock,
/// persisting and reconciling exactly as the cycle loop does.
#[async_trait]
impl RpcHandler for Node {
    async fn handle_request_vote(&self, req: RequestVoteRequest) -> RequestVoteResponse {
        let (resp, tick) = {
            let mut cm = self.consensus.lock().unwrap();
            let mut tick = Tick::default();
            let resp = cm.handle_request_vote(req, &mut tick);
            if let Err(err) = self.persist_if_needed(&cm, &tick) {
                error!(error = %err, "durable save failed while handling RequestVote");
            }
            (resp, tick)
        };
        if !tick.reconcile.is_empty() {
            apply::reconcile_discarded(self.state_machine.as_ref(), tick.reconcile).await;
        }
        if tick.commit_advanced {
            self.apply_notify.notify_one();
        }
        resp
    }

    async fn handle_append_entries(&self, req: AppendEntriesRequest) -> AppendEntriesResponse {
        let (resp, tick) = {
            let mut cm = self.consensus.lock().unwrap();
            let mut tick = Tick::default();
            let resp = cm.handle_append_entries(req, &mut tick);
            if let Err(err) = self.persist_if_needed(&cm, &tick) {
                error!(error = %err, "durable save failed while handling AppendEntries");
            }
            (resp, tick)
        };
        if !tick.reconcile.is_empty() {
            apply::reconcile_discarded(self.state_machine.as_ref(), tick.reconcile).await;
        }
        if tick.commit_advanced {
            self.apply_notify.notify_one();
        }
        resp
    }
}
