//! Integration tests driven through in-process `Node`s wired together with
//! `InProcessTransport` (no sockets, no real disk): each scenario spins up a
//! small cluster, proposes commands, and asserts on the replicated state
//! every node converges to.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use raft_core::apply::{ApplyOutcome, StateMachine};
use raft_core::config::{ClusterConfig, RaftConfig};
use raft_core::node::{Node, NodeHandles};
use raft_core::protos::LogIndex;
use raft_core::store::MemoryStore;
use raft_core::transport::{InProcessNetwork, InProcessTransport};

/// Records every command applied, in the order it was applied, so tests can
/// assert on ordering and count without needing a real domain state machine.
struct RecordingMachine {
    applied: Mutex<Vec<(LogIndex, Vec<u8>)>>,
    reconciled: Mutex<Vec<(LogIndex, Vec<u8>)>>,
}

impl RecordingMachine {
    fn new() -> Arc<Self> {
        Arc::new(RecordingMachine {
            applied: Mutex::new(Vec::new()),
            reconciled: Mutex::new(Vec::new()),
        })
    }

    fn applied_count(&self) -> usize {
        self.applied.lock().unwrap().len()
    }
}

#[async_trait]
impl StateMachine for RecordingMachine {
    async fn apply(&self, index: LogIndex, command: &[u8]) -> ApplyOutcome {
        self.applied.lock().unwrap().push((index, command.to_vec()));
        Ok(())
    }

    async fn apply_for_reconciliation(&self, index: LogIndex, command: &[u8]) -> ApplyOutcome {
        self.reconciled.lock().unwrap().push((index, command.to_vec()));
        Ok(())
    }
}

fn fast_config() -> RaftConfig {
    RaftConfig {
        election_timeout_min: Duration::from_millis(30),
        election_timeout_max: Duration::from_millis(60),
        heartbeat_interval: Duration::from_millis(15),
        election_grace_period: Duration::from_millis(20),
        ..RaftConfig::default()
    }
}

fn cluster_of(ids: &[&str]) -> ClusterConfig {
    let mut members = HashMap::new();
    for (i, id) in ids.iter().enumerate() {
        let addr: SocketAddr = format!("127.0.0.1:{}", 20000 + i).parse().unwrap();
        members.insert(id.to_string(), addr);
    }
    ClusterConfig::new(members)
}

struct Harness {
    network: Arc<InProcessNetwork>,
    cluster: ClusterConfig,
    config: RaftConfig,
    nodes: HashMap<String, (Arc<Node>, Arc<RecordingMachine>, Arc<MemoryStore>, NodeHandles)>,
}

impl Harness {
    fn new(ids: &[&str], config: RaftConfig) -> Self {
        Harness {
            network: Arc::new(InProcessNetwork::new()),
            cluster: cluster_of(ids),
            config,
            nodes: HashMap::new(),
        }
    }

    fn start(&mut self, id: &str) {
        self.start_with_store(id, Arc::new(MemoryStore::new()));
    }

    fn start_with_store(&mut self, id: &str, store: Arc<MemoryStore>) {
        let transport = Arc::new(InProcessTransport::new(self.network.clone()));
        let machine = RecordingMachine::new();
        let node = Node::open(
            id.to_string(),
            &self.cluster,
            store.clone(),
            transport,
            machine.clone(),
            self.config.clone(),
        )
        .unwrap();
        self.network.register(id.to_string(), node.clone());
        let handles = node.run();
        self.nodes.insert(id.to_string(), (node, machine, store, handles));
    }

    fn stop(&mut self, id: &str) {
        self.network.unregister(&id.to_string());
        if let Some((_, _, _, handles)) = self.nodes.remove(id) {
            handles.abort();
        }
    }

    fn node(&self, id: &str) -> Arc<Node> {
        self.nodes[id].0.clone()
    }

    fn machine(&self, id: &str) -> Arc<RecordingMachine> {
        self.nodes[id].1.clone()
    }

    fn store(&self, id: &str) -> Arc<MemoryStore> {
        self.nodes[id].2.clone()
    }

    fn leader(&self) -> Option<Arc<Node>> {
        self.nodes.values().find(|(n, ..)| n.is_leader()).map(|(n, ..)| n.clone())
    }

    async fn wait_for_leader(&self) -> Arc<Node> {
        for _ in 0..200 {
            if let Some(n) = self.leader() {
                return n;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no leader elected in time");
    }
}

#[tokio::test]
async fn s1_single_node_commit() {
    let mut harness = Harness::new(&["n1"], fast_config());
    harness.start("n1");

    let leader = harness.wait_for_leader().await;
    assert_eq!(leader.id().as_str(), "n1");

    let rx = leader.propose(b"create-user-a".to_vec()).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
    assert!(outcome.is_ok());

    let status = leader.status();
    assert_eq!(status.commit_index, 1);
    assert_eq!(status.last_applied, 1);
    assert_eq!(harness.machine("n1").applied_count(), 1);
}

#[tokio::test]
async fn s2_three_node_happy_path() {
    let mut harness = Harness::new(&["n1", "n2", "n3"], fast_config());
    harness.start("n1");
    harness.start("n2");
    harness.start("n3");

    let leader = harness.wait_for_leader().await;
    assert!(leader.status().term >= 1);

    for i in 0..10u32 {
        let rx = leader.propose(format!("cmd-{}", i).into_bytes()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap().unwrap();
    }

    // Give followers a few more heartbeats to catch up and apply.
    tokio::time::sleep(Duration::from_millis(200)).await;

    for id in ["n1", "n2", "n3"] {
        let status = harness.node(id).status();
        assert_eq!(status.last_applied, 10, "node {} did not apply all entries", id);
        assert_eq!(harness.machine(id).applied_count(), 10);
    }
}

#[tokio::test]
async fn s3_follower_catches_up_after_restart() {
    let mut harness = Harness::new(&["n1", "n2", "n3"], fast_config());
    harness.start("n1");
    harness.start("n2");
    harness.start("n3");

    let leader = harness.wait_for_leader().await;
    for i in 0..10u32 {
        let rx = leader.propose(format!("cmd-{}", i).into_bytes()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap().unwrap();
    }
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(harness.node("n3").status().last_applied, 10);

    // Stop n3 but keep its store, then propose five more while it's down.
    let n3_store = harness.store("n3");
    harness.stop("n3");

    for i in 10..15u32 {
        let rx = leader.propose(format!("cmd-{}", i).into_bytes()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap().unwrap();
    }

    // Restart n3 from the same (persisted) store.
    harness.start_with_store("n3", n3_store);
    tokio::time::sleep(Duration::from_millis(250)).await;

    let status = harness.node("n3").status();
    assert!(status.commit_index >= 15, "n3 commit_index = {}", status.commit_index);
    assert_eq!(harness.machine("n3").applied_count(), 15);
}

#[tokio::test]
async fn s4_leader_failover() {
    let mut harness = Harness::new(&["n1", "n2", "n3"], fast_config());
    harness.start("n1");
    harness.start("n2");
    harness.start("n3");

    let first_leader = harness.wait_for_leader().await;
    let first_term = first_leader.status().term;
    let first_id = first_leader.id().clone();

    harness.stop(&first_id);

    // Wait for a new leader among the two survivors, with a higher term.
    let mut new_leader = None;
    for _ in 0..300 {
        if let Some(n) = harness.leader() {
            if n.id() != &first_id && n.status().term > first_term {
                new_leader = Some(n);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let new_leader = new_leader.expect("no failover leader elected");

    let rx = new_leader.propose(b"after-failover".to_vec()).await.unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(1), rx).await.unwrap().unwrap();
    assert!(outcome.is_ok());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let survivors: Vec<&str> = ["n1", "n2", "n3"]
        .into_iter()
        .filter(|id| *id != first_id.as_str())
        .collect();
    for id in survivors {
        assert!(harness.machine(id).applied_count() >= 1);
    }
}
