//! Demo binary wiring a [`raft_core::node::Node`] to a minimal in-memory
//! command log so the crate is runnable end to end: each stdin line becomes
//! one proposed command, and the reply reports the outcome.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tracing::info;

use raft_core::apply::{ApplyOutcome, StateMachine};
use raft_core::config::{ClusterConfig, RaftConfig};
use raft_core::node::Node;
use raft_core::protos::LogIndex;
use raft_core::store::SledStore;
use raft_core::transport::{serve, TcpTransport};

/// A trivially small application: every committed command is appended to an
/// in-memory log and echoed to stdout.
struct CommandLogMachine {
    entries: std::sync::Mutex<Vec<Vec<u8>>>,
}

impl CommandLogMachine {
    fn new() -> Self {
        CommandLogMachine {
            entries: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StateMachine for CommandLogMachine {
    async fn apply(&self, index: LogIndex, command: &[u8]) -> ApplyOutcome {
        let text = String::from_utf8_lossy(command).into_owned();
        info!(index, command = %text, "applied");
        self.entries.lock().unwrap().push(command.to_vec());
        Ok(())
    }

    async fn apply_for_reconciliation(&self, index: LogIndex, command: &[u8]) -> ApplyOutcome {
        let text = String::from_utf8_lossy(command).into_owned();
        info!(index, command = %text, "reconciled (discarded by conflict truncation)");
        Ok(())
    }
}

/// One `NAME=HOST:PORT` cluster member, parsed from repeated `--peer` flags.
#[derive(Clone)]
struct PeerSpec {
    id: String,
    addr: SocketAddr,
}

impl std::str::FromStr for PeerSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, addr) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=HOST:PORT, got {:?}", s))?;
        Ok(PeerSpec {
            id: id.to_string(),
            addr: addr.parse().map_err(|e| format!("bad address {:?}: {}", addr, e))?,
        })
    }
}

#[derive(Parser, Debug)]
#[clap(about = "Sample consensus-reaching node")]
struct Args {
    /// This node's id. Must match one of the `--peer` entries below.
    #[clap(long)]
    id: String,

    /// Directory holding this node's persistent store (term, vote, log).
    #[clap(long)]
    dir: PathBuf,

    /// One cluster member as NAME=HOST:PORT, repeatable. Must include an
    /// entry for `--id` itself.
    #[clap(long = "peer", required = true)]
    peers: Vec<PeerSpec>,

    /// Enable the dynamic-quorum extension for elections.
    #[clap(long)]
    dynamic_quorum_elections: bool,

    /// Enable the dynamic-quorum extension for commit advancement.
    #[clap(long)]
    dynamic_quorum_commit: bool,

    /// Enable LWW reconciliation of truncated, already-committed entries.
    #[clap(long)]
    lww_reconciliation: bool,
}

#[tokio::main]
async fn main() -> raft_core::errors::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut members = HashMap::new();
    for peer in &args.peers {
        members.insert(peer.id.clone(), peer.addr);
    }
    let cluster = ClusterConfig::new(members);
    let my_addr = cluster
        .address_of(&args.id)
        .ok_or_else(|| format!("--peer list does not include this node's id {:?}", args.id))?;

    let config = RaftConfig {
        dynamic_quorum_elections: args.dynamic_quorum_elections,
        dynamic_quorum_commit: args.dynamic_quorum_commit,
        lww_reconciliation: args.lww_reconciliation,
        ..RaftConfig::default()
    };

    std::fs::create_dir_all(&args.dir)?;
    let store = Arc::new(SledStore::open(&args.dir)?);

    let addresses: HashMap<_, _> = cluster
        .peers_of(&args.id)
        .map(|id| (id.clone(), cluster.address_of(id).unwrap()))
        .collect();
    let transport = Arc::new(TcpTransport::new(addresses));

    let machine = Arc::new(CommandLogMachine::new());

    let node = Node::open(
        args.id.clone(),
        &cluster,
        store,
        transport,
        machine,
        config,
    )?;
    let _handles = node.run();
    let node_for_rpc = node.clone();

    let listener = TcpListener::bind(my_addr).await?;
    info!(id = %args.id, %my_addr, "listening");
    tokio::spawn(async move {
        if let Err(err) = serve(listener, node_for_rpc).await {
            tracing::error!(error = %err, "RPC server exited");
        }
    });

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    while let Some(line) = lines.next_line().await? {
        if line.is_empty() {
            continue;
        }
        match node.propose(line.clone().into_bytes()).await {
            Ok(rx) => match rx.await {
                Ok(Ok(())) => info!(command = %line, "committed"),
                Ok(Err(err)) => info!(command = %line, error = %err, "rejected by state machine"),
                Err(_) => info!(command = %line, "dropped (node restarted before applying)"),
            },
            Err(err) => info!(command = %line, error = %err, "propose failed"),
        }
    }

    Ok(())
}
