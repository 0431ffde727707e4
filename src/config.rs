//! Cluster membership and tunables.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use crate::protos::ServerId;

/// Tunables for the election and replication timers.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    pub election_timeout_min: Duration,
    pub election_timeout_max: Duration,
    pub heartbeat_interval: Duration,

    /// Grace period after dispatching RequestVote before the dynamic-quorum
    /// tally is allowed to declare victory on partial responses.
    pub election_grace_period: Duration,

    /// Compute election majority against the set of peers that responded to
    /// the current round, rather than the full cluster. Default `false`
    /// (plain Raft).
    pub dynamic_quorum_elections: bool,

    /// Compute commit majority against `active_peers` rather than the full
    /// cluster. Default `false`. Can be enabled independently of
    /// `dynamic_quorum_elections`.
    pub dynamic_quorum_commit: bool,

    /// Whether conflict truncation routes discarded, already-committed
    /// entries through `apply_for_reconciliation` before dropping them.
    /// Default `false`.
    pub lww_reconciliation: bool,
}

impl Default for RaftConfig {
    fn default() -> Self {
        RaftConfig {
            election_timeout_min: Duration::from_millis(3000),
            election_timeout_max: Duration::from_millis(6000),
            heartbeat_interval: Duration::from_millis(1000),
            election_grace_period: Duration::from_millis(200),
            dynamic_quorum_elections: false,
            dynamic_quorum_commit: false,
            lww_reconciliation: false,
        }
    }
}

/// The fixed set of nodes in the cluster, identified by stable string ids
/// mapped to network addresses (§2).
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub members: HashMap<ServerId, SocketAddr>,
}

impl ClusterConfig {
    pub fn new(members: HashMap<ServerId, SocketAddr>) -> Self {
        ClusterConfig { members }
    }

    pub fn peers_of<'a>(&'a self, id: &'a ServerId) -> impl Iterator<Item = &'a ServerId> {
        self.members.keys().filter(move |peer| *peer != id)
    }

    pub fn address_of(&self, id: &ServerId) -> Option<SocketAddr> {
        self.members.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
