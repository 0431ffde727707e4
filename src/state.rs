//! Volatile node state: `ServerState` and its per-state payloads.
//!
//! Candidate state tracks both `votes_granted` and `votes_responded` since
//! dynamic-quorum elections tally against responders rather than the full
//! cluster. Leader state tracks `active_peers` for the same reason on the
//! commit side.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::protos::{LogIndex, ServerId};

pub enum ServerState {
    Follower(ServerFollowerState),
    Candidate(ServerCandidateState),
    Leader(ServerLeaderState),
}

impl ServerState {
    pub fn label(&self) -> &'static str {
        match self {
            ServerState::Follower(_) => "follower",
            ServerState::Candidate(_) => "candidate",
            ServerState::Leader(_) => "leader",
        }
    }
}

pub struct ServerFollowerState {
    pub election_timeout: Duration,
    pub last_leader_id: Option<ServerId>,
    pub last_heartbeat: Instant,
}

pub struct ServerCandidateState {
    pub election_start: Instant,
    pub election_timeout: Duration,

    /// Peers that granted us a vote this election (self is not in this set;
    /// the candidate always counts itself separately).
    pub votes_granted: HashSet<ServerId>,

    /// Every peer that has replied at all (granted or not), for the
    /// dynamic-quorum tally (§4.3). Monotonic within one election only.
    pub votes_responded: HashSet<ServerId>,
}

pub struct ServerLeaderState {
    pub servers: HashMap<ServerId, ServerProgress>,

    /// Peers whose most recent `AppendEntries` succeeded (§3: `activePeers`),
    /// used by the dynamic-quorum commit rule when enabled.
    pub active_peers: HashSet<ServerId>,
}

pub struct ServerProgress {
    /// Index of the next entry to send to this peer.
    pub next_index: LogIndex,

    /// Highest index known to be replicated on this peer.
    pub match_index: LogIndex,

    /// Suppresses sending another request while one is already in flight.
    pub request_pending: bool,

    /// When the last request was sent, for heartbeat-suppression (only send
    /// an empty heartbeat once `HEARTBEAT_TIMEOUT` has elapsed since the
    /// last request to an already-caught-up peer).
    pub last_sent: Option<Instant>,

    /// The term in which the in-flight request (if any) was sent, so a
    /// late reply from a stale term can be discarded (§5 ordering
    /// guarantee).
    pub request_term: Option<crate::protos::Term>,
}

impl ServerProgress {
    pub fn new(last_log_index: LogIndex) -> Self {
        ServerProgress {
            next_index: last_log_index + 1,
            match_index: 0,
            request_pending: false,
            last_sent: None,
            request_term: None,
        }
    }
}
