//! Wire and persistent-state types shared by every other module.
//!
//! Cluster membership changes are out of scope, so there's no
//! configuration-change machinery here: no `ConfigChange` entries, no
//! joint-consensus configuration snapshots.

use std::fmt;

/// Identifies a single server in the cluster. Stable for the lifetime of the
/// cluster; assigned out of band (e.g. by a deployment config), not by Raft
/// itself.
pub type ServerId = String;

pub type Term = u64;

pub type LogIndex = u64;

/// Persistent information describing the state of the current server.
///
/// Only the two fields that must be durable before they can be observed by a
/// peer are kept here; `commit_index`/`last_applied` are volatile and get
/// reconstructed from the log on restart instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Latest term seen by this server (starts at 0).
    pub current_term: Term,

    /// The id of the server we voted for in `current_term`, if any.
    pub voted_for: Option<ServerId>,
}

impl Default for Metadata {
    fn default() -> Self {
        Metadata {
            current_term: 0,
            voted_for: None,
        }
    }
}

/// The payload carried by a single log entry.
///
/// A leader proposes a `Noop` immediately upon election if its log's last
/// entry predates the current term, the standard trick for committing
/// straddling entries from a previous term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogEntryData {
    /// Occupies a log index without invoking the application's `Apply`.
    Noop,

    /// Opaque bytes handed to the application's `Apply` callback verbatim.
    Command(Vec<u8>),
}

impl LogEntryData {
    /// The sentinel at index 0 is represented as an empty command rather than
    /// its own variant, matching §3's "a zero/empty command denotes the
    /// sentinel".
    pub fn is_empty_command(&self) -> bool {
        matches!(self, LogEntryData::Command(data) if data.is_empty())
    }
}

/// A single entry in the replicated log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub index: LogIndex,
    pub term: Term,
    pub data: LogEntryData,
}

impl LogEntry {
    /// The fabricated entry at index 0 that every log starts with.
    pub fn sentinel() -> Self {
        LogEntry {
            index: 0,
            term: 0,
            data: LogEntryData::Command(Vec::new()),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "LogEntry(index={}, term={})", self.index, self.term)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestVoteRequest {
    pub term: Term,
    pub candidate_id: ServerId,
    pub last_log_index: LogIndex,
    pub last_log_term: Term,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestVoteResponse {
    pub term: Term,
    pub vote_granted: bool,
}

/// Entries are assumed to be sequential (`entries[i].index == prev_log_index + 1 + i`);
/// the wire format does not repeat indices redundantly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendEntriesRequest {
    pub term: Term,
    pub leader_id: ServerId,
    pub prev_log_index: LogIndex,
    pub prev_log_term: Term,
    pub entries: Vec<LogEntry>,
    pub leader_commit: LogIndex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendEntriesResponse {
    pub term: Term,
    pub success: bool,
}

/// A proposal handed back to `Propose` callers: the `(term, index)` pair a
/// committed entry must match for that specific proposal to have "won".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub term: Term,
    pub index: LogIndex,
}

/// Snapshot of a node's externally-observable status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub id: ServerId,
    pub state: &'static str,
    pub term: Term,
    pub commit_index: LogIndex,
    pub last_applied: LogIndex,
    pub leader_id: Option<ServerId>,
}
