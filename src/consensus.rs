//! The `ConsensusModule`: all Raft state transitions behind one synchronous,
//! side-effect-free-until-flushed surface.
//!
//! Every entry point takes `&mut self` plus a `&mut Tick` and returns having
//! made no I/O itself, leaving the caller to persist anything durable and
//! dispatch `tick.messages` only after releasing the lock. There is no
//! configuration-change machinery (no joint consensus, no pre-vote, no
//! `ConfigChange` log entries) since membership changes are out of scope;
//! the dynamic-quorum tally and the LWW reconciliation hook, both gated by
//! [`RaftConfig`], are this core's own extensions.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::RaftConfig;
use crate::errors::*;
use crate::log::Log;
use crate::protos::{
    AppendEntriesRequest, AppendEntriesResponse, LogEntry, LogEntryData, LogIndex, Metadata,
    Proposal, RequestVoteRequest, RequestVoteResponse, ServerId, Status, Term,
};
use crate::state::{
    ServerCandidateState, ServerFollowerState, ServerLeaderState, ServerProgress, ServerState,
};

/// An outbound RPC the caller must dispatch after unlocking the module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    RequestVote(RequestVoteRequest),
    AppendEntries(AppendEntriesRequest),
}

/// The record of everything `cycle`/`propose`/`handle_*` decided to do on one
/// call into the module. Nothing here has happened yet: the caller persists
/// (`ConsensusModule::persist`, if `meta_dirty || new_entries`), then sends
/// `messages`, then reconciles `reconcile` through the application's
/// `ApplyForReconciliation`, all *after* releasing the module's lock.
#[derive(Default)]
pub struct Tick {
    pub messages: Vec<(ServerId, Message)>,

    /// `current_term`/`voted_for` changed and must be durably persisted
    /// before any message above is sent, and before any RPC response that
    /// depended on this call is returned to its caller.
    pub meta_dirty: bool,

    /// The log gained or lost entries and must be persisted under the same
    /// rule as `meta_dirty`.
    pub new_entries: bool,

    /// `commit_index` moved forward; the apply pipeline should be woken.
    pub commit_advanced: bool,

    /// This call made the node a leader.
    pub became_leader: bool,

    /// Already-committed entries discarded by conflict truncation, in the
    /// order they appeared in the log. Only populated when
    /// `RaftConfig::lww_reconciliation` is enabled; routed through
    /// `ApplyForReconciliation` by the caller before being dropped for good.
    pub reconcile: Vec<LogEntry>,

    /// When the caller should next invoke `cycle` absent any other event.
    pub next_tick: Option<Duration>,
}

/// All Raft state for one node, guarded by a single mutex at the call site.
pub struct ConsensusModule {
    id: ServerId,
    peers: Vec<ServerId>,
    meta: Metadata,
    log: Log,
    state: ServerState,
    config: RaftConfig,
    commit_index: LogIndex,
    last_applied: LogIndex,
}

impl ConsensusModule {
    pub fn new(
        id: ServerId,
        peers: Vec<ServerId>,
        meta: Metadata,
        log: Log,
        config: RaftConfig,
    ) -> Self {
        let election_timeout = Self::random_election_timeout(&config);
        ConsensusModule {
            id,
            peers,
            meta,
            log,
            state: ServerState::Follower(ServerFollowerState {
                election_timeout,
                last_leader_id: None,
                last_heartbeat: Instant::now(),
            }),
            config,
            commit_index: 0,
            last_applied: 0,
        }
    }

    pub fn id(&self) -> &ServerId {
        &self.id
    }

    pub fn is_leader(&self) -> bool {
        matches!(self.state, ServerState::Leader(_))
    }

    pub fn leader_hint(&self) -> Option<ServerId> {
        match &self.state {
            ServerState::Leader(_) => Some(self.id.clone()),
            ServerState::Follower(fs) => fs.last_leader_id.clone(),
            ServerState::Candidate(_) => None,
        }
    }

    pub fn current_term(&self) -> Term {
        self.meta.current_term
    }

    pub fn commit_index(&self) -> LogIndex {
        self.commit_index
    }

    pub fn last_applied(&self) -> LogIndex {
        self.last_applied
    }

    /// The apply worker advances this, under the same lock, once it has
    /// finished applying `index`.
    pub fn set_last_applied(&mut self, index: LogIndex) {
        self.last_applied = index;
    }

    pub fn log_last_index(&self) -> LogIndex {
        self.log.last_index()
    }

    pub fn entry_at(&self, index: LogIndex) -> Option<LogEntry> {
        self.log.entry(index).cloned()
    }

    pub fn status(&self) -> Status {
        Status {
            id: self.id.clone(),
            state: self.state.label(),
            term: self.meta.current_term,
            commit_index: self.commit_index,
            last_applied: self.last_applied,
            leader_id: self.leader_hint(),
        }
    }

    /// Persists `(current_term, voted_for, log)` to the durable store.
    /// Callers must do this whenever `tick.meta_dirty || tick.new_entries` is
    /// set, before dispatching any message recorded in the same tick.
    pub fn persist(&self) -> Result<()> {
        self.log.persist(&self.meta)
    }

    // ---- the main driver -------------------------------------------------

    /// Advances time: fires an election on timeout, rechecks a dynamic-quorum
    /// victory condition while a candidate, or sends heartbeats while leader.
    /// Called whenever the election timer fires, and also opportunistically
    /// after any RPC reply that might have changed the outcome.
    pub fn cycle(&mut self, tick: &mut Tick) {
        enum Action {
            StartElection,
            CheckVictory,
            Heartbeat,
            Wait,
        }

        let action = match &self.state {
            ServerState::Follower(fs) => {
                if fs.last_heartbeat.elapsed() >= fs.election_timeout {
                    Action::StartElection
                } else {
                    Action::Wait
                }
            }
            ServerState::Candidate(cs) => {
                if cs.election_start.elapsed() >= cs.election_timeout {
                    Action::StartElection
                } else {
                    Action::CheckVictory
                }
            }
            ServerState::Leader(_) => Action::Heartbeat,
        };

        match action {
            Action::StartElection => self.start_election(tick),
            Action::CheckVictory => self.maybe_declare_victory(tick),
            Action::Heartbeat => self.replicate_entries(tick),
            Action::Wait => {}
        }

        self.schedule_next(tick);
    }

    fn schedule_next(&self, tick: &mut Tick) {
        tick.next_tick = Some(match &self.state {
            ServerState::Follower(fs) => {
                fs.election_timeout.saturating_sub(fs.last_heartbeat.elapsed())
            }
            ServerState::Candidate(cs) => {
                let remaining_election =
                    cs.election_timeout.saturating_sub(cs.election_start.elapsed());
                if self.config.dynamic_quorum_elections {
                    let remaining_grace = self
                        .config
                        .election_grace_period
                        .saturating_sub(cs.election_start.elapsed());
                    remaining_election.min(remaining_grace.max(Duration::from_millis(10)))
                } else {
                    remaining_election
                }
            }
            ServerState::Leader(_) => self.config.heartbeat_interval,
        });
    }

    // ---- proposing commands ----------------------------------------------

    /// Appends `data` to the log as the leader. Fails with `NotLeader` if
    /// this node is not currently the leader (§4.2 `Propose`).
    pub fn propose(&mut self, data: Vec<u8>, tick: &mut Tick) -> Result<Proposal> {
        if !self.is_leader() {
            return Err(ErrorKind::NotLeader(self.leader_hint()).into());
        }
        let index = self.log.last_index() + 1;
        let term = self.meta.current_term;
        self.log.append(LogEntry {
            index,
            term,
            data: LogEntryData::Command(data),
        });
        tick.new_entries = true;
        self.replicate_entries(tick);
        // Covers the single-node-cluster case: with no peers to reply, a
        // majority is already met and nothing will otherwise call this.
        self.update_commit_index(tick);
        Ok(Proposal { term, index })
    }

    // ---- elections ---------------------------------------------------------

    fn start_election(&mut self, tick: &mut Tick) {
        self.meta.current_term += 1;
        self.meta.voted_for = Some(self.id.clone());
        tick.meta_dirty = true;

        info!(term = self.meta.current_term, "starting election");

        self.state = ServerState::Candidate(ServerCandidateState {
            election_start: Instant::now(),
            election_timeout: Self::random_election_timeout(&self.config),
            votes_granted: Default::default(),
            votes_responded: Default::default(),
        });

        let last_log_index = self.log.last_index();
        let last_log_term = self.log.term(last_log_index).unwrap_or(0);
        for peer in self.peers.clone() {
            tick.messages.push((
                peer,
                Message::RequestVote(RequestVoteRequest {
                    term: self.meta.current_term,
                    candidate_id: self.id.clone(),
                    last_log_index,
                    last_log_term,
                }),
            ));
        }

        // A lone node (no peers) wins its own election outright.
        self.maybe_declare_victory(tick);
    }

    /// Tests the election-victory condition and transitions to leader if it
    /// holds. With `dynamic_quorum_elections` off this is the plain-Raft
    /// "strict majority of the whole cluster" rule, checked as soon as it is
    /// reached. With it on, the majority is computed over the peers that
    /// have responded so far, which can declare victory without hearing from
    /// every peer: two disjoint minorities could each see themselves as a
    /// majority of their own responders and both elect a leader in the same
    /// term.
    fn maybe_declare_victory(&mut self, tick: &mut Tick) {
        let won = match &self.state {
            ServerState::Candidate(cs) => {
                let total_peers = self.peers.len();
                let granted = cs.votes_granted.len() + 1;
                let responded = cs.votes_responded.len() + 1;

                if !self.config.dynamic_quorum_elections {
                    let needed = (total_peers + 1) / 2 + 1;
                    granted >= needed
                } else {
                    let needed = responded / 2 + 1;
                    if granted < needed {
                        false
                    } else {
                        let grace_elapsed =
                            cs.election_start.elapsed() >= self.config.election_grace_period;
                        let everyone_responded = cs.votes_responded.len() == total_peers;
                        grace_elapsed || everyone_responded
                    }
                }
            }
            _ => false,
        };

        if won {
            self.become_leader(tick);
        }
    }

    fn become_leader(&mut self, tick: &mut Tick) {
        info!(term = self.meta.current_term, "became leader");

        let last_log_index = self.log.last_index();
        let mut servers = HashMap::new();
        for peer in &self.peers {
            servers.insert(peer.clone(), ServerProgress::new(last_log_index));
        }
        self.state = ServerState::Leader(ServerLeaderState {
            servers,
            active_peers: Default::default(),
        });
        tick.became_leader = true;

        // Commit a no-op in the new term immediately if there are genuinely
        // uncommitted entries from a previous term straddling the new one.
        // Guarding on `last_log_index > commit_index` as well as the term
        // check matters: on the very first election the log is sentinel-only
        // (index 0, term 0) and `last_term != current_term` alone would be
        // true, injecting a phantom entry at index 1 before any client
        // command and shifting every later index by one.
        let last_term = self.log.term(last_log_index).unwrap_or(0);
        if last_term != self.meta.current_term && last_log_index > self.commit_index {
            self.log.append(LogEntry {
                index: last_log_index + 1,
                term: self.meta.current_term,
                data: LogEntryData::Noop,
            });
            tick.new_entries = true;
        }

        self.replicate_entries(tick);
        self.update_commit_index(tick);
    }

    fn become_follower(&mut self, leader_hint: Option<ServerId>) {
        match &mut self.state {
            ServerState::Follower(fs) => {
                fs.last_heartbeat = Instant::now();
                if leader_hint.is_some() {
                    fs.last_leader_id = leader_hint;
                }
            }
            _ => {
                self.state = ServerState::Follower(ServerFollowerState {
                    election_timeout: Self::random_election_timeout(&self.config),
                    last_leader_id: leader_hint,
                    last_heartbeat: Instant::now(),
                });
            }
        }
    }

    /// Steps down to follower and clears `voted_for` whenever a higher term
    /// is observed anywhere (a reply, a request, or a vote), per Raft's
    /// "the term always wins" rule. Returns `true` if it actually stepped
    /// the term forward.
    fn observe_term(&mut self, term: Term, tick: &mut Tick) -> bool {
        if term > self.meta.current_term {
            self.meta.current_term = term;
            self.meta.voted_for = None;
            tick.meta_dirty = true;
            self.become_follower(None);
            true
        } else {
            false
        }
    }

    fn random_election_timeout(config: &RaftConfig) -> Duration {
        let min = config.election_timeout_min.as_millis() as u64;
        let max = config.election_timeout_max.as_millis().max(min as u128 + 1) as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..max))
    }

    // ---- RequestVote ------------------------------------------------------

    pub fn handle_request_vote(
        &mut self,
        req: RequestVoteRequest,
        tick: &mut Tick,
    ) -> RequestVoteResponse {
        self.observe_term(req.term, tick);

        if req.term < self.meta.current_term {
            return RequestVoteResponse {
                term: self.meta.current_term,
                vote_granted: false,
            };
        }

        let can_vote = match &self.meta.voted_for {
            None => true,
            Some(id) => id == &req.candidate_id,
        };
        let last_log_index = self.log.last_index();
        let last_log_term = self.log.term(last_log_index).unwrap_or(0);
        let candidate_up_to_date =
            (req.last_log_term, req.last_log_index) >= (last_log_term, last_log_index);
        let grant = can_vote && candidate_up_to_date;

        if grant {
            self.meta.voted_for = Some(req.candidate_id.clone());
            tick.meta_dirty = true;
            if let ServerState::Follower(fs) = &mut self.state {
                fs.last_heartbeat = Instant::now();
            }
        }

        debug!(candidate = %req.candidate_id, granted = grant, "RequestVote");

        RequestVoteResponse {
            term: self.meta.current_term,
            vote_granted: grant,
        }
    }

    pub fn handle_request_vote_response(
        &mut self,
        from: ServerId,
        sent_term: Term,
        resp: RequestVoteResponse,
        tick: &mut Tick,
    ) {
        if self.observe_term(resp.term, tick) {
            return;
        }
        if sent_term != self.meta.current_term {
            return; // reply to a request from a term we've since left
        }

        match &mut self.state {
            ServerState::Candidate(cs) => {
                cs.votes_responded.insert(from.clone());
                if resp.vote_granted {
                    cs.votes_granted.insert(from);
                }
            }
            _ => return,
        }

        self.maybe_declare_victory(tick);
        self.schedule_next(tick);
    }

    // ---- AppendEntries ------------------------------------------------------

    pub fn handle_append_entries(
        &mut self,
        req: AppendEntriesRequest,
        tick: &mut Tick,
    ) -> AppendEntriesResponse {
        self.observe_term(req.term, tick);

        if req.term < self.meta.current_term {
            return AppendEntriesResponse {
                term: self.meta.current_term,
                success: false,
            };
        }

        // A legitimate leader for a term we accept: step down if we were
        // competing, and refresh the election clock either way.
        self.become_follower(Some(req.leader_id.clone()));

        if req.prev_log_index > 0 {
            match self.log.term(req.prev_log_index) {
                None => {
                    return AppendEntriesResponse {
                        term: self.meta.current_term,
                        success: false,
                    }
                }
                Some(t) if t != req.prev_log_term => {
                    return AppendEntriesResponse {
                        term: self.meta.current_term,
                        success: false,
                    }
                }
                _ => {}
            }
        }

        let mut next_index = req.prev_log_index + 1;
        let mut truncated = false;
        for (i, entry) in req.entries.iter().enumerate() {
            let idx = req.prev_log_index + 1 + i as u64;
            match self.log.term(idx) {
                Some(t) if t == entry.term => {
                    // Already present with the same term: nothing to
                    // truncate or append here, but `next_index` must still
                    // advance past it so the append step below doesn't try
                    // to re-append an entry that's already at this index.
                    next_index = idx + 1;
                    continue;
                }
                Some(_) => {
                    if self.config.lww_reconciliation {
                        for discard_idx in idx..=self.log.last_index() {
                            if discard_idx <= self.commit_index {
                                if let Some(discarded) = self.log.entry(discard_idx) {
                                    tick.reconcile.push(discarded.clone());
                                }
                            }
                        }
                    } else if idx <= self.commit_index {
                        warn!(
                            index = idx,
                            commit_index = self.commit_index,
                            "discarding already-committed entries without LWW reconciliation enabled"
                        );
                    }
                    self.log.truncate_suffix(idx);
                    truncated = true;
                    next_index = idx;
                    break;
                }
                None => {
                    next_index = idx;
                    break;
                }
            }
        }

        let start_offset = (next_index - (req.prev_log_index + 1)) as usize;
        if start_offset < req.entries.len() {
            for entry in &req.entries[start_offset..] {
                self.log.append(entry.clone());
            }
            tick.new_entries = true;
        }

        // If conflict truncation discarded entries we'd already applied,
        // lastApplied must rewind: those entries are no longer guaranteed to
        // have been the ones that were applied. The apply worker must be
        // woken even if commitIndex itself doesn't move this call, or the
        // reinstated suffix never gets reapplied.
        if truncated && self.last_applied > req.prev_log_index {
            self.last_applied = req.prev_log_index;
            tick.commit_advanced = true;
        }

        if req.leader_commit > self.commit_index {
            // Only entries this request actually carried (or already had, up
            // to prev_log_index) are verified against the leader's log; never
            // advance past them even if stale trailing entries remain.
            self.commit_index = req
                .leader_commit
                .min(req.prev_log_index + req.entries.len() as u64);
            tick.commit_advanced = true;
        }

        AppendEntriesResponse {
            term: self.meta.current_term,
            success: true,
        }
    }

    pub fn handle_append_entries_response(
        &mut self,
        from: ServerId,
        sent_term: Term,
        sent_prev_log_index: LogIndex,
        sent_num_entries: usize,
        resp: AppendEntriesResponse,
        tick: &mut Tick,
    ) {
        if self.observe_term(resp.term, tick) {
            return;
        }
        if sent_term != self.meta.current_term {
            return;
        }

        if let ServerState::Leader(ls) = &mut self.state {
            if let Some(progress) = ls.servers.get_mut(&from) {
                if progress.request_term != Some(sent_term) {
                    return;
                }
                progress.request_pending = false;
                if resp.success {
                    let new_match = sent_prev_log_index + sent_num_entries as u64;
                    if new_match > progress.match_index {
                        progress.match_index = new_match;
                    }
                    progress.next_index = progress.match_index + 1;
                    ls.active_peers.insert(from);
                } else {
                    progress.next_index = progress.next_index.saturating_sub(1).max(1);
                    ls.active_peers.remove(&from);
                    warn!(peer = %from, "AppendEntries rejected, backing off");
                }
            }
        }

        self.update_commit_index(tick);
    }

    /// Clears the in-flight flag for a peer whose request never completed
    /// (transport error or timeout), so the next `replicate_entries` retries
    /// it instead of waiting forever.
    pub fn handle_append_entries_no_response(&mut self, from: &ServerId) {
        if let ServerState::Leader(ls) = &mut self.state {
            if let Some(progress) = ls.servers.get_mut(from) {
                progress.request_pending = false;
            }
            ls.active_peers.remove(from);
        }
    }

    /// Sends `AppendEntries` to every peer that needs it: peers with
    /// unreplicated entries get them now; caught-up peers get an empty
    /// heartbeat once `heartbeat_interval` has elapsed since their last
    /// request. Skips peers with a request already in flight.
    fn replicate_entries(&mut self, tick: &mut Tick) {
        let current_term = self.meta.current_term;
        let leader_commit = self.commit_index;
        let last_index = self.log.last_index();
        let heartbeat_interval = self.config.heartbeat_interval;
        let my_id = self.id.clone();
        let peers = self.peers.clone();

        if let ServerState::Leader(ls) = &mut self.state {
            for peer in &peers {
                let progress = match ls.servers.get_mut(peer) {
                    Some(p) => p,
                    None => continue,
                };
                if progress.request_pending {
                    continue;
                }
                let should_send = progress.next_index <= last_index
                    || progress
                        .last_sent
                        .map_or(true, |t| t.elapsed() >= heartbeat_interval);
                if !should_send {
                    continue;
                }

                let prev_log_index = progress.next_index.saturating_sub(1);
                let prev_log_term = self.log.term(prev_log_index).unwrap_or(0);
                let entries = self.log.entries_from(progress.next_index).to_vec();

                progress.request_pending = true;
                progress.last_sent = Some(Instant::now());
                progress.request_term = Some(current_term);

                tick.messages.push((
                    peer.clone(),
                    Message::AppendEntries(AppendEntriesRequest {
                        term: current_term,
                        leader_id: my_id.clone(),
                        prev_log_index,
                        prev_log_term,
                        entries,
                        leader_commit,
                    }),
                ));
            }
        }
    }

    /// Leader-only: advances `commit_index` to the highest index replicated
    /// on a majority, restricted to entries from the current term (Raft's
    /// §5.4.2 safety rule -- never commit a previous term's entry purely by
    /// counting replicas, only as a side effect of committing a later one).
    fn update_commit_index(&mut self, tick: &mut Tick) {
        let current_term = self.meta.current_term;
        let last_index = self.log.last_index();
        let commit_index = self.commit_index;
        let total_peers = self.peers.len();

        let mut candidate = None;
        if let ServerState::Leader(ls) = &self.state {
            let mut idx = last_index;
            while idx > commit_index {
                if self.log.term(idx) == Some(current_term) {
                    let replicated =
                        ls.servers.values().filter(|p| p.match_index >= idx).count() + 1;
                    let quorum_base = if self.config.dynamic_quorum_commit {
                        ls.active_peers.len() + 1
                    } else {
                        total_peers + 1
                    };
                    let needed = quorum_base / 2 + 1;
                    if replicated >= needed {
                        candidate = Some(idx);
                        break;
                    }
                }
                idx -= 1;
            }
        }

        if let Some(idx) = candidate {
            if idx > self.commit_index {
                self.commit_index = idx;
                tick.commit_advanced = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn module(id: &str, peers: &[&str]) -> ConsensusModule {
        let store = Arc::new(MemoryStore::new());
        let log = Log::new(vec![LogEntry::sentinel()], store);
        ConsensusModule::new(
            id.to_string(),
            peers.iter().map(|s| s.to_string()).collect(),
            Metadata::default(),
            log,
            RaftConfig::default(),
        )
    }

    #[test]
    fn single_node_cluster_elects_itself_immediately() {
        let mut cm = module("n1", &[]);
        let mut tick = Tick::default();
        cm.start_election(&mut tick);
        assert!(cm.is_leader());
        assert_eq!(cm.current_term(), 1);
    }

    #[test]
    fn propose_requires_leadership() {
        let mut cm = module("n1", &["n2", "n3"]);
        let mut tick = Tick::default();
        let err = cm.propose(b"x".to_vec(), &mut tick).unwrap_err();
        match err.kind() {
            ErrorKind::NotLeader(_) => {}
            other => panic!("expected NotLeader, got {:?}", other),
        }
    }

    #[test]
    fn classic_majority_needs_every_other_peer_in_a_three_node_cluster() {
        let mut cm = module("n1", &["n2", "n3"]);
        let mut tick = Tick::default();
        cm.start_election(&mut tick);
        assert!(!cm.is_leader());

        let term = cm.current_term();
        cm.handle_request_vote_response(
            "n2".to_string(),
            term,
            RequestVoteResponse {
                term,
                vote_granted: true,
            },
            &mut tick,
        );
        assert!(cm.is_leader());
    }

    #[test]
    fn append_entries_from_stale_term_is_rejected() {
        let mut cm = module("n1", &["n2"]);
        let mut tick = Tick::default();
        cm.start_election(&mut tick);
        let current = cm.current_term();

        let mut tick2 = Tick::default();
        let resp = cm.handle_append_entries(
            AppendEntriesRequest {
                term: current.saturating_sub(1),
                leader_id: "n2".to_string(),
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![],
                leader_commit: 0,
            },
            &mut tick2,
        );
        assert!(!resp.success);
        assert_eq!(resp.term, current);
    }

    #[test]
    fn append_entries_advances_commit_index_on_follower() {
        let mut cm = module("n1", &["n2"]);
        let mut tick = Tick::default();
        let entry = LogEntry {
            index: 1,
            term: 5,
            data: LogEntryData::Command(b"x".to_vec()),
        };
        let resp = cm.handle_append_entries(
            AppendEntriesRequest {
                term: 5,
                leader_id: "n2".to_string(),
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![entry],
                leader_commit: 1,
            },
            &mut tick,
        );
        assert!(resp.success);
        assert_eq!(cm.commit_index(), 1);
    }

    #[test]
    fn dynamic_quorum_election_can_win_on_a_single_peer_reply() {
        let store = Arc::new(MemoryStore::new());
        let log = Log::new(vec![LogEntry::sentinel()], store);
        let mut config = RaftConfig::default();
        config.dynamic_quorum_elections = true;
        config.election_grace_period = Duration::from_millis(0);
        let mut cm = ConsensusModule::new(
            "n1".to_string(),
            vec!["n2".to_string(), "n3".to_string()],
            Metadata::default(),
            log,
            config,
        );
        let mut tick = Tick::default();
        cm.start_election(&mut tick);
        let term = cm.current_term();

        cm.handle_request_vote_response(
            "n2".to_string(),
            term,
            RequestVoteResponse {
                term,
                vote_granted: true,
            },
            &mut tick,
        );

        assert!(cm.is_leader());
    }
}
