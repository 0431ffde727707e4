//! Driving committed entries into the application.
//!
//! A dedicated task waits on a `tokio::sync::Notify`, then walks
//! `last_applied+1 ..= commit_index` one entry at a time, releasing the
//! consensus lock before calling into the (possibly slow, possibly fallible)
//! application.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{oneshot, Notify};
use tracing::warn;

use crate::consensus::ConsensusModule;
use crate::protos::{LogEntry, LogEntryData, LogIndex};

/// The result handed back to a `Propose` caller once its entry is applied
/// (or fails to apply). Plain `String` rather than this crate's `Error`
/// type: state machines are supplied by the embedding application and
/// shouldn't need to depend on our internal error taxonomy to report their
/// own failures.
pub type ApplyOutcome = Result<(), String>;

/// The application logic sitting behind the replicated log. Every committed
/// command is handed to `apply`, in strictly ascending index order, one at a
/// time -- never concurrently (§4.5).
#[async_trait]
pub trait StateMachine: Send + Sync {
    async fn apply(&self, index: LogIndex, command: &[u8]) -> ApplyOutcome;

    /// Invoked instead of `apply` for an already-committed entry that
    /// conflict truncation is about to discard, when
    /// `RaftConfig::lww_reconciliation` is enabled (§9 "LWW reconciliation").
    /// The default implementation does nothing, for applications that don't
    /// need reconciliation semantics.
    async fn apply_for_reconciliation(&self, _index: LogIndex, _command: &[u8]) -> ApplyOutcome {
        Ok(())
    }
}

/// Pending `Propose` callers keyed by the log index they're waiting on.
pub type Completions = Arc<Mutex<HashMap<LogIndex, oneshot::Sender<ApplyOutcome>>>>;

/// The apply pipeline: wakes on `Notify`, applies everything newly
/// committed, resolves any matching completion, and advances `last_applied`
/// under the consensus lock.
pub struct ApplyWorker {
    consensus: Arc<Mutex<ConsensusModule>>,
    state_machine: Arc<dyn StateMachine>,
    notify: Arc<Notify>,
    completions: Completions,
}

impl ApplyWorker {
    pub fn new(
        consensus: Arc<Mutex<ConsensusModule>>,
        state_machine: Arc<dyn StateMachine>,
        notify: Arc<Notify>,
        completions: Completions,
    ) -> Self {
        ApplyWorker {
            consensus,
            state_machine,
            notify,
            completions,
        }
    }

    pub async fn run(self) {
        loop {
            self.notify.notified().await;
            while let Some(entry) = self.next_pending_entry() {
                self.apply_one(entry).await;
            }
        }
    }

    fn next_pending_entry(&self) -> Option<LogEntry> {
        let cm = self.consensus.lock().unwrap();
        let next = cm.last_applied() + 1;
        if next > cm.commit_index() {
            return None;
        }
        cm.entry_at(next)
    }

    async fn apply_one(&self, entry: LogEntry) {
        if let LogEntryData::Command(command) = &entry.data {
            let result = self.state_machine.apply(entry.index, command).await;
            if let Some(tx) = self.completions.lock().unwrap().remove(&entry.index) {
                let _ = tx.send(result.clone());
            }
            if let Err(err) = &result {
                warn!(index = entry.index, error = %err, "state machine rejected committed entry");
            }
        }

        self.consensus.lock().unwrap().set_last_applied(entry.index);
    }
}

/// Runs discarded-but-already-committed entries through
/// `ApplyForReconciliation`, in the order conflict truncation collected
/// them. Called by the node loop after releasing the consensus lock (never
/// while holding it, since the application may block or do I/O).
pub async fn reconcile_discarded(state_machine: &dyn StateMachine, entries: Vec<LogEntry>) {
    for entry in entries {
        if let LogEntryData::Command(command) = &entry.data {
            if let Err(err) = state_machine
                .apply_for_reconciliation(entry.index, command)
                .await
            {
                warn!(index = entry.index, error = %err, "reconciliation apply failed");
            }
        }
    }
}
