//! Integration tests for conflict truncation and LWW reconciliation of
//! already-committed entries, driven directly against `ConsensusModule`: no
//! transport or timers needed since these scenarios are about a single
//! `AppendEntries` call's effect on a follower's log.

use std::sync::Arc;

use raft_core::config::RaftConfig;
use raft_core::consensus::{ConsensusModule, Tick};
use raft_core::log::Log;
use raft_core::protos::{AppendEntriesRequest, LogEntry, LogEntryData, Metadata};
use raft_core::store::MemoryStore;

fn follower_with_divergent_suffix(config: RaftConfig) -> ConsensusModule {
    let store = Arc::new(MemoryStore::new());
    let entries = vec![
        LogEntry::sentinel(),
        LogEntry {
            index: 1,
            term: 1,
            data: LogEntryData::Command(b"a".to_vec()),
        },
        LogEntry {
            index: 2,
            term: 5,
            data: LogEntryData::Command(b"stale-b".to_vec()),
        },
        LogEntry {
            index: 3,
            term: 5,
            data: LogEntryData::Command(b"stale-c".to_vec()),
        },
    ];
    let log = Log::new(entries, store);
    ConsensusModule::new(
        "follower".to_string(),
        vec!["leader".to_string()],
        Metadata {
            current_term: 5,
            voted_for: None,
        },
        log,
        config,
    )
}

#[test]
fn s5_conflicting_suffix_is_truncated_and_replaced() {
    let mut cm = follower_with_divergent_suffix(RaftConfig::default());
    let mut tick = Tick::default();

    let resp = cm.handle_append_entries(
        AppendEntriesRequest {
            term: 6,
            leader_id: "leader".to_string(),
            prev_log_index: 1,
            prev_log_term: 1,
            entries: vec![LogEntry {
                index: 2,
                term: 6,
                data: LogEntryData::Command(b"replacement".to_vec()),
            }],
            leader_commit: 2,
        },
        &mut tick,
    );

    assert!(resp.success);
    assert_eq!(cm.log_last_index(), 2);
    let entry = cm.entry_at(2).unwrap();
    assert_eq!(entry.term, 6);
    assert_eq!(entry.data, LogEntryData::Command(b"replacement".to_vec()));
    assert_eq!(cm.commit_index(), 2);
    assert!(tick.reconcile.is_empty(), "reconciliation is off by default");
}

#[test]
fn s6_lww_reconciliation_surfaces_discarded_committed_entry() {
    let mut config = RaftConfig::default();
    config.lww_reconciliation = true;
    let mut cm = follower_with_divergent_suffix(config);

    // Follower had already committed index 2 (e.g. during the partition)
    // before the new leader's conflicting entry arrives. The commit index can
    // only advance as far as entries this call actually verified, so the
    // matching entry at index 2 must be carried (a leaderCommit bump alone,
    // with no entries, must not retroactively commit whatever already
    // happens to sit in the follower's log).
    let mut warmup_tick = Tick::default();
    cm.handle_append_entries(
        AppendEntriesRequest {
            term: 5,
            leader_id: "old-leader".to_string(),
            prev_log_index: 1,
            prev_log_term: 1,
            entries: vec![LogEntry {
                index: 2,
                term: 5,
                data: LogEntryData::Command(b"stale-b".to_vec()),
            }],
            leader_commit: 2,
        },
        &mut warmup_tick,
    );
    assert_eq!(cm.commit_index(), 2);

    let mut tick = Tick::default();
    let resp = cm.handle_append_entries(
        AppendEntriesRequest {
            term: 6,
            leader_id: "leader".to_string(),
            prev_log_index: 1,
            prev_log_term: 1,
            entries: vec![LogEntry {
                index: 2,
                term: 6,
                data: LogEntryData::Command(b"replacement".to_vec()),
            }],
            leader_commit: 2,
        },
        &mut tick,
    );

    assert!(resp.success);
    assert_eq!(tick.reconcile.len(), 1);
    assert_eq!(tick.reconcile[0].index, 2);
    assert_eq!(tick.reconcile[0].data, LogEntryData::Command(b"stale-b".to_vec()));

    let entry = cm.entry_at(2).unwrap();
    assert_eq!(entry.data, LogEntryData::Command(b"replacement".to_vec()));
}
