//! The in-memory view of the replicated log, backed by a [`PersistentStore`].
//!
//! Entries live in a plain `Vec<LogEntry>` always headed by the zero-index
//! sentinel; no on-disk segment files or compaction, since this core has no
//! snapshotting.

use std::sync::Arc;

use crate::errors::*;
use crate::protos::{LogEntry, LogIndex, Metadata, Term};
use crate::store::PersistentStore;

/// Log entries in memory, indexed by position (`entries[i].index == i`),
/// always starting with the sentinel at index 0.
pub struct Log {
    entries: Vec<LogEntry>,
    store: Arc<dyn PersistentStore>,
}

impl Log {
    /// Wraps an already-loaded entry sequence (as returned by
    /// `PersistentStore::load`) with the store it came from, so later
    /// mutations can be persisted back to the same place.
    pub fn new(entries: Vec<LogEntry>, store: Arc<dyn PersistentStore>) -> Self {
        assert!(!entries.is_empty(), "log must always contain the sentinel");
        assert_eq!(entries[0].index, 0, "log[0] must be the sentinel");
        Log { entries, store }
    }

    pub fn last_index(&self) -> LogIndex {
        self.entries.last().unwrap().index
    }

    /// Always 0: this core never compacts the log, so index 0's sentinel is
    /// always present.
    pub fn first_index(&self) -> LogIndex {
        0
    }

    pub fn term(&self, index: LogIndex) -> Option<Term> {
        self.entries.get(index as usize).map(|e| e.term)
    }

    pub fn entry(&self, index: LogIndex) -> Option<&LogEntry> {
        self.entries.get(index as usize)
    }

    pub fn entries_from(&self, index: LogIndex) -> &[LogEntry] {
        let start = (index as usize).min(self.entries.len());
        &self.entries[start..]
    }

    /// Appends a single entry. Callers are responsible for calling
    /// [`Log::persist`] before any side-effecting message that depends on it
    /// is sent.
    pub fn append(&mut self, entry: LogEntry) {
        assert_eq!(
            entry.index as usize,
            self.entries.len(),
            "entries must be appended contiguously"
        );
        self.entries.push(entry);
    }

    pub fn append_all(&mut self, new_entries: &[LogEntry]) {
        for e in new_entries {
            self.append(e.clone());
        }
    }

    /// Discards every entry at index `>= index`, keeping `[0, index)`. Used
    /// by conflict truncation; callers are responsible for routing any
    /// discarded, already-committed entries through the LWW-apply hook
    /// *before* calling this (the entries are gone afterwards).
    pub fn truncate_suffix(&mut self, index: LogIndex) {
        assert!(index >= 1, "must never truncate away the sentinel");
        self.entries.truncate(index as usize);
    }

    pub fn persist(&self, meta: &Metadata) -> Result<()> {
        self.store
            .save(meta, &self.entries)
            .chain_err(|| ErrorKind::PersistenceError)
    }

    #[cfg(test)]
    pub fn as_slice(&self) -> &[LogEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protos::LogEntryData;
    use crate::store::MemoryStore;

    fn entry(index: LogIndex, term: Term) -> LogEntry {
        LogEntry {
            index,
            term,
            data: LogEntryData::Command(vec![index as u8]),
        }
    }

    #[test]
    fn append_and_lookup() {
        let store = Arc::new(MemoryStore::new());
        let mut log = Log::new(vec![LogEntry::sentinel()], store);
        log.append(entry(1, 1));
        log.append(entry(2, 1));
        log.append(entry(3, 2));

        assert_eq!(log.last_index(), 3);
        assert_eq!(log.term(2), Some(1));
        assert_eq!(log.term(3), Some(2));
        assert_eq!(log.term(4), None);
        assert_eq!(log.entries_from(2).len(), 2);
    }

    #[test]
    fn truncate_suffix_keeps_prefix() {
        let store = Arc::new(MemoryStore::new());
        let mut log = Log::new(vec![LogEntry::sentinel()], store);
        log.append(entry(1, 1));
        log.append(entry(2, 5));
        log.append(entry(3, 5));

        log.truncate_suffix(2);
        assert_eq!(log.last_index(), 1);
        assert_eq!(log.term(2), None);
    }

    #[test]
    #[should_panic]
    fn truncate_suffix_cannot_remove_sentinel() {
        let store = Arc::new(MemoryStore::new());
        let mut log = Log::new(vec![LogEntry::sentinel()], store);
        log.truncate_suffix(0);
    }

    #[test]
    fn persist_round_trips_through_store() {
        let store = Arc::new(MemoryStore::new());
        let mut log = Log::new(vec![LogEntry::sentinel()], store.clone());
        log.append(entry(1, 1));
        log.persist(&Metadata {
            current_term: 1,
            voted_for: Some("n1".to_string()),
        })
        .unwrap();

        let (meta, entries) = store.load().unwrap();
        assert_eq!(meta.current_term, 1);
        assert_eq!(entries.len(), 2);
    }
}
