//! The persistent store.
//!
//! `save` durably records `(current_term, voted_for, log)` before returning;
//! `load` returns the last durable snapshot, or zero values on a fresh
//! directory. The whole log is rewritten on every save rather than
//! incrementally appended; `sled` gives each logical bucket (term/vote,
//! log) its own named tree.

use crate::errors::*;
use crate::protos::{LogEntry, Metadata};

/// A durable store for the three fields Raft must persist before it can act
/// on them. Implementations must flush to stable media before `save`
/// returns.
pub trait PersistentStore: Send + Sync {
    fn save(&self, meta: &Metadata, log: &[LogEntry]) -> Result<()>;

    fn load(&self) -> Result<(Metadata, Vec<LogEntry>)>;
}

const CURRENT_TERM_KEY: &[u8] = b"current_term";
const VOTED_FOR_KEY: &[u8] = b"voted_for";
const LOG_KEY: &[u8] = b"log";

/// `sled`-backed store. One directory per node; the `state` tree holds
/// `current_term`/`voted_for`, the `log` tree holds a single `log` key with
/// the whole `rmp_serde`-encoded entry sequence (sentinel included).
pub struct SledStore {
    state: sled::Tree,
    log: sled::Tree,
    // Kept alive for the lifetime of the store; dropping the `Db` would close
    // the trees out from under us.
    _db: sled::Db,
}

impl SledStore {
    pub fn open(dir: &std::path::Path) -> Result<Self> {
        let db = sled::open(dir)?;
        let state = db.open_tree("state")?;
        let log = db.open_tree("log")?;
        Ok(SledStore {
            state,
            log,
            _db: db,
        })
    }
}

impl PersistentStore for SledStore {
    fn save(&self, meta: &Metadata, log: &[LogEntry]) -> Result<()> {
        self.state
            .insert(CURRENT_TERM_KEY, &meta.current_term.to_be_bytes())?;
        match &meta.voted_for {
            Some(id) => {
                self.state.insert(VOTED_FOR_KEY, id.as_bytes())?;
            }
            None => {
                self.state.remove(VOTED_FOR_KEY)?;
            }
        }

        let encoded = rmp_serde::to_vec(&log.to_vec()).chain_err(|| "failed to encode log")?;
        self.log.insert(LOG_KEY, encoded)?;

        // Durability point: both trees must hit stable media before a caller
        // may act on the new values.
        self.state.flush().chain_err(|| "failed to flush state tree")?;
        self.log.flush().chain_err(|| "failed to flush log tree")?;
        Ok(())
    }

    fn load(&self) -> Result<(Metadata, Vec<LogEntry>)> {
        let current_term = match self.state.get(CURRENT_TERM_KEY)? {
            Some(bytes) => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                u64::from_be_bytes(buf)
            }
            None => 0,
        };
        let voted_for = self
            .state
            .get(VOTED_FOR_KEY)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        let log = match self.log.get(LOG_KEY)? {
            Some(bytes) => {
                rmp_serde::from_slice(&bytes).chain_err(|| "failed to decode persisted log")?
            }
            None => vec![LogEntry::sentinel()],
        };

        Ok((
            Metadata {
                current_term,
                voted_for,
            },
            log,
        ))
    }
}

/// An in-memory store used by unit/scenario tests that don't want to touch a
/// real directory.
#[derive(Default)]
pub struct MemoryStore {
    inner: std::sync::Mutex<Option<(Metadata, Vec<LogEntry>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: std::sync::Mutex::new(None),
        }
    }
}

impl PersistentStore for MemoryStore {
    fn save(&self, meta: &Metadata, log: &[LogEntry]) -> Result<()> {
        *self.inner.lock().unwrap() = Some((meta.clone(), log.to_vec()));
        Ok(())
    }

    fn load(&self) -> Result<(Metadata, Vec<LogEntry>)> {
        match &*self.inner.lock().unwrap() {
            Some((meta, log)) => Ok((meta.clone(), log.clone())),
            None => Ok((Metadata::default(), vec![LogEntry::sentinel()])),
        }
    }
}
