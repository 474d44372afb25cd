//! Journal-backed listener store.
//!
//! Wraps:
//! - An in-memory map of live records for reads
//! - The append-only journal for durable writes

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockWriteGuard};

use tracing::{debug, info, warn};

use crate::error::FlowResult;
use crate::expression::ExpressionId;
use crate::listen::ListenRecord;
use crate::storage::traits::{ExpressionStore, StorageError};

use super::wal::{JournalOp, WriteAheadLog};
use super::JournalConfig;

/// File name of the journal inside the store directory.
pub const JOURNAL_FILE: &str = "listeners.journal";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct JournalState {
    records: BTreeMap<ExpressionId, ListenRecord>,
    /// Entries in the journal that no longer describe a live record.
    dead: usize,
}

/// Durable [`ExpressionStore`] for a single process.
pub struct JournalStore {
    dir: PathBuf,
    wal: WriteAheadLog,
    state: RwLock<JournalState>,
    config: JournalConfig,
}

impl JournalStore {
    /// Opens or creates a store in `dir`, replaying its journal.
    pub fn open(dir: impl AsRef<Path>, config: JournalConfig) -> FlowResult<Self> {
        let config = config.validate()?;
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(StorageError::from)?;

        let (wal, entries) = WriteAheadLog::open(&dir.join(JOURNAL_FILE), config.sync_on_write)
            .map_err(StorageError::from)?;

        let mut state = JournalState::default();
        let replayed = entries.len();
        for entry in entries {
            match entry.op {
                JournalOp::Put(record) => {
                    state.records.insert(record.id.clone(), record);
                }
                JournalOp::Delete { id } => {
                    state.records.remove(&id);
                }
            }
        }
        state.dead = replayed.saturating_sub(state.records.len());

        let store = Self {
            dir: dir.to_path_buf(),
            wal,
            state: RwLock::new(state),
            config,
        };
        {
            let mut state = store.write("open")?;
            store.maybe_compact(&mut state);
            info!(
                dir = %store.dir.display(),
                replayed,
                live = state.records.len(),
                "listener journal opened"
            );
        }
        Ok(store)
    }

    fn write(&self, context: &'static str) -> Result<RwLockWriteGuard<'_, JournalState>, StorageError> {
        self.state.write().map_err(|_| lock_err(context))
    }

    /// Rewrites the journal once enough dead entries accumulated. A failed
    /// compaction leaves the old journal in place and is retried later.
    fn maybe_compact(&self, state: &mut JournalState) {
        if state.dead < self.config.compact_threshold {
            return;
        }
        match self.wal.rewrite(state.records.values()) {
            Ok(()) => {
                debug!(dropped = state.dead, live = state.records.len(), "listener journal compacted");
                state.dead = 0;
            }
            Err(err) => warn!(error = %err, "listener journal compaction failed"),
        }
    }

    /// Number of live records.
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.state.read().map_err(|_| lock_err("len"))?.records.len())
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    /// Journal entries not describing a live record.
    pub fn dead_entries(&self) -> Result<usize, StorageError> {
        Ok(self.state.read().map_err(|_| lock_err("dead_entries"))?.dead)
    }

    /// Directory holding the journal.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current journal size in bytes.
    pub fn journal_size(&self) -> Result<u64, StorageError> {
        Ok(self.wal.size_bytes()?)
    }
}

impl ExpressionStore for JournalStore {
    fn put(&self, record: &ListenRecord) -> Result<(), StorageError> {
        let mut state = self.write("put")?;
        self.wal.append(JournalOp::Put(record.clone()))?;
        if state.records.insert(record.id.clone(), record.clone()).is_some() {
            state.dead += 1;
        }
        self.maybe_compact(&mut state);
        Ok(())
    }

    fn get(&self, id: &ExpressionId) -> Result<Option<ListenRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("get"))?;
        Ok(state.records.get(id).cloned())
    }

    fn delete(&self, id: &ExpressionId) -> Result<bool, StorageError> {
        let mut state = self.write("delete")?;
        if !state.records.contains_key(id) {
            return Ok(false);
        }
        self.wal.append(JournalOp::Delete { id: id.clone() })?;
        state.records.remove(id);
        // The put and the delete are both dead now.
        state.dead += 2;
        self.maybe_compact(&mut state);
        Ok(true)
    }

    fn list(&self) -> Result<Vec<ListenRecord>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("list"))?;
        Ok(state.records.values().cloned().collect())
    }
}
