//! Durable listener storage.
//!
//! A single-process, append-only journal with:
//! - Write-ahead appends (optionally fsynced) before in-memory state changes
//! - CRC32 checksums for corruption detection
//! - Replay on open, with a damaged tail truncated away
//! - Compaction once dead entries pile up
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 JournalStore                  │
//! │  ┌──────────────────┐  ┌───────────────────┐  │
//! │  │ live records     │  │ WriteAheadLog     │  │
//! │  │ (BTreeMap)       │  │ (append-only)     │  │
//! │  └──────────────────┘  └─────────┬─────────┘  │
//! │                                  ↓            │
//! │                      codec (len + JSON + CRC) │
//! └──────────────────────────────────────────────┘
//! ```

mod codec;
mod store;
mod wal;

pub use store::{JournalStore, JOURNAL_FILE};
pub use wal::{JournalEntry, JournalOp, WriteAheadLog};

use serde::{Deserialize, Serialize};

use crate::error::{FlowResult, ValidationError};

/// Configuration for [`JournalStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Whether to fsync after every append (slower but safer).
    pub sync_on_write: bool,
    /// Dead entries tolerated before the journal is rewritten.
    pub compact_threshold: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            compact_threshold: 1024,
        }
    }
}

impl JournalConfig {
    /// Rejects a zero compaction threshold.
    pub fn validate(self) -> FlowResult<Self> {
        if self.compact_threshold == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "compact_threshold must be at least 1".to_string(),
            }
            .into());
        }
        Ok(self)
    }
}

/// Opens a [`JournalStore`] in `dir`, using defaults when `config` is `None`.
///
/// # Example
/// ```rust,ignore
/// use kyroflow::storage::persistent::open_journal;
///
/// let store = Arc::new(open_journal("./listeners", None)?);
/// let engine = Engine::new(EngineConfig::default(), store, resolver, launcher, parent)?;
/// engine.reload()?;
/// ```
pub fn open_journal(
    dir: impl AsRef<std::path::Path>,
    config: Option<JournalConfig>,
) -> FlowResult<JournalStore> {
    JournalStore::open(dir, config.unwrap_or_default())
}
