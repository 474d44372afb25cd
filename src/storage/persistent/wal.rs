//! Append-only listener journal.
//!
//! Every store mutation is appended (and optionally fsynced) before it is
//! applied in memory; replaying the file on open rebuilds the live set.
//! Compaction rewrites the journal into a sibling file and renames it over the
//! old one, so a crash mid-compaction leaves the previous journal intact.
//!
//! # File Format
//! ```text
//! [MAGIC: 4 bytes][VERSION: 1 byte]
//! [ENTRY 1: codec-framed JournalEntry]
//! [ENTRY 2: codec-framed JournalEntry]
//! ...
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Error as IoError, ErrorKind, Result as IoResult, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::expression::ExpressionId;
use crate::listen::ListenRecord;

use super::codec;

/// A single journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Monotonically increasing within one journal file.
    pub sequence: u64,
    /// Wall-clock time of the append.
    pub timestamp: DateTime<Utc>,
    /// The mutation.
    pub op: JournalOp,
}

/// Logged store mutation.
#[allow(missing_docs)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JournalOp {
    /// Insert or replace a record.
    Put(ListenRecord),
    /// Remove the record for `id`.
    Delete { id: ExpressionId },
}

struct Writer {
    file: BufWriter<File>,
    sequence: u64,
}

/// Journal file handle; appends are serialized by an internal mutex.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: Mutex<Writer>,
    sync_on_write: bool,
}

fn poisoned() -> IoError {
    IoError::new(ErrorKind::Other, "journal writer lock poisoned")
}

impl WriteAheadLog {
    /// Opens `path`, creating it with a header if missing or empty.
    ///
    /// Returns the log and every intact entry. A torn or corrupt tail is
    /// truncated away so later appends start on a clean boundary.
    pub fn open(path: &Path, sync_on_write: bool) -> IoResult<(Self, Vec<JournalEntry>)> {
        let has_header = path.exists() && fs::metadata(path)?.len() >= 5;

        let entries = if has_header {
            let (entries, valid_len) = Self::scan(path)?;
            let file = OpenOptions::new().write(true).open(path)?;
            if file.metadata()?.len() > valid_len {
                warn!(path = %path.display(), valid_len, "truncating damaged journal tail");
                file.set_len(valid_len)?;
                if sync_on_write {
                    file.sync_all()?;
                }
            }
            entries
        } else {
            let mut file = File::create(path)?;
            codec::write_header(&mut file)?;
            if sync_on_write {
                file.sync_all()?;
            }
            Vec::new()
        };

        let sequence = entries.last().map_or(0, |e| e.sequence);
        let file = OpenOptions::new().append(true).open(path)?;

        Ok((
            Self {
                path: path.to_path_buf(),
                writer: Mutex::new(Writer {
                    file: BufWriter::new(file),
                    sequence,
                }),
                sync_on_write,
            },
            entries,
        ))
    }

    fn writer(&self) -> IoResult<MutexGuard<'_, Writer>> {
        self.writer.lock().map_err(|_| poisoned())
    }

    /// Appends one operation and returns its sequence number.
    pub fn append(&self, op: JournalOp) -> IoResult<u64> {
        let mut writer = self.writer()?;
        let sequence = writer.sequence + 1;
        let encoded = codec::encode(&JournalEntry {
            sequence,
            timestamp: Utc::now(),
            op,
        })?;

        writer.file.write_all(&encoded)?;
        writer.file.flush()?;
        if self.sync_on_write {
            writer.file.get_ref().sync_all()?;
        }

        writer.sequence = sequence;
        Ok(sequence)
    }

    /// Replaces the journal with one `Put` per live record.
    pub fn rewrite<'a>(&self, live: impl IntoIterator<Item = &'a ListenRecord>) -> IoResult<()> {
        let mut writer = self.writer()?;
        writer.file.flush()?;

        let tmp_path = self.path.with_extension("compact");
        let mut sequence = 0;
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            codec::write_header(&mut tmp)?;
            for record in live {
                sequence += 1;
                tmp.write_all(&codec::encode(&JournalEntry {
                    sequence,
                    timestamp: Utc::now(),
                    op: JournalOp::Put(record.clone()),
                })?)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        *writer = Writer {
            file: BufWriter::new(file),
            sequence,
        };
        Ok(())
    }

    /// Sequence number of the last appended entry.
    pub fn current_sequence(&self) -> IoResult<u64> {
        Ok(self.writer()?.sequence)
    }

    /// Current journal length on disk.
    pub fn size_bytes(&self) -> IoResult<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Reads entries until the end of the file or the first damaged entry.
    /// Returns them with the byte length of the intact prefix.
    fn scan(path: &Path) -> IoResult<(Vec<JournalEntry>, u64)> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        codec::read_header(&mut reader)?;

        let mut entries = Vec::new();
        let mut valid_len = reader.stream_position()?;
        while valid_len < file_len {
            match codec::decode::<JournalEntry>(&mut reader) {
                Ok(entry) => {
                    entries.push(entry);
                    valid_len = reader.stream_position()?;
                }
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        after_sequence = entries.last().map_or(0, |last: &JournalEntry| last.sequence),
                        error = %e,
                        "journal replay stopped at damaged entry"
                    );
                    break;
                }
            }
        }
        Ok((entries, valid_len))
    }
}
