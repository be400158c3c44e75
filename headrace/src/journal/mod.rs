// Copyright (c) 2026 The Headrace Project

//! Durable append-only event journal.
//!
//! Every state-changing event is journalled before its effects become
//! visible, which makes the head logic recoverable: on restart the
//! journal is replayed through the same update function and yields the
//! same state.
//!
//! # On-disk format
//!
//! The journal is a flat file of self-delimited records:
//!
//! ```text
//! [u32 LE payload length][payload][32-byte SHA-256 of payload]
//! ```
//!
//! The payload is the bincode encoding of a versioned [`StoredRecord`].
//! Older files may contain `Legacy` records (events without ids); they
//! are lifted to the current form on read, with ids assigned by
//! position. New records are always written in the current form. A
//! partial record at the end of the file (a crash mid-append) is
//! truncated away on open; a checksum mismatch anywhere else is
//! corruption and refuses the whole journal.
//!
//! # Writer affinity
//!
//! Once a journal handle has appended, no other handle in the process
//! may read the same file: reloading a live journal would race the
//! writer. Such reads fail with [`JournalError::IncorrectAccess`].

use crate::head::events::Event;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upper bound on a single record; anything larger is corruption.
const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

/// Length prefix plus trailing checksum.
const FRAME_OVERHEAD: usize = 4 + 32;

/// Errors from the journal.
#[derive(Debug, Error)]
pub enum JournalError {
    /// A record failed its checksum or is structurally invalid.
    #[error("corrupt journal record at offset {offset}")]
    CorruptRecord {
        /// Byte offset of the offending record.
        offset: u64,
    },

    /// The journal is owned by a live writer; reloading now would race it.
    #[error("journal at {path} is owned by a live writer")]
    IncorrectAccess {
        /// Path of the contested journal.
        path: PathBuf,
    },

    /// Filesystem failure.
    #[error("journal IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A journalled event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Dense, strictly increasing id.
    pub event_id: u64,

    /// The journalled event.
    pub event: Event,
}

/// Versioned on-disk payload.
///
/// `Legacy` is the pre-versioning layout: a bare event whose id is its
/// position in the file. Mixed files (legacy and current interleaved)
/// are accepted; writes always produce `V1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum StoredRecord {
    /// Pre-versioning record: event only.
    Legacy(Event),

    /// Current record: event with explicit id.
    V1(EventRecord),
}

// Registry of journal paths with a live writer, keyed by canonical path.
// The value identifies the owning handle so that the writer itself may
// keep reading.
static LIVE_WRITERS: Mutex<Option<HashMap<PathBuf, u64>>> = Mutex::new(None);

fn with_registry<T>(f: impl FnOnce(&mut HashMap<PathBuf, u64>) -> T) -> T {
    let mut guard = LIVE_WRITERS.lock().unwrap_or_else(|e| e.into_inner());
    f(guard.get_or_insert_with(HashMap::new))
}

fn next_handle_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Append-only journal of head events.
pub struct EventJournal {
    file: File,
    path: PathBuf,
    handle_id: u64,
    next_event_id: u64,
    has_appended: bool,
}

impl EventJournal {
    /// Open (or create) the journal at `path`, recover from any torn
    /// tail, and return the handle positioned for appending.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        // Scan once to find the clean end of the log and the next id.
        let scan = scan_records(&mut file, &path)?;
        if scan.truncate_to < scan.file_len {
            warn!(
                path = %path.display(),
                at = scan.truncate_to,
                "truncating torn record at journal tail"
            );
            file.set_len(scan.truncate_to)?;
        }
        file.seek(SeekFrom::End(0))?;

        info!(
            path = %path.display(),
            events = scan.records.len(),
            "journal opened"
        );
        Ok(Self {
            file,
            path,
            handle_id: next_handle_id(),
            next_event_id: scan.next_event_id,
            has_appended: false,
        })
    }

    /// The journal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The id the next appended event will get.
    pub fn next_event_id(&self) -> u64 {
        self.next_event_id
    }

    /// Read back every record in append order.
    ///
    /// Fails with [`JournalError::IncorrectAccess`] when another handle
    /// has appended to this journal and is still alive.
    pub fn load_all(&mut self) -> Result<Vec<EventRecord>, JournalError> {
        self.check_access()?;
        let scan = scan_records(&mut self.file, &self.path)?;
        self.file.seek(SeekFrom::End(0))?;
        Ok(scan.records)
    }

    /// Durably append one event. The record is fsynced before this
    /// returns, so effects of the event may safely become visible
    /// afterwards.
    pub fn append(&mut self, event: &Event) -> Result<EventRecord, JournalError> {
        self.claim_write_ownership()?;

        let record = EventRecord {
            event_id: self.next_event_id,
            event: event.clone(),
        };
        let payload = bincode::serialize(&StoredRecord::V1(record.clone()))
            .map_err(|e| JournalError::Io(std::io::Error::other(e)))?;

        let mut frame = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(&Sha256::digest(&payload));

        self.file.write_all(&frame)?;
        self.file.sync_data()?;

        self.next_event_id += 1;
        debug!(event_id = record.event_id, "journalled event");
        Ok(record)
    }

    /// Flush everything to disk.
    pub fn flush(&mut self) -> Result<(), JournalError> {
        self.file.sync_all()?;
        Ok(())
    }

    fn canonical_path(&self) -> PathBuf {
        self.path.canonicalize().unwrap_or_else(|_| self.path.clone())
    }

    fn claim_write_ownership(&mut self) -> Result<(), JournalError> {
        if self.has_appended {
            return Ok(());
        }
        let key = self.canonical_path();
        let owned = with_registry(|registry| match registry.get(&key) {
            Some(owner) if *owner != self.handle_id => false,
            _ => {
                registry.insert(key.clone(), self.handle_id);
                true
            }
        });
        if !owned {
            return Err(JournalError::IncorrectAccess {
                path: self.path.clone(),
            });
        }
        self.has_appended = true;
        Ok(())
    }

    fn check_access(&self) -> Result<(), JournalError> {
        let key = self.canonical_path();
        let denied = with_registry(|registry| {
            matches!(registry.get(&key), Some(owner) if *owner != self.handle_id)
        });
        if denied {
            return Err(JournalError::IncorrectAccess {
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}

impl Drop for EventJournal {
    fn drop(&mut self) {
        if self.has_appended {
            let key = self.canonical_path();
            with_registry(|registry| {
                if registry.get(&key) == Some(&self.handle_id) {
                    registry.remove(&key);
                }
            });
        }
    }
}

struct ScanResult {
    records: Vec<EventRecord>,
    next_event_id: u64,
    truncate_to: u64,
    file_len: u64,
}

/// Read records from the start of the file. A partial frame at the tail
/// marks the clean end; a bad checksum or oversized length before that
/// is corruption.
fn scan_records(file: &mut File, path: &Path) -> Result<ScanResult, JournalError> {
    let file_len = file.metadata()?.len();
    let mut buf = Vec::with_capacity(file_len as usize);
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut buf)?;

    let mut records = Vec::new();
    let mut next_event_id = 0u64;
    let mut offset = 0usize;

    while offset < buf.len() {
        if buf.len() - offset < 4 {
            break; // torn length prefix
        }
        let len = u32::from_le_bytes(
            buf[offset..offset + 4]
                .try_into()
                .expect("slice is exactly 4 bytes"),
        );
        if len > MAX_RECORD_LEN {
            return Err(JournalError::CorruptRecord {
                offset: offset as u64,
            });
        }
        let frame_len = 4 + len as usize + 32;
        if buf.len() - offset < frame_len {
            break; // torn payload or checksum
        }

        let payload = &buf[offset + 4..offset + 4 + len as usize];
        let checksum = &buf[offset + 4 + len as usize..offset + frame_len];
        if Sha256::digest(payload).as_slice() != checksum {
            // The tail record of a crashed append can also fail its
            // checksum when the length landed but the payload did not.
            if offset + frame_len == buf.len() {
                break;
            }
            return Err(JournalError::CorruptRecord {
                offset: offset as u64,
            });
        }

        let stored: StoredRecord =
            bincode::deserialize(payload).map_err(|_| JournalError::CorruptRecord {
                offset: offset as u64,
            })?;
        let record = match stored {
            StoredRecord::V1(record) => record,
            // Legacy records carry no id; their position is their id.
            StoredRecord::Legacy(event) => EventRecord {
                event_id: next_event_id,
                event,
            },
        };
        next_event_id = record.event_id + 1;
        records.push(record);
        offset += frame_len;
    }

    if offset < buf.len() {
        debug!(
            path = %path.display(),
            offset,
            "journal has a torn tail"
        );
    }

    Ok(ScanResult {
        records,
        next_event_id,
        truncate_to: offset as u64,
        file_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::head::events::ClientCommand;
    use crate::ledger::Tx;

    fn event(n: u64) -> Event {
        Event::Command(ClientCommand::NewTx {
            tx: Tx::new(n, [n], [n + 100]),
        })
    }

    #[test]
    fn test_append_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        let mut journal = EventJournal::open(&path).unwrap();
        for n in 0..5 {
            journal.append(&event(n)).unwrap();
        }
        let records = journal.load_all().unwrap();

        assert_eq!(records.len(), 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.event_id, i as u64);
            assert_eq!(record.event, event(i as u64));
        }
    }

    #[test]
    fn test_reopen_continues_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        {
            let mut journal = EventJournal::open(&path).unwrap();
            journal.append(&event(0)).unwrap();
            journal.append(&event(1)).unwrap();
        }
        let mut journal = EventJournal::open(&path).unwrap();
        assert_eq!(journal.next_event_id(), 2);
        let record = journal.append(&event(2)).unwrap();
        assert_eq!(record.event_id, 2);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        {
            let mut journal = EventJournal::open(&path).unwrap();
            journal.append(&event(0)).unwrap();
            journal.append(&event(1)).unwrap();
        }
        // Chop the last record in half.
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 10).unwrap();
        drop(file);

        let mut journal = EventJournal::open(&path).unwrap();
        let records = journal.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(journal.next_event_id(), 1);
    }

    #[test]
    fn test_mid_file_corruption_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        {
            let mut journal = EventJournal::open(&path).unwrap();
            journal.append(&event(0)).unwrap();
            journal.append(&event(1)).unwrap();
        }
        // Flip a byte inside the first record's payload.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[6] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(
            EventJournal::open(&path),
            Err(JournalError::CorruptRecord { offset: 0 })
        ));
    }

    #[test]
    fn test_live_writer_blocks_other_readers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        let mut writer = EventJournal::open(&path).unwrap();
        let mut reader = EventJournal::open(&path).unwrap();
        writer.append(&event(0)).unwrap();

        assert!(matches!(
            reader.load_all(),
            Err(JournalError::IncorrectAccess { .. })
        ));
        // The writer itself may keep reading.
        assert_eq!(writer.load_all().unwrap().len(), 1);

        // Ownership is released when the writer goes away.
        drop(writer);
        assert_eq!(reader.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_legacy_records_are_lifted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.log");

        // Hand-write one legacy record, then append a current one.
        let payload = bincode::serialize(&StoredRecord::Legacy(event(0))).unwrap();
        let mut frame = Vec::new();
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(&Sha256::digest(&payload));
        std::fs::write(&path, &frame).unwrap();

        let mut journal = EventJournal::open(&path).unwrap();
        assert_eq!(journal.next_event_id(), 1);
        journal.append(&event(1)).unwrap();

        let records = journal.load_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_id, 0);
        assert_eq!(records[0].event, event(0));
        assert_eq!(records[1].event_id, 1);
    }
}
