//! Durable presence ledger - append-only admission log
//!
//! Admission events are written in JSONL format (one JSON object per line).
//! Presence is derived, never stored: a vehicle is inside iff its IN rows
//! outnumber its OUT rows over the full on-disk history. Queries replay the
//! file so the answer survives restarts consistent with durable state.
//!
//! The ledger lock is the single serialization point for query-then-record
//! sequences: two concurrent exit requests for the same plate cannot both
//! observe "inside".

use crate::domain::types::{AdmissionEvent, Direction};
use parking_lot::{Mutex, MutexGuard};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger open failed: {0}")]
    OpenFailed(#[source] std::io::Error),
    #[error("ledger write failed: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("ledger read failed: {0}")]
    ReadFailed(#[source] std::io::Error),
}

struct LedgerFile {
    path: PathBuf,
    appender: File,
    #[cfg(test)]
    fail_writes: bool,
}

/// Append-only admission ledger backed by a JSONL file
pub struct PresenceLedger {
    inner: Mutex<LedgerFile>,
}

impl PresenceLedger {
    /// Open (or create) the ledger file. Startup-fatal on failure: an access
    /// control device has no safe mode without its ledger.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(LedgerError::OpenFailed)?;
            }
        }

        let appender = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(LedgerError::OpenFailed)?;

        info!(path = %path.display(), "ledger_opened");
        Ok(Self {
            inner: Mutex::new(LedgerFile {
                path,
                appender,
                #[cfg(test)]
                fail_writes: false,
            }),
        })
    }

    /// Begin a transaction. The returned guard holds the ledger lock so a
    /// presence query and the record that follows it execute atomically
    /// with respect to other requests.
    pub fn begin(&self) -> LedgerTxn<'_> {
        LedgerTxn { guard: self.inner.lock() }
    }

    /// One-off presence query (its own short transaction)
    pub fn is_inside(&self, plate: &str) -> Result<bool, LedgerError> {
        self.begin().is_inside(plate)
    }

    /// Make every subsequent `record` fail, to exercise fail-closed paths
    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

/// Lock guard over the ledger; all queries and appends go through this
pub struct LedgerTxn<'a> {
    guard: MutexGuard<'a, LedgerFile>,
}

impl LedgerTxn<'_> {
    /// true iff (#IN events) > (#OUT events) for this plate, replayed from
    /// the file on every call. A missing file means an empty history.
    pub fn is_inside(&mut self, plate: &str) -> Result<bool, LedgerError> {
        let file = match File::open(&self.guard.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(LedgerError::ReadFailed(e)),
        };

        let mut balance: i64 = 0;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(LedgerError::ReadFailed)?;
            if line.trim().is_empty() {
                continue;
            }
            let event: AdmissionEvent = match serde_json::from_str(&line) {
                Ok(event) => event,
                Err(e) => {
                    // One bad row must not poison the whole history
                    warn!(error = %e, "ledger_row_unparseable");
                    continue;
                }
            };
            if event.plate == plate {
                match event.direction {
                    Direction::In => balance += 1,
                    Direction::Out => balance -= 1,
                }
            }
        }
        Ok(balance > 0)
    }

    /// Append one event. The write only counts as committed after flush and
    /// sync; on error the caller must treat the event as not having occurred.
    pub fn record(&mut self, event: &AdmissionEvent) -> Result<(), LedgerError> {
        #[cfg(test)]
        if self.guard.fail_writes {
            return Err(LedgerError::WriteFailed(std::io::Error::other("simulated write failure")));
        }

        let json = serde_json::to_string(event).map_err(|e| LedgerError::WriteFailed(e.into()))?;
        writeln!(self.guard.appender, "{}", json).map_err(LedgerError::WriteFailed)?;
        self.guard.appender.flush().map_err(LedgerError::WriteFailed)?;
        self.guard.appender.sync_data().map_err(LedgerError::WriteFailed)?;

        debug!(
            event_id = %event.event_id,
            plate = %event.plate,
            direction = %event.direction,
            "ledger_appended"
        );
        Ok(())
    }
}
