// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log of events, one JSON object per line.
//!
//! Entries are buffered by [`Wal::append`] and become durable on
//! [`Wal::flush`], which writes the whole batch at once. A failed write is
//! cut back to the last durable length. A corrupt or torn tail found at open
//! is cut off: the damaged file is rotated to `.bak` and the valid prefix
//! rewritten.

use orc_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// A failed batch could not be removed from the file
    #[error("WAL tail could not be rolled back: {0}")]
    Broken(std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

pub struct Wal {
    path: PathBuf,
    file: File,
    /// File length after the last durable batch
    len: u64,
    buffer: Vec<WalEntry>,
    write_seq: u64,
    processed_seq: u64,
    broken: bool,
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl Wal {
    /// Open or create the log. `processed_seq` is the sequence already
    /// reflected in the loaded snapshot.
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let (valid, corrupt) = if path.exists() { scan(path)? } else { (Vec::new(), false) };
        if corrupt {
            let bak = crate::snapshot::rotate_bak_path(path);
            warn!(path = %path.display(), valid = valid.len(), bak = %bak.display(), "corrupt WAL tail, keeping valid prefix");
            fs::rename(path, &bak)?;
            let mut clean = BufWriter::new(File::create(path)?);
            for entry in &valid {
                serde_json::to_writer(&mut clean, entry)?;
                clean.write_all(b"\n")?;
            }
            clean.flush()?;
            clean.get_ref().sync_all()?;
        }

        let write_seq = valid.last().map(|e| e.seq).unwrap_or(0).max(processed_seq);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
            buffer: Vec::new(),
            write_seq,
            processed_seq,
            broken: false,
            #[cfg(test)]
            fail_after: None,
        })
    }

    /// Buffer an event and return its sequence number
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        self.write_seq += 1;
        self.buffer.push(WalEntry { seq: self.write_seq, event: event.clone() });
        Ok(self.write_seq)
    }

    /// Write buffered entries and sync them to disk. On error nothing of
    /// the batch stays in the file and the entries stay buffered.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.broken {
            return Err(WalError::Broken(std::io::Error::other("an earlier rollback failed")));
        }
        if self.buffer.is_empty() {
            return Ok(());
        }
        let mut batch = Vec::new();
        for entry in &self.buffer {
            serde_json::to_writer(&mut batch, entry)?;
            batch.push(b'\n');
        }
        if let Err(e) = self.write_batch(&batch) {
            warn!(error = %e, len = self.len, "WAL write failed, cutting back the batch");
            if let Err(rollback) = self.rollback() {
                error!(error = %rollback, path = %self.path.display(), "WAL rollback failed");
                self.broken = true;
                return Err(WalError::Broken(rollback));
            }
            return Err(e.into());
        }
        self.len += batch.len() as u64;
        self.buffer.clear();
        Ok(())
    }

    fn write_batch(&mut self, batch: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(cut) = self.fail_after.take() {
            self.file.write_all(&batch[..cut.min(batch.len())])?;
            return Err(std::io::Error::other("injected write failure"));
        }
        self.file.write_all(batch)?;
        self.file.sync_data()
    }

    /// Cut the file back to the last durable batch and reopen it
    fn rollback(&mut self) -> std::io::Result<()> {
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(self.len)?;
        file.sync_all()?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        Ok(())
    }

    /// Make the next batch write only `bytes` bytes and then fail
    #[cfg(test)]
    pub(crate) fn fail_next_write(&mut self, bytes: usize) {
        self.fail_after = Some(bytes);
    }

    /// Drop buffered entries that were never flushed
    pub fn discard_unflushed(&mut self) {
        if let Some(first) = self.buffer.first() {
            self.write_seq = first.seq - 1;
        }
        self.buffer.clear();
    }

    /// Durable entries with `seq > after`, stopping at the first unreadable line
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        let (entries, _) = scan(&self.path)?;
        Ok(entries.into_iter().filter(|e| e.seq > after).collect())
    }

    pub fn mark_processed(&mut self, seq: u64) {
        self.processed_seq = self.processed_seq.max(seq);
    }

    /// Rewrite the log keeping only entries with `seq >= keep_from`
    pub fn truncate_before(&mut self, keep_from: u64) -> Result<(), WalError> {
        self.flush()?;
        let kept = self.entries_after(keep_from.saturating_sub(1))?;
        let tmp = self.path.with_extension("tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for entry in &kept {
                serde_json::to_writer(&mut out, entry)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = self.file.metadata()?.len();
        Ok(())
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }
}

/// Read every parseable entry up to the first bad line. The flag reports
/// whether anything after the valid prefix was found.
fn scan(path: &Path) -> Result<(Vec<WalEntry>, bool), WalError> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.split(b'\n') {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice::<WalEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(_) => return Ok((entries, true)),
        }
    }
    Ok((entries, false))
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
