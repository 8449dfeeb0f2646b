// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Writing and loading compressed snapshots

use crate::snapshot::{rotate_bak_path, Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
use crate::MaterializedState;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointResult {
    pub seq: u64,
    pub size_bytes: u64,
}

/// Writes snapshots atomically: temp file, fsync, rotate the previous
/// snapshot to `.bak`, rename into place.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    path: PathBuf,
}

impl Checkpointer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn checkpoint_sync(
        &self,
        seq: u64,
        state: &MaterializedState,
    ) -> Result<CheckpointResult, SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(&Snapshot::new(seq, state.clone()))?;
        let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?;

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }
        if self.path.exists() {
            fs::rename(&self.path, rotate_bak_path(&self.path))?;
        }
        fs::rename(&tmp, &self.path)?;

        Ok(CheckpointResult { seq, size_bytes: compressed.len() as u64 })
    }
}

/// Load the snapshot at `path`, falling back to the most recent `.bak`
/// when the primary is unreadable. Returns `None` when neither exists.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    match read_snapshot(path) {
        Ok(found) => Ok(found),
        Err(e) => {
            let bak = path.with_extension("bak");
            warn!(path = %path.display(), error = %e, "snapshot unreadable, trying backup");
            match read_snapshot(&bak)? {
                Some(snapshot) => Ok(Some(snapshot)),
                None => Err(e),
            }
        }
    }
}

fn read_snapshot(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let json = if bytes.starts_with(&ZSTD_MAGIC) { zstd::decode_all(bytes.as_slice())? } else { bytes };
    let snapshot: Snapshot = serde_json::from_slice(&json)?;
    if snapshot.version > CURRENT_SNAPSHOT_VERSION {
        return Err(SnapshotError::Version(snapshot.version));
    }
    Ok(Some(snapshot))
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
