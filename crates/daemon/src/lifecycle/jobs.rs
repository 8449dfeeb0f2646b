// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job spec files: one TOML job per `*.toml` file in the jobs directory.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use orc_core::JobSpec;
use tracing::{debug, info};

use super::LifecycleError;

/// Read every job file in `dir`, in file name order. A missing directory
/// means no jobs.
pub fn load_jobs(dir: &Path) -> Result<Vec<JobSpec>, LifecycleError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(dir = %dir.display(), "no jobs directory");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut seen = HashSet::new();
    let mut jobs = Vec::with_capacity(paths.len());
    for path in paths {
        let job = parse_job(&path)?;
        if !seen.insert(job.id.clone()) {
            return Err(LifecycleError::DuplicateJob { id: job.id, path });
        }
        debug!(job = %job.id, path = %path.display(), "loaded job file");
        jobs.push(job);
    }
    Ok(jobs)
}

fn parse_job(path: &Path) -> Result<JobSpec, LifecycleError> {
    let raw = std::fs::read_to_string(path)?;
    toml::from_str(&raw).map_err(|source| LifecycleError::JobFile { path: path.to_path_buf(), source })
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
