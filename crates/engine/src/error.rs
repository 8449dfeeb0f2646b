// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error types

use orc_adapters::{ChainError, SignerError};
use orc_core::{BlockHash, ErrorKind, JobId, JobSpecError, RunId};
use orc_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The store refused a write; callers should back off and retry later
    #[error("store unavailable, refusing new work")]
    Backpressure,
    #[error("unknown job: {0}")]
    UnknownJob(JobId),
    #[error("unknown run: {0}")]
    UnknownRun(RunId),
    #[error("job {job} does not accept {got} triggers")]
    TriggerMismatch { job: JobId, got: &'static str },
    #[error("invalid job: {0}")]
    InvalidJob(#[from] JobSpecError),
    #[error("job {job} uses unknown task type {kind:?}")]
    UnknownTaskType { job: JobId, kind: String },
    #[error("head {0} does not link to its parent")]
    MalformedHead(BlockHash),
    /// A head above the view has an ancestor the chain cannot return yet
    #[error("chain has no block {0} to connect a new head")]
    UnknownParent(BlockHash),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Signer(#[from] SignerError),
    #[error("engine is shut down")]
    Shutdown,
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable => EngineError::Backpressure,
            StoreError::UnknownRun(id) => EngineError::UnknownRun(id),
            StoreError::UnknownJob(id) => EngineError::UnknownJob(id),
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Backpressure | EngineError::Shutdown => ErrorKind::ResourceExhausted,
            EngineError::Store(e) => e.kind(),
            EngineError::Chain(e) => e.kind(),
            EngineError::UnknownParent(_) => ErrorKind::Transient,
            EngineError::Signer(_) => ErrorKind::Validation,
            EngineError::UnknownJob(_)
            | EngineError::UnknownRun(_)
            | EngineError::TriggerMismatch { .. }
            | EngineError::InvalidJob(_)
            | EngineError::MalformedHead(_)
            | EngineError::UnknownTaskType { .. } => ErrorKind::Validation,
        }
    }
}
