// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure taxonomy shared by every component that can fail a Run

use serde::{Deserialize, Serialize};

/// How a failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retried under the task's retry policy
    Transient,
    /// Never retried; the Run errors immediately
    Validation,
    /// The chain disagreed with what we submitted (reorg, consumed nonce)
    ChainConsistency,
    /// The store or another shared resource is unavailable
    ResourceExhausted,
}

crate::simple_display! {
    ErrorKind {
        Transient => "transient",
        Validation => "validation",
        ChainConsistency => "chain_consistency",
        ResourceExhausted => "resource_exhausted",
    }
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

/// Structured terminal cause persisted on an errored Run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub message: String,
}

impl RunError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, task_id: None, message: message.into() }
    }

    pub fn in_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.task_id {
            Some(task) => write!(f, "{} error in task {}: {}", self.kind, task, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}
