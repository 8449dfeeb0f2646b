// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event methods: name and owning entity

use super::Event;
use crate::run::RunId;
use crate::tx::TxId;

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::JobRegistered { .. } => "job:registered",
            Event::FeedRecorded { .. } => "feed:recorded",
            Event::RunCreated { .. } => "run:created",
            Event::RunStatusChanged { .. } => "run:status",
            Event::RunTaskRecorded { .. } => "run:task",
            Event::RunTaskConfirmed { .. } => "run:task:confirmed",
            Event::RunErrored { .. } => "run:errored",
            Event::HeadObserved { .. } => "head:observed",
            Event::HeadsDiscarded { .. } => "head:discarded",
            Event::NonceReserved { .. } => "nonce:reserved",
            Event::TxSubmitted { .. } => "tx:submitted",
            Event::TxIncluded { .. } => "tx:included",
            Event::TxConfirmed { .. } => "tx:confirmed",
            Event::TxInvalidated { .. } => "tx:invalidated",
            Event::TxRebroadcast { .. } => "tx:rebroadcast",
            Event::TxFatal { .. } => "tx:fatal",
            Event::TxArchived { .. } => "tx:archived",
        }
    }

    /// Run this event mutates, if any
    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            Event::RunCreated { run } => Some(&run.id),
            Event::RunStatusChanged { id, .. }
            | Event::RunTaskRecorded { id, .. }
            | Event::RunTaskConfirmed { id, .. }
            | Event::RunErrored { id, .. } => Some(id),
            Event::TxSubmitted { tx } => Some(&tx.run_id),
            _ => None,
        }
    }

    /// Transaction this event mutates, if any
    pub fn tx_id(&self) -> Option<&TxId> {
        match self {
            Event::TxSubmitted { tx } => Some(&tx.id),
            Event::TxIncluded { id, .. }
            | Event::TxConfirmed { id }
            | Event::TxInvalidated { id }
            | Event::TxRebroadcast { id, .. }
            | Event::TxFatal { id, .. }
            | Event::TxArchived { id } => Some(id),
            _ => None,
        }
    }
}
