// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Head Tracker: follows the chain's new heads, detects reorgs and tells the
//! coordinator when watched blocks are deep enough.
//!
//! Every accepted change is persisted before the in-memory view moves, so a
//! store failure leaves the view where it was and the next head reconnects
//! through the gap.

mod view;

pub use view::{ChainChange, Confirmations, HeadChainView, Walk};

use crate::backoff::Reconnect;
use crate::config::TrackerConfig;
use crate::error::EngineError;
use orc_adapters::ChainClient;
use orc_core::{BlockHash, Head};
use orc_storage::Store;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Notifications to the coordinator, in chain order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadEvent {
    /// Heads above `common` were replaced
    Reorg { common: Option<Head>, discarded: Vec<BlockHash>, added: Vec<BlockHash> },
    /// A watched block reached `depth` confirmations
    HeadConfirmed { hash: BlockHash, number: u64, depth: u64 },
    NewHead(Head),
}

struct Shared {
    view: HeadChainView,
    watches: HashSet<(BlockHash, u64)>,
}

/// Read access to the tracker's view, shared with the coordinator
#[derive(Clone)]
pub struct TrackerHandle {
    shared: Arc<RwLock<Shared>>,
}

impl TrackerHandle {
    fn new(view: HeadChainView) -> Self {
        Self { shared: Arc::new(RwLock::new(Shared { view, watches: HashSet::new() })) }
    }

    pub fn top(&self) -> Option<Head> {
        self.shared.read().view.top().cloned()
    }

    /// Number of the newest head, 0 before any head is seen
    pub fn top_number(&self) -> u64 {
        self.shared.read().view.top().map(|h| h.number).unwrap_or(0)
    }

    /// Number of the oldest head still held
    pub fn floor(&self) -> Option<u64> {
        self.shared.read().view.oldest().map(|h| h.number)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.shared.read().view.contains(hash)
    }

    pub fn confirmations_of(&self, hash: &BlockHash) -> Confirmations {
        self.shared.read().view.confirmations_of(hash)
    }

    /// Held heads, newest first
    pub fn heads(&self) -> Vec<Head> {
        self.shared.read().view.iter().cloned().collect()
    }

    /// Ask for a `HeadConfirmed` once `hash` is `depth` deep. The view keeps
    /// at least `depth + 1` heads from now on.
    pub fn watch(&self, hash: BlockHash, depth: u64) {
        let mut shared = self.shared.write();
        shared.view.ensure_depth(depth as usize + 1);
        shared.watches.insert((hash, depth));
    }

    pub fn unwatch(&self, hash: &BlockHash) {
        self.shared.write().watches.retain(|(h, _)| h != hash);
    }

    pub fn watch_count(&self) -> usize {
        self.shared.read().watches.len()
    }
}

pub struct HeadTracker<C: ChainClient> {
    chain: C,
    store: Store,
    handle: TrackerHandle,
    events: mpsc::Sender<HeadEvent>,
    config: TrackerConfig,
}

impl<C: ChainClient> HeadTracker<C> {
    /// Build a tracker whose view is restored from the store's head history
    pub fn new(chain: C, store: Store, config: TrackerConfig, events: mpsc::Sender<HeadEvent>) -> Self {
        let history = store.recent_heads();
        let view = HeadChainView::restore(config.head_history, &history);
        if let Some(top) = view.top() {
            info!(head = %top, held = view.len(), "restored head view");
        }
        Self { chain, store, handle: TrackerHandle::new(view), events, config }
    }

    pub fn handle(&self) -> TrackerHandle {
        self.handle.clone()
    }

    /// Admit one announced head
    pub async fn on_new_head(&self, head: Head) -> Result<ChainChange, EngineError> {
        if self.handle.contains(&head.hash) {
            return Ok(ChainChange::Duplicate);
        }

        // Newest first while walking; each fetched parent is one block lower,
        // so the walk ends at the view's oldest number at the latest
        let mut walked = vec![head];
        loop {
            let step = self.handle.shared.read().view.walk(&walked[walked.len() - 1..]);
            let Walk::Fetch(parent) = step else { break };
            let Some(fetched) = self.chain.head_by_hash(&parent).await? else {
                let top = self.handle.top_number();
                if walked.iter().all(|h| h.number > top) {
                    return Err(EngineError::UnknownParent(parent));
                }
                warn!(%parent, "chain does not know parent, treating branch as disconnected");
                break;
            };
            let Some(oldest) = walked.last() else { break };
            if !oldest.is_child_of(&fetched) {
                return Err(EngineError::MalformedHead(oldest.hash.clone()));
            }
            walked.push(fetched);
        }
        if walked.len() > 1 {
            debug!(fetched = walked.len() - 1, "walked back to the held chain");
        }
        walked.reverse();
        let branch = walked;

        let change = {
            let shared = self.handle.shared.read();
            if !shared.view.is_well_formed(&branch) {
                let newest = branch.last().map(|h| h.hash.clone()).unwrap_or_else(|| BlockHash::new(""));
                return Err(EngineError::MalformedHead(newest));
            }
            shared.view.connect(branch)
        };
        if change == ChainChange::Duplicate {
            return Ok(change);
        }

        let discarded: Vec<BlockHash> = change.discarded().iter().map(|h| h.hash.clone()).collect();
        self.store.record_branch(discarded.clone(), change.added().to_vec())?;

        let events = {
            let mut shared = self.handle.shared.write();
            shared.watches.retain(|(h, _)| !discarded.contains(h));
            let watched = watched_numbers(&shared, &change);
            shared.view.apply(&change);
            collect_events(&mut shared, &change, &watched)
        };
        log_change(&change);
        for event in events {
            if self.events.send(event).await.is_err() {
                debug!("head event receiver dropped");
                break;
            }
        }
        Ok(change)
    }

    /// Re-validate the view against the node's latest head
    pub async fn reconcile_latest(&self) -> Result<ChainChange, EngineError> {
        let latest = self.chain.latest_head().await?;
        self.on_new_head(latest).await
    }

    /// Follow new heads until `shutdown`, resubscribing with backoff
    pub async fn run(self, shutdown: CancellationToken) {
        let mut backoff = Reconnect::new(self.config.reconnect_initial, self.config.reconnect_max);
        loop {
            match self.follow(&shutdown, &mut backoff).await {
                Ok(()) if shutdown.is_cancelled() => return,
                Ok(()) => warn!("head subscription closed"),
                Err(e) => warn!(error = %e, "head subscription failed"),
            }
            let delay = backoff.next_delay();
            debug!(?delay, "resubscribing to heads");
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn follow(&self, shutdown: &CancellationToken, backoff: &mut Reconnect) -> Result<(), EngineError> {
        match self.reconcile_latest().await {
            Ok(_) => {}
            Err(EngineError::Chain(e)) => return Err(EngineError::Chain(e)),
            Err(e) => warn!(error = %e, "could not reconcile latest head"),
        }
        let mut heads = self.chain.subscribe_heads().await?;
        backoff.reset();
        info!("subscribed to new heads");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                next = heads.recv() => match next {
                    Some(head) => {
                        let number = head.number;
                        if let Err(e) = self.on_new_head(head).await {
                            warn!(head = number, error = %e, "head not admitted");
                        }
                    }
                    None => return Ok(()),
                },
            }
        }
    }
}

/// Block numbers of watched heads, taken before a long extension can prune
/// them from the view
fn watched_numbers(shared: &Shared, change: &ChainChange) -> HashMap<BlockHash, u64> {
    shared
        .watches
        .iter()
        .filter_map(|(hash, _)| {
            let head = shared.view.get(hash).or_else(|| change.added().iter().find(|h| &h.hash == hash))?;
            Some((hash.clone(), head.number))
        })
        .collect()
}

/// Events for an applied change, and watches they satisfy
fn collect_events(shared: &mut Shared, change: &ChainChange, watched: &HashMap<BlockHash, u64>) -> Vec<HeadEvent> {
    let mut events = Vec::new();
    if let ChainChange::Reorg { common, discarded, added } = change {
        events.push(HeadEvent::Reorg {
            common: common.clone(),
            discarded: discarded.iter().map(|h| h.hash.clone()).collect(),
            added: added.iter().map(|h| h.hash.clone()).collect(),
        });
    }
    for head in change.added() {
        let fired: Vec<(BlockHash, u64, u64)> = shared
            .watches
            .iter()
            .filter_map(|(hash, depth)| {
                let number = *watched.get(hash)?;
                let confirmations = head.number.checked_sub(number)?;
                (confirmations >= *depth).then(|| (hash.clone(), number, *depth))
            })
            .collect();
        for (hash, number, depth) in fired {
            shared.watches.remove(&(hash.clone(), depth));
            events.push(HeadEvent::HeadConfirmed { hash, number, depth });
        }
        events.push(HeadEvent::NewHead(head.clone()));
    }
    events
}

fn log_change(change: &ChainChange) {
    match change {
        ChainChange::Duplicate => {}
        ChainChange::Extend { added } => {
            if let Some(top) = added.last() {
                if added.len() > 1 {
                    info!(head = %top, filled = added.len() - 1, "filled missed heads");
                } else {
                    debug!(head = %top, "new head");
                }
            }
        }
        ChainChange::Reorg { common, discarded, added } => {
            warn!(
                common = common.as_ref().map(|h| h.number),
                discarded = discarded.len(),
                added = added.len(),
                "chain reorganized"
            );
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
