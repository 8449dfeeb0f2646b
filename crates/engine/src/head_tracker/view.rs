// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded in-memory view of the canonical chain.
//!
//! Heads are held newest first and always form a single linked chain. The
//! view does no I/O: the tracker walks back from a new head with [`walk`],
//! fetching parents until the branch connects, then asks [`connect`] what
//! the branch means for the view and applies the answer once it has been
//! persisted.
//!
//! [`walk`]: HeadChainView::walk
//! [`connect`]: HeadChainView::connect

use orc_core::{BlockHash, Head};
use std::collections::VecDeque;

/// Depth of a head below the top of the view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmations {
    Known(u64),
    /// Pruned, discarded or never seen
    Unknown,
}

impl Confirmations {
    pub fn at_least(self, depth: u64) -> bool {
        matches!(self, Confirmations::Known(d) if d >= depth)
    }
}

/// Next step while connecting a branch to the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Walk {
    Connected,
    /// The branch's oldest head has an unknown parent worth fetching
    Fetch(BlockHash),
    /// The branch reaches below the view without meeting it
    Disconnected,
}

/// What admitting a branch does to the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainChange {
    Duplicate,
    /// New heads on top; more than one means missed heads were filled in
    Extend { added: Vec<Head> },
    /// Heads above `common` are replaced. `common` is `None` when no shared
    /// ancestor is held, in which case every held head is discarded.
    Reorg { common: Option<Head>, discarded: Vec<Head>, added: Vec<Head> },
}

impl ChainChange {
    pub fn added(&self) -> &[Head] {
        match self {
            ChainChange::Duplicate => &[],
            ChainChange::Extend { added } | ChainChange::Reorg { added, .. } => added,
        }
    }

    pub fn discarded(&self) -> &[Head] {
        match self {
            ChainChange::Reorg { discarded, .. } => discarded,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeadChainView {
    /// Newest first
    heads: VecDeque<Head>,
    max_depth: usize,
}

impl HeadChainView {
    pub fn new(max_depth: usize) -> Self {
        Self { heads: VecDeque::new(), max_depth: max_depth.max(1) }
    }

    /// Rebuild from persisted history (oldest first). Heads that do not link
    /// to their predecessor start a new chain, so only the newest linked
    /// segment is kept.
    pub fn restore(max_depth: usize, history: &[Head]) -> Self {
        let mut view = Self::new(max_depth);
        for head in history {
            match view.top() {
                Some(top) if head.is_child_of(top) => view.heads.push_front(head.clone()),
                Some(top) if top.hash == head.hash => {}
                _ => {
                    view.heads.clear();
                    view.heads.push_front(head.clone());
                }
            }
            view.prune();
        }
        view
    }

    pub fn top(&self) -> Option<&Head> {
        self.heads.front()
    }

    pub fn oldest(&self) -> Option<&Head> {
        self.heads.back()
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Raise the retained depth; it never shrinks
    pub fn ensure_depth(&mut self, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&Head> {
        self.heads.iter().find(|h| &h.hash == hash)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.get(hash).is_some()
    }

    /// Newest first
    pub fn iter(&self) -> impl Iterator<Item = &Head> {
        self.heads.iter()
    }

    pub fn confirmations_of(&self, hash: &BlockHash) -> Confirmations {
        match (self.top(), self.get(hash)) {
            (Some(top), Some(head)) => Confirmations::Known(top.number - head.number),
            _ => Confirmations::Unknown,
        }
    }

    /// Decide how to continue connecting `branch` (oldest first)
    pub fn walk(&self, branch: &[Head]) -> Walk {
        let (Some(first), Some(oldest)) = (branch.first(), self.oldest()) else {
            return Walk::Connected;
        };
        if self.contains(&first.parent_hash) {
            return Walk::Connected;
        }
        if first.number == 0 || first.number <= oldest.number {
            return Walk::Disconnected;
        }
        Walk::Fetch(first.parent_hash.clone())
    }

    /// True when `branch` links head to head and, if its first parent is
    /// held, numbers continue from that parent
    pub fn is_well_formed(&self, branch: &[Head]) -> bool {
        let linked = branch.windows(2).all(|w| w[1].is_child_of(&w[0]));
        let anchored = match branch.first().and_then(|first| self.get(&first.parent_hash).map(|p| (first, p))) {
            Some((first, parent)) => first.is_child_of(parent),
            None => true,
        };
        linked && anchored
    }

    /// Classify a connected or disconnected `branch` (oldest first, linked)
    pub fn connect(&self, branch: Vec<Head>) -> ChainChange {
        let Some(first) = branch.first() else { return ChainChange::Duplicate };
        if branch.iter().all(|h| self.contains(&h.hash)) {
            return ChainChange::Duplicate;
        }
        let Some(common) = self.get(&first.parent_hash) else {
            if self.is_empty() {
                return ChainChange::Extend { added: branch };
            }
            return ChainChange::Reorg {
                common: None,
                discarded: self.heads.iter().cloned().collect(),
                added: branch,
            };
        };
        let discarded: Vec<Head> =
            self.heads.iter().take_while(|h| h.number > common.number).cloned().collect();
        if discarded.is_empty() {
            ChainChange::Extend { added: branch }
        } else {
            ChainChange::Reorg { common: Some(common.clone()), discarded, added: branch }
        }
    }

    pub fn apply(&mut self, change: &ChainChange) {
        match change {
            ChainChange::Duplicate => return,
            ChainChange::Extend { added } => {
                self.push_all(added);
            }
            ChainChange::Reorg { common: None, added, .. } => {
                self.heads.clear();
                self.push_all(added);
            }
            ChainChange::Reorg { common: Some(common), added, .. } => {
                while self.heads.front().is_some_and(|h| h.number > common.number) {
                    self.heads.pop_front();
                }
                self.push_all(added);
            }
        }
        self.prune();
    }

    fn push_all(&mut self, oldest_first: &[Head]) {
        for head in oldest_first {
            self.heads.push_front(head.clone());
        }
    }

    fn prune(&mut self) {
        self.heads.truncate(self.max_depth);
    }
}

#[cfg(test)]
#[path = "view_tests.rs"]
mod tests;
