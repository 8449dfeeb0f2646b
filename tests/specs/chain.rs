// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Head tracking: reorg detection and store outages

use crate::prelude::*;
use similar_asserts::assert_eq;
use test_support::{chain, fork, head};
use tokio::sync::mpsc;

#[tokio::test]
async fn competing_branch_reports_common_ancestor_and_discarded_heads() {
    let fake = FakeChain::with_height(3);
    let store = Store::in_memory();
    let (tx, mut events) = mpsc::channel(64);
    let tracker = HeadTracker::new(fake.clone(), store.clone(), TrackerConfig::default(), tx);
    for h in chain(0, 3) {
        tracker.on_new_head(h).await.unwrap();
    }
    while events.try_recv().is_ok() {}

    // H2' and H3' where H2' descends from H1
    let branch = fork(2, 3, 1);
    for h in &branch {
        fake.announce(h.clone());
    }
    tracker.on_new_head(branch[1].clone()).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            HeadEvent::Reorg {
                common: Some(head(1)),
                discarded: vec![head(3).hash, head(2).hash],
                added: vec![branch[0].hash.clone(), branch[1].hash.clone()],
            },
            HeadEvent::NewHead(branch[0].clone()),
            HeadEvent::NewHead(branch[1].clone()),
        ]
    );

    let held: Vec<_> = tracker.handle().heads().into_iter().map(|h| h.hash).collect();
    assert!(!held.contains(&head(2).hash));
    assert_eq!(tracker.handle().top(), Some(branch[1].clone()));
    let persisted: Vec<_> = store.recent_heads().into_iter().map(|h| h.hash).collect();
    assert!(!persisted.contains(&head(3).hash));
}

#[tokio::test]
async fn unavailable_store_freezes_the_head_view() {
    let h = Harness::new(registry());
    h.start().await;
    let before = h.node.head().unwrap();

    h.node.store().set_available(false);
    h.chain.mine();
    h.chain.mine();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.node.head(), Some(before.clone()));

    // Once the store is back the next head fills the gap
    h.node.store().set_available(true);
    let tip = h.mine().await;
    assert_eq!(tip.number, before.number + 3);
    let numbers: Vec<_> = h.node.store().recent_heads().iter().map(|h| h.number).collect();
    assert!(numbers.ends_with(&[before.number + 1, before.number + 2, before.number + 3]));
    h.node.shutdown().await.unwrap();
}
