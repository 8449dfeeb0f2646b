// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use orc_core::test_support::head;
use std::io::Write;
use tempfile::tempdir;

fn head_event(n: u64) -> Event {
    Event::HeadObserved { head: head(n) }
}

fn append_garbage(path: &Path, bytes: &[u8]) {
    let mut f = OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(bytes).unwrap();
}

#[test]
fn open_creates_file_and_parents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wal").join("events.wal");
    let wal = Wal::open(&path, 0).unwrap();
    assert!(path.exists());
    assert_eq!(wal.write_seq(), 0);
    assert_eq!(wal.processed_seq(), 0);
}

#[test]
fn appended_entries_are_invisible_until_flushed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let mut wal = Wal::open(&path, 0).unwrap();

    assert_eq!(wal.append(&head_event(1)).unwrap(), 1);
    assert_eq!(wal.append(&head_event(2)).unwrap(), 2);
    assert!(wal.entries_after(0).unwrap().is_empty());

    wal.flush().unwrap();
    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(entries[1].event, head_event(2));
}

#[test]
fn discard_unflushed_rewinds_sequence() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&head_event(1)).unwrap();
    wal.flush().unwrap();
    wal.append(&head_event(2)).unwrap();
    wal.discard_unflushed();
    assert_eq!(wal.write_seq(), 1);
    assert_eq!(wal.append(&head_event(3)).unwrap(), 2);
}

#[test]
fn reopen_continues_sequence_and_filters_processed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    {
        let mut wal = Wal::open(&path, 0).unwrap();
        for n in 1..=3 {
            wal.append(&head_event(n)).unwrap();
        }
        wal.flush().unwrap();
    }

    let mut wal = Wal::open(&path, 2).unwrap();
    assert_eq!(wal.write_seq(), 3);
    let replay = wal.entries_after(wal.processed_seq()).unwrap();
    assert_eq!(replay.len(), 1);
    assert_eq!(replay[0].event, head_event(3));
    assert_eq!(wal.append(&head_event(4)).unwrap(), 4);
}

#[test]
fn truncate_before_keeps_tail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let mut wal = Wal::open(&path, 0).unwrap();
    for n in 1..=3 {
        wal.append(&head_event(n)).unwrap();
    }
    wal.flush().unwrap();

    wal.truncate_before(2).unwrap();
    let seqs: Vec<_> = wal.entries_after(0).unwrap().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![2, 3]);

    // Appends after truncation land in the rewritten file
    wal.append(&head_event(4)).unwrap();
    wal.flush().unwrap();
    assert_eq!(wal.entries_after(3).unwrap().len(), 1);
}

#[test]
fn torn_tail_is_cut_and_backed_up() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    {
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&head_event(1)).unwrap();
        wal.append(&head_event(2)).unwrap();
        wal.flush().unwrap();
    }
    append_garbage(&path, b"{\"seq\":3,\"event\":{\"type\":\"head:obs");

    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 2);
    assert!(path.with_extension("bak").exists());
    assert_eq!(wal.entries_after(0).unwrap().len(), 2);
}

#[test]
fn binary_garbage_yields_empty_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    std::fs::write(&path, b"\x80\x81\xff\xfe\n").unwrap();
    let wal = Wal::open(&path, 0).unwrap();
    assert_eq!(wal.write_seq(), 0);
    assert!(path.with_extension("bak").exists());
}

#[test]
fn entries_after_stops_at_corruption_written_after_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&head_event(1)).unwrap();
    wal.flush().unwrap();
    append_garbage(&path, b"not-json\n");
    assert_eq!(wal.entries_after(0).unwrap().len(), 1);
}

#[test]
fn torn_batch_is_cut_back_to_the_last_durable_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let mut wal = Wal::open(&path, 0).unwrap();
    wal.append(&head_event(1)).unwrap();
    wal.flush().unwrap();
    let durable = std::fs::metadata(&path).unwrap().len();

    wal.fail_next_write(15);
    wal.append(&head_event(2)).unwrap();
    wal.append(&head_event(3)).unwrap();
    assert!(matches!(wal.flush(), Err(WalError::Io(_))));
    assert_eq!(std::fs::metadata(&path).unwrap().len(), durable);

    wal.discard_unflushed();
    assert_eq!(wal.append(&head_event(4)).unwrap(), 2);
    wal.flush().unwrap();
    drop(wal);

    let wal = Wal::open(&path, 0).unwrap();
    let entries = wal.entries_after(0).unwrap();
    assert_eq!(entries.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(entries[1].event, head_event(4));
    assert!(!path.with_extension("bak").exists());
}

#[test]
fn failed_batch_stays_buffered_until_discarded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.wal");
    let mut wal = Wal::open(&path, 0).unwrap();
    wal.fail_next_write(0);
    wal.append(&head_event(1)).unwrap();
    assert!(wal.flush().is_err());
    assert!(wal.entries_after(0).unwrap().is_empty());

    wal.flush().unwrap();
    assert_eq!(wal.entries_after(0).unwrap().len(), 1);
}
