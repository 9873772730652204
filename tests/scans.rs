//! # Range Scan Tests
//!
//! These tests cover the lazy snapshot semantics of `select`:
//!
//! - inclusive bounds, open bounds on either side, and empty ranges
//! - the snapshot is captured at the first pull, not at construction
//! - an open stream is unaffected by concurrent commits, including
//!   structural ones (splits and merges), and by in-place value updates

use monsoon::{CallerId, Database};
use tempfile::tempdir;

const A: CallerId = CallerId(1);

fn key(k: u32) -> Vec<u8> {
    k.to_be_bytes().to_vec()
}

fn value(k: u32) -> Vec<u8> {
    format!("v{k}").into_bytes()
}

fn open_db(dir: &std::path::Path) -> Database {
    Database::open(dir, 4, 1_000).unwrap()
}

fn collect_keys(scan: monsoon::btree::Scan) -> Vec<u32> {
    scan.map(|pair| {
        let (k, _) = pair.unwrap();
        u32::from_be_bytes(k.as_slice().try_into().unwrap())
    })
    .collect()
}

#[test]
fn bounded_scan_is_inclusive_on_both_ends() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    for k in 0..=10 {
        db.put(A, key(k), value(k)).unwrap();
    }

    let pairs: Vec<_> = db
        .select(Some(key(3)), Some(key(7)))
        .map(|p| p.unwrap())
        .collect();

    let expected: Vec<_> = (3..=7).map(|k| (key(k), value(k))).collect();
    assert_eq!(pairs, expected);
}

#[test]
fn open_lower_bound_starts_at_the_head() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    for k in 5..=15 {
        db.put(A, key(k), value(k)).unwrap();
    }

    assert_eq!(
        collect_keys(db.select(None, Some(key(9)))),
        (5..=9).collect::<Vec<_>>()
    );
}

#[test]
fn open_upper_bound_runs_to_the_tail() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    for k in 5..=15 {
        db.put(A, key(k), value(k)).unwrap();
    }

    assert_eq!(
        collect_keys(db.select(Some(key(12)), None)),
        (12..=15).collect::<Vec<_>>()
    );
}

#[test]
fn fully_open_scan_streams_everything_in_order() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    for k in (0..50).rev() {
        db.put(A, key(k), value(k)).unwrap();
    }

    assert_eq!(collect_keys(db.select(None, None)), (0..50).collect::<Vec<_>>());
}

#[test]
fn scan_over_an_empty_database_yields_nothing() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());

    assert_eq!(collect_keys(db.select(None, None)), Vec::<u32>::new());
    assert_eq!(collect_keys(db.select(Some(key(1)), Some(key(9)))), Vec::<u32>::new());
}

#[test]
fn scan_outside_the_key_range_yields_nothing() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    for k in 10..20 {
        db.put(A, key(k), value(k)).unwrap();
    }

    assert_eq!(collect_keys(db.select(Some(key(50)), Some(key(60)))), Vec::<u32>::new());
    assert_eq!(collect_keys(db.select(Some(key(0)), Some(key(5)))), Vec::<u32>::new());
}

#[test]
fn stream_is_isolated_from_later_commits() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    for k in 0..=10 {
        db.put(A, key(k), value(k)).unwrap();
    }

    let mut scan = db.select(Some(key(3)), Some(key(7)));
    // first pull captures the snapshot
    let first = scan.next().unwrap().unwrap();
    assert_eq!(first, (key(3), value(3)));

    // structural churn after the capture: a split and a merge
    db.put(A, key(11), value(11)).unwrap();
    db.remove(A, b"\x00\x00\x00\x00").unwrap();

    let rest: Vec<_> = scan.map(|p| p.unwrap()).collect();
    let expected: Vec<_> = (4..=7).map(|k| (key(k), value(k))).collect();
    assert_eq!(rest, expected, "open stream must keep yielding the snapshot");
}

#[test]
fn stream_is_isolated_from_value_updates_with_stable_leaf_ids() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    for k in 0..=10 {
        db.put(A, key(k), value(k)).unwrap();
    }

    let mut scan = db.select(None, None);
    let first = scan.next().unwrap().unwrap();
    assert_eq!(first, (key(0), value(0)));

    // in-place updates reuse leaf ids; the id-addressed successor reads
    // must still resolve to the snapshot's versions
    for k in 0..=10 {
        db.put(A, key(k), b"overwritten".to_vec()).unwrap();
    }

    let rest: Vec<_> = scan.map(|p| p.unwrap()).collect();
    let expected: Vec<_> = (1..=10).map(|k| (key(k), value(k))).collect();
    assert_eq!(rest, expected);
}

#[test]
fn snapshot_is_captured_at_first_pull_not_at_select() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    db.put(A, key(1), value(1)).unwrap();

    let scan = db.select(None, None);
    // committed after select() but before the first pull: visible
    db.put(A, key(2), value(2)).unwrap();

    assert_eq!(collect_keys(scan), vec![1, 2]);
}

#[test]
fn scans_never_observe_uncommitted_transactions() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    db.put(A, key(1), value(1)).unwrap();

    db.start_transaction(A).unwrap();
    db.put(A, key(2), value(2)).unwrap();

    // range scans read the committed header, holder or not
    assert_eq!(collect_keys(db.select(None, None)), vec![1]);

    db.end_transaction(A).unwrap();
    assert_eq!(collect_keys(db.select(None, None)), vec![1, 2]);
}

#[test]
fn interleaved_streams_hold_distinct_snapshots() {
    let dir = tempdir().unwrap();
    let db = open_db(dir.path());
    for k in 0..5 {
        db.put(A, key(k), value(k)).unwrap();
    }

    let mut early = db.select(None, None);
    assert_eq!(early.next().unwrap().unwrap(), (key(0), value(0)));

    for k in 5..10 {
        db.put(A, key(k), value(k)).unwrap();
    }

    let late = db.select(None, None);
    assert_eq!(collect_keys(late), (0..10).collect::<Vec<_>>());

    assert_eq!(collect_keys(early), (1..5).collect::<Vec<_>>());
}
