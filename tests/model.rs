//! # Model-Based Randomized Tests
//!
//! These tests drive the engine with seeded pseudo-random workloads and
//! compare every observable against `std::collections::BTreeMap` as the
//! reference model. A failure prints the seed, so any divergence is
//! reproducible.
//!
//! Covered interleavings:
//!
//! - puts, overwrites and removes at several tree sizes
//! - bounded and unbounded scans checked against the model's range
//! - explicit vacuums and full close/reopen cycles mid-workload
//! - transactions that randomly commit or cancel, with the model applying
//!   or discarding the same batch

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use monsoon::{CallerId, Database};
use tempfile::tempdir;

const A: CallerId = CallerId(1);

type Model = BTreeMap<Vec<u8>, Vec<u8>>;

fn key(k: u32) -> Vec<u8> {
    k.to_be_bytes().to_vec()
}

fn check_against_model(db: &Database, model: &Model, key_space: u32, seed: u64) {
    for k in 0..key_space {
        assert_eq!(
            db.get(A, &key(k)).unwrap(),
            model.get(&key(k)).cloned(),
            "divergence at key {k} (seed {seed})"
        );
    }

    let scanned: Vec<_> = db.select(None, None).map(|p| p.unwrap()).collect();
    let expected: Vec<_> = model.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    assert_eq!(scanned, expected, "full scan diverged (seed {seed})");

    db.verify().unwrap();
}

#[test]
fn random_churn_matches_the_model() {
    for seed in [7u64, 1234, 998_877] {
        let mut rng = StdRng::seed_from_u64(seed);
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path(), 4, 1_000_000).unwrap();
        let mut model = Model::new();

        let key_space = 200u32;
        for step in 0..1_500 {
            let k = rng.gen_range(0..key_space);
            if rng.gen_bool(0.6) {
                let v = format!("s{step}").into_bytes();
                db.put(A, key(k), v.clone()).unwrap();
                model.insert(key(k), v);
            } else {
                db.remove(A, &key(k)).unwrap();
                model.remove(&key(k));
            }
        }

        check_against_model(&db, &model, key_space, seed);
    }
}

#[test]
fn random_bounded_scans_match_the_model() {
    let seed = 42u64;
    let mut rng = StdRng::seed_from_u64(seed);
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), 4, 1_000_000).unwrap();
    let mut model = Model::new();

    for k in 0..300u32 {
        if rng.gen_bool(0.7) {
            let v = key(k);
            db.put(A, key(k), v.clone()).unwrap();
            model.insert(key(k), v);
        }
    }

    for _ in 0..50 {
        let a = rng.gen_range(0..300u32);
        let b = rng.gen_range(0..300u32);
        let (lower, upper) = (a.min(b), a.max(b));

        let scanned: Vec<_> = db
            .select(Some(key(lower)), Some(key(upper)))
            .map(|p| p.unwrap())
            .collect();
        let expected: Vec<_> = model
            .range(key(lower)..=key(upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        assert_eq!(scanned, expected, "range [{lower}, {upper}] diverged (seed {seed})");
    }
}

#[test]
fn churn_with_vacuum_and_reopen_matches_the_model() {
    let seed = 31_337u64;
    let mut rng = StdRng::seed_from_u64(seed);
    let dir = tempdir().unwrap();
    let mut db = Database::open(dir.path(), 4, 1_000_000).unwrap();
    let mut model = Model::new();

    let key_space = 150u32;
    for step in 0..1_000 {
        let k = rng.gen_range(0..key_space);
        if rng.gen_bool(0.55) {
            let v = format!("s{step}").into_bytes();
            db.put(A, key(k), v.clone()).unwrap();
            model.insert(key(k), v);
        } else {
            db.remove(A, &key(k)).unwrap();
            model.remove(&key(k));
        }

        if step % 230 == 229 {
            db.vacuum().unwrap();
        }
        if step % 410 == 409 {
            drop(db);
            db = Database::open(dir.path(), 4, 1_000_000).unwrap();
        }
    }

    check_against_model(&db, &model, key_space, seed);
}

#[test]
fn random_transactions_commit_or_vanish_atomically() {
    let seed = 777u64;
    let mut rng = StdRng::seed_from_u64(seed);
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), 4, 1_000_000).unwrap();
    let mut model = Model::new();

    let key_space = 100u32;
    for round in 0..60 {
        db.start_transaction(A).unwrap();
        let mut batch = Model::new();
        let mut removed = Vec::new();

        for _ in 0..rng.gen_range(1..20) {
            let k = rng.gen_range(0..key_space);
            if rng.gen_bool(0.7) {
                let v = format!("r{round}").into_bytes();
                db.put(A, key(k), v.clone()).unwrap();
                batch.insert(key(k), v);
                removed.retain(|r| *r != key(k));
            } else {
                db.remove(A, &key(k)).unwrap();
                batch.remove(&key(k));
                removed.push(key(k));
            }
        }

        if rng.gen_bool(0.5) {
            db.end_transaction(A).unwrap();
            for (k, v) in batch {
                model.insert(k, v);
            }
            for k in removed {
                model.remove(&k);
            }
        } else {
            db.cancel_transaction(A).unwrap();
        }

        check_against_model(&db, &model, key_space, seed);
    }
}
