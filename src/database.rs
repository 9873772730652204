//! # Database Module
//!
//! This module provides the high-level Database API for Monsoon, combining
//! the block log, the copy-on-write tree and the transaction gate into a
//! unified engine handle.
//!
//! ## Operation Routing
//!
//! ```text
//! put/remove/put_metadata ──> gate.write_header(caller)
//!     │                          │ Committed: mutate + commit + fsync,
//!     │                          │            maybe vacuum
//!     │                          │ Transaction: mutate holder's private
//!     │                          │              header, flush only
//! get/get_metadata ─────────> gate.read_header(caller)
//! select ───────────────────> current snapshot, captured at first pull
//! ```
//!
//! The engine state sits behind one mutex: that mutex is the single
//! logical writer the design calls for. Range scans deliberately live
//! outside it — a scan pins the log handle and a committed header on its
//! first pull and then streams without ever touching the engine again, so
//! a suspended scan never holds up the writer.
//!
//! ## Durability
//!
//! A non-transactional mutation returns only after its commit block is
//! fsynced. Transactional mutations are flushed (not committed) as they
//! happen; `end_transaction` writes the commit block that publishes them
//! all atomically. A crash before that commit leaves garbage past the last
//! commit block, which reopening skips.
//!
//! ## Vacuum
//!
//! After a commit pushes the generation counter past `gen_limit` (and
//! whenever `vacuum` is called explicitly), the engine copies the live
//! snapshot into `tmp.monsoon`, renames it over `db.monsoon`, installs the
//! fresh log and resets the counter. Scans opened before the swap keep
//! streaming from the replaced file through their pinned handle.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::btree::{self, LeafIdAllocator, LeafLinks, NodeShape, Scan, ScanSnapshot, Tree, TreeStats};
use crate::config::{DB_FILE_NAME, MIN_CAPACITY, TMP_FILE_NAME};
use crate::encoding::{decode_pairs, encode_pairs};
use crate::error::{MonsoonError, Result};
use crate::mvcc::{CallerId, Snapshot, TransactionGate, WriteTarget};
use crate::storage::{BlockLog, TreeHeader};

/// The engine handle. Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Mutex<Engine>>,
}

struct Engine {
    dir: PathBuf,
    log: Arc<BlockLog>,
    capacity: u16,
    gate: TransactionGate,
    ids: LeafIdAllocator,
    closed: bool,
}

impl Database {
    /// Opens (or creates) the database in `dir`. `capacity` is the tree's
    /// branching factor (even, >= 4) and applies only when the file is
    /// fresh: an existing tree keeps the capacity it was created with.
    /// `gen_limit` is the number of commits between automatic vacuums.
    pub fn open<P: AsRef<Path>>(dir: P, capacity: u16, gen_limit: u64) -> Result<Database> {
        if capacity < MIN_CAPACITY || capacity % 2 != 0 {
            return Err(MonsoonError::InvalidArgument(format!(
                "capacity must be even and >= {MIN_CAPACITY}, got {capacity}"
            )));
        }

        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let log = BlockLog::open(&dir.join(DB_FILE_NAME))?;

        let (snapshot, capacity, next_leaf_id) = match log.latest_commit()? {
            Some((header, frontier)) => {
                let persisted = btree::root_capacity(&log, &header)?;
                if persisted != capacity {
                    warn!(
                        requested = capacity,
                        persisted,
                        "capacity fixed at tree creation, keeping persisted value"
                    );
                }
                let links = LeafLinks::decode(&log.get_leaf_links(header.leaf_links)?)?;
                let next_leaf_id = links.max_id().unwrap_or(0) + 1;
                info!(dir = %dir.display(), capacity = persisted, "database recovered");
                (Snapshot { header, frontier }, persisted, next_leaf_id)
            }
            None => {
                let header = Tree::bootstrap(&log, capacity, 1);
                let frontier = log.commit(&header)?;
                info!(dir = %dir.display(), capacity, "fresh database created");
                (Snapshot { header, frontier }, capacity, 2)
            }
        };

        Ok(Database {
            inner: Arc::new(Mutex::new(Engine {
                dir,
                log: Arc::new(log),
                capacity,
                gate: TransactionGate::new(snapshot, gen_limit),
                ids: LeafIdAllocator::new(next_leaf_id),
                closed: false,
            })),
        })
    }

    /// Durably stores `key = value`. Inside a transaction the write stays
    /// private to the holder until `end_transaction`.
    pub fn put(&self, caller: CallerId, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        let mut guard = self.inner.lock();
        let engine = &mut *guard;
        engine.ensure_open()?;

        let (header, target) = engine.gate.write_header(caller)?;
        let tree = Tree::new(&engine.log, engine.capacity);
        let new_header = tree.insert(&header, key, value, &mut engine.ids)?;
        engine.apply_write(target, new_header)
    }

    /// Removes `key`. Removing an absent key succeeds without altering the
    /// tree.
    pub fn remove(&self, caller: CallerId, key: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock();
        let engine = &mut *guard;
        engine.ensure_open()?;

        let (header, target) = engine.gate.write_header(caller)?;
        let tree = Tree::new(&engine.log, engine.capacity);
        let new_header = tree.remove(&header, key, &mut engine.ids)?;

        if new_header == header {
            // nothing changed, nothing to commit
            return Ok(());
        }
        engine.apply_write(target, new_header)
    }

    pub fn get(&self, caller: CallerId, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let guard = self.inner.lock();
        guard.ensure_open()?;

        let header = guard.gate.read_header(caller);
        Tree::new(&guard.log, guard.capacity).search(&header, key)
    }

    /// Lazy ordered stream over `[lower, upper]` (either bound absent means
    /// open on that side). The snapshot is the committed state at the
    /// moment of the first pull; later commits and vacuums do not affect
    /// an open stream.
    pub fn select(&self, lower: Option<Vec<u8>>, upper: Option<Vec<u8>>) -> Scan {
        let inner = Arc::clone(&self.inner);
        Scan::new(
            Box::new(move || {
                let guard = inner.lock();
                guard.ensure_open()?;
                let snapshot = guard.gate.current();
                Ok(ScanSnapshot {
                    log: Arc::clone(&guard.log),
                    header: snapshot.header,
                    frontier: snapshot.frontier,
                })
            }),
            lower,
            upper,
        )
    }

    /// Replaces the metadata block with `pairs`.
    pub fn put_metadata(&self, caller: CallerId, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let mut guard = self.inner.lock();
        let engine = &mut *guard;
        engine.ensure_open()?;

        let (header, target) = engine.gate.write_header(caller)?;
        let metadata = engine.log.put_metadata(&encode_pairs(pairs));
        engine.apply_write(
            target,
            TreeHeader {
                root: header.root,
                leaf_links: header.leaf_links,
                metadata,
            },
        )
    }

    pub fn get_metadata(&self, caller: CallerId) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let guard = self.inner.lock();
        guard.ensure_open()?;

        let header = guard.gate.read_header(caller);
        decode_pairs(&guard.log.get_metadata(header.metadata)?)
    }

    pub fn start_transaction(&self, caller: CallerId) -> Result<()> {
        let mut guard = self.inner.lock();
        guard.ensure_open()?;
        guard.gate.start_transaction(caller)
    }

    /// Publishes the holder's pending writes as the new committed state.
    pub fn end_transaction(&self, caller: CallerId) -> Result<()> {
        let mut guard = self.inner.lock();
        let engine = &mut *guard;
        engine.ensure_open()?;

        let header = engine.gate.end_transaction(caller)?;
        engine.commit_and_publish(header)
    }

    /// Discards the holder's pending writes. The blocks they produced stay
    /// in the log as garbage until the next vacuum.
    pub fn cancel_transaction(&self, caller: CallerId) -> Result<()> {
        let mut guard = self.inner.lock();
        guard.ensure_open()?;
        guard.gate.cancel_transaction(caller)
    }

    /// Liveness notification from the dispatcher: if `caller` holds the
    /// open transaction it is discarded silently.
    pub fn caller_down(&self, caller: CallerId) {
        let mut guard = self.inner.lock();
        if guard.closed {
            return;
        }
        guard.gate.caller_down(caller);
    }

    /// Rewrites the live snapshot into a fresh log and swaps it in. Fails
    /// with [`MonsoonError::TxOccupied`] while a transaction is in flight.
    pub fn vacuum(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        let engine = &mut *guard;
        engine.ensure_open()?;

        if engine.gate.in_transaction() {
            return Err(MonsoonError::TxOccupied);
        }
        engine.vacuum()
    }

    /// Flushes outstanding work and marks the handle closed; subsequent
    /// operations fail with [`MonsoonError::Closed`]. The file lock is
    /// released when the last clone (and the last open scan) drops.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.inner.lock();
        if guard.closed {
            return Ok(());
        }
        guard.log.flush()?;
        guard.closed = true;
        info!(dir = %guard.dir.display(), "database closed");
        Ok(())
    }

    pub fn path(&self) -> PathBuf {
        self.inner.lock().dir.join(DB_FILE_NAME)
    }

    /// On-disk size of the log, in bytes.
    pub fn file_size(&self) -> Result<u64> {
        let guard = self.inner.lock();
        guard.ensure_open()?;
        guard.log.size()
    }

    /// Decoded picture of the committed tree, for structural assertions.
    pub fn tree_shape(&self) -> Result<NodeShape> {
        let guard = self.inner.lock();
        guard.ensure_open()?;
        btree::verify::shape(&guard.log, &guard.gate.current().header)
    }

    /// Full structural integrity check of the committed tree.
    pub fn verify(&self) -> Result<TreeStats> {
        let guard = self.inner.lock();
        guard.ensure_open()?;
        btree::verify::verify(&guard.log, &guard.gate.current().header)
    }
}

impl Engine {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(MonsoonError::Closed);
        }
        Ok(())
    }

    fn apply_write(&mut self, target: WriteTarget, header: TreeHeader) -> Result<()> {
        match target {
            WriteTarget::Transaction => {
                // keep the queue bounded; durability waits for the commit
                // that end_transaction issues
                self.log.flush()?;
                self.gate.set_tx_header(header);
                Ok(())
            }
            WriteTarget::Committed => self.commit_and_publish(header),
        }
    }

    fn commit_and_publish(&mut self, header: TreeHeader) -> Result<()> {
        let frontier = self.log.commit(&header)?;
        self.gate.publish(Snapshot { header, frontier });
        debug!(gen = self.gate.generation(), frontier, "commit published");

        if self.gate.vacuum_due() {
            self.vacuum()?;
        }
        Ok(())
    }

    fn vacuum(&mut self) -> Result<()> {
        let primary = self.dir.join(DB_FILE_NAME);
        let tmp_path = self.dir.join(TMP_FILE_NAME);
        let old_size = self.log.size()?;

        let tmp = BlockLog::create(&tmp_path)?;
        let (header, frontier) = {
            let tree = Tree::new(&self.log, self.capacity);
            tree.copy_to(&self.gate.current().header, &tmp)?
        };

        let swapped = tmp.swap(&primary)?;
        self.log = Arc::new(swapped);
        self.gate.install(Snapshot { header, frontier });
        self.gate.reset_generation();

        info!(
            old_size,
            new_size = self.log.size()?,
            "vacuum complete, log swapped"
        );
        Ok(())
    }
}
