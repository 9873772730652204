//! # Monsoon - Embedded Ordered Key-Value Store
//!
//! Monsoon is an embedded, single-file, ordered key-value store. It provides
//! durable `put`/`remove`/`get`/range-scan over an ordered map, process-scoped
//! transactions whose effects are published atomically on commit, and periodic
//! compaction that reclaims space consumed by the append-only log.
//!
//! ## Quick Start
//!
//! ```ignore
//! use monsoon::{CallerId, Database};
//!
//! let db = Database::open("./mydb", 32, 1000)?;
//! let caller = CallerId(1);
//!
//! db.put(caller, b"greeting".to_vec(), b"hello".to_vec())?;
//! assert_eq!(db.get(caller, b"greeting")?, Some(b"hello".to_vec()));
//!
//! for pair in db.select(None, None) {
//!     let (key, value) = pair?;
//!     println!("{:?} = {:?}", key, value);
//! }
//! ```
//!
//! ## Architecture
//!
//! Monsoon uses a layered architecture over a single append-only file:
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Public API (Database)         │
//! ├─────────────────────────────────────┤
//! │  Transaction Gate (single writer)    │
//! ├─────────────────────────────────────┤
//! │   Copy-on-Write B+Tree │ Range Scan  │
//! ├─────────────────────────────────────┤
//! │     Node Codec (varint payloads)     │
//! ├─────────────────────────────────────┤
//! │  Block Log (append, commit, vacuum)  │
//! └─────────────────────────────────────┘
//! ```
//!
//! Every mutation is a pure functional update: a changed node is written as a
//! new block at the end of the log and its new position replaces the old one
//! in the rewritten parent, up to the root. A commit block naming the new
//! root is the atomic publication point. Readers traverse the immutable block
//! graph from a captured header and never take locks.
//!
//! ## File Layout
//!
//! ```text
//! database_dir/
//! ├── db.monsoon       # The block log (the entire database)
//! └── tmp.monsoon      # Vacuum target, renamed over db.monsoon on completion
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: append-only block log, typed block headers, file lock
//! - [`btree`]: copy-on-write B+tree, leaf links, range scans, copy kernel
//! - [`mvcc`]: transaction gate and generation accounting
//! - [`encoding`]: varint primitives and payload helpers
//! - [`database`]: the public engine handle

#[macro_use]
mod macros;

pub mod btree;
pub mod config;
pub mod database;
pub mod encoding;
pub mod error;
pub mod mvcc;
pub mod storage;

/// Stable identifier of a logical leaf, preserved across copy-on-write
/// versions of the same leaf. Interior node blocks carry id `0`.
pub type LeafId = u64;

pub use database::Database;
pub use error::{MonsoonError, Result};
pub use mvcc::CallerId;
pub use storage::{BlockPtr, TreeHeader};
