//! # Storage Module
//!
//! This module provides the persistence layer for Monsoon: a single
//! append-only block log per database, typed block headers, and the
//! advisory file lock that makes the log single-owner.
//!
//! ## Append-Only Discipline
//!
//! Nothing in the file is ever updated in place. Tree mutations append new
//! node blocks; a commit block naming the new snapshot header is the
//! atomic publication point; everything between the last commit and the
//! end of the file is garbage from a crash and is skipped by the backward
//! recovery scan. Space is reclaimed only by vacuum, which rewrites the
//! live subgraph into a fresh log and renames it over the primary path.
//!
//! ## Why No Page Cache
//!
//! Blocks are immutable once written, so readers need no invalidation
//! protocol: a positioned read at a block pointer is always correct for
//! the snapshot that produced the pointer. The only cache kept is the
//! session map from leaf id to its latest written position, serving the
//! range-scan path that addresses leaves by stable id.

mod headers;
mod lock;
mod log;

pub use headers::{
    BlockPtr, CommitHeader, NodeHeader, PayloadHeader, TreeHeader, COMMIT_MAGIC, LEAF_LINKS_MAGIC,
    METADATA_MAGIC, NODE_MAGIC,
};
pub use log::BlockLog;
