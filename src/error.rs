//! # Error Types
//!
//! This module defines the typed error surface of the engine. Every failure
//! class a caller can act on has its own variant: the transaction gate's
//! outcomes (`NotTxProc`, `TxAlreadyStarted`, `TxOccupied`) drive dispatcher
//! behavior and must be matchable, and the storage layer distinguishes a
//! busy file lock from an I/O fault from a malformed block.
//!
//! A missing key is not an error: `get` returns `Option` and `remove` of an
//! absent key succeeds without touching the tree.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonsoonError>;

#[derive(Debug, Error)]
pub enum MonsoonError {
    /// The database file is already locked by another engine instance.
    #[error("database file is locked by another engine instance")]
    LockBusy,

    /// An underlying read, write, sync or rename failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A block's magic or length did not match the expected kind.
    #[error("decode error: expected {expected} block at offset {offset}, found magic {found:#06x}")]
    Decode {
        expected: &'static str,
        found: u16,
        offset: u64,
    },

    /// A block payload was malformed beyond its magic.
    #[error("corrupted block payload: {0}")]
    Corrupted(String),

    /// A mutation arrived from a non-holder while a transaction is in flight.
    #[error("a transaction is in flight and this caller does not hold it")]
    NotTxProc,

    /// The caller already holds the open transaction.
    #[error("this caller already holds the open transaction")]
    TxAlreadyStarted,

    /// Another caller holds the open transaction.
    #[error("another caller holds the open transaction")]
    TxOccupied,

    /// The write queue's recorded position no longer matches the file end.
    #[error("write queue position {queued} does not match file end {actual}")]
    WrongWritePosition { queued: u64, actual: u64 },

    /// An argument failed validation at the API boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine handle was explicitly closed.
    #[error("database is closed")]
    Closed,
}
