//! # Transaction Gate
//!
//! The gate owns at most two live tree headers: the committed `current`
//! and the pending `tx`. It routes every read and write to one of them
//! based on the caller token, enforces the single-slot state machine, and
//! keeps the commit generation counter that triggers vacuum.
//!
//! The gate itself performs no I/O; the engine asks it where an operation
//! should land, performs the tree mutation, and reports the outcome back
//! (`set_tx_header` for transactional writes, `publish` for commits).

use tracing::{debug, warn};

use crate::error::{MonsoonError, Result};
use crate::storage::TreeHeader;

use super::CallerId;

/// A committed header plus the commit offset bounding its snapshot; range
/// scans use the offset to keep id-addressed reads inside the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub header: TreeHeader,
    pub frontier: u64,
}

/// Where a write should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteTarget {
    /// No transaction in flight: mutate `current` and commit immediately.
    Committed,
    /// The caller holds the open transaction: mutate its private header.
    Transaction,
}

#[derive(Debug)]
struct TxSlot {
    holder: CallerId,
    header: TreeHeader,
}

#[derive(Debug)]
pub struct TransactionGate {
    current: Snapshot,
    tx: Option<TxSlot>,
    gen: u64,
    gen_limit: u64,
}

impl TransactionGate {
    pub fn new(current: Snapshot, gen_limit: u64) -> Self {
        Self {
            current,
            tx: None,
            gen: 0,
            gen_limit,
        }
    }

    pub fn current(&self) -> Snapshot {
        self.current
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.gen
    }

    pub fn start_transaction(&mut self, caller: CallerId) -> Result<()> {
        match &self.tx {
            Some(slot) if slot.holder == caller => Err(MonsoonError::TxAlreadyStarted),
            Some(_) => Err(MonsoonError::TxOccupied),
            None => {
                debug!(caller = caller.0, "transaction started");
                self.tx = Some(TxSlot {
                    holder: caller,
                    header: self.current.header,
                });
                Ok(())
            }
        }
    }

    /// Takes the pending header for publication. The engine commits it and
    /// calls [`publish`].
    ///
    /// [`publish`]: TransactionGate::publish
    pub fn end_transaction(&mut self, caller: CallerId) -> Result<TreeHeader> {
        match self.tx.take() {
            Some(slot) if slot.holder == caller => {
                debug!(caller = caller.0, "transaction ending, publishing header");
                Ok(slot.header)
            }
            other => {
                self.tx = other;
                Err(MonsoonError::NotTxProc)
            }
        }
    }

    pub fn cancel_transaction(&mut self, caller: CallerId) -> Result<()> {
        match self.tx.take() {
            Some(slot) if slot.holder == caller => {
                debug!(caller = caller.0, "transaction cancelled, header discarded");
                Ok(())
            }
            other => {
                self.tx = other;
                Err(MonsoonError::NotTxProc)
            }
        }
    }

    /// Liveness notification: if `caller` holds the transaction, its
    /// pending header is discarded silently. Returns whether a discard
    /// happened.
    pub fn caller_down(&mut self, caller: CallerId) -> bool {
        match &self.tx {
            Some(slot) if slot.holder == caller => {
                warn!(caller = caller.0, "transaction holder died, discarding pending header");
                self.tx = None;
                true
            }
            _ => false,
        }
    }

    /// Resolves where a write from `caller` lands, or rejects it.
    pub fn write_header(&self, caller: CallerId) -> Result<(TreeHeader, WriteTarget)> {
        match &self.tx {
            Some(slot) if slot.holder == caller => Ok((slot.header, WriteTarget::Transaction)),
            Some(_) => Err(MonsoonError::NotTxProc),
            None => Ok((self.current.header, WriteTarget::Committed)),
        }
    }

    /// The header a read from `caller` dereferences: the pending header
    /// for the holder, the committed one for everyone else.
    pub fn read_header(&self, caller: CallerId) -> TreeHeader {
        match &self.tx {
            Some(slot) if slot.holder == caller => slot.header,
            _ => self.current.header,
        }
    }

    /// Records the outcome of a transactional mutation.
    pub fn set_tx_header(&mut self, header: TreeHeader) {
        if let Some(slot) = &mut self.tx {
            slot.header = header;
        }
    }

    /// Publishes a committed snapshot and advances the generation counter.
    pub fn publish(&mut self, snapshot: Snapshot) {
        self.current = snapshot;
        self.gen += 1;
    }

    /// Installs the post-vacuum snapshot without advancing the generation.
    pub fn install(&mut self, snapshot: Snapshot) {
        self.current = snapshot;
    }

    pub fn vacuum_due(&self) -> bool {
        self.gen > self.gen_limit && self.tx.is_none()
    }

    pub fn reset_generation(&mut self) {
        self.gen = 0;
    }
}
