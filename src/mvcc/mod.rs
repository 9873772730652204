//! # Single-Writer MVCC
//!
//! This module implements Monsoon's concurrency regime: one logical writer
//! serialises every mutating operation, while readers dereference immutable
//! snapshots and never block. The design leans on the storage layer's
//! copy-on-write discipline — because nodes and links blocks are immutable
//! once written, a reader holding a pre-mutation header observes the
//! pre-mutation snapshot with no coordination at all.
//!
//! ## Transaction Model
//!
//! Transactions are process-scoped and single-slot: at most one is in
//! flight, tied to an opaque caller token supplied by the dispatcher.
//! The holder's writes accumulate on a private header and become visible
//! to everyone else only when `end_transaction` commits it; `cancel`
//! discards the private header, and a liveness notification that the
//! holder died does the same silently.
//!
//! ```text
//!            start_transaction(c)
//!   Idle ───────────────────────────> InTx(c)
//!    ^                                   │ end_transaction(c): publish + commit
//!    │                                   │ cancel_transaction(c): discard
//!    └───────────────────────────────────┘ caller_down(c): discard silently
//! ```
//!
//! ## Generation Accounting
//!
//! Every successful commit increments the generation counter; once it
//! exceeds the configured limit and no transaction is in flight, the
//! engine vacuums and resets the counter.

pub mod gate;

pub use gate::{Snapshot, TransactionGate, WriteTarget};

/// Opaque caller identity supplied by the dispatcher with every gated
/// operation. The engine compares tokens, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallerId(pub u64);
