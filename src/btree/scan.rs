//! # Snapshot Range Scans
//!
//! A [`Scan`] is a lazily produced, finite stream of `(key, value)` pairs
//! in ascending key order. Nothing is captured at construction; when the
//! stream is first pulled it requests the then-current tree header from the
//! transaction gate through a one-shot provider callback, pins the log
//! handle and the snapshot frontier, and from there runs entirely against
//! immutable state:
//!
//! ```text
//! first next():  provider() -> (Arc<BlockLog>, header, frontier)
//!                read leaf links from the header
//!                start leaf: pointer descent to the lower bound,
//!                            or the links head when unbounded
//! every next():  drain the buffered leaf, then follow the `next` id
//!                via get_node_by_id(id, before = frontier)
//! ```
//!
//! The frontier bound is what keeps id-addressed reads inside the
//! snapshot: a leaf rewritten after the scan began lives at a higher
//! offset and is never returned. Later commits, and vacuum itself, do not
//! disturb an open scan — the pinned `Arc` keeps the pre-vacuum file alive
//! until the scan drops.
//!
//! Abandoning the iterator is the only cancellation; a scan holds no locks
//! and may be suspended indefinitely at a leaf boundary.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::Result;
use crate::storage::{BlockLog, TreeHeader};
use crate::LeafId;

use super::leaf::Leaf;
use super::links::LeafLinks;
use super::descend_to_leaf;

/// What the gate hands a scan on its first pull: the committed header, the
/// log it lives in, and the commit offset bounding the snapshot.
pub struct ScanSnapshot {
    pub log: Arc<BlockLog>,
    pub header: TreeHeader,
    pub frontier: u64,
}

pub type SnapshotProvider = Box<dyn FnOnce() -> Result<ScanSnapshot> + Send>;

enum State {
    Pending(SnapshotProvider),
    Active(Active),
    Done,
}

struct Active {
    log: Arc<BlockLog>,
    links: LeafLinks,
    frontier: u64,
    current_leaf: Option<LeafId>,
    buffer: VecDeque<(Vec<u8>, Vec<u8>)>,
}

pub struct Scan {
    lower: Option<Vec<u8>>,
    upper: Option<Vec<u8>>,
    state: State,
}

impl Scan {
    pub fn new(provider: SnapshotProvider, lower: Option<Vec<u8>>, upper: Option<Vec<u8>>) -> Self {
        Self {
            lower,
            upper,
            state: State::Pending(provider),
        }
    }

    fn activate(&mut self, provider: SnapshotProvider) -> Result<Active> {
        let snapshot = provider()?;
        let links = LeafLinks::decode(&snapshot.log.get_leaf_links(snapshot.header.leaf_links)?)?;

        let start = match &self.lower {
            Some(lower) => descend_to_leaf(&snapshot.log, snapshot.header.root, lower)?,
            None => {
                let head = links.head()?;
                let (_, payload) = snapshot.log.get_node_by_id(head, snapshot.frontier)?;
                Leaf::decode(head, &payload)?
            }
        };

        let buffer = self.in_range_entries(&start);
        Ok(Active {
            log: snapshot.log,
            links,
            frontier: snapshot.frontier,
            current_leaf: Some(start.id()),
            buffer,
        })
    }

    fn in_range_entries(&self, leaf: &Leaf) -> VecDeque<(Vec<u8>, Vec<u8>)> {
        leaf.entries()
            .iter()
            .filter(|(key, _)| match &self.lower {
                Some(lower) => key >= lower,
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Loads the successor leaf into the buffer; `Ok(false)` means the
    /// chain is exhausted.
    fn advance(&mut self) -> Result<bool> {
        let State::Active(active) = &mut self.state else {
            return Ok(false);
        };

        let Some(current) = active.current_leaf else {
            return Ok(false);
        };
        let Some(next) = active.links.next(current) else {
            active.current_leaf = None;
            return Ok(false);
        };

        let (_, payload) = active.log.get_node_by_id(next, active.frontier)?;
        let leaf = Leaf::decode(next, &payload)?;
        active.buffer = leaf.entries().iter().cloned().collect();
        active.current_leaf = Some(next);
        Ok(true)
    }

    fn past_upper(&self, key: &[u8]) -> bool {
        match &self.upper {
            Some(upper) => key > upper.as_slice(),
            None => false,
        }
    }
}

impl Iterator for Scan {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,
                State::Pending(provider) => match self.activate(provider) {
                    Ok(active) => self.state = State::Active(active),
                    Err(err) => return Some(Err(err)),
                },
                State::Active(mut active) => {
                    if let Some(pair) = active.buffer.pop_front() {
                        if self.past_upper(&pair.0) {
                            return None;
                        }
                        self.state = State::Active(active);
                        return Some(Ok(pair));
                    }

                    self.state = State::Active(active);
                    match self.advance() {
                        Ok(true) => {}
                        Ok(false) => {
                            self.state = State::Done;
                            return None;
                        }
                        Err(err) => return Some(Err(err)),
                    }
                }
            }
        }
    }
}
