//! # Leaf Links
//!
//! The leaf-links block maps every leaf id to its `(prev, next)` neighbors,
//! forming a doubly-linked list over all leaves in ascending key order. The
//! range-scan path walks this chain by stable leaf id instead of block
//! pointers, which is what lets a leaf's content change (same id, new
//! block) without invalidating the chain.
//!
//! The whole mapping is stored as a single block and rewritten on every
//! structural leaf change (split or merge). Content-only leaf rewrites
//! reuse the id and leave this block untouched.
//!
//! Splice operations are idempotent: re-applying a splice whose old ids are
//! already gone is a no-op, and both ends are handled (the head has no
//! `prev`, the tail has no `next`).
//!
//! ## Payload Layout
//!
//! Entries are encoded in ascending id order for determinism:
//!
//! ```text
//! +-----------+--------------------------------------------------+
//! | count     | per entry: id (8B BE) | flags (1B) |             |
//! | (varint)  |   prev (8B BE, if bit 0) | next (8B BE, if bit 1)|
//! +-----------+--------------------------------------------------+
//! ```

use hashbrown::HashMap;

use crate::encoding::{put_varint, take_varint};
use crate::error::{MonsoonError, Result};
use crate::LeafId;

const HAS_PREV: u8 = 0b01;
const HAS_NEXT: u8 = 0b10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub prev: Option<LeafId>,
    pub next: Option<LeafId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafLinks {
    map: HashMap<LeafId, Neighbors>,
}

impl LeafLinks {
    /// The chain of a single-leaf tree: one entry with no neighbors.
    pub fn single(id: LeafId) -> Self {
        let mut map = HashMap::new();
        map.insert(id, Neighbors::default());
        Self { map }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, id: LeafId) -> bool {
        self.map.contains_key(&id)
    }

    pub fn neighbors(&self, id: LeafId) -> Option<Neighbors> {
        self.map.get(&id).copied()
    }

    pub fn next(&self, id: LeafId) -> Option<LeafId> {
        self.map.get(&id).and_then(|n| n.next)
    }

    pub fn prev(&self, id: LeafId) -> Option<LeafId> {
        self.map.get(&id).and_then(|n| n.prev)
    }

    /// The head leaf: the one with no predecessor.
    pub fn head(&self) -> Result<LeafId> {
        self.map
            .iter()
            .find(|(_, n)| n.prev.is_none())
            .map(|(&id, _)| id)
            .ok_or_else(|| MonsoonError::Corrupted("leaf-links chain has no head".into()))
    }

    /// Largest id in the chain; the id allocator resumes past it at open.
    pub fn max_id(&self) -> Option<LeafId> {
        self.map.keys().copied().max()
    }

    /// Splices `left` and `right` into the chain in place of `old` after a
    /// leaf split. No-op if `old` is already gone.
    pub fn split(&mut self, old: LeafId, left: LeafId, right: LeafId) {
        let Some(old_neighbors) = self.map.remove(&old) else {
            return;
        };

        if let Some(prev) = old_neighbors.prev {
            if let Some(entry) = self.map.get_mut(&prev) {
                entry.next = Some(left);
            }
        }
        if let Some(next) = old_neighbors.next {
            if let Some(entry) = self.map.get_mut(&next) {
                entry.prev = Some(right);
            }
        }

        self.map.insert(
            left,
            Neighbors {
                prev: old_neighbors.prev,
                next: Some(right),
            },
        );
        self.map.insert(
            right,
            Neighbors {
                prev: Some(left),
                next: old_neighbors.next,
            },
        );
    }

    /// Splices `merged` into the chain in place of the adjacent pair
    /// `(left, right)` after a leaf merge. No-op unless both are present.
    pub fn merge(&mut self, left: LeafId, right: LeafId, merged: LeafId) {
        if !self.map.contains_key(&left) || !self.map.contains_key(&right) {
            return;
        }
        let left_neighbors = self.map.remove(&left).expect("presence checked above");
        let right_neighbors = self.map.remove(&right).expect("presence checked above");

        if let Some(prev) = left_neighbors.prev {
            if let Some(entry) = self.map.get_mut(&prev) {
                entry.next = Some(merged);
            }
        }
        if let Some(next) = right_neighbors.next {
            if let Some(entry) = self.map.get_mut(&next) {
                entry.prev = Some(merged);
            }
        }

        self.map.insert(
            merged,
            Neighbors {
                prev: left_neighbors.prev,
                next: right_neighbors.next,
            },
        );
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut ids: Vec<LeafId> = self.map.keys().copied().collect();
        ids.sort_unstable();

        let mut buf = Vec::new();
        put_varint(&mut buf, ids.len() as u64);
        for id in ids {
            let neighbors = self.map[&id];
            buf.extend_from_slice(&id.to_be_bytes());

            let mut flags = 0u8;
            if neighbors.prev.is_some() {
                flags |= HAS_PREV;
            }
            if neighbors.next.is_some() {
                flags |= HAS_NEXT;
            }
            buf.push(flags);

            if let Some(prev) = neighbors.prev {
                buf.extend_from_slice(&prev.to_be_bytes());
            }
            if let Some(next) = neighbors.next {
                buf.extend_from_slice(&next.to_be_bytes());
            }
        }
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut pos = 0;
        let count = take_varint(payload, &mut pos)? as usize;
        let mut map = HashMap::with_capacity(count);

        for _ in 0..count {
            let id = take_u64(payload, &mut pos)?;
            let flags = *payload
                .get(pos)
                .ok_or_else(|| MonsoonError::Corrupted("leaf-links entry truncated".into()))?;
            pos += 1;

            let prev = if flags & HAS_PREV != 0 {
                Some(take_u64(payload, &mut pos)?)
            } else {
                None
            };
            let next = if flags & HAS_NEXT != 0 {
                Some(take_u64(payload, &mut pos)?)
            } else {
                None
            };

            map.insert(id, Neighbors { prev, next });
        }

        Ok(Self { map })
    }
}

fn take_u64(payload: &[u8], pos: &mut usize) -> Result<u64> {
    let end = *pos + 8;
    let bytes = payload
        .get(*pos..end)
        .ok_or_else(|| MonsoonError::Corrupted("leaf-links id field truncated".into()))?;
    *pos = end;
    Ok(u64::from_be_bytes(bytes.try_into().expect("length checked")))
}
