//! # B+Tree Leaf Node
//!
//! This module implements leaf nodes for Monsoon's copy-on-write B+tree.
//! Leaf nodes hold the actual key-value pairs, sorted by key ascending, and
//! are linked to their siblings through the leaf-links block.
//!
//! ## Copy-on-Write Discipline
//!
//! A leaf is never modified in place. Every mutating method returns a new
//! `Leaf` value; the caller writes it to the log and propagates the new
//! block pointer up the root path. Content-only changes (value replacement,
//! insertion without split, removal without merge, rotation with a sibling)
//! keep the stable leaf id, so the leaf-links block need not be rewritten.
//! Splits and merges mint fresh ids and force a links rewrite.
//!
//! ## Fill Bounds
//!
//! With branching factor `capacity` (even, >= 4):
//!
//! ```text
//! max keys       capacity - 1     (a full leaf splits on the next insert)
//! min keys       capacity / 2     (below this a non-root leaf rebalances)
//! ```
//!
//! A split distributes the `capacity`-entry overflow sequence at
//! `capacity / 2`: the left leaf keeps the first half, the right leaf the
//! rest, and the right leaf's first key becomes the separator promoted to
//! the parent.
//!
//! ## Payload Layout
//!
//! ```text
//! +----------+---------------+----------------------------------+
//! | capacity | entry count   | (key, value) byte-string pairs   |
//! | (2B BE)  | (varint)      | each varint-length-prefixed      |
//! +----------+---------------+----------------------------------+
//! ```

use crate::encoding::{put_bytes, put_varint, take_bytes, take_varint};
use crate::error::{MonsoonError, Result};
use crate::LeafId;

/// Outcome of a key lookup inside a node: the position of the key, or the
/// position where it would be inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchResult {
    Found(usize),
    NotFound(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    id: LeafId,
    capacity: u16,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl Leaf {
    pub fn new(id: LeafId, capacity: u16) -> Self {
        Self {
            id,
            capacity,
            entries: Vec::new(),
        }
    }

    pub fn with_entries(id: LeafId, capacity: u16, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
        Self {
            id,
            capacity,
            entries,
        }
    }

    pub fn id(&self) -> LeafId {
        self.id
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.entries
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        &self.entries[index].0
    }

    pub fn value_at(&self, index: usize) -> &[u8] {
        &self.entries[index].1
    }

    pub fn max_keys(&self) -> usize {
        self.capacity as usize - 1
    }

    pub fn min_keys(&self) -> usize {
        self.capacity as usize / 2
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_keys()
    }

    pub fn is_underflowed(&self) -> bool {
        self.entries.len() < self.min_keys()
    }

    /// Whether this leaf can give an entry to a deficient sibling without
    /// underflowing itself.
    pub fn can_lend(&self) -> bool {
        self.entries.len() > self.min_keys()
    }

    pub fn find_key(&self, key: &[u8]) -> SearchResult {
        match self
            .entries
            .binary_search_by(|(k, _)| k.as_slice().cmp(key))
        {
            Ok(index) => SearchResult::Found(index),
            Err(index) => SearchResult::NotFound(index),
        }
    }

    /// New version with the value at `index` replaced. Same id: a content
    /// change does not disturb the link chain.
    pub fn replace_value(&self, index: usize, value: Vec<u8>) -> Leaf {
        let mut entries = self.entries.clone();
        entries[index].1 = value;
        Self::with_entries(self.id, self.capacity, entries)
    }

    /// New version with `(key, value)` inserted at `index`. Same id.
    pub fn insert_at(&self, index: usize, key: Vec<u8>, value: Vec<u8>) -> Leaf {
        let mut entries = self.entries.clone();
        entries.insert(index, (key, value));
        Self::with_entries(self.id, self.capacity, entries)
    }

    /// New version with the entry at `index` removed. Same id.
    pub fn remove_at(&self, index: usize) -> Leaf {
        let mut entries = self.entries.clone();
        entries.remove(index);
        Self::with_entries(self.id, self.capacity, entries)
    }

    /// Splits this full leaf with `(key, value)` inserted at `index` into
    /// two freshly-identified leaves. The left leaf keeps
    /// `capacity / 2` entries; the right leaf's first key is the separator
    /// the caller promotes into the parent.
    pub fn split_with(
        &self,
        index: usize,
        key: Vec<u8>,
        value: Vec<u8>,
        left_id: LeafId,
        right_id: LeafId,
    ) -> (Leaf, Leaf) {
        let mut combined = self.entries.clone();
        combined.insert(index, (key, value));

        let mid = self.capacity as usize / 2;
        let right_entries = combined.split_off(mid);

        (
            Self::with_entries(left_id, self.capacity, combined),
            Self::with_entries(right_id, self.capacity, right_entries),
        )
    }

    /// Moves this leaf's first entry to the back of `deficient` (rotation
    /// from the right sibling). Both keep their ids. Returns
    /// `(deficient', self', new separator)` where the separator is the new
    /// first key of the lender.
    pub fn lend_first(&self, deficient: &Leaf) -> (Leaf, Leaf, Vec<u8>) {
        let mut lender = self.entries.clone();
        let entry = lender.remove(0);
        let mut receiver = deficient.entries.clone();
        receiver.push(entry);

        let separator = lender[0].0.clone();
        (
            Self::with_entries(deficient.id, deficient.capacity, receiver),
            Self::with_entries(self.id, self.capacity, lender),
            separator,
        )
    }

    /// Moves this leaf's last entry to the front of `deficient` (rotation
    /// from the left sibling). The moved key is the new separator.
    pub fn lend_last(&self, deficient: &Leaf) -> (Leaf, Leaf, Vec<u8>) {
        let mut lender = self.entries.clone();
        let entry = lender.pop().expect("lender checked non-empty via can_lend");
        let separator = entry.0.clone();

        let mut receiver = deficient.entries.clone();
        receiver.insert(0, entry);

        (
            Self::with_entries(deficient.id, deficient.capacity, receiver),
            Self::with_entries(self.id, self.capacity, lender),
            separator,
        )
    }

    /// Concatenates two adjacent siblings into one freshly-identified leaf.
    pub fn merge(left: &Leaf, right: &Leaf, merged_id: LeafId) -> Leaf {
        let mut entries = left.entries.clone();
        entries.extend_from_slice(&right.entries);
        Self::with_entries(merged_id, left.capacity, entries)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.capacity.to_be_bytes());
        put_varint(&mut buf, self.entries.len() as u64);
        for (key, value) in &self.entries {
            put_bytes(&mut buf, key);
            put_bytes(&mut buf, value);
        }
        buf
    }

    pub fn decode(id: LeafId, payload: &[u8]) -> Result<Self> {
        let capacity = read_capacity(payload)?;
        let mut pos = 2;
        let count = take_varint(payload, &mut pos)? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let key = take_bytes(payload, &mut pos)?.to_vec();
            let value = take_bytes(payload, &mut pos)?.to_vec();
            entries.push((key, value));
        }
        Ok(Self::with_entries(id, capacity, entries))
    }
}

/// Reads the capacity prefix shared by leaf and interior payloads.
pub(crate) fn read_capacity(payload: &[u8]) -> Result<u16> {
    if payload.len() < 2 {
        return Err(MonsoonError::Corrupted(
            "node payload shorter than its capacity prefix".into(),
        ));
    }
    Ok(u16::from_be_bytes([payload[0], payload[1]]))
}
