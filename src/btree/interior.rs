//! # B+Tree Interior Node
//!
//! Interior nodes hold `n` separator keys and `n + 1` child block pointers.
//! For child index `i`, every key reachable from child `i` is `<`
//! separator `i`, and every key reachable from child `i + 1` is `>=`
//! separator `i`.
//!
//! ## Fill Bounds
//!
//! Interior bounds are expressed on children: a split of a full interior
//! (holding `capacity` separators after the transient insertion) promotes
//! the middle separator and leaves both halves with at least
//! `capacity / 2` children. An interior underflows below `capacity / 2`
//! children during removal.
//!
//! ## Payload Layout
//!
//! ```text
//! +----------+-----------+--------------------+----------------------+
//! | capacity | sep count | separators         | children             |
//! | (2B BE)  | (varint)  | varint-prefixed    | (count+1) x 8B:      |
//! |          |           | byte strings       | offset BE, length BE |
//! +----------+-----------+--------------------+----------------------+
//! ```

use crate::encoding::{put_bytes, put_varint, take_bytes, take_varint};
use crate::error::{MonsoonError, Result};
use crate::storage::BlockPtr;

use super::leaf::read_capacity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interior {
    capacity: u16,
    separators: Vec<Vec<u8>>,
    children: Vec<BlockPtr>,
}

impl Interior {
    pub fn new(capacity: u16, separators: Vec<Vec<u8>>, children: Vec<BlockPtr>) -> Self {
        debug_assert_eq!(children.len(), separators.len() + 1);
        Self {
            capacity,
            separators,
            children,
        }
    }

    /// The root produced by a split: one separator, two children.
    pub fn new_root(capacity: u16, separator: Vec<u8>, left: BlockPtr, right: BlockPtr) -> Self {
        Self::new(capacity, vec![separator], vec![left, right])
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn separators(&self) -> &[Vec<u8>] {
        &self.separators
    }

    pub fn separator_count(&self) -> usize {
        self.separators.len()
    }

    pub fn children(&self) -> &[BlockPtr] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [BlockPtr] {
        &mut self.children
    }

    pub fn child(&self, index: usize) -> BlockPtr {
        self.children[index]
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn max_separators(&self) -> usize {
        self.capacity as usize - 1
    }

    pub fn min_children(&self) -> usize {
        self.capacity as usize / 2
    }

    pub fn is_overflowed(&self) -> bool {
        self.separators.len() > self.max_separators()
    }

    pub fn is_underflowed(&self) -> bool {
        self.children.len() < self.min_children()
    }

    pub fn can_lend(&self) -> bool {
        self.children.len() > self.min_children()
    }

    /// Index of the child owning `key`: child `i` if `key < separators[i]`,
    /// else the child after the last separator it is `>=`.
    pub fn find_child(&self, key: &[u8]) -> usize {
        self.separators.partition_point(|sep| sep.as_slice() <= key)
    }

    /// New version with the pointer at `index` replaced.
    pub fn with_child_replaced(&self, index: usize, ptr: BlockPtr) -> Interior {
        let mut next = self.clone();
        next.children[index] = ptr;
        next
    }

    /// New version with the separator at `index` replaced (rotation updates
    /// the boundary key between two children).
    pub fn with_separator_replaced(&self, index: usize, separator: Vec<u8>) -> Interior {
        let mut next = self.clone();
        next.separators[index] = separator;
        next
    }

    /// New version reflecting a child split: the child at `index` is
    /// replaced by `left` and `right` with `separator` between them. The
    /// result may transiently overflow; the caller then calls [`split`].
    ///
    /// [`split`]: Interior::split
    pub fn with_split_applied(
        &self,
        index: usize,
        separator: Vec<u8>,
        left: BlockPtr,
        right: BlockPtr,
    ) -> Interior {
        let mut next = self.clone();
        next.separators.insert(index, separator);
        next.children[index] = left;
        next.children.insert(index + 1, right);
        next
    }

    /// New version reflecting a merge of the children at `index` and
    /// `index + 1`: the separator between them disappears and the merged
    /// pointer takes their place.
    pub fn with_children_merged(&self, index: usize, merged: BlockPtr) -> Interior {
        let mut next = self.clone();
        next.separators.remove(index);
        next.children.remove(index + 1);
        next.children[index] = merged;
        next
    }

    /// Splits an overflowed interior. The middle separator moves up, it
    /// does not stay in either half.
    pub fn split(&self) -> (Interior, Vec<u8>, Interior) {
        debug_assert!(self.is_overflowed());
        let mid = self.capacity as usize / 2;

        let left = Self::new(
            self.capacity,
            self.separators[..mid].to_vec(),
            self.children[..=mid].to_vec(),
        );
        let promoted = self.separators[mid].clone();
        let right = Self::new(
            self.capacity,
            self.separators[mid + 1..].to_vec(),
            self.children[mid + 1..].to_vec(),
        );

        (left, promoted, right)
    }

    /// Rotation from the right sibling: the parent separator between the
    /// two nodes descends as the deficient node's new last separator, the
    /// sibling's first child migrates, and the sibling's first separator
    /// ascends to the parent. Returns `(deficient', self', new separator)`.
    pub fn lend_first(&self, deficient: &Interior, parent_separator: Vec<u8>) -> (Interior, Interior, Vec<u8>) {
        let mut lender = self.clone();
        let migrating_child = lender.children.remove(0);
        let ascending = lender.separators.remove(0);

        let mut receiver = deficient.clone();
        receiver.separators.push(parent_separator);
        receiver.children.push(migrating_child);

        (receiver, lender, ascending)
    }

    /// Rotation from the left sibling: mirror of [`lend_first`].
    ///
    /// [`lend_first`]: Interior::lend_first
    pub fn lend_last(&self, deficient: &Interior, parent_separator: Vec<u8>) -> (Interior, Interior, Vec<u8>) {
        let mut lender = self.clone();
        let migrating_child = lender.children.pop().expect("lender checked via can_lend");
        let ascending = lender.separators.pop().expect("lender checked via can_lend");

        let mut receiver = deficient.clone();
        receiver.separators.insert(0, parent_separator);
        receiver.children.insert(0, migrating_child);

        (receiver, lender, ascending)
    }

    /// Merges two adjacent interior siblings, pulling the parent separator
    /// between them down into the merged node.
    pub fn merge(left: &Interior, right: &Interior, parent_separator: Vec<u8>) -> Interior {
        let mut separators = left.separators.clone();
        separators.push(parent_separator);
        separators.extend_from_slice(&right.separators);

        let mut children = left.children.clone();
        children.extend_from_slice(&right.children);

        Self::new(left.capacity, separators, children)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.capacity.to_be_bytes());
        put_varint(&mut buf, self.separators.len() as u64);
        for separator in &self.separators {
            put_bytes(&mut buf, separator);
        }
        for child in &self.children {
            buf.extend_from_slice(&child.offset().to_be_bytes());
            buf.extend_from_slice(&child.length().to_be_bytes());
        }
        buf
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let capacity = read_capacity(payload)?;
        let mut pos = 2;
        let count = take_varint(payload, &mut pos)? as usize;

        let mut separators = Vec::with_capacity(count);
        for _ in 0..count {
            separators.push(take_bytes(payload, &mut pos)?.to_vec());
        }

        let mut children = Vec::with_capacity(count + 1);
        for _ in 0..count + 1 {
            let end = pos + 8;
            if end > payload.len() {
                return Err(MonsoonError::Corrupted(
                    "interior child pointer overruns payload".into(),
                ));
            }
            let offset = u32::from_be_bytes(payload[pos..pos + 4].try_into().expect("length checked"));
            let length = u32::from_be_bytes(payload[pos + 4..end].try_into().expect("length checked"));
            children.push(BlockPtr::new(offset, length));
            pos = end;
        }

        Ok(Self::new(capacity, separators, children))
    }
}
