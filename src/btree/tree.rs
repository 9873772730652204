//! # Copy-on-Write B+Tree Engine
//!
//! This module implements the mutation and traversal engine over the block
//! log. All mutation is copy-on-write: a mutated node is never modified in
//! place; a new node with the updated content is appended to the log and
//! its new block pointer replaces the old pointer in its parent, which is
//! itself rewritten up to the root. The result of every mutation is a new
//! [`TreeHeader`] naming the new root; nothing is visible to readers until
//! the caller commits that header.
//!
//! ## Insert Algorithm
//!
//! ```text
//! 1. Descend from the root, recording (interior, child index) on a path
//!    stack
//! 2. At the leaf:
//!    - key present: replace the value in a new leaf with the same id
//!    - key absent, leaf not full: insert at the ordered position, same id
//!    - leaf full: split the overflow sequence at capacity/2 into two
//!      freshly-identified leaves; the right leaf's first key is the
//!      separator; splice the pair into the leaf links
//! 3. Unwind the path, rewriting each parent with the new child pointer;
//!    a split that overflows a parent splits it too (middle key moves up);
//!    a split that reaches past the root allocates a new root
//! ```
//!
//! ## Remove Algorithm
//!
//! ```text
//! 1. Descend, recording the path
//! 2. Key absent: the operation is a no-op and returns the old header
//! 3. Remove the pair; if the leaf holds >= capacity/2 keys, unwind with
//!    plain pointer replacement
//! 4. Underflowed non-root node: rebalance with a sibling, preferring the
//!    right one when it exists:
//!    - sibling above minimum: rotate one entry across, update the parent
//!      separator to the new boundary (ids stable, links untouched)
//!    - otherwise: merge the pair into one freshly-identified node,
//!      dropping one child pointer from the parent (leaf merges splice the
//!      links); the parent may underflow in turn, cascading the decision
//! 5. An interior root left with zero separators is replaced by its only
//!    child
//! ```
//!
//! ## Copy Kernel
//!
//! `copy_to` re-appends the live subgraph of a header into a destination
//! log in post-order, rewriting child pointers as new positions are
//! assigned, then re-appends the leaf links and metadata and commits the
//! destination. Leaf ids are preserved so the copied links block stays
//! valid. Vacuum is its only caller.

use smallvec::SmallVec;

use crate::error::{MonsoonError, Result};
use crate::storage::{BlockLog, BlockPtr, TreeHeader};
use crate::LeafId;

use super::interior::Interior;
use super::leaf::{Leaf, SearchResult};
use super::links::LeafLinks;
use super::{descend_to_leaf, load_node, Node};

/// Mints stable leaf ids. Seeded past the largest id in the recovered leaf
/// links at open.
#[derive(Debug)]
pub struct LeafIdAllocator {
    next: LeafId,
}

impl LeafIdAllocator {
    pub fn new(next: LeafId) -> Self {
        Self { next }
    }

    pub fn mint(&mut self) -> LeafId {
        let id = self.next;
        self.next += 1;
        id
    }
}

type PathStack = SmallVec<[(Interior, usize); 8]>;

/// Propagation state while unwinding an insert.
enum Up {
    Replace(BlockPtr),
    Split {
        separator: Vec<u8>,
        left: BlockPtr,
        right: BlockPtr,
    },
}

pub struct Tree<'a> {
    log: &'a BlockLog,
    capacity: u16,
}

impl<'a> Tree<'a> {
    pub fn new(log: &'a BlockLog, capacity: u16) -> Self {
        Self { log, capacity }
    }

    /// Enqueues the blocks of an empty tree (one empty leaf, its links
    /// entry, empty metadata) and returns the header. The caller commits.
    pub fn bootstrap(log: &BlockLog, capacity: u16, root_leaf_id: LeafId) -> TreeHeader {
        let leaf = Leaf::new(root_leaf_id, capacity);
        let root = log.put_node(leaf.id(), &leaf.encode());
        let leaf_links = log.put_leaf_links(&LeafLinks::single(root_leaf_id).encode());
        let metadata = log.put_metadata(&crate::encoding::encode_pairs(&[]));
        TreeHeader {
            root,
            leaf_links,
            metadata,
        }
    }

    pub fn search(&self, header: &TreeHeader, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let leaf = descend_to_leaf(self.log, header.root, key)?;
        match leaf.find_key(key) {
            SearchResult::Found(index) => Ok(Some(leaf.value_at(index).to_vec())),
            SearchResult::NotFound(_) => Ok(None),
        }
    }

    fn descend(&self, header: &TreeHeader, key: &[u8]) -> Result<(Leaf, PathStack)> {
        let mut path = PathStack::new();
        let mut ptr = header.root;

        loop {
            match load_node(self.log, ptr)? {
                Node::Leaf(leaf) => return Ok((leaf, path)),
                Node::Interior(interior) => {
                    let child_index = interior.find_child(key);
                    ptr = interior.child(child_index);
                    path.push((interior, child_index));
                }
            }
        }
    }

    fn write_leaf(&self, leaf: &Leaf) -> BlockPtr {
        self.log.put_node(leaf.id(), &leaf.encode())
    }

    fn write_interior(&self, interior: &Interior) -> BlockPtr {
        self.log.put_node(0, &interior.encode())
    }

    fn load_links(&self, header: &TreeHeader) -> Result<LeafLinks> {
        LeafLinks::decode(&self.log.get_leaf_links(header.leaf_links)?)
    }

    pub fn insert(
        &self,
        header: &TreeHeader,
        key: Vec<u8>,
        value: Vec<u8>,
        ids: &mut LeafIdAllocator,
    ) -> Result<TreeHeader> {
        let (leaf, mut path) = self.descend(header, &key)?;
        let mut leaf_links = header.leaf_links;

        let mut up = match leaf.find_key(&key) {
            SearchResult::Found(index) => Up::Replace(self.write_leaf(&leaf.replace_value(index, value))),
            SearchResult::NotFound(index) if !leaf.is_full() => {
                Up::Replace(self.write_leaf(&leaf.insert_at(index, key, value)))
            }
            SearchResult::NotFound(index) => {
                let left_id = ids.mint();
                let right_id = ids.mint();
                let (left, right) = leaf.split_with(index, key, value, left_id, right_id);
                let separator = right.key_at(0).to_vec();

                let mut links = self.load_links(header)?;
                links.split(leaf.id(), left_id, right_id);
                leaf_links = self.log.put_leaf_links(&links.encode());

                Up::Split {
                    separator,
                    left: self.write_leaf(&left),
                    right: self.write_leaf(&right),
                }
            }
        };

        while let Some((parent, child_index)) = path.pop() {
            up = match up {
                Up::Replace(ptr) => {
                    Up::Replace(self.write_interior(&parent.with_child_replaced(child_index, ptr)))
                }
                Up::Split {
                    separator,
                    left,
                    right,
                } => {
                    let widened = parent.with_split_applied(child_index, separator, left, right);
                    if widened.is_overflowed() {
                        let (split_left, promoted, split_right) = widened.split();
                        Up::Split {
                            separator: promoted,
                            left: self.write_interior(&split_left),
                            right: self.write_interior(&split_right),
                        }
                    } else {
                        Up::Replace(self.write_interior(&widened))
                    }
                }
            };
        }

        let root = match up {
            Up::Replace(ptr) => ptr,
            Up::Split {
                separator,
                left,
                right,
            } => self.write_interior(&Interior::new_root(self.capacity, separator, left, right)),
        };

        Ok(TreeHeader {
            root,
            leaf_links,
            metadata: header.metadata,
        })
    }

    pub fn remove(
        &self,
        header: &TreeHeader,
        key: &[u8],
        ids: &mut LeafIdAllocator,
    ) -> Result<TreeHeader> {
        let (leaf, mut path) = self.descend(header, key)?;

        let SearchResult::Found(index) = leaf.find_key(key) else {
            // removing an absent key succeeds without touching the tree
            return Ok(*header);
        };

        let mut links: Option<LeafLinks> = None;
        let mut node = Node::Leaf(leaf.remove_at(index));

        let root = loop {
            let Some((parent, child_index)) = path.pop() else {
                // the root is exempt from underflow; an interior root left
                // with a single child collapses to that child
                break match node {
                    Node::Leaf(leaf) => self.write_leaf(&leaf),
                    Node::Interior(interior) if interior.separator_count() == 0 => interior.child(0),
                    Node::Interior(interior) => self.write_interior(&interior),
                };
            };

            let underflowed = match &node {
                Node::Leaf(leaf) => leaf.is_underflowed(),
                Node::Interior(interior) => interior.is_underflowed(),
            };

            if !underflowed {
                let ptr = match &node {
                    Node::Leaf(leaf) => self.write_leaf(leaf),
                    Node::Interior(interior) => self.write_interior(interior),
                };
                node = Node::Interior(parent.with_child_replaced(child_index, ptr));
                continue;
            }

            node = self.rebalance(parent, child_index, node, header, &mut links, ids)?;
        };

        let leaf_links = match links {
            Some(links) => self.log.put_leaf_links(&links.encode()),
            None => header.leaf_links,
        };

        Ok(TreeHeader {
            root,
            leaf_links,
            metadata: header.metadata,
        })
    }

    /// Resolves one underflow: rotate from a richer sibling or merge with
    /// it, returning the rewritten parent for the next unwind step.
    fn rebalance(
        &self,
        parent: Interior,
        child_index: usize,
        deficient: Node,
        header: &TreeHeader,
        links: &mut Option<LeafLinks>,
        ids: &mut LeafIdAllocator,
    ) -> Result<Node> {
        // prefer the right sibling when one exists
        let from_right = child_index + 1 < parent.child_count();
        let sibling_index = if from_right { child_index + 1 } else { child_index - 1 };
        let separator_index = child_index.min(sibling_index);

        let sibling = load_node(self.log, parent.child(sibling_index))?;

        match (deficient, sibling) {
            (Node::Leaf(deficient), Node::Leaf(sibling)) if sibling.can_lend() => {
                let (balanced, lender, separator) = if from_right {
                    sibling.lend_first(&deficient)
                } else {
                    sibling.lend_last(&deficient)
                };
                let balanced_ptr = self.write_leaf(&balanced);
                let lender_ptr = self.write_leaf(&lender);
                Ok(Node::Interior(
                    parent
                        .with_child_replaced(child_index, balanced_ptr)
                        .with_child_replaced(sibling_index, lender_ptr)
                        .with_separator_replaced(separator_index, separator),
                ))
            }
            (Node::Leaf(deficient), Node::Leaf(sibling)) => {
                let (left, right) = if from_right {
                    (deficient, sibling)
                } else {
                    (sibling, deficient)
                };
                let merged_id = ids.mint();
                let merged = Leaf::merge(&left, &right, merged_id);
                let merged_ptr = self.write_leaf(&merged);

                let mut chain = match links.take() {
                    Some(chain) => chain,
                    None => self.load_links(header)?,
                };
                chain.merge(left.id(), right.id(), merged_id);
                *links = Some(chain);

                Ok(Node::Interior(
                    parent.with_children_merged(separator_index, merged_ptr),
                ))
            }
            (Node::Interior(deficient), Node::Interior(sibling)) if sibling.can_lend() => {
                let parent_separator = parent.separators()[separator_index].clone();
                let (balanced, lender, ascending) = if from_right {
                    sibling.lend_first(&deficient, parent_separator)
                } else {
                    sibling.lend_last(&deficient, parent_separator)
                };
                let balanced_ptr = self.write_interior(&balanced);
                let lender_ptr = self.write_interior(&lender);
                Ok(Node::Interior(
                    parent
                        .with_child_replaced(child_index, balanced_ptr)
                        .with_child_replaced(sibling_index, lender_ptr)
                        .with_separator_replaced(separator_index, ascending),
                ))
            }
            (Node::Interior(deficient), Node::Interior(sibling)) => {
                let parent_separator = parent.separators()[separator_index].clone();
                let (left, right) = if from_right {
                    (deficient, sibling)
                } else {
                    (sibling, deficient)
                };
                let merged = Interior::merge(&left, &right, parent_separator);
                let merged_ptr = self.write_interior(&merged);
                Ok(Node::Interior(
                    parent.with_children_merged(separator_index, merged_ptr),
                ))
            }
            _ => Err(MonsoonError::Corrupted(
                "siblings at the same depth disagree on node kind".into(),
            )),
        }
    }

    /// Post-order copy of the live subgraph of `header` into `dst`,
    /// followed by the links and metadata blocks, a flush and a commit.
    /// Returns the new header and the destination's commit offset.
    pub fn copy_to(&self, header: &TreeHeader, dst: &BlockLog) -> Result<(TreeHeader, u64)> {
        let root = self.copy_node(header.root, dst)?;

        let links_payload = self.log.get_leaf_links(header.leaf_links)?;
        let leaf_links = dst.put_leaf_links(&links_payload);

        let metadata_payload = self.log.get_metadata(header.metadata)?;
        let metadata = dst.put_metadata(&metadata_payload);

        let new_header = TreeHeader {
            root,
            leaf_links,
            metadata,
        };
        let commit_offset = dst.commit(&new_header)?;
        Ok((new_header, commit_offset))
    }

    fn copy_node(&self, ptr: BlockPtr, dst: &BlockLog) -> Result<BlockPtr> {
        let (leaf_id, payload) = self.log.get_node(ptr)?;
        if leaf_id != 0 {
            return Ok(dst.put_node(leaf_id, &payload));
        }

        let mut interior = Interior::decode(&payload)?;
        for child in interior.children_mut() {
            *child = self.copy_node(*child, dst)?;
        }
        let copied = dst.put_node(0, &interior.encode());
        // cap queue memory: one flush per copied subtree
        dst.flush()?;
        Ok(copied)
    }
}
