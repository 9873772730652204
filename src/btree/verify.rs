//! # Structural Integrity Verification
//!
//! Offline checks over a committed header, used by the test suites and
//! available to operators. `verify` walks the whole tree and confirms the
//! B+tree invariants:
//!
//! - in-order traversal yields strictly increasing keys
//! - every non-root node respects the fill bounds
//! - all root-to-leaf paths have equal length
//! - separators partition their subtrees
//! - the leaf-link chain visits exactly the reachable leaves, in in-order
//!   sequence
//!
//! `shape` returns a decoded picture of the tree for structural
//! assertions in tests.

use crate::error::{MonsoonError, Result};
use crate::storage::{BlockLog, BlockPtr, TreeHeader};
use crate::LeafId;

use super::links::LeafLinks;
use super::{load_node, Node};

/// Summary returned by a successful verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub depth: usize,
    pub leaf_count: usize,
    pub key_count: usize,
}

/// A decoded picture of the tree, for structural assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeShape {
    Leaf {
        id: LeafId,
        keys: Vec<Vec<u8>>,
    },
    Interior {
        separators: Vec<Vec<u8>>,
        children: Vec<NodeShape>,
    },
}

pub fn shape(log: &BlockLog, header: &TreeHeader) -> Result<NodeShape> {
    shape_at(log, header.root)
}

fn shape_at(log: &BlockLog, ptr: BlockPtr) -> Result<NodeShape> {
    match load_node(log, ptr)? {
        Node::Leaf(leaf) => Ok(NodeShape::Leaf {
            id: leaf.id(),
            keys: leaf.entries().iter().map(|(k, _)| k.clone()).collect(),
        }),
        Node::Interior(interior) => {
            let mut children = Vec::with_capacity(interior.child_count());
            for &child in interior.children() {
                children.push(shape_at(log, child)?);
            }
            Ok(NodeShape::Interior {
                separators: interior.separators().to_vec(),
                children,
            })
        }
    }
}

pub fn verify(log: &BlockLog, header: &TreeHeader) -> Result<TreeStats> {
    let mut walk = Walk {
        log,
        leaves: Vec::new(),
        key_count: 0,
        last_key: None,
    };
    let depth = walk.check(header.root, None, None, true)?;

    let links = LeafLinks::decode(&log.get_leaf_links(header.leaf_links)?)?;
    check_links_agree(&links, &walk.leaves)?;

    Ok(TreeStats {
        depth,
        leaf_count: walk.leaves.len(),
        key_count: walk.key_count,
    })
}

struct Walk<'a> {
    log: &'a BlockLog,
    leaves: Vec<LeafId>,
    key_count: usize,
    last_key: Option<Vec<u8>>,
}

impl Walk<'_> {
    /// Returns the subtree depth. `lower`/`upper` are the separator bounds
    /// inherited from ancestors: every key in the subtree must satisfy
    /// `lower <= key < upper`.
    fn check(
        &mut self,
        ptr: BlockPtr,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        is_root: bool,
    ) -> Result<usize> {
        match load_node(self.log, ptr)? {
            Node::Leaf(leaf) => {
                if !is_root && leaf.is_underflowed() {
                    return Err(corrupt(format!(
                        "leaf {} underflowed with {} keys",
                        leaf.id(),
                        leaf.len()
                    )));
                }
                if leaf.len() > leaf.max_keys() {
                    return Err(corrupt(format!(
                        "leaf {} holds {} keys over the maximum {}",
                        leaf.id(),
                        leaf.len(),
                        leaf.max_keys()
                    )));
                }

                for (key, _) in leaf.entries() {
                    if let Some(last) = &self.last_key {
                        if key <= last {
                            return Err(corrupt("in-order key sequence not strictly increasing".into()));
                        }
                    }
                    if let Some(lower) = lower {
                        if key.as_slice() < lower {
                            return Err(corrupt("leaf key below its separator lower bound".into()));
                        }
                    }
                    if let Some(upper) = upper {
                        if key.as_slice() >= upper {
                            return Err(corrupt("leaf key at or above its separator upper bound".into()));
                        }
                    }
                    self.last_key = Some(key.clone());
                    self.key_count += 1;
                }

                self.leaves.push(leaf.id());
                Ok(1)
            }
            Node::Interior(interior) => {
                if is_root && interior.separator_count() == 0 {
                    return Err(corrupt("interior root with zero separators".into()));
                }
                if !is_root && interior.is_underflowed() {
                    return Err(corrupt(format!(
                        "interior underflowed with {} children",
                        interior.child_count()
                    )));
                }

                let separators = interior.separators();
                for pair in separators.windows(2) {
                    if pair[0] >= pair[1] {
                        return Err(corrupt("separators not strictly increasing".into()));
                    }
                }

                let mut depth = None;
                for (index, &child) in interior.children().iter().enumerate() {
                    let child_lower = if index == 0 {
                        lower
                    } else {
                        Some(separators[index - 1].as_slice())
                    };
                    let child_upper = if index == separators.len() {
                        upper
                    } else {
                        Some(separators[index].as_slice())
                    };

                    let child_depth = self.check(child, child_lower, child_upper, false)?;
                    match depth {
                        None => depth = Some(child_depth),
                        Some(expected) if expected != child_depth => {
                            return Err(corrupt("root-to-leaf paths differ in length".into()))
                        }
                        Some(_) => {}
                    }
                }

                Ok(depth.expect("interior nodes always have children") + 1)
            }
        }
    }
}

fn check_links_agree(links: &LeafLinks, in_order: &[LeafId]) -> Result<()> {
    if links.len() != in_order.len() {
        return Err(corrupt(format!(
            "links block tracks {} leaves, tree reaches {}",
            links.len(),
            in_order.len()
        )));
    }

    let mut cursor = Some(links.head()?);
    for &expected in in_order {
        let Some(id) = cursor else {
            return Err(corrupt("link chain shorter than in-order leaf sequence".into()));
        };
        if id != expected {
            return Err(corrupt(format!(
                "link chain visits leaf {id}, in-order traversal expects {expected}"
            )));
        }
        cursor = links.next(id);
    }

    if cursor.is_some() {
        return Err(corrupt("link chain longer than in-order leaf sequence".into()));
    }
    Ok(())
}

fn corrupt(message: String) -> MonsoonError {
    MonsoonError::Corrupted(message)
}
