//! # Block Header Definitions
//!
//! This module provides the type-safe, zerocopy-based headers for every
//! block kind in the log, plus the block pointer and tree header types that
//! the rest of the engine passes around.
//!
//! ## Block Kinds
//!
//! Each block begins with a 16-bit magic identifying its kind:
//!
//! ```text
//! 0xFAFA   commit      names the three pointers of a snapshot header
//! 0xFBFB   node        leaf or interior B+tree node
//! 0xFCFC   leaf-links  the doubly-linked list over all leaves
//! 0xFDFD   metadata    opaque ordered (name, value) pair list
//! ```
//!
//! ## Header Layouts
//!
//! ```text
//! commit (32 bytes, block padded to one unit):
//! +-------+-----------+-----------+-----------+----------+
//! | magic | root      | links     | metadata  | reserved |
//! | (2B)  | (4B+4B)   | (4B+4B)   | (4B+4B)   | (6B)     |
//! +-------+-----------+-----------+-----------+----------+
//!
//! node (14 bytes, then payload, padded to unit multiple):
//! +-------+------------------+-------------+
//! | magic | leaf id (8B)     | length (4B) |
//! +-------+------------------+-------------+
//!
//! leaf-links / metadata (6 bytes, then payload, padded):
//! +-------+-------------+
//! | magic | length (4B) |
//! +-------+-------------+
//! ```
//!
//! All multi-byte integers are big-endian, carried through
//! `zerocopy::big_endian` wrapper types so reads from arbitrary file offsets
//! need no alignment.
//!
//! ## Decode Validation
//!
//! Every decode checks the magic against the expected kind and fails with a
//! typed [`MonsoonError::Decode`] naming both. Commit blocks are further
//! shape-checked during the backward recovery scan (pointer bounds, zero
//! reserved tail) before being trusted; that logic lives with the scan in
//! the block log, because it needs the candidate's file offset.

use zerocopy::big_endian::{U16, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{COMMIT_HEADER_SIZE, NODE_HEADER_SIZE, PAYLOAD_HEADER_SIZE};
use crate::error::{MonsoonError, Result};
use crate::LeafId;

pub const COMMIT_MAGIC: u16 = 0xFAFA;
pub const NODE_MAGIC: u16 = 0xFBFB;
pub const LEAF_LINKS_MAGIC: u16 = 0xFCFC;
pub const METADATA_MAGIC: u16 = 0xFDFD;

/// Locates a block in the log: byte offset and padded block length.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct BlockPtr {
    offset: U32,
    length: U32,
}

impl BlockPtr {
    pub fn new(offset: u32, length: u32) -> Self {
        Self {
            offset: U32::new(offset),
            length: U32::new(length),
        }
    }

    zerocopy_getters! {
        offset: u32,
        length: u32,
    }

    /// Offset one past the end of the block.
    pub fn end(&self) -> u64 {
        self.offset() as u64 + self.length() as u64
    }
}

impl std::fmt::Debug for BlockPtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockPtr({}+{})", self.offset(), self.length())
    }
}

/// The complete description of a snapshot: the three pointers a commit
/// block publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    pub root: BlockPtr,
    pub leaf_links: BlockPtr,
    pub metadata: BlockPtr,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct CommitHeader {
    magic: U16,
    root: BlockPtr,
    leaf_links: BlockPtr,
    metadata: BlockPtr,
    reserved: [u8; 6],
}

const _: () = assert!(std::mem::size_of::<CommitHeader>() == COMMIT_HEADER_SIZE);

impl CommitHeader {
    pub fn new(header: &TreeHeader) -> Self {
        Self {
            magic: U16::new(COMMIT_MAGIC),
            root: header.root,
            leaf_links: header.leaf_links,
            metadata: header.metadata,
            reserved: [0u8; 6],
        }
    }

    /// Decodes without judging the magic, for scan probing. Returns `None`
    /// only if the buffer is too short.
    pub fn probe(bytes: &[u8]) -> Option<&Self> {
        Self::ref_from_bytes(bytes.get(..COMMIT_HEADER_SIZE)?).ok()
    }

    pub fn decode(bytes: &[u8], offset: u64) -> Result<&Self> {
        let header = Self::probe(bytes).ok_or_else(|| MonsoonError::Corrupted(format!(
            "commit block at offset {offset} shorter than {COMMIT_HEADER_SIZE} bytes"
        )))?;
        if header.magic() != COMMIT_MAGIC {
            return Err(MonsoonError::Decode {
                expected: "commit",
                found: header.magic(),
                offset,
            });
        }
        Ok(header)
    }

    zerocopy_getters! {
        magic: u16,
    }

    pub fn tree_header(&self) -> TreeHeader {
        TreeHeader {
            root: self.root,
            leaf_links: self.leaf_links,
            metadata: self.metadata,
        }
    }

    /// The reserved tail must be zero for a scan candidate to be trusted;
    /// node payload fragments that happen to start with the commit magic at
    /// unit alignment fail this shape check.
    pub fn reserved_is_zero(&self) -> bool {
        self.reserved == [0u8; 6]
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NodeHeader {
    magic: U16,
    leaf_id: U64,
    payload_len: U32,
}

const _: () = assert!(std::mem::size_of::<NodeHeader>() == NODE_HEADER_SIZE);

impl NodeHeader {
    pub fn new(leaf_id: LeafId, payload_len: u32) -> Self {
        Self {
            magic: U16::new(NODE_MAGIC),
            leaf_id: U64::new(leaf_id),
            payload_len: U32::new(payload_len),
        }
    }

    /// Decodes without judging the magic, for the read-by-id backward scan.
    pub fn probe(bytes: &[u8]) -> Option<&Self> {
        Self::ref_from_bytes(bytes.get(..NODE_HEADER_SIZE)?).ok()
    }

    pub fn decode(bytes: &[u8], offset: u64) -> Result<&Self> {
        let header = Self::probe(bytes).ok_or_else(|| MonsoonError::Corrupted(format!(
            "node block at offset {offset} shorter than {NODE_HEADER_SIZE} bytes"
        )))?;
        if header.magic() != NODE_MAGIC {
            return Err(MonsoonError::Decode {
                expected: "node",
                found: header.magic(),
                offset,
            });
        }
        Ok(header)
    }

    zerocopy_getters! {
        magic: u16,
        leaf_id: u64,
        payload_len: u32,
    }
}

/// Shared header of leaf-links and metadata blocks.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PayloadHeader {
    magic: U16,
    payload_len: U32,
}

const _: () = assert!(std::mem::size_of::<PayloadHeader>() == PAYLOAD_HEADER_SIZE);

impl PayloadHeader {
    pub fn new(magic: u16, payload_len: u32) -> Self {
        Self {
            magic: U16::new(magic),
            payload_len: U32::new(payload_len),
        }
    }

    pub fn decode<'a>(bytes: &'a [u8], expected: u16, kind: &'static str, offset: u64) -> Result<&'a Self> {
        let header = Self::ref_from_bytes(bytes.get(..PAYLOAD_HEADER_SIZE).ok_or_else(|| {
            MonsoonError::Corrupted(format!(
                "{kind} block at offset {offset} shorter than {PAYLOAD_HEADER_SIZE} bytes"
            ))
        })?)
        .map_err(|_| {
            MonsoonError::Corrupted(format!("{kind} block header unreadable at offset {offset}"))
        })?;
        if header.magic() != expected {
            return Err(MonsoonError::Decode {
                expected: kind,
                found: header.magic(),
                offset,
            });
        }
        Ok(header)
    }

    zerocopy_getters! {
        magic: u16,
        payload_len: u32,
    }
}
