//! # Monsoon Configuration Constants
//!
//! This module centralizes all configuration constants, grouping
//! interdependent values together and documenting their relationships.
//!
//! ## Dependency Graph
//!
//! ```text
//! BLOCK_UNIT (1024 bytes)
//!       │
//!       ├─> COMMIT_HEADER_SIZE (32 bytes, must fit in one unit)
//!       │     The commit block is exactly one unit; the backward recovery
//!       │     scan reads one unit at a time and decodes its head.
//!       │
//!       ├─> NODE_HEADER_SIZE (14 bytes)
//!       │     Node blocks are padded up to a whole number of units, so the
//!       │     read-by-id scan can step backward one unit at a time and
//!       │     probe for a node header at each boundary.
//!       │
//!       └─> PAYLOAD_HEADER_SIZE (6 bytes, leaf-links and metadata blocks)
//!
//! MIN_CAPACITY (4)
//!       │
//!       └─> Capacity must be even and >= MIN_CAPACITY so that both split
//!           halves and the post-merge node respect the fill bounds.
//! ```
//!
//! ## Critical Invariants
//!
//! Enforced by compile-time assertions below:
//!
//! 1. `BLOCK_UNIT` is a power of two (alignment arithmetic uses masking)
//! 2. `COMMIT_HEADER_SIZE <= BLOCK_UNIT` (commit block is one unit)
//! 3. `NODE_HEADER_SIZE < BLOCK_UNIT` (a header never spans units)

/// Fixed allocation unit of the block log. Every block's length is a
/// multiple of this, and the recovery scan steps by exactly this much.
pub const BLOCK_UNIT: usize = 1024;

/// Size of the commit block header: magic (2) + three (offset, length)
/// pointer pairs (24) + reserved (6). The block itself is padded to one
/// unit.
pub const COMMIT_HEADER_SIZE: usize = 32;

/// Size of a node block header: magic (2) + leaf id (8) + payload length (4).
pub const NODE_HEADER_SIZE: usize = 14;

/// Size of a leaf-links or metadata block header: magic (2) + payload
/// length (4).
pub const PAYLOAD_HEADER_SIZE: usize = 6;

/// Smallest allowed branching factor. Capacity must also be even.
pub const MIN_CAPACITY: u16 = 4;

/// Primary database file name inside the configured directory.
pub const DB_FILE_NAME: &str = "db.monsoon";

/// Vacuum target file name; renamed over the primary on completion.
pub const TMP_FILE_NAME: &str = "tmp.monsoon";

const _: () = assert!(BLOCK_UNIT.is_power_of_two(), "BLOCK_UNIT must be a power of two");

const _: () = assert!(
    COMMIT_HEADER_SIZE <= BLOCK_UNIT,
    "commit header must fit inside a single block unit"
);

const _: () = assert!(
    NODE_HEADER_SIZE < BLOCK_UNIT,
    "node header must never span a unit boundary"
);

/// Rounds `len` up to the next multiple of [`BLOCK_UNIT`].
#[inline]
pub const fn align_to_unit(len: usize) -> usize {
    (len + BLOCK_UNIT - 1) & !(BLOCK_UNIT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_to_unit_rounds_up() {
        assert_eq!(align_to_unit(0), 0);
        assert_eq!(align_to_unit(1), BLOCK_UNIT);
        assert_eq!(align_to_unit(BLOCK_UNIT), BLOCK_UNIT);
        assert_eq!(align_to_unit(BLOCK_UNIT + 1), 2 * BLOCK_UNIT);
        assert_eq!(align_to_unit(COMMIT_HEADER_SIZE), BLOCK_UNIT);
    }
}
