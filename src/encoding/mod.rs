//! # Encoding Module
//!
//! This module provides the payload serialisation primitives shared by the
//! node, leaf-links and metadata codecs:
//!
//! - **Varints**: compact length and count encoding ([`varint`])
//! - **Byte strings**: varint-length-prefixed slices
//! - **Pair lists**: the metadata block payload, an ordered list of
//!   `(name, value)` byte-string pairs
//!
//! The payload format is self-describing in the sense the block log needs:
//! a payload carries its own counts and lengths, so write and read
//! round-trip without out-of-band schema. All multi-byte fixed-width
//! integers elsewhere in the format are big-endian; varints carry their own
//! byte order.

pub mod varint;

pub use varint::{put_varint, take_varint, varint_len};

use crate::error::{MonsoonError, Result};

/// Appends `bytes` to `buf` prefixed with its varint length.
pub fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Decodes a length-prefixed byte string at `*pos`, advancing the cursor.
pub fn take_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len = take_varint(buf, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| {
            MonsoonError::Corrupted(format!(
                "byte string of length {len} overruns payload of {} bytes",
                buf.len()
            ))
        })?;
    let bytes = &buf[*pos..end];
    *pos = end;
    Ok(bytes)
}

/// Encodes an ordered `(name, value)` pair list as a metadata payload.
pub fn encode_pairs(pairs: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
    let mut buf = Vec::new();
    put_varint(&mut buf, pairs.len() as u64);
    for (name, value) in pairs {
        put_bytes(&mut buf, name);
        put_bytes(&mut buf, value);
    }
    buf
}

/// Decodes a metadata payload back into its pair list.
pub fn decode_pairs(payload: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut pos = 0;
    let count = take_varint(payload, &mut pos)? as usize;
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let name = take_bytes(payload, &mut pos)?.to_vec();
        let value = take_bytes(payload, &mut pos)?.to_vec();
        pairs.push((name, value));
    }
    Ok(pairs)
}
