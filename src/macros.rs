//! # Internal Macros
//!
//! This module provides internal macros for reducing boilerplate in Monsoon.
//!
//! ## zerocopy_getters!
//!
//! Generates getter methods for zerocopy struct fields that use big-endian
//! wrapper types (U16, U32, U64). The on-disk format is big-endian end to
//! end, so every header struct stores its multi-byte fields through these
//! wrappers and exposes native integers through generated getters.
//!
//! ### Usage
//!
//! ```ignore
//! use zerocopy::big_endian::{U32, U64};
//!
//! #[repr(C)]
//! struct NodeHeader {
//!     leaf_id: U64,
//!     payload_len: U32,
//! }
//!
//! impl NodeHeader {
//!     zerocopy_getters! {
//!         leaf_id: u64,
//!         payload_len: u32,
//!     }
//! }
//!
//! // Generates:
//! // pub fn leaf_id(&self) -> u64 { self.leaf_id.get() }
//! // pub fn payload_len(&self) -> u32 { self.payload_len.get() }
//! ```

/// Generates getter methods for zerocopy big-endian fields (read-only).
#[macro_export]
macro_rules! zerocopy_getters {
    ($($field:ident : $native_ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $field(&self) -> $native_ty {
                self.$field.get()
            }
        )*
    };
}
