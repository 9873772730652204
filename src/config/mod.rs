//! # Monsoon Configuration Module
//!
//! This module centralizes all configuration constants for Monsoon. Constants
//! are grouped by their functional area and interdependencies are documented
//! and enforced through compile-time assertions.
//!
//! ## Why Centralization?
//!
//! The block layout constants are tightly coupled: every block is a multiple
//! of `BLOCK_UNIT`, the commit header must fit inside a single unit, and the
//! backward commit scan steps by exactly one unit. Co-locating these values
//! with compile-time checks prevents a format change from silently breaking
//! the recovery scan.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric configuration values with dependency
//!   documentation

pub mod constants;
pub use constants::*;
