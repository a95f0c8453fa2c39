//! Test infrastructure for ledger testing
//!
//! Helpers for building keyed, funded ledgers on temporary storage, used by
//! the unit tests across the crate.

pub mod test_utils;

pub use test_utils::*;
