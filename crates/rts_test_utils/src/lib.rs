//! # RTS Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Match fixtures and entity placement helpers
//! - Invariant checkers
//! - Determinism test harness
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod invariants;
pub mod strategies;

/// Re-export proptest for convenience.
pub use proptest;
