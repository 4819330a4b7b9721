//! # Skirmish Test Utilities
//!
//! Shared testing utilities for all crates:
//! - Determinism test harness
//! - Ready-made sandbox scenarios
//! - Property-based testing strategies

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod scenarios;

/// The fixture catalog and sandbox builders.
pub use skirmish_core::fixtures;

/// Re-export proptest for convenience.
pub use proptest;
