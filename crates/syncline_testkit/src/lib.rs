//! # Syncline Testkit
//!
//! Test utilities for Syncline.
//!
//! This crate provides:
//! - Temporary file-backed stores and in-memory stores
//! - Operation spec builders
//! - Pre-seeded queue snapshots for restart and recovery tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use syncline_testkit::prelude::*;
//!
//! #[test]
//! fn restart_keeps_operations() {
//!     let store = SnapshotBuilder::new()
//!         .with_operation("op-1", sample_spec(1), 10)
//!         .into_memory_store(DEFAULT_SNAPSHOT_KEY);
//!     // ... open a queue or manager over `store`
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
