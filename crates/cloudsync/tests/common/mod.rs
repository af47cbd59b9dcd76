//! Shared test utilities for cloudsync integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a `SyncService` to a YAML inventory provider on a
//!   temporary database
//! - Builders for assembling inventories programmatically

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
