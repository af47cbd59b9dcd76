//! Orchestration of region syncs.
//!
//! A [`SyncUnit`] pairs one provider with one region and carries the sync
//! status and timestamps. [`SyncService`] owns the shared collaborators,
//! submits unit syncs to the task runner and drives a [`Cascade`] for each.

pub mod cascade;
pub mod error;
pub mod range;
pub mod service;
pub mod unit;
pub mod units;

pub use cascade::{sync_regions, Cascade};
pub use error::SyncError;
pub use range::SyncRange;
pub use service::{ProviderRegistry, RegisteredProvider, SyncService};
pub use unit::{SyncStatus, SyncUnit};
pub use units::SyncUnitManager;
