//! Reconciliation core for a multi-cloud resource control plane.
//!
//! Keeps a local model of cloud resources in line with what providers
//! report. Each provider × region pair is a sync unit; syncing one walks
//! the region top-down and, per resource kind, deletes what vanished,
//! updates what changed and creates what appeared.

pub mod cloud;
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod lock;
pub mod model;
pub mod reconcile;
pub mod result;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod telemetry;

pub use cloud::{CloudError, CloudProvider, Inventory, InventoryNode, InventoryProvider};
pub use compare::{compare_sets, CompareError, Partition};
pub use config::{load_config, SyncConfig};
pub use db::{Database, DatabaseError};
pub use error::{CloudSyncError, ConfigError, Result};
pub use events::{SyncEvent, SyncEventBroadcaster, SyncPhase};
pub use lock::{KeyedLockManager, LockGuard, LockKey, LockService};
pub use reconcile::{ProviderInfo, ReconcileError, Reconciler, SyncContext, SyncKind};
pub use result::{SyncResult, SyncResultSet};
pub use scheduler::{AutoSyncLoop, Submission, SyncTaskRunner};
pub use store::{RecordStore, SqliteStore, StoreError};
pub use sync::{SyncError, SyncRange, SyncService, SyncStatus, SyncUnit};
pub use telemetry::init_tracing;
