//! Task execution and periodic scheduling of syncs.

pub mod auto_sync;
pub mod task_runner;

pub use auto_sync::AutoSyncLoop;
pub use task_runner::{Submission, SyncTaskRunner};
