//! Single-flight task execution keyed by sync task key.
//!
//! At most one task runs per key. A submission for a key that is already in
//! flight is dropped, which is how duplicate sync requests for the same
//! region collapse into the one already running. Different keys run in
//! parallel, bounded by a semaphore.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// What happened to a submitted task.
#[derive(Debug)]
pub enum Submission {
    /// The task was spawned.
    Started(JoinHandle<()>),
    /// Another task with the same key is in flight; this one was dropped.
    AlreadyRunning,
}

impl Submission {
    pub fn is_started(&self) -> bool {
        matches!(self, Submission::Started(_))
    }
}

/// In-flight keys and who submitted each.
type Inflight = Arc<Mutex<HashMap<String, String>>>;

#[derive(Clone)]
pub struct SyncTaskRunner {
    inflight: Inflight,
    permits: Arc<Semaphore>,
}

impl SyncTaskRunner {
    /// Creates a runner allowing `max_concurrent` keys to run at once.
    /// Zero is treated as one.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Spawns `task` under `key` unless a task with that key is in flight.
    ///
    /// Must be called from within a tokio runtime. The key is released when
    /// the task finishes, including when it panics.
    pub fn submit<F>(&self, key: impl Into<String>, task: F) -> Submission
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.submit_owned(key, String::new(), task)
    }

    /// Like [`submit`](Self::submit), recording `owner` against the key
    /// while the task is in flight.
    pub fn submit_owned<F>(&self, key: impl Into<String>, owner: impl Into<String>, task: F) -> Submission
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        {
            let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
            if inflight.contains_key(&key) {
                tracing::debug!(key = %key, "sync task already in flight, dropping submission");
                return Submission::AlreadyRunning;
            }
            inflight.insert(key.clone(), owner.into());
        }

        let slot = InflightSlot {
            inflight: Arc::clone(&self.inflight),
            key,
        };
        let permits = Arc::clone(&self.permits);

        let handle = tokio::spawn(async move {
            let _slot = slot;
            let _permit = permits.acquire_owned().await.ok();
            task.await;
        });

        Submission::Started(handle)
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Owner recorded for `key`, if a task with that key is in flight.
    pub fn owner(&self, key: &str) -> Option<String> {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of keys in flight, waiting for a permit included.
    pub fn running(&self) -> usize {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for SyncTaskRunner {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

struct InflightSlot {
    inflight: Inflight,
    key: String,
}

impl Drop for InflightSlot {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}
