//! Keyed mutual exclusion.
//!
//! Reconciliation serializes on two kinds of keys: object locks
//! `(kind, id)` guarding a single record, and raw locks
//! `(namespace, key)` guarding something that is not a record yet, such as
//! a parent's child collection or a kind's name space. The two never
//! collide even when their strings do.
//!
//! A [`LockGuard`] releases on drop, so every exit path (early return, `?`,
//! panic unwind) gives the lock back.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    Object { kind: String, id: String },
    Raw { namespace: String, key: String },
}

impl LockKey {
    pub fn object(kind: impl Into<String>, id: impl Into<String>) -> Self {
        LockKey::Object {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn raw(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        LockKey::Raw {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Object { kind, id } => write!(f, "object:{}/{}", kind, id),
            LockKey::Raw { namespace, key } => write!(f, "raw:{}/{}", namespace, key),
        }
    }
}

/// A held lock. Dropping it releases the key.
pub struct LockGuard {
    key: LockKey,
    _release: Box<dyn Any + Send + Sync>,
}

impl LockGuard {
    /// Wraps whatever a [`LockService`] needs to keep alive while the lock is
    /// held. Its `Drop` performs the release.
    pub fn new(key: LockKey, release: impl Any + Send + Sync) -> Self {
        Self {
            key,
            _release: Box::new(release),
        }
    }

    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

/// Provider of keyed locks. Acquisition waits until the key is free.
#[async_trait]
pub trait LockService: Send + Sync {
    async fn acquire(&self, key: LockKey) -> LockGuard;

    async fn lock_object(&self, kind: &str, id: &str) -> LockGuard {
        self.acquire(LockKey::object(kind, id)).await
    }

    async fn lock_raw(&self, namespace: &str, key: &str) -> LockGuard {
        self.acquire(LockKey::raw(namespace, key)).await
    }
}

type Table = Arc<Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>>;

/// In-process [`LockService`] backed by one async mutex per live key.
///
/// Entries are created on first acquire and dropped again once nobody holds
/// or waits on them, so the table stays proportional to contention.
#[derive(Clone, Default)]
pub struct KeyedLockManager {
    table: Table,
}

impl KeyedLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl LockService for KeyedLockManager {
    async fn acquire(&self, key: LockKey) -> LockGuard {
        let slot = {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.entry(key.clone()).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        tracing::trace!(key = %key, "lock acquired");

        LockGuard::new(
            key.clone(),
            KeyedRelease {
                table: self.table.clone(),
                key,
                guard: Some(guard),
            },
        )
    }
}

struct KeyedRelease {
    table: Table,
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyedRelease {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        if let Some(slot) = table.get(&self.key) {
            if Arc::strong_count(slot) == 1 {
                table.remove(&self.key);
            }
        }
        tracing::trace!(key = %self.key, "lock released");
    }
}
