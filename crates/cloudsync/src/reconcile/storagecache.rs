//! Storage caches discovered while walking storages.
//!
//! Several storages can share one cache. The cascade collects each distinct
//! cache once per sync, then reconciles its cached images in a single pass.

use std::sync::Arc;

use tracing::{debug, info};

use super::{naming, ReconcileError, SyncContext, NAME_LOCK};
use crate::cloud::CloudStoragecache;
use crate::model::{Record, Storage, Storagecache};
use crate::telemetry::AUDIT_TARGET;

pub struct StoragecachePair {
    pub local: Storagecache,
    pub remote: Arc<dyn CloudStoragecache>,
    /// The local cache was created by this sync.
    pub is_new: bool,
}

/// Distinct caches seen during one sync, in discovery order.
#[derive(Default)]
pub struct StoragecachePairs {
    pairs: Vec<StoragecachePair>,
}

impl StoragecachePairs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `pair` unless its local cache is already tracked. A pair first
    /// seen as existing is upgraded if a later sighting created it.
    pub fn add(&mut self, pair: StoragecachePair) -> bool {
        if let Some(existing) = self.pairs.iter_mut().find(|p| p.local.id() == pair.local.id()) {
            existing.is_new |= pair.is_new;
            return false;
        }
        self.pairs.push(pair);
        true
    }

    pub fn contains(&self, local_id: &str) -> bool {
        self.pairs.iter().any(|p| p.local.id() == local_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoragecachePair> {
        self.pairs.iter()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Finds or creates the local cache mirroring `remote`.
pub async fn sync_storagecache(
    ctx: &SyncContext,
    remote: &Arc<dyn CloudStoragecache>,
) -> Result<(Storagecache, bool), ReconcileError> {
    let external_id = remote.global_id();
    let _guard = ctx.locks.lock_raw(Storagecache::KIND, &external_id).await;

    if let Some(existing) = ctx.find_external::<Storagecache>(&external_id).await? {
        let (cache, diff) = ctx
            .store
            .update_with(&existing, |c: &mut Storagecache| {
                ctx.apply_metadata(&mut c.base, remote.as_ref());
                c.path = remote.path();
                Ok::<(), ReconcileError>(())
            })
            .await?;
        if !diff.is_empty() {
            debug!(id = cache.id(), fields = ?diff.fields(), "storage cache updated");
        }
        return Ok((cache, false));
    }

    let mut cache = Storagecache {
        base: ctx.new_base(remote.as_ref()),
        path: remote.path(),
    };
    let _name_guard = ctx.locks.lock_raw(Storagecache::KIND, NAME_LOCK).await;
    cache.base.name =
        naming::generate_name(&ctx.store, Storagecache::KIND, &remote.name(), None).await?;
    ctx.store.insert(&cache).await?;

    info!(
        target: AUDIT_TARGET,
        kind = Storagecache::KIND,
        id = cache.id(),
        name = cache.name(),
        external_id = %external_id,
        "created record"
    );
    Ok((cache, true))
}

/// Points `storage` at `cache`. Returns the storage as stored.
pub async fn attach_storage(
    ctx: &SyncContext,
    storage: &Storage,
    cache: &Storagecache,
) -> Result<Storage, ReconcileError> {
    let _guard = ctx.locks.lock_object(Storage::KIND, storage.id()).await;
    let current = ctx
        .store
        .get::<Storage>(storage.id())
        .await?
        .ok_or_else(|| ReconcileError::Vanished {
            kind: Storage::KIND,
            id: storage.id().to_string(),
        })?;
    let (updated, _) = ctx
        .store
        .update_with(&current, |s: &mut Storage| {
            s.storagecache_id = cache.id().to_string();
            Ok::<(), ReconcileError>(())
        })
        .await?;
    Ok(updated)
}

/// Resolves the cache behind `remote_storage`, links it and records the
/// pair. Storages without a cache are left alone.
pub async fn track_storagecache(
    ctx: &SyncContext,
    storage: &Storage,
    remote: Option<Arc<dyn CloudStoragecache>>,
    pairs: &mut StoragecachePairs,
) -> Result<(), ReconcileError> {
    let Some(remote) = remote else {
        return Ok(());
    };
    let (cache, is_new) = sync_storagecache(ctx, &remote).await?;
    if storage.storagecache_id != cache.id() {
        attach_storage(ctx, storage, &cache).await?;
    }
    pairs.add(StoragecachePair {
        local: cache,
        remote,
        is_new,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::InventoryNode;
    use crate::db::Database;
    use crate::lock::KeyedLockManager;
    use crate::reconcile::ProviderInfo;
    use crate::store::{RecordStore, SqliteStore};

    fn context() -> SyncContext {
        let store = RecordStore::new(Arc::new(SqliteStore::new(Database::open_in_memory().unwrap())));
        SyncContext::new(
            store,
            Arc::new(KeyedLockManager::new()),
            Arc::new(ProviderInfo::new("p1", "acme")),
        )
    }

    fn remote_cache(id: &str) -> Arc<dyn CloudStoragecache> {
        Arc::new(InventoryNode::new(id).with_attr("path", "/var/cache"))
    }

    #[tokio::test]
    async fn test_pairs_dedup_by_local_id() {
        let ctx = context();
        let remote = remote_cache("sc-1");
        let (cache, is_new) = sync_storagecache(&ctx, &remote).await.unwrap();
        assert!(is_new);

        let mut pairs = StoragecachePairs::new();
        assert!(pairs.add(StoragecachePair {
            local: cache.clone(),
            remote: remote.clone(),
            is_new: false,
        }));
        assert!(!pairs.add(StoragecachePair {
            local: cache.clone(),
            remote,
            is_new: true,
        }));
        assert_eq!(pairs.len(), 1);
        assert!(pairs.contains(cache.id()));
        assert!(pairs.iter().all(|p| p.is_new));
    }

    #[tokio::test]
    async fn test_shared_cache_created_once() {
        let ctx = context();
        let remote = remote_cache("sc-1");

        let (first, first_new) = sync_storagecache(&ctx, &remote).await.unwrap();
        let (second, second_new) = sync_storagecache(&ctx, &remote).await.unwrap();

        assert!(first_new);
        assert!(!second_new);
        assert_eq!(first.id(), second.id());
        assert_eq!(second.path, "/var/cache");
    }

    #[tokio::test]
    async fn test_track_links_storage() {
        let ctx = context();
        let mut storage = Storage {
            base: crate::model::ResourceBase::new("local-disk"),
            ..Default::default()
        };
        storage.base.manager_id = "p1".to_string();
        ctx.store.insert(&storage).await.unwrap();

        let mut pairs = StoragecachePairs::new();
        track_storagecache(&ctx, &storage, Some(remote_cache("sc-1")), &mut pairs)
            .await
            .unwrap();
        track_storagecache(&ctx, &storage, None, &mut pairs)
            .await
            .unwrap();

        assert_eq!(pairs.len(), 1);
        let stored: Storage = ctx.store.get(storage.id()).await.unwrap().unwrap();
        let cache = pairs.iter().next().unwrap();
        assert_eq!(stored.storagecache_id, cache.local.id());
    }
}
