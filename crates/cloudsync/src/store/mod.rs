//! Local record store.
//!
//! [`LocalStore`] is the object-safe seam: it moves untyped [`Document`]s.
//! [`RecordStore`] wraps one and gives reconcilers typed access, a
//! field-level diff on update, and delete-condition checks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

pub mod error;
pub mod sqlite;

pub use error::{StoreError, StoreResult};
pub use sqlite::SqliteStore;

use crate::model::{Record, RegionScoped, ResourceBase, ZoneScoped};

/// A record in store form: the indexed header plus the full JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub kind: String,
    pub id: String,
    pub name: String,
    pub external_id: String,
    pub manager_id: String,
    pub status: String,
    pub body: Value,
}

impl Document {
    pub fn from_record<R: Record>(record: &R) -> StoreResult<Self> {
        let base: &ResourceBase = record.base();
        Ok(Self {
            kind: R::KIND.to_string(),
            id: base.id.clone(),
            name: base.name.clone(),
            external_id: base.external_id.clone(),
            manager_id: base.manager_id.clone(),
            status: base.status.clone(),
            body: serde_json::to_value(record)?,
        })
    }

    pub fn into_record<R: Record>(self) -> StoreResult<R> {
        serde_json::from_value(self.body).map_err(|e| StoreError::Decode {
            kind: R::KIND,
            id: self.id,
            reason: e.to_string(),
        })
    }
}

/// Which records of a kind a query selects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub manager_id: Option<String>,
    /// Skip records without an external id.
    pub external_only: bool,
    pub fields: Vec<(&'static str, String)>,
}

impl Scope {
    /// Every record of the kind.
    pub fn all() -> Self {
        Self::default()
    }

    /// Synced records owned by `manager_id`: the set a reconciler compares.
    pub fn managed_by(manager_id: impl Into<String>) -> Self {
        Self {
            manager_id: Some(manager_id.into()),
            external_only: true,
            fields: Vec::new(),
        }
    }

    /// Adds an equality condition on a document field.
    pub fn with(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((field, value.into()));
        self
    }
}

/// A reference from child records to a parent, as `(child kind, field)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRef {
    pub kind: &'static str,
    pub field: &'static str,
}

impl ChildRef {
    pub const fn new(kind: &'static str, field: &'static str) -> Self {
        Self { kind, field }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// Top-level field differences between two versions of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diff {
    pub changes: Vec<FieldChange>,
}

impl Diff {
    /// Compares two JSON objects key by key. `updated_at` is ignored.
    pub fn between(before: &Value, after: &Value) -> Self {
        let empty = serde_json::Map::new();
        let old = before.as_object().unwrap_or(&empty);
        let new = after.as_object().unwrap_or(&empty);

        let mut fields: Vec<&String> = old.keys().chain(new.keys()).collect();
        fields.sort();
        fields.dedup();

        let changes = fields
            .into_iter()
            .filter(|f| f.as_str() != "updated_at")
            .filter_map(|f| {
                let o = old.get(f).cloned().unwrap_or(Value::Null);
                let n = new.get(f).cloned().unwrap_or(Value::Null);
                (o != n).then(|| FieldChange {
                    field: f.clone(),
                    old: o,
                    new: n,
                })
            })
            .collect();

        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.changes.iter().map(|c| c.field.as_str()).collect()
    }
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn query(&self, kind: &str, scope: &Scope) -> StoreResult<Vec<Document>>;

    async fn get(&self, kind: &str, id: &str) -> StoreResult<Option<Document>>;

    async fn insert(&self, doc: &Document) -> StoreResult<()>;

    /// Fails with [`StoreError::NotFound`] if the record is gone.
    async fn update(&self, doc: &Document) -> StoreResult<()>;

    /// Returns false if the record was already gone.
    async fn delete(&self, kind: &str, id: &str) -> StoreResult<bool>;

    async fn name_exists(&self, kind: &str, name: &str, exclude_id: Option<&str>)
        -> StoreResult<bool>;

    async fn count_referencing(&self, kind: &str, field: &str, value: &str) -> StoreResult<u64>;

    async fn delete_referencing(&self, kind: &str, field: &str, value: &str) -> StoreResult<u64>;
}

/// Typed facade over a [`LocalStore`]. Cheap to clone.
#[derive(Clone)]
pub struct RecordStore {
    inner: Arc<dyn LocalStore>,
}

impl RecordStore {
    pub fn new(inner: Arc<dyn LocalStore>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<dyn LocalStore> {
        &self.inner
    }

    pub async fn query<R: Record>(&self, scope: &Scope) -> StoreResult<Vec<R>> {
        self.inner
            .query(R::KIND, scope)
            .await?
            .into_iter()
            .map(Document::into_record)
            .collect()
    }

    pub async fn get<R: Record>(&self, id: &str) -> StoreResult<Option<R>> {
        self.inner
            .get(R::KIND, id)
            .await?
            .map(Document::into_record)
            .transpose()
    }

    /// Finds the record of `manager_id` mirroring remote `external_id`.
    pub async fn find_external<R: Record>(
        &self,
        manager_id: &str,
        external_id: &str,
    ) -> StoreResult<Option<R>> {
        if external_id.is_empty() {
            return Ok(None);
        }
        let scope = Scope::managed_by(manager_id).with("external_id", external_id);
        Ok(self.query::<R>(&scope).await?.into_iter().next())
    }

    pub async fn list_in_region<R: Record + RegionScoped>(
        &self,
        region_id: &str,
    ) -> StoreResult<Vec<R>> {
        self.query(&Scope::all().with("cloudregion_id", region_id))
            .await
    }

    pub async fn list_in_zone<R: Record + ZoneScoped>(&self, zone_id: &str) -> StoreResult<Vec<R>> {
        self.query(&Scope::all().with("zone_id", zone_id)).await
    }

    pub async fn insert<R: Record>(&self, record: &R) -> StoreResult<()> {
        self.inner.insert(&Document::from_record(record)?).await
    }

    /// Applies `f` to a copy of `record` and writes it back if any field
    /// changed. Returns the new version and what changed.
    ///
    /// Callers hold the record's object lock, so the read-modify-write is
    /// not interleaved with another writer.
    pub async fn update_with<R, F, E>(&self, record: &R, f: F) -> Result<(R, Diff), E>
    where
        R: Record,
        F: FnOnce(&mut R) -> Result<(), E> + Send,
        E: From<StoreError> + Send,
    {
        let before = serde_json::to_value(record).map_err(StoreError::from)?;
        let mut draft = record.clone();
        f(&mut draft)?;
        let after = serde_json::to_value(&draft).map_err(StoreError::from)?;

        let diff = Diff::between(&before, &after);
        if !diff.is_empty() {
            draft.base_mut().updated_at = Utc::now();
            self.inner.update(&Document::from_record(&draft)?).await?;
        }
        Ok((draft, diff))
    }

    /// Checks that nothing in `guards` still references `record`.
    pub async fn validate_delete_condition<R: Record>(
        &self,
        record: &R,
        guards: &[ChildRef],
    ) -> StoreResult<()> {
        if record.base().disable_delete {
            return Err(StoreError::DeleteBlocked {
                kind: R::KIND,
                id: record.id().to_string(),
                reason: "delete protection is enabled".to_string(),
            });
        }
        for guard in guards {
            let count = self
                .inner
                .count_referencing(guard.kind, guard.field, record.id())
                .await?;
            if count > 0 {
                return Err(StoreError::DeleteBlocked {
                    kind: R::KIND,
                    id: record.id().to_string(),
                    reason: format!("{} {} still reference it", count, guard.kind),
                });
            }
        }
        Ok(())
    }

    pub async fn delete<R: Record>(&self, record: &R) -> StoreResult<bool> {
        self.inner.delete(R::KIND, record.id()).await
    }

    pub async fn delete_referencing(&self, child: ChildRef, parent_id: &str) -> StoreResult<u64> {
        self.inner
            .delete_referencing(child.kind, child.field, parent_id)
            .await
    }

    pub async fn name_exists(
        &self,
        kind: &str,
        name: &str,
        exclude_id: Option<&str>,
    ) -> StoreResult<bool> {
        self.inner.name_exists(kind, name, exclude_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::{Network, Wire};

    fn store() -> RecordStore {
        let db = Database::open_in_memory().unwrap();
        RecordStore::new(Arc::new(SqliteStore::new(db)))
    }

    fn wire(name: &str, external_id: &str, vpc_id: &str) -> Wire {
        let mut wire = Wire {
            base: ResourceBase::new(name),
            vpc_id: vpc_id.to_string(),
            ..Default::default()
        };
        wire.base.external_id = external_id.to_string();
        wire.base.manager_id = "p1".to_string();
        wire
    }

    #[test]
    fn test_diff_between() {
        let before = serde_json::json!({"name": "a", "bandwidth": 10, "updated_at": "x"});
        let after = serde_json::json!({"name": "b", "bandwidth": 10, "updated_at": "y", "new": 1});

        let diff = Diff::between(&before, &after);
        assert_eq!(diff.fields(), vec!["name", "new"]);
        assert_eq!(diff.changes[0].old, "a");
        assert_eq!(diff.changes[1].old, Value::Null);
        assert!(Diff::between(&before, &before).is_empty());
    }

    #[tokio::test]
    async fn test_query_scope() {
        let store = store();
        store.insert(&wire("w1", "e1", "v1")).await.unwrap();
        store.insert(&wire("w2", "e2", "v2")).await.unwrap();
        store.insert(&wire("w3", "", "v1")).await.unwrap();

        let scoped: Vec<Wire> = store
            .query(&Scope::managed_by("p1").with("vpc_id", "v1"))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].base.name, "w1");

        let all: Vec<Wire> = store.query(&Scope::all()).await.unwrap();
        assert_eq!(all.len(), 3);

        let found: Option<Wire> = store.find_external("p1", "e2").await.unwrap();
        assert_eq!(found.unwrap().base.name, "w2");
        let missing: Option<Wire> = store.find_external("p2", "e2").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_update_with_only_writes_on_change() {
        let store = store();
        let original = wire("w1", "e1", "v1");
        store.insert(&original).await.unwrap();

        let (same, diff) = store
            .update_with(&original, |_w: &mut Wire| Ok::<(), StoreError>(()))
            .await
            .unwrap();
        assert!(diff.is_empty());
        assert_eq!(same.base.updated_at, original.base.updated_at);

        let (updated, diff) = store
            .update_with(&original, |w: &mut Wire| {
                w.bandwidth = 100;
                Ok::<(), StoreError>(())
            })
            .await
            .unwrap();
        assert_eq!(diff.fields(), vec!["bandwidth"]);
        assert!(updated.base.updated_at >= original.base.updated_at);

        let stored: Wire = store.get(&original.base.id).await.unwrap().unwrap();
        assert_eq!(stored.bandwidth, 100);
    }

    #[tokio::test]
    async fn test_update_with_missing_record() {
        let store = store();
        let ghost = wire("ghost", "e9", "v1");
        let err = store
            .update_with(&ghost, |w: &mut Wire| {
                w.bandwidth = 1;
                Ok::<(), StoreError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_validate_delete_condition() {
        let store = store();
        let w = wire("w1", "e1", "v1");
        store.insert(&w).await.unwrap();
        let guards = [ChildRef::new(Network::KIND, "wire_id")];

        store.validate_delete_condition(&w, &guards).await.unwrap();

        let network = Network {
            base: ResourceBase::new("n1"),
            wire_id: w.base.id.clone(),
            ..Default::default()
        };
        store.insert(&network).await.unwrap();
        let err = store
            .validate_delete_condition(&w, &guards)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DeleteBlocked { .. }));

        let mut protected = wire("w2", "e2", "v1");
        protected.base.disable_delete = true;
        assert!(store
            .validate_delete_condition(&protected, &[])
            .await
            .is_err());
    }
}
