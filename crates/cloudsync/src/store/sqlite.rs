//! [`LocalStore`] over the `resources` table.
//!
//! rusqlite is blocking; calls run on tokio's blocking pool so a slow disk
//! never stalls the reactor driving remote fetches.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use super::{Document, LocalStore, Scope, StoreError, StoreResult};
use crate::db::resource_repo::{self, ResourceFilter, ResourceRow};
use crate::db::{Database, DatabaseError};

#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
    {
        let db = self.db.clone();
        match tokio::task::spawn_blocking(move || f(&db)).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(e) => Err(StoreError::Task(e.to_string())),
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_row(doc: &Document) -> ResourceRow {
    let stamp = now();
    ResourceRow {
        kind: doc.kind.clone(),
        id: doc.id.clone(),
        name: doc.name.clone(),
        external_id: doc.external_id.clone(),
        manager_id: doc.manager_id.clone(),
        status: doc.status.clone(),
        doc: doc.body.to_string(),
        created_at: stamp.clone(),
        updated_at: stamp,
    }
}

fn from_row(row: ResourceRow) -> Result<Document, DatabaseError> {
    let body = serde_json::from_str(&row.doc).map_err(|e| DatabaseError::Corrupt {
        column: "doc",
        reason: format!("{} '{}': {}", row.kind, row.id, e),
    })?;
    Ok(Document {
        kind: row.kind,
        id: row.id,
        name: row.name,
        external_id: row.external_id,
        manager_id: row.manager_id,
        status: row.status,
        body,
    })
}

fn to_filter(scope: &Scope) -> ResourceFilter {
    ResourceFilter {
        manager_id: scope.manager_id.clone(),
        external_only: scope.external_only,
        fields: scope
            .fields
            .iter()
            .map(|(f, v)| (f.to_string(), v.clone()))
            .collect(),
    }
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn query(&self, kind: &str, scope: &Scope) -> StoreResult<Vec<Document>> {
        let kind = kind.to_string();
        let filter = to_filter(scope);
        self.blocking(move |db| {
            resource_repo::query(db, &kind, &filter)?
                .into_iter()
                .map(from_row)
                .collect()
        })
        .await
    }

    async fn get(&self, kind: &str, id: &str) -> StoreResult<Option<Document>> {
        let (kind, id) = (kind.to_string(), id.to_string());
        self.blocking(move |db| resource_repo::find_by_id(db, &kind, &id)?.map(from_row).transpose())
            .await
    }

    async fn insert(&self, doc: &Document) -> StoreResult<()> {
        let row = to_row(doc);
        self.blocking(move |db| resource_repo::insert(db, &row)).await
    }

    async fn update(&self, doc: &Document) -> StoreResult<()> {
        let row = to_row(doc);
        let (kind, id) = (row.kind.clone(), row.id.clone());
        let found = self
            .blocking(move |db| resource_repo::update(db, &row))
            .await?;
        if found {
            Ok(())
        } else {
            Err(StoreError::NotFound { kind, id })
        }
    }

    async fn delete(&self, kind: &str, id: &str) -> StoreResult<bool> {
        let (kind, id) = (kind.to_string(), id.to_string());
        self.blocking(move |db| resource_repo::delete(db, &kind, &id))
            .await
    }

    async fn name_exists(
        &self,
        kind: &str,
        name: &str,
        exclude_id: Option<&str>,
    ) -> StoreResult<bool> {
        let (kind, name) = (kind.to_string(), name.to_string());
        let exclude = exclude_id.map(str::to_string);
        self.blocking(move |db| resource_repo::name_exists(db, &kind, &name, exclude.as_deref()))
            .await
    }

    async fn count_referencing(&self, kind: &str, field: &str, value: &str) -> StoreResult<u64> {
        let (kind, field, value) = (kind.to_string(), field.to_string(), value.to_string());
        self.blocking(move |db| resource_repo::count_referencing(db, &kind, &field, &value))
            .await
    }

    async fn delete_referencing(&self, kind: &str, field: &str, value: &str) -> StoreResult<u64> {
        let (kind, field, value) = (kind.to_string(), field.to_string(), value.to_string());
        self.blocking(move |db| resource_repo::delete_referencing(db, &kind, &field, &value))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_document_round_trip_through_rows() {
        let store = SqliteStore::new(Database::open_in_memory().unwrap());
        let doc = Document {
            kind: "vpcs".to_string(),
            id: "v1".to_string(),
            name: "default".to_string(),
            external_id: "vpc-123".to_string(),
            manager_id: "p1".to_string(),
            status: "available".to_string(),
            body: serde_json::json!({"id": "v1", "cidr_block": "10.0.0.0/8"}),
        };
        store.insert(&doc).await.unwrap();

        let found = store.get("vpcs", "v1").await.unwrap().unwrap();
        assert_eq!(found, doc);
        assert!(store.delete("vpcs", "v1").await.unwrap());
        assert!(store.get("vpcs", "v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = SqliteStore::new(Database::open_in_memory().unwrap());
        let doc = Document {
            kind: "vpcs".to_string(),
            id: "nope".to_string(),
            name: "nope".to_string(),
            external_id: String::new(),
            manager_id: String::new(),
            status: String::new(),
            body: serde_json::json!({}),
        };
        assert!(matches!(
            store.update(&doc).await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
