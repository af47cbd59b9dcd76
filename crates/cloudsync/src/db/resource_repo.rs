//! Resource repository: document rows in the `resources` table.
//!
//! Every record kind lives in the same table. Columns hold what queries
//! filter on; the full record is the JSON `doc`, and kind-specific fields
//! are reached with `json_extract`.

use rusqlite::types::ToSql;
use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw resource row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRow {
    pub kind: String,
    pub id: String,
    pub name: String,
    pub external_id: String,
    pub manager_id: String,
    pub status: String,
    pub doc: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ResourceRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            kind: row.get("kind")?,
            id: row.get("id")?,
            name: row.get("name")?,
            external_id: row.get("external_id")?,
            manager_id: row.get("manager_id")?,
            status: row.get("status")?,
            doc: row.get("doc")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Filter for [`query`]. All conditions are ANDed.
#[derive(Debug, Default, Clone)]
pub struct ResourceFilter {
    pub manager_id: Option<String>,
    /// Only rows that carry an external id.
    pub external_only: bool,
    /// `(field, value)` pairs matched against the JSON document.
    pub fields: Vec<(String, String)>,
}

fn json_path(field: &str) -> Result<String, DatabaseError> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DatabaseError::InvalidField(field.to_string()));
    }
    Ok(format!("$.{}", field))
}

pub fn insert(db: &Database, row: &ResourceRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO resources (kind, id, name, external_id, manager_id, status, doc,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                row.kind,
                row.id,
                row.name,
                row.external_id,
                row.manager_id,
                row.status,
                row.doc,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites a row. Returns false if no row with that kind and id exists.
pub fn update(db: &Database, row: &ResourceRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE resources SET name=?3, external_id=?4, manager_id=?5, status=?6, doc=?7,
             updated_at=?8
             WHERE kind=?1 AND id=?2",
            params![
                row.kind,
                row.id,
                row.name,
                row.external_id,
                row.manager_id,
                row.status,
                row.doc,
                row.updated_at,
            ],
        )?;
        Ok(changed > 0)
    })
}

pub fn delete(db: &Database, kind: &str, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM resources WHERE kind = ?1 AND id = ?2",
            params![kind, id],
        )?;
        Ok(changed > 0)
    })
}

pub fn find_by_id(db: &Database, kind: &str, id: &str) -> Result<Option<ResourceRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM resources WHERE kind = ?1 AND id = ?2")?;
        let mut rows = stmt.query_map(params![kind, id], ResourceRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Lists rows of `kind` matching `filter`, oldest first.
pub fn query(
    db: &Database,
    kind: &str,
    filter: &ResourceFilter,
) -> Result<Vec<ResourceRow>, DatabaseError> {
    let mut conditions = vec!["kind = ?1".to_string()];
    let mut param_values: Vec<Box<dyn ToSql>> = vec![Box::new(kind.to_string())];

    if let Some(ref manager_id) = filter.manager_id {
        param_values.push(Box::new(manager_id.clone()));
        conditions.push(format!("manager_id = ?{}", param_values.len()));
    }
    if filter.external_only {
        conditions.push("external_id != ''".to_string());
    }
    for (field, value) in &filter.fields {
        param_values.push(Box::new(json_path(field)?));
        let path_idx = param_values.len();
        param_values.push(Box::new(value.clone()));
        conditions.push(format!(
            "json_extract(doc, ?{}) = ?{}",
            path_idx,
            param_values.len()
        ));
    }

    let sql = format!(
        "SELECT * FROM resources WHERE {} ORDER BY created_at, rowid",
        conditions.join(" AND ")
    );

    db.with_conn(|conn| {
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), ResourceRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Whether a row of `kind` is named `name`, ignoring `exclude_id`.
pub fn name_exists(
    db: &Database,
    kind: &str,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM resources WHERE kind = ?1 AND name = ?2 AND id != ?3",
            params![kind, name, exclude_id.unwrap_or("")],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Counts rows of `kind` whose document field `field` equals `value`.
pub fn count_referencing(
    db: &Database,
    kind: &str,
    field: &str,
    value: &str,
) -> Result<u64, DatabaseError> {
    let path = json_path(field)?;
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM resources WHERE kind = ?1 AND json_extract(doc, ?2) = ?3",
            params![kind, path, value],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Deletes rows of `kind` whose document field `field` equals `value`.
pub fn delete_referencing(
    db: &Database,
    kind: &str,
    field: &str,
    value: &str,
) -> Result<u64, DatabaseError> {
    let path = json_path(field)?;
    db.with_conn(|conn| {
        let changed = conn.execute(
            "DELETE FROM resources WHERE kind = ?1 AND json_extract(doc, ?2) = ?3",
            params![kind, path, value],
        )?;
        Ok(changed as u64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(kind: &str, id: &str, external_id: &str, doc: serde_json::Value) -> ResourceRow {
        ResourceRow {
            kind: kind.to_string(),
            id: id.to_string(),
            name: id.to_string(),
            external_id: external_id.to_string(),
            manager_id: "provider-1".to_string(),
            status: "available".to_string(),
            doc: doc.to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let row = sample("wires", "w1", "e1", serde_json::json!({"vpc_id": "v1"}));
        insert(&db, &row).unwrap();

        let found = find_by_id(&db, "wires", "w1").unwrap().unwrap();
        assert_eq!(found, row);
        assert!(find_by_id(&db, "networks", "w1").unwrap().is_none());
    }

    #[test]
    fn test_update_and_delete() {
        let db = test_db();
        let mut row = sample("wires", "w1", "e1", serde_json::json!({}));
        insert(&db, &row).unwrap();

        row.name = "renamed".to_string();
        row.updated_at = "2026-01-02T00:00:00Z".to_string();
        assert!(update(&db, &row).unwrap());
        let found = find_by_id(&db, "wires", "w1").unwrap().unwrap();
        assert_eq!(found.name, "renamed");
        assert_eq!(found.created_at, "2026-01-01T00:00:00Z");

        assert!(delete(&db, "wires", "w1").unwrap());
        assert!(!delete(&db, "wires", "w1").unwrap());
        assert!(!update(&db, &row).unwrap());
    }

    #[test]
    fn test_query_by_document_field() {
        let db = test_db();
        insert(&db, &sample("wires", "w1", "e1", serde_json::json!({"vpc_id": "v1"}))).unwrap();
        insert(&db, &sample("wires", "w2", "e2", serde_json::json!({"vpc_id": "v2"}))).unwrap();
        insert(&db, &sample("wires", "w3", "", serde_json::json!({"vpc_id": "v1"}))).unwrap();

        let filter = ResourceFilter {
            manager_id: Some("provider-1".to_string()),
            external_only: true,
            fields: vec![("vpc_id".to_string(), "v1".to_string())],
        };
        let rows = query(&db, "wires", &filter).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["w1"]);

        let all = query(&db, "wires", &ResourceFilter::default()).unwrap();
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_invalid_field_rejected() {
        let db = test_db();
        let filter = ResourceFilter {
            fields: vec![("vpc_id') OR 1=1 --".to_string(), "x".to_string())],
            ..Default::default()
        };
        assert!(matches!(
            query(&db, "wires", &filter),
            Err(DatabaseError::InvalidField(_))
        ));
    }

    #[test]
    fn test_name_exists_excludes_self() {
        let db = test_db();
        insert(&db, &sample("vpcs", "v1", "e1", serde_json::json!({}))).unwrap();

        assert!(name_exists(&db, "vpcs", "v1", None).unwrap());
        assert!(!name_exists(&db, "vpcs", "v1", Some("v1")).unwrap());
        assert!(!name_exists(&db, "wires", "v1", None).unwrap());
    }

    #[test]
    fn test_referencing() {
        let db = test_db();
        insert(&db, &sample("networks", "n1", "e1", serde_json::json!({"wire_id": "w1"}))).unwrap();
        insert(&db, &sample("networks", "n2", "e2", serde_json::json!({"wire_id": "w1"}))).unwrap();
        insert(&db, &sample("networks", "n3", "e3", serde_json::json!({"wire_id": "w2"}))).unwrap();

        assert_eq!(count_referencing(&db, "networks", "wire_id", "w1").unwrap(), 2);
        assert_eq!(delete_referencing(&db, "networks", "wire_id", "w1").unwrap(), 2);
        assert_eq!(count_referencing(&db, "networks", "wire_id", "w1").unwrap(), 0);
        assert_eq!(count_referencing(&db, "networks", "wire_id", "w2").unwrap(), 1);
    }
}
