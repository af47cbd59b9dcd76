//! Sync unit repository: CRUD operations for the `sync_units` table.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw sync unit row. Timestamps are RFC 3339 strings.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncUnitRow {
    pub id: String,
    pub provider_id: String,
    pub region_id: String,
    pub enabled: bool,
    pub sync_status: String,
    pub last_sync_at: Option<String>,
    pub last_sync_end_at: Option<String>,
    pub last_auto_sync_at: Option<String>,
    pub last_deep_sync_at: Option<String>,
    pub sync_results: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SyncUnitRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            provider_id: row.get("provider_id")?,
            region_id: row.get("region_id")?,
            enabled: row.get("enabled")?,
            sync_status: row.get("sync_status")?,
            last_sync_at: row.get("last_sync_at")?,
            last_sync_end_at: row.get("last_sync_end_at")?,
            last_auto_sync_at: row.get("last_auto_sync_at")?,
            last_deep_sync_at: row.get("last_deep_sync_at")?,
            sync_results: row.get("sync_results")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

fn first_row(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<SyncUnitRow>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query_map(params, SyncUnitRow::from_row)?;
    match rows.next() {
        Some(Ok(row)) => Ok(Some(row)),
        Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
        None => Ok(None),
    }
}

pub fn insert(db: &Database, unit: &SyncUnitRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sync_units (id, provider_id, region_id, enabled, sync_status,
             last_sync_at, last_sync_end_at, last_auto_sync_at, last_deep_sync_at,
             sync_results, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                unit.id,
                unit.provider_id,
                unit.region_id,
                unit.enabled,
                unit.sync_status,
                unit.last_sync_at,
                unit.last_sync_end_at,
                unit.last_auto_sync_at,
                unit.last_deep_sync_at,
                unit.sync_results,
                unit.created_at,
                unit.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Overwrites all mutable columns. Returns false if the unit does not exist.
pub fn update(db: &Database, unit: &SyncUnitRow) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE sync_units SET enabled=?2, sync_status=?3, last_sync_at=?4,
             last_sync_end_at=?5, last_auto_sync_at=?6, last_deep_sync_at=?7,
             sync_results=?8, updated_at=?9
             WHERE id=?1",
            params![
                unit.id,
                unit.enabled,
                unit.sync_status,
                unit.last_sync_at,
                unit.last_sync_end_at,
                unit.last_auto_sync_at,
                unit.last_deep_sync_at,
                unit.sync_results,
                unit.updated_at,
            ],
        )?;
        Ok(changed > 0)
    })
}

pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM sync_units WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

pub fn find_by_id(db: &Database, id: &str) -> Result<Option<SyncUnitRow>, DatabaseError> {
    db.with_conn(|conn| first_row(conn, "SELECT * FROM sync_units WHERE id = ?1", &[&id]))
}

/// Finds the unit pairing `provider_id` with `region_id`.
pub fn find_by_pair(
    db: &Database,
    provider_id: &str,
    region_id: &str,
) -> Result<Option<SyncUnitRow>, DatabaseError> {
    db.with_conn(|conn| {
        first_row(
            conn,
            "SELECT * FROM sync_units WHERE provider_id = ?1 AND region_id = ?2",
            &[&provider_id, &region_id],
        )
    })
}

pub fn list_by_provider(db: &Database, provider_id: &str) -> Result<Vec<SyncUnitRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM sync_units WHERE provider_id = ?1 ORDER BY created_at, rowid",
        )?;
        let rows = stmt
            .query_map(params![provider_id], SyncUnitRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

pub fn list_enabled(db: &Database) -> Result<Vec<SyncUnitRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM sync_units WHERE enabled = 1 ORDER BY created_at, rowid")?;
        let rows = stmt
            .query_map([], SyncUnitRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
