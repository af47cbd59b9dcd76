//! Persistence and status transitions of sync units.

use chrono::Utc;

use super::error::{Result, SyncError};
use super::range::SyncRange;
use super::unit::{SyncStatus, SyncUnit};
use crate::db::{sync_unit_repo, Database};
use crate::result::SyncResultSet;

/// Reads and writes [`SyncUnit`]s. Every transition is a read-modify-write
/// of one row, run on the blocking pool.
#[derive(Clone)]
pub struct SyncUnitManager {
    db: Database,
}

impl SyncUnitManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?
    }

    /// Returns the unit pairing `provider_id` with `region_id`, creating it
    /// on first attach.
    pub async fn attach(&self, provider_id: &str, region_id: &str) -> Result<SyncUnit> {
        let (provider_id, region_id) = (provider_id.to_string(), region_id.to_string());
        self.blocking(move |db| {
            if let Some(row) = sync_unit_repo::find_by_pair(db, &provider_id, &region_id)? {
                return Ok(SyncUnit::from_row(row)?);
            }
            let unit = SyncUnit::new(provider_id, region_id);
            sync_unit_repo::insert(db, &unit.to_row()?)?;
            log::info!(
                "Attached provider {} to region {}",
                unit.provider_id,
                unit.region_id
            );
            Ok(unit)
        })
        .await
    }

    /// Removes the unit pairing `provider_id` with `region_id`.
    pub async fn detach(&self, provider_id: &str, region_id: &str) -> Result<bool> {
        let (provider_id, region_id) = (provider_id.to_string(), region_id.to_string());
        self.blocking(move |db| match sync_unit_repo::find_by_pair(db, &provider_id, &region_id)? {
            Some(row) => {
                log::info!("Detached provider {} from region {}", provider_id, region_id);
                Ok(sync_unit_repo::delete(db, &row.id)?)
            }
            None => Ok(false),
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Result<SyncUnit> {
        let id = id.to_string();
        self.blocking(move |db| match sync_unit_repo::find_by_id(db, &id)? {
            Some(row) => Ok(SyncUnit::from_row(row)?),
            None => Err(SyncError::UnitNotFound(id)),
        })
        .await
    }

    pub async fn list_by_provider(&self, provider_id: &str) -> Result<Vec<SyncUnit>> {
        let provider_id = provider_id.to_string();
        self.blocking(move |db| {
            sync_unit_repo::list_by_provider(db, &provider_id)?
                .into_iter()
                .map(|row| SyncUnit::from_row(row).map_err(SyncError::from))
                .collect()
        })
        .await
    }

    pub async fn list_enabled(&self) -> Result<Vec<SyncUnit>> {
        self.blocking(|db| {
            sync_unit_repo::list_enabled(db)?
                .into_iter()
                .map(|row| SyncUnit::from_row(row).map_err(SyncError::from))
                .collect()
        })
        .await
    }

    /// Loads the unit, applies `f` and writes it back.
    async fn modify<F>(&self, id: &str, f: F) -> Result<SyncUnit>
    where
        F: FnOnce(&mut SyncUnit) -> Result<()> + Send + 'static,
    {
        let id = id.to_string();
        self.blocking(move |db| {
            let row = sync_unit_repo::find_by_id(db, &id)?
                .ok_or_else(|| SyncError::UnitNotFound(id.clone()))?;
            let mut unit = SyncUnit::from_row(row)?;
            f(&mut unit)?;
            unit.updated_at = Utc::now();
            if !sync_unit_repo::update(db, &unit.to_row()?)? {
                return Err(SyncError::UnitNotFound(id));
            }
            Ok(unit)
        })
        .await
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<SyncUnit> {
        self.modify(id, move |unit| {
            unit.enabled = enabled;
            Ok(())
        })
        .await
    }

    /// Marks the unit as picked for a coming sync, if `range` covers its
    /// region.
    pub async fn mark_starting_sync(&self, id: &str, range: &SyncRange) -> Result<SyncUnit> {
        let range = range.clone();
        self.modify(id, move |unit| {
            ensure_enabled(unit)?;
            if range.needs_region(&unit.region_id) {
                unit.sync_status = SyncStatus::Queuing;
            }
            Ok(())
        })
        .await
    }

    /// Reverts a [`mark_starting_sync`](Self::mark_starting_sync) that was
    /// not followed by a submission.
    pub async fn cancel_starting_sync(&self, id: &str) -> Result<SyncUnit> {
        self.modify(id, |unit| {
            if unit.sync_status == SyncStatus::Queuing {
                unit.sync_status = SyncStatus::Idle;
            }
            Ok(())
        })
        .await
    }

    /// Returns a queued unit to idle when no task will pick it up.
    pub async fn cancel_queued(&self, id: &str) -> Result<SyncUnit> {
        self.modify(id, |unit| {
            if unit.sync_status == SyncStatus::Queued {
                unit.sync_status = SyncStatus::Idle;
            }
            Ok(())
        })
        .await
    }

    pub async fn mark_queued(&self, id: &str) -> Result<SyncUnit> {
        self.modify(id, |unit| {
            ensure_enabled(unit)?;
            unit.sync_status = SyncStatus::Queued;
            Ok(())
        })
        .await
    }

    pub async fn mark_syncing(&self, id: &str) -> Result<SyncUnit> {
        self.modify(id, |unit| {
            ensure_enabled(unit)?;
            unit.sync_status = SyncStatus::Syncing;
            unit.last_sync_at = Some(Utc::now());
            unit.last_sync_end_at = None;
            Ok(())
        })
        .await
    }

    pub async fn mark_end_sync(
        &self,
        id: &str,
        results: SyncResultSet,
        deep_sync: bool,
    ) -> Result<SyncUnit> {
        self.modify(id, move |unit| {
            let now = Utc::now();
            unit.sync_status = SyncStatus::Idle;
            unit.last_sync_end_at = Some(now);
            unit.sync_results = Some(results);
            if deep_sync {
                unit.last_deep_sync_at = Some(now);
            }
            Ok(())
        })
        .await
    }

    pub async fn mark_auto_sync(&self, id: &str) -> Result<SyncUnit> {
        self.modify(id, |unit| {
            unit.last_auto_sync_at = Some(Utc::now());
            Ok(())
        })
        .await
    }

    pub async fn reset_auto_sync(&self, id: &str) -> Result<SyncUnit> {
        self.modify(id, |unit| {
            unit.last_auto_sync_at = None;
            Ok(())
        })
        .await
    }
}

fn ensure_enabled(unit: &SyncUnit) -> Result<()> {
    if unit.enabled {
        Ok(())
    } else {
        Err(SyncError::UnitDisabled {
            provider_id: unit.provider_id.clone(),
            region_id: unit.region_id.clone(),
        })
    }
}
