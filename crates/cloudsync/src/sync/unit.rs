//! The (provider, region) pairing that is scheduled and synced as a whole.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::config::SyncConfig;
use crate::db::sync_unit_repo::SyncUnitRow;
use crate::db::DatabaseError;
use crate::model::{Host, Network, Record};
use crate::result::SyncResultSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    /// Picked for a sync that has not been submitted yet.
    Queuing,
    Queued,
    Syncing,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Queuing => "queuing",
            SyncStatus::Queued => "queued",
            SyncStatus::Syncing => "syncing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(SyncStatus::Idle),
            "queuing" => Some(SyncStatus::Queuing),
            "queued" => Some(SyncStatus::Queued),
            "syncing" => Some(SyncStatus::Syncing),
            _ => None,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncUnit {
    pub id: String,
    pub provider_id: String,
    /// Local region id.
    pub region_id: String,
    pub enabled: bool,
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_end_at: Option<DateTime<Utc>>,
    pub last_auto_sync_at: Option<DateTime<Utc>>,
    pub last_deep_sync_at: Option<DateTime<Utc>>,
    pub sync_results: Option<SyncResultSet>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncUnit {
    pub fn new(provider_id: impl Into<String>, region_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            provider_id: provider_id.into(),
            region_id: region_id.into(),
            enabled: true,
            sync_status: SyncStatus::Idle,
            last_sync_at: None,
            last_sync_end_at: None,
            last_auto_sync_at: None,
            last_deep_sync_at: None,
            sync_results: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a new sync may start. A unit left queued or syncing longer
    /// than `stale_after` is assumed abandoned.
    pub fn can_sync(&self, stale_after: Duration, now: DateTime<Utc>) -> bool {
        match self.sync_status {
            SyncStatus::Queued | SyncStatus::Syncing => match self.last_sync_at {
                None => true,
                Some(at) => elapsed(at, now) > stale_after,
            },
            SyncStatus::Idle | SyncStatus::Queuing => true,
        }
    }

    /// Whether the last sync saw nothing new for the kind that tells if the
    /// region is in use. Units without stored results are not empty.
    pub fn is_empty_region(&self, on_premise: bool) -> bool {
        let keyword = if on_premise { Host::KIND } else { Network::KIND };
        self.sync_results
            .as_ref()
            .is_some_and(|results| results.is_empty_for(keyword))
    }

    /// Interval until the next sync. Empty regions are polled less often,
    /// but never less than once per `max_interval`.
    pub fn sync_interval(&self, config: &SyncConfig, on_premise: bool) -> Duration {
        let base = config.sync_interval();
        if !self.is_empty_region(on_premise) {
            return base;
        }
        base.saturating_mul(config.empty_region_multiplier)
            .min(config.max_interval().max(base))
    }

    pub fn need_sync(&self, config: &SyncConfig, on_premise: bool, now: DateTime<Utc>) -> bool {
        match self.last_sync_end_at {
            None => true,
            Some(end) => elapsed(end, now) > self.sync_interval(config, on_premise),
        }
    }

    /// Like [`need_sync`](Self::need_sync), but the first automatic sync
    /// of a unit is always due.
    pub fn need_auto_sync(&self, config: &SyncConfig, on_premise: bool, now: DateTime<Utc>) -> bool {
        self.last_auto_sync_at.is_none() || self.need_sync(config, on_premise, now)
    }

    pub fn should_deep_sync(&self, config: &SyncConfig, now: DateTime<Utc>) -> bool {
        match self.last_deep_sync_at {
            None => true,
            Some(at) => elapsed(at, now) > config.deep_sync_interval(),
        }
    }

    /// Duration of the last completed sync, rounded to whole seconds.
    pub fn last_sync_cost(&self) -> Option<Duration> {
        let (start, end) = (self.last_sync_at?, self.last_sync_end_at?);
        let millis = (end - start).num_milliseconds().max(0);
        let secs = u64::try_from((millis + 500) / 1000).unwrap_or(0);
        Some(Duration::from_secs(secs))
    }

    /// Single-flight key: the region's external id, or the provider id for
    /// regions without one.
    pub fn task_key(&self, region_external_id: &str) -> String {
        if region_external_id.is_empty() {
            self.provider_id.clone()
        } else {
            region_external_id.to_string()
        }
    }

    pub fn from_row(row: SyncUnitRow) -> Result<Self, DatabaseError> {
        let sync_status =
            SyncStatus::parse(&row.sync_status).ok_or_else(|| DatabaseError::Corrupt {
                column: "sync_status",
                reason: format!("unknown status '{}'", row.sync_status),
            })?;
        let sync_results = row
            .sync_results
            .as_deref()
            .map(SyncResultSet::from_json)
            .transpose()
            .map_err(|e| DatabaseError::Corrupt {
                column: "sync_results",
                reason: e.to_string(),
            })?;

        Ok(Self {
            sync_status,
            sync_results,
            last_sync_at: parse_opt(row.last_sync_at.as_deref(), "last_sync_at")?,
            last_sync_end_at: parse_opt(row.last_sync_end_at.as_deref(), "last_sync_end_at")?,
            last_auto_sync_at: parse_opt(row.last_auto_sync_at.as_deref(), "last_auto_sync_at")?,
            last_deep_sync_at: parse_opt(row.last_deep_sync_at.as_deref(), "last_deep_sync_at")?,
            created_at: parse(&row.created_at, "created_at")?,
            updated_at: parse(&row.updated_at, "updated_at")?,
            id: row.id,
            provider_id: row.provider_id,
            region_id: row.region_id,
            enabled: row.enabled,
        })
    }

    pub fn to_row(&self) -> Result<SyncUnitRow, DatabaseError> {
        let sync_results = self
            .sync_results
            .as_ref()
            .map(SyncResultSet::to_json)
            .transpose()
            .map_err(|e| DatabaseError::Corrupt {
                column: "sync_results",
                reason: e.to_string(),
            })?;

        Ok(SyncUnitRow {
            id: self.id.clone(),
            provider_id: self.provider_id.clone(),
            region_id: self.region_id.clone(),
            enabled: self.enabled,
            sync_status: self.sync_status.as_str().to_string(),
            last_sync_at: self.last_sync_at.map(stamp),
            last_sync_end_at: self.last_sync_end_at.map(stamp),
            last_auto_sync_at: self.last_auto_sync_at.map(stamp),
            last_deep_sync_at: self.last_deep_sync_at.map(stamp),
            sync_results,
            created_at: stamp(self.created_at),
            updated_at: stamp(self.updated_at),
        })
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

fn stamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse(value: &str, column: &'static str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt {
            column,
            reason: format!("'{}': {}", value, e),
        })
}

fn parse_opt(
    value: Option<&str>,
    column: &'static str,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.map(|v| parse(v, column)).transpose()
}
