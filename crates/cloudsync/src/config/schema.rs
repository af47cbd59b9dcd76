use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime settings for the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base interval between automatic syncs of one region.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Factor applied to the interval for regions that look empty.
    #[serde(default = "default_empty_region_multiplier")]
    pub empty_region_multiplier: u32,

    /// Upper bound for the stretched interval.
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,

    /// Age after which a queued or syncing unit is assumed dead.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Deadline for a single remote fetch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Maximum age of the last deep sync before one is forced.
    #[serde(default = "default_deep_sync_interval_secs")]
    pub deep_sync_interval_secs: u64,

    /// Extra attempts for a region fetch that failed transiently.
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    /// First retry delay; doubles with every attempt.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_max_concurrent_syncs")]
    pub max_concurrent_syncs: usize,

    /// How often the auto-sync loop looks for due units.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_sync_interval_secs() -> u64 {
    300
}

fn default_empty_region_multiplier() -> u32 {
    8
}

fn default_max_interval_secs() -> u64 {
    86_400
}

fn default_stale_after_secs() -> u64 {
    900
}

fn default_fetch_timeout_secs() -> u64 {
    120
}

fn default_deep_sync_interval_secs() -> u64 {
    86_400
}

fn default_fetch_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    2_000
}

fn default_max_concurrent_syncs() -> usize {
    num_cpus::get()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            empty_region_multiplier: default_empty_region_multiplier(),
            max_interval_secs: default_max_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            deep_sync_interval_secs: default_deep_sync_interval_secs(),
            fetch_retries: default_fetch_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_concurrent_syncs: default_max_concurrent_syncs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            database_path: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn deep_sync_interval(&self) -> Duration {
        Duration::from_secs(self.deep_sync_interval_secs)
    }

    /// Delay before retry `attempt` (1-based).
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_base_delay_ms.saturating_mul(factor))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// The configured database path, or `~/.cloudsync/data/cloudsync.db`.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path
            .clone()
            .or_else(crate::db::default_database_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG` when set.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}
