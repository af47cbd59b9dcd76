use std::path::Path;

use crate::config::schema::SyncConfig;
use crate::error::ConfigError;

/// Serialization of a config document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Picks the format from a file extension. Anything that is not
    /// `.yaml`/`.yml` is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                ConfigFormat::Yaml
            }
            _ => ConfigFormat::Json,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SyncConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, ConfigFormat::from_path(path))
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<SyncConfig, ConfigError> {
    let config: SyncConfig = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &SyncConfig) -> Result<(), ConfigError> {
    let positive = [
        ("sync_interval_secs", config.sync_interval_secs),
        ("max_interval_secs", config.max_interval_secs),
        ("stale_after_secs", config.stale_after_secs),
        ("fetch_timeout_secs", config.fetch_timeout_secs),
        ("deep_sync_interval_secs", config.deep_sync_interval_secs),
        ("sweep_interval_secs", config.sweep_interval_secs),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(ConfigError::Validation {
                message: format!("{} must be greater than zero", name),
            });
        }
    }

    if config.empty_region_multiplier == 0 {
        return Err(ConfigError::Validation {
            message: "empty_region_multiplier must be at least 1".to_string(),
        });
    }

    if config.max_concurrent_syncs == 0 {
        return Err(ConfigError::Validation {
            message: "max_concurrent_syncs must be at least 1".to_string(),
        });
    }

    if config.max_interval_secs < config.sync_interval_secs {
        return Err(ConfigError::Validation {
            message: format!(
                "max_interval_secs ({}) is shorter than sync_interval_secs ({})",
                config.max_interval_secs, config.sync_interval_secs
            ),
        });
    }

    if config.logging.filter.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "logging.filter must not be empty".to_string(),
        });
    }

    Ok(())
}
