//! Application configuration loaded from TOML
//!
//! Every field has a default, so an empty or missing file is valid.
//! Clinical thresholds are not configurable and do not appear here.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ingest: IngestConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server bind address.
    ///
    /// Can be overridden by `CARESYNQ_SERVER_ADDR` env var or `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the sled database and the process lock
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(defaults::DATA_DIR)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(defaults::DB_DIR_NAME)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Largest accepted upload body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Frame count at which analysis moves to the rayon pool
    #[serde(default = "default_parallel_min_frames")]
    pub parallel_min_frames: usize,

    /// Look-back window for readings queries without `hours`
    #[serde(default = "default_window_hours")]
    pub default_window_hours: u32,
}

fn default_max_upload_bytes() -> usize {
    defaults::MAX_UPLOAD_BYTES
}

fn default_parallel_min_frames() -> usize {
    defaults::PARALLEL_MIN_FRAMES
}

fn default_window_hours() -> u32 {
    defaults::READINGS_WINDOW_HOURS
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            parallel_min_frames: default_parallel_min_frames(),
            default_window_hours: default_window_hours(),
        }
    }
}

impl AppConfig {
    /// Load configuration using the standard search order:
    /// 1. `$CARESYNQ_CONFIG`
    /// 2. `./caresynq.toml`
    /// 3. Built-in defaults
    ///
    /// A file that fails to load is logged and skipped.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_PATH_ENV) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from CARESYNQ_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from CARESYNQ_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "CARESYNQ_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./caresynq.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./caresynq.toml, using defaults");
                }
            }
        }

        info!("No caresynq.toml found, using built-in defaults");
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `CARESYNQ_SERVER_ADDR` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var(defaults::SERVER_ADDR_ENV) {
            self.server.addr = addr;
        }
    }

    /// Validate values for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.server.addr.parse::<SocketAddr>().is_err() {
            errors.push(format!(
                "server.addr: '{}' is not a valid socket address",
                self.server.addr
            ));
        }
        if self.ingest.max_upload_bytes == 0 {
            errors.push("ingest.max_upload_bytes: must be > 0".to_string());
        }
        if self.ingest.default_window_hours == 0 {
            errors.push("ingest.default_window_hours: must be > 0".to_string());
        }
        if self.storage.data_dir.as_os_str().is_empty() {
            errors.push("storage.data_dir: must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok(), "Default config must always validate");
    }

    #[test]
    fn test_empty_toml_produces_defaults() {
        let config: AppConfig = toml::from_str("").expect("empty TOML should parse");
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(config.ingest.max_upload_bytes, 16 * 1024 * 1024);
        assert_eq!(config.ingest.default_window_hours, 24);
    }

    #[test]
    fn test_partial_toml_override() {
        let toml_str = r#"
[server]
addr = "127.0.0.1:9000"

[ingest]
default_window_hours = 48
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("partial TOML should parse");
        assert_eq!(config.server.addr, "127.0.0.1:9000");
        assert_eq!(config.ingest.default_window_hours, 48);
        // Non-overridden values retain defaults
        assert_eq!(config.ingest.parallel_min_frames, 8);
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = AppConfig::default();
        config.server.addr = "not-an-address".to_string();
        config.ingest.max_upload_bytes = 0;
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.iter().any(|e| e.contains("server.addr")));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caresynq.toml");
        std::fs::write(&path, "[storage]\ndata_dir = \"/var/lib/caresynq\"\n").unwrap();

        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.storage.db_path(), PathBuf::from("/var/lib/caresynq/sensor_readings.db"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let err = AppConfig::load_from_file(Path::new("/nonexistent/caresynq.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }

    #[test]
    fn test_roundtrip_toml() {
        let original = AppConfig::default();
        let toml_str = original.to_toml().expect("serialization should work");
        let roundtripped: AppConfig = toml::from_str(&toml_str).expect("deserialization should work");
        assert_eq!(original.server.addr, roundtripped.server.addr);
        assert_eq!(original.ingest.max_upload_bytes, roundtripped.ingest.max_upload_bytes);
    }
}
