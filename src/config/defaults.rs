//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Server
// ============================================================================

/// Default HTTP bind address.
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Env var overriding the bind address.
pub const SERVER_ADDR_ENV: &str = "CARESYNQ_SERVER_ADDR";

// ============================================================================
// Storage
// ============================================================================

/// Default data directory for the sled database and lock file.
pub const DATA_DIR: &str = "./data";

/// Sled database directory name inside the data directory.
pub const DB_DIR_NAME: &str = "sensor_readings.db";

// ============================================================================
// Ingestion
// ============================================================================

/// Largest accepted upload body (bytes). 16 MiB is ~4 000 frames.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Uploads with at least this many frames are analyzed on the rayon pool.
pub const PARALLEL_MIN_FRAMES: usize = 8;

/// Default look-back window for readings queries (hours).
pub const READINGS_WINDOW_HOURS: u32 = 24;

// ============================================================================
// Config file discovery
// ============================================================================

/// Env var pointing at a config file.
pub const CONFIG_PATH_ENV: &str = "CARESYNQ_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "caresynq.toml";
