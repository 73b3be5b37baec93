//! Application Configuration
//!
//! ## Loading Order
//!
//! 1. `CARESYNQ_CONFIG` environment variable (path to TOML file)
//! 2. `caresynq.toml` in the current working directory
//! 3. Built-in defaults
//!
//! `CARESYNQ_SERVER_ADDR` and the `--addr` CLI flag override `server.addr`.

mod app_config;
pub mod defaults;

pub use app_config::*;
