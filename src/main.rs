//! CareSynq - pressure-mat ingestion service
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API
//! cargo run --release -- serve
//!
//! # Ingest a CSV export for patient 42 without starting the server
//! ./caresynq ingest --patient-id 42 --file mat_export.csv
//! ```
//!
//! # Environment Variables
//!
//! - `CARESYNQ_CONFIG`: Path to a TOML config file (default: `./caresynq.toml`)
//! - `CARESYNQ_SERVER_ADDR`: HTTP bind address (default: `0.0.0.0:8080`)
//! - `CARESYNQ_CORS_ORIGINS`: Comma-separated origins allowed by CORS
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use caresynq::api::{create_app, ApiState};
use caresynq::config::AppConfig;
use caresynq::storage::{ProcessLock, SledStore};
use caresynq::{IngestionPipeline, PatientId, UploadService};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "caresynq")]
#[command(about = "CareSynq pressure-mat ingestion and alerting")]
#[command(version)]
struct CliArgs {
    /// Override the data directory (default from config: "./data")
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Serve the HTTP API
    Serve {
        /// Override the server address (default: "0.0.0.0:8080")
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Ingest one CSV export and exit
    Ingest {
        /// Patient the upload belongs to
        #[arg(long)]
        patient_id: u32,
        /// Path to the CSV export
        #[arg(long)]
        file: PathBuf,
    },
}

// ============================================================================
// Commands
// ============================================================================

fn build_service(config: &AppConfig) -> Result<(Arc<SledStore>, UploadService)> {
    let db_path = config.storage.db_path();
    let store = Arc::new(
        SledStore::open(&db_path)
            .with_context(|| format!("Failed to open sensor storage at {}", db_path.display()))?,
    );
    info!("✓ Sensor storage opened at {}", db_path.display());

    let pipeline =
        IngestionPipeline::new().with_parallel_min_frames(config.ingest.parallel_min_frames);
    Ok((store.clone(), UploadService::new(store, pipeline)))
}

async fn run_serve(config: AppConfig, cancel_token: CancellationToken) -> Result<()> {
    let _process_lock = ProcessLock::acquire(&config.storage.data_dir)?;
    let (store, service) = build_service(&config)?;

    let server_addr = config.server.addr.clone();
    let app = create_app(ApiState::new(service, config));

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;
    info!("✓ HTTP server listening on {}", server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            info!("[HttpServer] Received shutdown signal");
        })
        .await
        .map_err(|e| {
            error!("[HttpServer] Server error: {}", e);
            anyhow::anyhow!("HTTP server error: {}", e)
        })?;

    store.flush().context("Failed to flush sensor storage")?;
    info!("[HttpServer] Graceful shutdown complete");
    Ok(())
}

fn run_ingest(config: &AppConfig, patient_id: u32, file: &Path) -> Result<()> {
    let raw = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let (store, service) = build_service(config)?;

    let receipt = service
        .upload_bytes(PatientId(patient_id), &raw, Utc::now())
        .with_context(|| format!("Failed to ingest {}", file.display()))?;

    info!(
        "📊 Patient {}: {} readings stored ({} alerts, {} frames skipped), machine {}",
        receipt.patient_id,
        receipt.record_count,
        receipt.alert_count,
        receipt.skipped_frames,
        receipt.sensor_machine_id
    );
    store.flush().context("Failed to flush sensor storage")?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let mut config = AppConfig::load();
    config.apply_env_overrides();
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = dir;
    }

    match args.command {
        SubCommand::Serve { addr } => {
            if let Some(addr) = addr {
                config.server.addr = addr;
            }
            config.validate()?;

            let cancel_token = CancellationToken::new();
            let shutdown_token = cancel_token.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("🛑 Received Ctrl+C, initiating shutdown...");
                shutdown_token.cancel();
            });

            run_serve(config, cancel_token).await?;
        }
        SubCommand::Ingest { patient_id, file } => {
            config.validate()?;
            run_ingest(&config, patient_id, &file)?;
        }
    }

    info!("✓ CareSynq shutdown complete");
    Ok(())
}
