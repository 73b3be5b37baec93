//! CareSynq: pressure-mat ingestion and alerting
//!
//! Turns raw 32x32 pressure-mat CSV uploads into analyzed, alert-annotated
//! sensor records for clinical review.
//!
//! ## Architecture
//!
//! - **Acquisition**: CSV → 32x32 frames, tolerant of malformed rows and cells
//! - **Analysis**: peak pressure, contact area, pressure-injury alert per frame
//! - **Pipeline**: upload orchestration, device auto-provisioning, timestamp backfill
//! - **Storage**: device registry and reading store (in-memory, sled)
//! - **API**: axum HTTP surface for uploads and dashboard queries

pub mod acquisition;
pub mod analysis;
pub mod api;
pub mod config;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use config::AppConfig;

pub use types::{
    AlertTrigger, FrameMetrics, PatientId, PressureFrame, ReadingSummary, SensorMachine,
    SensorMachineId, SensorRecord,
};

pub use acquisition::decode;
pub use analysis::analyze;
pub use pipeline::{ingest, IngestError, IngestionPipeline, UploadReceipt, UploadService};

pub use storage::{
    InMemoryStore, PersistenceError, RecordSink, SensorMachineRegistry, SledStore, Store,
};
