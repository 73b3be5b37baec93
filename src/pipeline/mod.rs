//! Ingestion Pipeline
//!
//! ```text
//! PHASE 1: Decode     raw CSV -> 32x32 frames (serial, order-preserving)
//! PHASE 2: Resolve    find or provision the patient's sensor machine
//! PHASE 3: Analyze    frame -> metrics (rayon for larger uploads)
//! PHASE 4: Timestamp  backfill from "now" using the final frame count
//! PHASE 5: Persist    atomic bulk append (UploadService only)
//! ```
//!
//! An upload either yields every record or fails; nothing is persisted for
//! a failed upload.

pub mod ingest;
pub mod service;

pub use ingest::{frame_timestamp, ingest, IngestBatch, IngestError, IngestionPipeline};
pub use service::{UploadReceipt, UploadService};
