//! Pressure Analysis
//!
//! Per-frame clinical metrics and upload-level summaries.
//!
//! Contact area and alerting use raw pixel counts over fixed thresholds.
//! There is no connected-region clustering: a "sustained region" is simply
//! ten or more high-pressure pixels anywhere on the mat.

pub mod metrics;

pub use metrics::{analyze, summarize, UploadSummary};
