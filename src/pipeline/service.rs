//! Upload service: ingestion plus bulk append as one operation

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;

use super::ingest::{IngestError, IngestionPipeline};
use crate::storage::{RecordSink, Store};
use crate::types::{PatientId, SensorMachineId};

/// What an accepted upload produced
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub patient_id: PatientId,
    pub sensor_machine_id: SensorMachineId,
    pub record_count: usize,
    pub alert_count: usize,
    pub skipped_frames: usize,
    pub max_peak_pressure: f64,
    pub mean_contact_area: f64,
    pub record_ids: Vec<u64>,
}

/// Shared handle used by the CLI and the HTTP handlers
#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn Store>,
    pipeline: IngestionPipeline,
}

impl UploadService {
    pub fn new(store: Arc<dyn Store>, pipeline: IngestionPipeline) -> Self {
        Self { store, pipeline }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Ingest and persist one upload.
    ///
    /// Records are appended only after the whole upload has been analyzed,
    /// and the append itself is atomic.
    pub fn upload(
        &self,
        patient_id: PatientId,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<UploadReceipt, IngestError> {
        let batch = self
            .pipeline
            .ingest(patient_id, raw, self.store.as_ref(), now)?;
        let record_ids = self.store.append_all(&batch.records)?;

        tracing::info!(
            patient_id = %patient_id,
            records = record_ids.len(),
            backend = self.store.backend_name(),
            "Upload persisted"
        );

        Ok(UploadReceipt {
            patient_id,
            sensor_machine_id: batch.machine.id,
            record_count: record_ids.len(),
            alert_count: batch.summary.alert_frames,
            skipped_frames: batch.decode_stats.skipped_windows,
            max_peak_pressure: batch.summary.max_peak_pressure,
            mean_contact_area: batch.summary.mean_contact_area,
            record_ids,
        })
    }

    /// Ingest raw upload bytes.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD, so a corrupt byte only spoils
    /// its own cell, which then falls back to the resting value.
    pub fn upload_bytes(
        &self,
        patient_id: PatientId,
        raw: &[u8],
        now: DateTime<Utc>,
    ) -> Result<UploadReceipt, IngestError> {
        let text = String::from_utf8_lossy(raw);
        if matches!(text, Cow::Owned(_)) {
            tracing::warn!(patient_id = %patient_id, "Upload contained invalid UTF-8");
        }
        self.upload(patient_id, &text, now)
    }

    /// Run `upload_bytes` on the blocking pool so the executor stays responsive.
    pub async fn upload_blocking(
        &self,
        patient_id: PatientId,
        raw: Vec<u8>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Result<UploadReceipt, IngestError>> {
        let service = self.clone();
        let result =
            tokio::task::spawn_blocking(move || service.upload_bytes(patient_id, &raw, now))
                .await?;
        Ok(result)
    }
}
