//! Upload ingestion: decode, resolve device, analyze, timestamp
//!
//! Two phases. The whole upload is decoded first because timestamps depend
//! on the final frame count. Analysis then runs per frame (in parallel for
//! larger uploads) and records are built in decode order.

use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::acquisition::{self, DecodeStats};
use crate::analysis::{self, UploadSummary};
use crate::config::defaults::PARALLEL_MIN_FRAMES;
use crate::storage::{PersistenceError, SensorMachineRegistry};
use crate::types::thresholds::backfill::FRAMES_PER_MINUTE_STEP;
use crate::types::{FrameMetrics, PatientId, PressureFrame, SensorMachine, SensorRecord};

/// Ingestion errors
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The upload held no complete, valid frame.
    #[error("no valid data found in upload")]
    EmptyUpload,

    /// Device provisioning still conflicted after one re-resolve.
    #[error("device provisioning conflict for patient {patient_id}")]
    ProvisioningConflict { patient_id: PatientId },

    #[error(transparent)]
    Persistence(PersistenceError),
}

impl From<PersistenceError> for IngestError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::ProvisioningConflict(patient_id) => {
                IngestError::ProvisioningConflict { patient_id }
            }
            other => IngestError::Persistence(other),
        }
    }
}

/// Result of ingesting one upload
#[derive(Debug, Clone)]
pub struct IngestBatch {
    /// One record per decoded frame, in decode order
    pub records: Vec<SensorRecord>,
    /// Device every record is attributed to
    pub machine: SensorMachine,
    pub summary: UploadSummary,
    pub decode_stats: DecodeStats,
}

/// Decoder + analyzer orchestration for a single upload
#[derive(Debug, Clone, Copy)]
pub struct IngestionPipeline {
    parallel_min_frames: usize,
}

impl Default for IngestionPipeline {
    fn default() -> Self {
        Self {
            parallel_min_frames: PARALLEL_MIN_FRAMES,
        }
    }
}

impl IngestionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze on the rayon pool once an upload has at least this many frames.
    pub fn with_parallel_min_frames(mut self, frames: usize) -> Self {
        self.parallel_min_frames = frames;
        self
    }

    /// Ingest one raw upload for a patient.
    ///
    /// Fails with `EmptyUpload` before touching the registry when no frame
    /// decodes, so a rejected upload never provisions a device.
    pub fn ingest<R: SensorMachineRegistry + ?Sized>(
        &self,
        patient_id: PatientId,
        raw: &str,
        registry: &R,
        now: DateTime<Utc>,
    ) -> Result<IngestBatch, IngestError> {
        let mut decoder = acquisition::decode(raw);
        let frames: Vec<PressureFrame> = decoder.by_ref().collect();
        let decode_stats = decoder.stats();

        if frames.is_empty() {
            warn!(
                patient_id = %patient_id,
                skipped_windows = decode_stats.skipped_windows,
                tail_rows = decode_stats.tail_rows_discarded,
                "Upload contained no valid frames"
            );
            return Err(IngestError::EmptyUpload);
        }

        let machine = resolve_machine(registry, patient_id, now)?;
        let metrics = self.analyze_all(&frames);
        let summary = analysis::summarize(&metrics);

        let total = frames.len();
        let records: Vec<SensorRecord> = frames
            .into_iter()
            .zip(&metrics)
            .enumerate()
            .map(|(i, (frame, m))| {
                SensorRecord::new(
                    patient_id,
                    machine.id,
                    frame_timestamp(now, i, total),
                    frame,
                    m,
                )
            })
            .collect();

        info!(
            patient_id = %patient_id,
            machine_id = %machine.id,
            frames = summary.frames,
            alerts = summary.alert_frames,
            skipped_windows = decode_stats.skipped_windows,
            max_peak = summary.max_peak_pressure,
            "Upload ingested"
        );

        Ok(IngestBatch {
            records,
            machine,
            summary,
            decode_stats,
        })
    }

    fn analyze_all(&self, frames: &[PressureFrame]) -> Vec<FrameMetrics> {
        if frames.len() >= self.parallel_min_frames {
            frames.par_iter().map(analysis::analyze).collect()
        } else {
            frames.iter().map(analysis::analyze).collect()
        }
    }
}

/// Ingest with default settings, returning only the records.
pub fn ingest<R: SensorMachineRegistry + ?Sized>(
    patient_id: PatientId,
    raw: &str,
    registry: &R,
    now: DateTime<Utc>,
) -> Result<Vec<SensorRecord>, IngestError> {
    IngestionPipeline::new()
        .ingest(patient_id, raw, registry, now)
        .map(|batch| batch.records)
}

/// Backdated timestamp for frame `index` of `total`.
///
/// `now - floor((total - index) / 32)` minutes. Consecutive frames share a
/// minute in groups of 32; stored data depends on this exact spacing.
pub fn frame_timestamp(now: DateTime<Utc>, index: usize, total: usize) -> DateTime<Utc> {
    let steps = total.saturating_sub(index) / FRAMES_PER_MINUTE_STEP;
    now - Duration::minutes(i64::try_from(steps).unwrap_or(i64::MAX / 60_000))
}

/// Look up or provision the patient's device, re-resolving once on conflict.
fn resolve_machine<R: SensorMachineRegistry + ?Sized>(
    registry: &R,
    patient_id: PatientId,
    now: DateTime<Utc>,
) -> Result<SensorMachine, IngestError> {
    match registry.find_or_create(patient_id, now) {
        Err(PersistenceError::ProvisioningConflict(_)) => {
            warn!(patient_id = %patient_id, "Provisioning conflict, re-resolving sensor machine");
            Ok(registry.find_or_create(patient_id, now)?)
        }
        other => Ok(other?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::types::{SensorMachineId, FRAME_DIM};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn frame_text(value: u32) -> String {
        let row = vec![value.to_string(); FRAME_DIM].join(",");
        let mut s = String::new();
        for _ in 0..FRAME_DIM {
            s.push_str(&row);
            s.push('\n');
        }
        s
    }

    fn upload(values: &[u32]) -> String {
        values.iter().map(|&v| frame_text(v)).collect()
    }

    #[test]
    fn test_empty_upload_fails_without_provisioning() {
        let store = InMemoryStore::new();
        let err = ingest(PatientId(1), "", &store, Utc::now()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyUpload));
        assert_eq!(store.machine_count(), 0);
    }

    #[test]
    fn test_all_malformed_upload_is_empty() {
        let store = InMemoryStore::new();
        let text = "1,2,3\n".repeat(64);
        let err = ingest(PatientId(1), &text, &store, Utc::now()).unwrap_err();
        assert!(matches!(err, IngestError::EmptyUpload));
    }

    #[test]
    fn test_one_machine_for_all_frames() {
        let store = InMemoryStore::new();
        let records = ingest(PatientId(8), &upload(&[1, 50, 300]), &store, Utc::now()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(store.machine_count(), 1);
        let machine_id = records[0].sensor_machine_id;
        assert!(records.iter().all(|r| r.sensor_machine_id == machine_id));
        assert!(records.iter().all(|r| r.patient_id == PatientId(8)));
    }

    #[test]
    fn test_records_carry_metrics_in_decode_order() {
        let store = InMemoryStore::new();
        let records = ingest(PatientId(2), &upload(&[1, 300, 2]), &store, Utc::now()).unwrap();
        assert!(!records[0].is_high_pressure_alert);
        assert_eq!(records[0].peak_pressure_index, 1.0);
        assert!(records[1].is_high_pressure_alert);
        assert_eq!(records[1].peak_pressure_index, 300.0);
        assert_eq!(records[2].contact_area_percentage, 100.0);
        assert_eq!(records[2].pressure_map.get(5, 5), Some(2));
    }

    #[test]
    fn test_parallel_and_serial_agree() {
        let store = InMemoryStore::new();
        let text = upload(&[1, 205, 300, 2, 1, 221, 9, 1, 1, 400]);
        let now = Utc::now();
        let serial = IngestionPipeline::new()
            .with_parallel_min_frames(usize::MAX)
            .ingest(PatientId(1), &text, &store, now)
            .unwrap();
        let parallel = IngestionPipeline::new()
            .with_parallel_min_frames(1)
            .ingest(PatientId(1), &text, &store, now)
            .unwrap();
        assert_eq!(serial.records, parallel.records);
        assert_eq!(serial.summary.alert_frames, 4);
    }

    #[test]
    fn test_frame_timestamp_formula() {
        let now = Utc::now();
        // N = 70: (70-0)/32 = 2, (70-6)/32 = 2, (70-7)/32 = 1, (70-39)/32 = 0
        assert_eq!(frame_timestamp(now, 0, 70), now - Duration::minutes(2));
        assert_eq!(frame_timestamp(now, 6, 70), now - Duration::minutes(2));
        assert_eq!(frame_timestamp(now, 7, 70), now - Duration::minutes(1));
        assert_eq!(frame_timestamp(now, 39, 70), now);
        assert_eq!(frame_timestamp(now, 69, 70), now);
    }

    #[test]
    fn test_timestamps_non_decreasing() {
        let store = InMemoryStore::new();
        let values: Vec<u32> = (0..40).map(|i| i % 5 + 1).collect();
        let now = Utc::now();
        let records = ingest(PatientId(4), &upload(&values), &store, now).unwrap();
        assert_eq!(records.len(), 40);
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(records[0].timestamp, now - Duration::minutes(1));
        assert_eq!(records[39].timestamp, now);
    }

    /// Registry that reports a conflict for the first `conflicts` calls
    struct ConflictingRegistry {
        conflicts: usize,
        calls: AtomicUsize,
    }

    impl SensorMachineRegistry for ConflictingRegistry {
        fn find_or_create(
            &self,
            patient_id: PatientId,
            now: DateTime<Utc>,
        ) -> Result<SensorMachine, PersistenceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.conflicts {
                Err(PersistenceError::ProvisioningConflict(patient_id))
            } else {
                Ok(SensorMachine::provisioned(SensorMachineId(11), patient_id, now))
            }
        }

        fn find(&self, _patient_id: PatientId) -> Result<Option<SensorMachine>, PersistenceError> {
            Ok(None)
        }
    }

    #[test]
    fn test_conflict_retried_once() {
        let registry = ConflictingRegistry {
            conflicts: 1,
            calls: AtomicUsize::new(0),
        };
        let records = ingest(PatientId(3), &upload(&[1]), &registry, Utc::now()).unwrap();
        assert_eq!(records[0].sensor_machine_id, SensorMachineId(11));
        assert_eq!(registry.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_second_conflict_is_surfaced() {
        let registry = ConflictingRegistry {
            conflicts: 2,
            calls: AtomicUsize::new(0),
        };
        let err = ingest(PatientId(3), &upload(&[1]), &registry, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            IngestError::ProvisioningConflict { patient_id: PatientId(3) }
        ));
        assert_eq!(registry.calls.load(Ordering::SeqCst), 2);
    }
}
