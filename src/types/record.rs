//! Sensor records, device handles, and read-side projections

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::frame::PressureFrame;

/// Patient identifier, owned by the patient-management collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub u32);

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sensor machine identifier, assigned by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorMachineId(pub u64);

impl fmt::Display for SensorMachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which rule raised an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertTrigger {
    /// No rule fired
    None,
    /// Peak pressure above the single-spot limit
    Peak,
    /// Enough high-pressure pixels to count as a sustained region
    SustainedRegion,
    /// Both rules fired
    Both,
}

impl AlertTrigger {
    pub fn from_rules(peak: bool, region: bool) -> Self {
        match (peak, region) {
            (true, true) => Self::Both,
            (true, false) => Self::Peak,
            (false, true) => Self::SustainedRegion,
            (false, false) => Self::None,
        }
    }

    pub fn is_alert(self) -> bool {
        self != Self::None
    }
}

/// Clinical metrics for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameMetrics {
    /// Maximum cell value (integer-valued)
    pub peak_pressure: f64,
    /// Active pixels as a percentage of all 1024 cells
    pub contact_area_percentage: f64,
    pub is_alert: bool,
    pub active_pixels: usize,
    pub high_pressure_pixels: usize,
    pub alert_trigger: AlertTrigger,
}

/// One analyzed frame, ready to persist.
///
/// Immutable once built. Field names match the stored record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub patient_id: PatientId,
    pub sensor_machine_id: SensorMachineId,
    pub timestamp: DateTime<Utc>,
    pub pressure_map: PressureFrame,
    pub peak_pressure_index: f64,
    pub contact_area_percentage: f64,
    pub is_high_pressure_alert: bool,
}

impl SensorRecord {
    pub fn new(
        patient_id: PatientId,
        sensor_machine_id: SensorMachineId,
        timestamp: DateTime<Utc>,
        pressure_map: PressureFrame,
        metrics: &FrameMetrics,
    ) -> Self {
        Self {
            patient_id,
            sensor_machine_id,
            timestamp,
            pressure_map,
            peak_pressure_index: metrics.peak_pressure,
            contact_area_percentage: metrics.contact_area_percentage,
            is_high_pressure_alert: metrics.is_alert,
        }
    }
}

/// A physical pressure mat assigned to a patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorMachine {
    pub id: SensorMachineId,
    pub serial_number: String,
    pub model_name: String,
    pub manufacture_date: DateTime<Utc>,
    pub last_calibration_date: DateTime<Utc>,
    pub is_active: bool,
    pub assigned_patient_id: Option<PatientId>,
}

impl SensorMachine {
    /// Model name given to auto-provisioned mats
    pub const DEFAULT_MODEL: &'static str = "Sensore Mat v1.0";

    /// Deterministic serial for a mat provisioned on upload, e.g. `SEN-0042`.
    pub fn provisioned_serial(patient_id: PatientId) -> String {
        format!("SEN-{:04}", patient_id.0)
    }

    /// Build the device record synthesized when a patient uploads without one.
    pub fn provisioned(id: SensorMachineId, patient_id: PatientId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            serial_number: Self::provisioned_serial(patient_id),
            model_name: Self::DEFAULT_MODEL.to_string(),
            manufacture_date: now,
            last_calibration_date: now,
            is_active: true,
            assigned_patient_id: Some(patient_id),
        }
    }
}

/// A persisted record together with its store-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    pub id: u64,
    pub record: SensorRecord,
}

/// Compact projection served to dashboards (no pressure map)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSummary {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub peak_pressure: f64,
    pub contact_area: f64,
    pub is_alert: bool,
}

impl From<&StoredReading> for ReadingSummary {
    fn from(stored: &StoredReading) -> Self {
        Self {
            id: stored.id,
            timestamp: stored.record.timestamp,
            peak_pressure: stored.record.peak_pressure_index,
            contact_area: stored.record.contact_area_percentage,
            is_alert: stored.record.is_high_pressure_alert,
        }
    }
}
