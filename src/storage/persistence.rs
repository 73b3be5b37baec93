//! Persistence collaborators consumed by the ingestion pipeline
//!
//! Two seams, so ingestion never depends on a concrete backend:
//! - `SensorMachineRegistry`: find-or-create the mat assigned to a patient
//! - `RecordSink`: atomically append one upload's records
//!
//! `InMemoryStore` implements both for tests and minimal deployments.
//! `SledStore` (see `sled_store`) is the durable backend.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{PatientId, SensorMachine, SensorMachineId, SensorRecord, StoredReading};

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    /// Another writer provisioned a device for this patient concurrently.
    #[error("device provisioning conflict for patient {0}")]
    ProvisioningConflict(PatientId),
}

impl From<sled::Error> for PersistenceError {
    fn from(err: sled::Error) -> Self {
        PersistenceError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

/// Lookup-or-create of the sensor machine assigned to a patient.
///
/// Implementations must be idempotent per patient: once a machine exists,
/// every call returns it. When two callers race to create one, the loser
/// gets `PersistenceError::ProvisioningConflict` and should look up again.
pub trait SensorMachineRegistry: Send + Sync {
    fn find_or_create(
        &self,
        patient_id: PatientId,
        now: DateTime<Utc>,
    ) -> Result<SensorMachine, PersistenceError>;

    /// Machine assigned to a patient, without provisioning one
    fn find(&self, patient_id: PatientId) -> Result<Option<SensorMachine>, PersistenceError>;
}

/// Bulk append of sensor records.
///
/// `append_all` is all-or-nothing: either every record is stored or none.
pub trait RecordSink: Send + Sync {
    /// Store records in order, returning their assigned ids
    fn append_all(&self, records: &[SensorRecord]) -> Result<Vec<u64>, PersistenceError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Read side used by the dashboard API
pub trait ReadingStore: Send + Sync {
    /// Readings for a patient at or after `since`, oldest first
    fn readings_since(
        &self,
        patient_id: PatientId,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredReading>, PersistenceError>;

    fn patient_has_alerts(&self, patient_id: PatientId) -> Result<bool, PersistenceError>;

    /// Alerted readings across all patients
    fn alert_count(&self) -> Result<usize, PersistenceError>;

    fn reading_count(&self) -> Result<usize, PersistenceError>;
}

/// Full storage backend: registry, sink and read side together
pub trait Store: SensorMachineRegistry + RecordSink + ReadingStore {}

impl<T: SensorMachineRegistry + RecordSink + ReadingStore> Store for T {}

/// In-memory store for testing and minimal deployments
///
/// Thread-safe via `Mutex`. Not durable — data lost on restart.
#[derive(Default)]
pub struct InMemoryStore {
    machines: Mutex<HashMap<PatientId, SensorMachine>>,
    readings: Mutex<Vec<StoredReading>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of machines provisioned so far
    pub fn machine_count(&self) -> usize {
        self.machines.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Pre-assign a machine to a patient
    pub fn assign(&self, machine: SensorMachine) -> Result<(), PersistenceError> {
        let patient_id = machine.assigned_patient_id.ok_or_else(|| {
            PersistenceError::Storage("machine has no assigned patient".to_string())
        })?;
        self.machines
            .lock()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?
            .insert(patient_id, machine);
        Ok(())
    }
}

impl SensorMachineRegistry for InMemoryStore {
    fn find_or_create(
        &self,
        patient_id: PatientId,
        now: DateTime<Utc>,
    ) -> Result<SensorMachine, PersistenceError> {
        let mut machines = self
            .machines
            .lock()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;

        // Ids assigned up front may be sparse; stay above all of them.
        let next_id = SensorMachineId(machines.values().map(|m| m.id.0).max().unwrap_or(0) + 1);
        let machine = machines.entry(patient_id).or_insert_with(|| {
            tracing::info!(patient_id = %patient_id, "Provisioning sensor machine");
            SensorMachine::provisioned(next_id, patient_id, now)
        });
        Ok(machine.clone())
    }

    fn find(&self, patient_id: PatientId) -> Result<Option<SensorMachine>, PersistenceError> {
        let machines = self
            .machines
            .lock()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(machines.get(&patient_id).cloned())
    }
}

impl RecordSink for InMemoryStore {
    fn append_all(&self, records: &[SensorRecord]) -> Result<Vec<u64>, PersistenceError> {
        let mut store = self
            .readings
            .lock()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;

        let first_id = store.len() as u64 + 1;
        let ids: Vec<u64> = (first_id..first_id + records.len() as u64).collect();
        store.extend(ids.iter().zip(records).map(|(&id, record)| StoredReading {
            id,
            record: record.clone(),
        }));
        Ok(ids)
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

impl ReadingStore for InMemoryStore {
    fn readings_since(
        &self,
        patient_id: PatientId,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredReading>, PersistenceError> {
        let store = self
            .readings
            .lock()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;

        let mut out: Vec<StoredReading> = store
            .iter()
            .filter(|r| r.record.patient_id == patient_id && r.record.timestamp >= since)
            .cloned()
            .collect();
        out.sort_by_key(|r| (r.record.timestamp, r.id));
        Ok(out)
    }

    fn patient_has_alerts(&self, patient_id: PatientId) -> Result<bool, PersistenceError> {
        let store = self
            .readings
            .lock()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(store
            .iter()
            .any(|r| r.record.patient_id == patient_id && r.record.is_high_pressure_alert))
    }

    fn alert_count(&self) -> Result<usize, PersistenceError> {
        let store = self
            .readings
            .lock()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(store.iter().filter(|r| r.record.is_high_pressure_alert).count())
    }

    fn reading_count(&self) -> Result<usize, PersistenceError> {
        let store = self
            .readings
            .lock()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(store.len())
    }
}
