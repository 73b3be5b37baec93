//! Sled-backed sensor storage
//!
//! Two named trees inside one sled database:
//!
//! - `sensor_machines`: key = patient id (u32 BE), value = JSON `SensorMachine`
//! - `sensor_readings`: two key families sharing one tree so a single
//!   `sled::Batch` covers both:
//!   - `r` ‖ patient (u32 BE) ‖ timestamp millis (sortable u64 BE) ‖ id (u64 BE)
//!     → JSON `SensorRecord`
//!   - `a` ‖ same suffix → empty (alert index)
//!
//! Readings for a patient sort chronologically under their prefix.

use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;

use super::persistence::{PersistenceError, ReadingStore, RecordSink, SensorMachineRegistry};
use crate::types::{PatientId, SensorMachine, SensorMachineId, SensorRecord, StoredReading};

const MACHINES_TREE: &str = "sensor_machines";
const READINGS_TREE: &str = "sensor_readings";

const READING_PREFIX: u8 = b'r';
const ALERT_PREFIX: u8 = b'a';

/// Durable store for machines and readings
#[derive(Clone)]
pub struct SledStore {
    db: Arc<sled::Db>,
    machines: sled::Tree,
    readings: sled::Tree,
}

impl SledStore {
    /// Open or create the store at the specified path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path_ref = path.as_ref();
        let db = sled::open(path_ref)?;
        let machines = db.open_tree(MACHINES_TREE)?;
        let readings = db.open_tree(READINGS_TREE)?;

        tracing::info!(path = %path_ref.display(), "Sensor storage opened");

        Ok(Self {
            db: Arc::new(db),
            machines,
            readings,
        })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }

    /// Get database size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    /// Number of provisioned machines
    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    /// Insert a fresh machine for the patient if the slot is still empty.
    fn provision(
        &self,
        patient_id: PatientId,
        now: DateTime<Utc>,
    ) -> Result<SensorMachine, PersistenceError> {
        let machine = SensorMachine::provisioned(SensorMachineId(self.next_id()?), patient_id, now);
        let value = serde_json::to_vec(&machine)?;

        match self
            .machines
            .compare_and_swap(patient_id.0.to_be_bytes(), None::<&[u8]>, Some(value))?
        {
            Ok(()) => {
                tracing::info!(
                    patient_id = %patient_id,
                    machine_id = %machine.id,
                    serial = %machine.serial_number,
                    "Provisioned sensor machine"
                );
                Ok(machine)
            }
            Err(_) => {
                tracing::warn!(patient_id = %patient_id, "Sensor machine provisioning conflict");
                Err(PersistenceError::ProvisioningConflict(patient_id))
            }
        }
    }

    fn next_id(&self) -> Result<u64, PersistenceError> {
        // generate_id starts at zero; keep ids positive
        Ok(self.db.generate_id()? + 1)
    }
}

/// Map a signed millisecond timestamp onto u64 preserving order
fn sortable_millis(ts: DateTime<Utc>) -> u64 {
    (ts.timestamp_millis() as u64) ^ (1 << 63)
}

fn patient_prefix(family: u8, patient_id: PatientId) -> [u8; 5] {
    let mut key = [0u8; 5];
    key[0] = family;
    key[1..].copy_from_slice(&patient_id.0.to_be_bytes());
    key
}

fn reading_key(family: u8, patient_id: PatientId, ts: DateTime<Utc>, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(21);
    key.extend_from_slice(&patient_prefix(family, patient_id));
    key.extend_from_slice(&sortable_millis(ts).to_be_bytes());
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Record id is the last eight bytes of a reading key
fn id_from_key(key: &[u8]) -> Option<u64> {
    let tail: [u8; 8] = key.get(key.len().checked_sub(8)?..)?.try_into().ok()?;
    Some(u64::from_be_bytes(tail))
}

impl SensorMachineRegistry for SledStore {
    fn find_or_create(
        &self,
        patient_id: PatientId,
        now: DateTime<Utc>,
    ) -> Result<SensorMachine, PersistenceError> {
        if let Some(existing) = self.find(patient_id)? {
            return Ok(existing);
        }
        // A concurrent upload may provision between the lookup and the insert.
        self.provision(patient_id, now)
    }

    fn find(&self, patient_id: PatientId) -> Result<Option<SensorMachine>, PersistenceError> {
        match self.machines.get(patient_id.0.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }
}

impl RecordSink for SledStore {
    fn append_all(&self, records: &[SensorRecord]) -> Result<Vec<u64>, PersistenceError> {
        let mut batch = sled::Batch::default();
        let mut ids = Vec::with_capacity(records.len());

        for record in records {
            let id = self.next_id()?;
            let value = serde_json::to_vec(record)?;
            batch.insert(
                reading_key(READING_PREFIX, record.patient_id, record.timestamp, id),
                value,
            );
            if record.is_high_pressure_alert {
                batch.insert(
                    reading_key(ALERT_PREFIX, record.patient_id, record.timestamp, id),
                    Vec::<u8>::new(),
                );
            }
            ids.push(id);
        }

        self.readings.apply_batch(batch)?;

        tracing::debug!(records = ids.len(), "Appended sensor readings");
        Ok(ids)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

impl ReadingStore for SledStore {
    fn readings_since(
        &self,
        patient_id: PatientId,
        since: DateTime<Utc>,
    ) -> Result<Vec<StoredReading>, PersistenceError> {
        let prefix = patient_prefix(READING_PREFIX, patient_id);
        let start = reading_key(READING_PREFIX, patient_id, since, 0);
        let mut end = prefix.to_vec();
        end.extend_from_slice(&[0xFF; 16]);

        let mut out = Vec::new();
        for item in self.readings.range(start..=end) {
            let (key, value) = item?;
            let Some(id) = id_from_key(&key) else {
                continue;
            };
            match serde_json::from_slice::<SensorRecord>(&value) {
                Ok(record) => out.push(StoredReading { id, record }),
                Err(e) => {
                    tracing::warn!(id, error = %e, "Failed to deserialize stored reading");
                }
            }
        }
        Ok(out)
    }

    fn patient_has_alerts(&self, patient_id: PatientId) -> Result<bool, PersistenceError> {
        match self
            .readings
            .scan_prefix(patient_prefix(ALERT_PREFIX, patient_id))
            .next()
        {
            Some(item) => item.map(|_| true).map_err(PersistenceError::from),
            None => Ok(false),
        }
    }

    fn alert_count(&self) -> Result<usize, PersistenceError> {
        count_prefix(&self.readings, ALERT_PREFIX)
    }

    fn reading_count(&self) -> Result<usize, PersistenceError> {
        count_prefix(&self.readings, READING_PREFIX)
    }
}

fn count_prefix(tree: &sled::Tree, family: u8) -> Result<usize, PersistenceError> {
    let mut count = 0;
    for item in tree.scan_prefix([family]) {
        item?;
        count += 1;
    }
    Ok(count)
}
