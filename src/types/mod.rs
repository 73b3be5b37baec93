//! Shared domain types for pressure-mat ingestion

mod frame;
mod record;
pub mod thresholds;

pub use frame::{PressureFrame, FRAME_CELLS, FRAME_DIM, NO_PRESSURE};
pub use record::{
    AlertTrigger, FrameMetrics, PatientId, ReadingSummary, SensorMachine, SensorMachineId,
    SensorRecord, StoredReading,
};
pub use thresholds::pressure_thresholds;
