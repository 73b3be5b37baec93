//! Sensor Storage
//!
//! Persistence collaborators for ingestion (device registry, record sink)
//! and the read side used by the API. Backends: in-memory and sled.

pub mod lockfile;
pub mod persistence;
pub mod sled_store;

pub use lockfile::ProcessLock;
pub use persistence::{
    InMemoryStore, PersistenceError, ReadingStore, RecordSink, SensorMachineRegistry, Store,
};
pub use sled_store::SledStore;
