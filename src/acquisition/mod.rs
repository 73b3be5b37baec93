//! Sensor data acquisition module
//!
//! Turns raw pressure-mat uploads into decoded frames.

pub mod frame_decoder;

pub use frame_decoder::{decode, DecodeStats, Frames};
