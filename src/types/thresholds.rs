//! Clinical pressure thresholds
//!
//! These are fixed clinical constants. They are deliberately not part of
//! `AppConfig`: changing them would reclassify already-stored readings.

/// Thresholds for pressure-injury alerting
pub mod pressure_thresholds {
    /// A cell above this value is in contact with the patient
    pub const ACTIVE_PIXEL_MIN: u32 = 1;

    /// A cell above this value is a high-pressure pixel
    pub const HIGH_PRESSURE_PIXEL_MIN: u32 = 200;

    /// A single reading above this value raises an alert
    pub const PEAK_ALERT: u32 = 220;

    /// This many high-pressure pixels (or more) raise an alert
    pub const SUSTAINED_REGION_PIXELS: usize = 10;
}

/// Timestamp backfill for uploaded frames
pub mod backfill {
    /// Frames sharing one minute of backdating
    pub const FRAMES_PER_MINUTE_STEP: usize = 32;
}
