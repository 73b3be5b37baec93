//! Frame metrics: peak pressure, contact area, alert status

use serde::Serialize;

use crate::types::pressure_thresholds::{
    ACTIVE_PIXEL_MIN, HIGH_PRESSURE_PIXEL_MIN, PEAK_ALERT, SUSTAINED_REGION_PIXELS,
};
use crate::types::{AlertTrigger, FrameMetrics, PressureFrame, FRAME_CELLS};

/// Compute clinical metrics for one frame
///
/// ## Rules
/// - Peak pressure: maximum cell value
/// - Active pixel: value > 1
/// - Contact area: active pixels / 1024 x 100
/// - High-pressure pixel: value > 200
/// - Alert: peak > 220, or at least 10 high-pressure pixels
pub fn analyze(frame: &PressureFrame) -> FrameMetrics {
    let mut peak = 0u32;
    let mut active_pixels = 0usize;
    let mut high_pressure_pixels = 0usize;

    for value in frame.cells() {
        peak = peak.max(value);
        if value > ACTIVE_PIXEL_MIN {
            active_pixels += 1;
        }
        if value > HIGH_PRESSURE_PIXEL_MIN {
            high_pressure_pixels += 1;
        }
    }

    let alert_trigger = AlertTrigger::from_rules(
        peak > PEAK_ALERT,
        high_pressure_pixels >= SUSTAINED_REGION_PIXELS,
    );

    FrameMetrics {
        peak_pressure: f64::from(peak),
        contact_area_percentage: active_pixels as f64 / FRAME_CELLS as f64 * 100.0,
        is_alert: alert_trigger.is_alert(),
        active_pixels,
        high_pressure_pixels,
        alert_trigger,
    }
}

/// Aggregate view of one upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UploadSummary {
    pub frames: usize,
    pub alert_frames: usize,
    pub max_peak_pressure: f64,
    pub mean_contact_area: f64,
}

/// Summarize the metrics of an upload. Empty input gives an all-zero summary.
pub fn summarize(metrics: &[FrameMetrics]) -> UploadSummary {
    if metrics.is_empty() {
        return UploadSummary::default();
    }

    let frames = metrics.len();
    let alert_frames = metrics.iter().filter(|m| m.is_alert).count();
    let max_peak_pressure = metrics
        .iter()
        .map(|m| m.peak_pressure)
        .fold(0.0_f64, f64::max);
    let mean_contact_area =
        metrics.iter().map(|m| m.contact_area_percentage).sum::<f64>() / frames as f64;

    UploadSummary {
        frames,
        alert_frames,
        max_peak_pressure,
        mean_contact_area,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FRAME_DIM;

    /// Resting frame with the first `count` cells (row-major) set to `value`
    fn frame_with(count: usize, value: u32) -> PressureFrame {
        let mut frame = PressureFrame::resting();
        for i in 0..count {
            frame.set(i / FRAME_DIM, i % FRAME_DIM, value);
        }
        frame
    }

    #[test]
    fn test_resting_frame() {
        let m = analyze(&PressureFrame::resting());
        assert_eq!(m.peak_pressure, 1.0);
        assert_eq!(m.contact_area_percentage, 0.0);
        assert!(!m.is_alert);
        assert_eq!(m.alert_trigger, AlertTrigger::None);
    }

    #[test]
    fn test_single_extreme_spot_alerts() {
        let m = analyze(&frame_with(1, 225));
        assert!(m.is_alert);
        assert_eq!(m.alert_trigger, AlertTrigger::Peak);
        assert!((m.contact_area_percentage - 100.0 / 1024.0).abs() < 1e-9);
        assert!((m.contact_area_percentage - 0.098).abs() < 0.001);
    }

    #[test]
    fn test_ten_moderate_pixels_alert_below_peak_limit() {
        let m = analyze(&frame_with(10, 201));
        assert_eq!(m.peak_pressure, 201.0);
        assert_eq!(m.high_pressure_pixels, 10);
        assert!(m.is_alert);
        assert_eq!(m.alert_trigger, AlertTrigger::SustainedRegion);
    }

    #[test]
    fn test_nine_moderate_pixels_do_not_alert() {
        let m = analyze(&frame_with(9, 210));
        assert!(!m.is_alert);
    }

    #[test]
    fn test_nine_extreme_pixels_alert_on_peak() {
        let m = analyze(&frame_with(9, 500));
        assert!(m.is_alert);
        assert_eq!(m.alert_trigger, AlertTrigger::Peak);
    }

    #[test]
    fn test_both_rules() {
        let m = analyze(&frame_with(12, 400));
        assert_eq!(m.alert_trigger, AlertTrigger::Both);
    }

    #[test]
    fn test_threshold_boundaries_are_strict() {
        // 220 is not above the peak limit, 200 is not a high-pressure pixel
        let mut frame = frame_with(20, 200);
        frame.set(31, 31, 220);
        let m = analyze(&frame);
        assert_eq!(m.high_pressure_pixels, 1);
        assert!(!m.is_alert);
    }

    #[test]
    fn test_zero_cells_are_not_active() {
        let m = analyze(&frame_with(FRAME_CELLS, 0));
        assert_eq!(m.active_pixels, 0);
        assert_eq!(m.peak_pressure, 0.0);
    }

    #[test]
    fn test_full_contact() {
        let m = analyze(&frame_with(FRAME_CELLS, 2));
        assert_eq!(m.contact_area_percentage, 100.0);
    }

    #[test]
    fn test_summarize() {
        let metrics = vec![
            analyze(&PressureFrame::resting()),
            analyze(&frame_with(1, 300)),
            analyze(&frame_with(FRAME_CELLS, 2)),
        ];
        let s = summarize(&metrics);
        assert_eq!(s.frames, 3);
        assert_eq!(s.alert_frames, 1);
        assert_eq!(s.max_peak_pressure, 300.0);
        assert!(s.mean_contact_area > 33.0 && s.mean_contact_area < 34.0);

        assert_eq!(summarize(&[]), UploadSummary::default());
    }
}
