//! Pressure-mat CSV frame decoder
//!
//! The mat exports frames as plain CSV with no header and no frame markers:
//!
//! ```text
//! 1,1,1,...,1        <- row 0 of frame 0 (32 cells)
//! 1,1,35,...,1
//! ...                <- 32 rows per frame
//! 1,1,1,...,1        <- row 0 of frame 1
//! ```
//!
//! Decoding rules:
//! - Empty rows are dropped before counting, so they never shift a frame boundary.
//! - Rows are taken 32 at a time. A trailing window of fewer than 32 rows is dropped.
//! - A row with fewer than 32 cells invalidates its whole window. Decoding resumes at
//!   the next window.
//! - Cells that fail to parse (or are negative) read as `1`, the no-pressure baseline.

use std::str::Split;

use crate::types::{PressureFrame, FRAME_DIM, NO_PRESSURE};

/// Counters collected while decoding an upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Complete frames yielded
    pub frames: usize,
    /// Windows dropped because a row had fewer than 32 cells
    pub skipped_windows: usize,
    /// Rows left over after the last complete window
    pub tail_rows_discarded: usize,
}

/// Decode a raw upload into frames.
///
/// The returned iterator is lazy; clone it to decode again from the start.
pub fn decode(raw: &str) -> Frames<'_> {
    Frames::new(raw)
}

/// Lazy iterator over the complete frames of an upload
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    lines: Split<'a, char>,
    window: Vec<&'a str>,
    stats: DecodeStats,
}

impl<'a> Frames<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            lines: raw.split('\n'),
            window: Vec::with_capacity(FRAME_DIM),
            stats: DecodeStats::default(),
        }
    }

    /// Counters for everything consumed so far
    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Next non-empty row, with any trailing `\r` removed
    fn next_row(&mut self) -> Option<&'a str> {
        self.lines
            .by_ref()
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .find(|line| !line.trim().is_empty())
    }

    /// Fill the window with the next 32 rows. Returns false at end of input.
    fn fill_window(&mut self) -> bool {
        self.window.clear();
        while self.window.len() < FRAME_DIM {
            match self.next_row() {
                Some(row) => self.window.push(row),
                None => {
                    if !self.window.is_empty() {
                        self.stats.tail_rows_discarded += self.window.len();
                        tracing::debug!(
                            rows = self.window.len(),
                            "Discarding partial trailing frame"
                        );
                    }
                    return false;
                }
            }
        }
        true
    }
}

impl Iterator for Frames<'_> {
    type Item = PressureFrame;

    fn next(&mut self) -> Option<Self::Item> {
        while self.fill_window() {
            if let Some(frame) = parse_window(&self.window) {
                self.stats.frames += 1;
                return Some(frame);
            }
            self.stats.skipped_windows += 1;
            tracing::debug!(
                window = self.stats.frames + self.stats.skipped_windows - 1,
                "Skipping frame with a short row"
            );
        }
        None
    }
}

/// Parse a full 32-row window. `None` if any row is short.
fn parse_window(rows: &[&str]) -> Option<PressureFrame> {
    let mut grid = [[NO_PRESSURE; FRAME_DIM]; FRAME_DIM];
    for (row, line) in rows.iter().enumerate() {
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() < FRAME_DIM {
            return None;
        }
        for (col, cell) in cells.iter().take(FRAME_DIM).enumerate() {
            grid[row][col] = parse_cell(cell);
        }
    }
    Some(PressureFrame::from_rows(grid))
}

/// Parse one cell, falling back to the no-pressure baseline.
pub fn parse_cell(cell: &str) -> u32 {
    cell.trim()
        .parse::<i32>()
        .ok()
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(NO_PRESSURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_of(value: &str, cells: usize) -> String {
        vec![value; cells].join(",")
    }

    fn frame_text(value: &str) -> String {
        let mut s = String::new();
        for _ in 0..FRAME_DIM {
            s.push_str(&row_of(value, FRAME_DIM));
            s.push('\n');
        }
        s
    }

    #[test]
    fn test_fewer_than_32_rows_yields_nothing() {
        let mut text = String::new();
        for _ in 0..31 {
            text.push_str(&row_of("5", 32));
            text.push('\n');
        }
        let mut frames = decode(&text);
        assert!(frames.next().is_none());
        assert_eq!(frames.stats().tail_rows_discarded, 31);
    }

    #[test]
    fn test_exact_multiple_yields_rows_over_32_frames() {
        let text = format!("{}{}{}", frame_text("3"), frame_text("4"), frame_text("5"));
        let frames: Vec<_> = decode(&text).collect();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].cells().all(|v| v == 3));
        assert!(frames[2].cells().all(|v| v == 5));
    }

    #[test]
    fn test_empty_lines_do_not_count_toward_boundary() {
        let mut text = String::from("\n\n");
        for i in 0..FRAME_DIM {
            text.push_str(&row_of("9", FRAME_DIM));
            text.push('\n');
            if i % 4 == 0 {
                text.push('\n');
            }
        }
        let frames: Vec<_> = decode(&text).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].cells().all(|v| v == 9));
    }

    #[test]
    fn test_blank_looking_rows_are_skipped() {
        let mut text = String::new();
        for i in 0..FRAME_DIM {
            text.push_str(&row_of("4", FRAME_DIM));
            text.push('\n');
            match i {
                3 => text.push_str("   \n"),
                9 => text.push_str("\r\n"),
                20 => text.push_str(" \t \r\n"),
                _ => {}
            }
        }
        let mut frames = decode(&text);
        let decoded: Vec<_> = frames.by_ref().collect();
        assert_eq!(decoded.len(), 1);
        assert_eq!(frames.stats().skipped_windows, 0);
        assert_eq!(frames.stats().tail_rows_discarded, 0);
    }

    #[test]
    fn test_short_row_invalidates_whole_window() {
        let mut bad = String::new();
        for i in 0..FRAME_DIM {
            let cells = if i == 17 { 31 } else { 32 };
            bad.push_str(&row_of("7", cells));
            bad.push('\n');
        }
        let text = format!("{}{}{}", frame_text("2"), bad, frame_text("6"));

        let mut frames = decode(&text);
        let decoded: Vec<_> = frames.by_ref().collect();
        assert_eq!(decoded.len(), 2);
        assert!(decoded[0].cells().all(|v| v == 2));
        assert!(decoded[1].cells().all(|v| v == 6));
        assert_eq!(frames.stats().skipped_windows, 1);
    }

    #[test]
    fn test_unparseable_cells_default_to_one() {
        let mut text = frame_text("10");
        text = text.replacen("10,10,10", "abc, ,-4", 1);
        let frames: Vec<_> = decode(&text).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].get(0, 0), Some(1));
        assert_eq!(frames[0].get(0, 1), Some(1));
        assert_eq!(frames[0].get(0, 2), Some(1));
        assert_eq!(frames[0].get(0, 3), Some(10));
    }

    #[test]
    fn test_extra_cells_are_ignored() {
        let mut text = String::new();
        for _ in 0..FRAME_DIM {
            text.push_str(&row_of("8", 40));
            text.push('\n');
        }
        let frames: Vec<_> = decode(&text).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].cells().all(|v| v == 8));
    }

    #[test]
    fn test_crlf_input() {
        let text = frame_text("12").replace('\n', "\r\n");
        let frames: Vec<_> = decode(&text).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].get(31, 31), Some(12));
    }

    #[test]
    fn test_partial_tail_is_discarded() {
        let mut text = frame_text("4");
        for _ in 0..10 {
            text.push_str(&row_of("4", 32));
            text.push('\n');
        }
        let mut frames = decode(&text);
        assert_eq!(frames.by_ref().count(), 1);
        assert_eq!(frames.stats().tail_rows_discarded, 10);
    }

    #[test]
    fn test_decoder_is_restartable() {
        let text = format!("{}{}", frame_text("1"), frame_text("300"));
        let frames = decode(&text);
        let first: Vec<_> = frames.clone().collect();
        let second: Vec<_> = frames.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_parse_cell() {
        assert_eq!(parse_cell(" 42 "), 42);
        assert_eq!(parse_cell(""), 1);
        assert_eq!(parse_cell("3.5"), 1);
        assert_eq!(parse_cell("99999999999"), 1);
        assert_eq!(parse_cell("0"), 0);
    }
}
