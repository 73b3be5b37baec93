//! Pressure frame - one 32x32 reading from the mat

use serde::{Deserialize, Serialize};

/// Rows and columns per frame.
pub const FRAME_DIM: usize = 32;

/// Total cells per frame (32 x 32).
pub const FRAME_CELLS: usize = FRAME_DIM * FRAME_DIM;

/// Resting value of an unloaded cell. Zero is never a valid reading.
pub const NO_PRESSURE: u32 = 1;

/// A complete 32x32 pressure map in row-major order.
///
/// Serializes as 32 sequences of 32 integers, which is the stored
/// `pressure_map` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PressureFrame {
    cells: Box<[[u32; FRAME_DIM]; FRAME_DIM]>,
}

impl PressureFrame {
    /// Frame with every cell at the no-pressure baseline.
    pub fn resting() -> Self {
        Self::from_rows([[NO_PRESSURE; FRAME_DIM]; FRAME_DIM])
    }

    pub fn from_rows(rows: [[u32; FRAME_DIM]; FRAME_DIM]) -> Self {
        Self {
            cells: Box::new(rows),
        }
    }

    /// Cell value at `(row, col)`, or `None` when out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<u32> {
        self.cells.get(row).and_then(|r| r.get(col)).copied()
    }

    /// Set a cell. Out-of-bounds writes are ignored.
    pub fn set(&mut self, row: usize, col: usize, value: u32) {
        if let Some(cell) = self.cells.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    pub fn rows(&self) -> &[[u32; FRAME_DIM]; FRAME_DIM] {
        &self.cells
    }

    /// All 1024 cells, row by row.
    pub fn cells(&self) -> impl Iterator<Item = u32> + '_ {
        self.cells.iter().flat_map(|row| row.iter().copied())
    }

    /// Stable row-major JSON encoding of the grid.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Default for PressureFrame {
    fn default() -> Self {
        Self::resting()
    }
}
