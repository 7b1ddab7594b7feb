//! Coordinate units used at module boundaries.
//!
//! The simulation works in *view units*: the view is `base_columns` units wide
//! and `height / width * base_columns` units tall, so one unit is one column of
//! the nearest depth layer. Cells are addressed by integer column/row indices
//! scaled by the cell size of their layer. Render targets are sized in pixels.
//!
//! Rounding rule: the head row of a falling string is `y.round()` (half away
//! from zero); every other float → index conversion uses `floor`.

use std::ops::{Add, Mul, Sub};

/// Length or position in view space.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct ViewUnits(pub f32);

/// Length in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PixelUnits(pub u32);

/// Column of a falling string, in multiples of its layer's cell size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ColumnIndex(pub i32);

/// Row of a cell, in multiples of its layer's cell size. Negative rows are above the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct RowIndex(pub i32);

impl ViewUnits {
    pub fn get(self) -> f32 {
        self.0
    }
}

impl Add for ViewUnits {
    type Output = ViewUnits;

    fn add(self, rhs: Self) -> Self::Output {
        ViewUnits(self.0 + rhs.0)
    }
}

impl Sub for ViewUnits {
    type Output = ViewUnits;

    fn sub(self, rhs: Self) -> Self::Output {
        ViewUnits(self.0 - rhs.0)
    }
}

impl Mul<f32> for ViewUnits {
    type Output = ViewUnits;

    fn mul(self, rhs: f32) -> Self::Output {
        ViewUnits(self.0 * rhs)
    }
}

impl PixelUnits {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl ColumnIndex {
    /// Left edge of the column for cells of `cell_size`.
    pub fn to_view(self, cell_size: ViewUnits) -> ViewUnits {
        ViewUnits(self.0 as f32 * cell_size.0)
    }
}

impl RowIndex {
    /// Head row for a fractional head position.
    pub fn from_head(y: f32) -> Self {
        RowIndex(y.round() as i32)
    }

    /// Top edge of the row for cells of `cell_size`.
    pub fn to_view(self, cell_size: ViewUnits) -> ViewUnits {
        ViewUnits(self.0 as f32 * cell_size.0)
    }

    pub fn offset(self, rows: i32) -> Self {
        RowIndex(self.0 + rows)
    }
}

/// Visible area in both unit systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width_px: PixelUnits,
    pub height_px: PixelUnits,
    pub width: ViewUnits,
    pub height: ViewUnits,
}

impl Viewport {
    /// Map a framebuffer size to view space `base_columns` units wide.
    pub fn from_pixels(width_px: u32, height_px: u32, base_columns: u32) -> Self {
        let width = base_columns as f32;
        let height = if width_px == 0 {
            0.0
        } else {
            height_px as f32 / width_px as f32 * width
        };
        Self {
            width_px: PixelUnits(width_px),
            height_px: PixelUnits(height_px),
            width: ViewUnits(width),
            height: ViewUnits(height),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width_px.0 == 0 || self.height_px.0 == 0
    }
}
