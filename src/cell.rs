//! Active character records and the flat vertex batch built from them.

use std::ops::Range;

use bytemuck::{Pod, Zeroable};

use crate::glyphs::{Glyph, GlyphProvider};
use crate::units::{ColumnIndex, RowIndex, ViewUnits};

/// Matches `VertexInput` in glyph.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable, PartialEq)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

pub const VERTICES_PER_CELL: usize = 6;

/// Which glyph an active cell shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphChoice {
    /// Hash of the cell coordinates, stable across frames.
    Hashed,
    Char(char),
}

/// One glyph to draw this frame, produced by the simulator or the intro.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActiveCell {
    pub column: ColumnIndex,
    pub row: RowIndex,
    pub size: ViewUnits,
    pub color: [f32; 4],
    pub glyph: GlyphChoice,
}

/// Two triangles covering one glyph quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterCell {
    pub vertices: [Vertex; VERTICES_PER_CELL],
}

impl CharacterCell {
    /// Place `glyph` inside the square cell whose top-left corner is `origin`.
    pub fn new(glyph: &Glyph, color: [f32; 4], origin: [ViewUnits; 2], size: ViewUnits) -> Self {
        let x0 = origin[0].get() + glyph.offset[0] * size.get();
        let y0 = origin[1].get() + glyph.offset[1] * size.get();
        let x1 = x0 + glyph.size[0] * size.get();
        let y1 = y0 + glyph.size[1] * size.get();
        let [u0, v0] = glyph.uv0;
        let [u1, v1] = glyph.uv1;

        let vertex = |position: [f32; 2], uv: [f32; 2]| Vertex {
            position,
            uv,
            color,
        };

        Self {
            vertices: [
                vertex([x0, y0], [u0, v0]),
                vertex([x0, y1], [u0, v1]),
                vertex([x1, y0], [u1, v0]),
                vertex([x0, y1], [u0, v1]),
                vertex([x1, y1], [u1, v1]),
                vertex([x1, y0], [u1, v0]),
            ],
        }
    }
}

/// Per-frame vertex batch. Each depth layer occupies one contiguous range so
/// the whole frame uploads in a single buffer write.
#[derive(Debug, Default)]
pub struct CellBatch {
    vertices: Vec<Vertex>,
    ranges: Vec<Range<u32>>,
}

impl CellBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.ranges.clear();
    }

    /// Append one layer's cells and return its vertex range.
    ///
    /// Cells whose character is missing from the provider are skipped.
    pub fn push_layer(&mut self, cells: &[ActiveCell], glyphs: &dyn GlyphProvider) -> Range<u32> {
        let start = self.vertices.len() as u32;
        self.vertices.reserve(cells.len() * VERTICES_PER_CELL);

        for cell in cells {
            let glyph = match cell.glyph {
                GlyphChoice::Hashed => glyphs.get_random_glyph(cell.column, cell.row),
                GlyphChoice::Char(ch) => match glyphs.get_glyph(ch) {
                    Some(glyph) => glyph,
                    None => continue,
                },
            };
            let origin = [cell.column.to_view(cell.size), cell.row.to_view(cell.size)];
            let quad = CharacterCell::new(glyph, cell.color, origin, cell.size);
            self.vertices.extend_from_slice(&quad.vertices);
        }

        let range = start..self.vertices.len() as u32;
        self.ranges.push(range.clone());
        range
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn layer_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn layer_range(&self, layer: usize) -> Range<u32> {
        self.ranges.get(layer).cloned().unwrap_or(0..0)
    }

    pub fn byte_len(&self) -> u64 {
        std::mem::size_of_val(self.vertices.as_slice()) as u64
    }
}
