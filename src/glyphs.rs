//! Glyph lookup for the cell batch builder.
//!
//! The batch builder only sees [`GlyphProvider`]. [`GlyphAtlas`] is the
//! concrete provider: a single-channel coverage bitmap plus per-glyph UV
//! rectangles and metrics normalized to the cell size, built either from a TTF
//! via fontdue or procedurally when no font is supplied.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use fontdue::{Font, FontSettings};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::FatalError;
use crate::units::{ColumnIndex, RowIndex};

const ATLAS_WIDTH: u32 = 1024;
const ATLAS_PADDING: u32 = 2;

/// Atlas-space rectangle and cell-normalized metrics of one glyph.
///
/// `offset` and `size` are fractions of the cell edge, measured from the cell's
/// top-left corner with y pointing down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glyph {
    pub codepoint: char,
    pub uv0: [f32; 2],
    pub uv1: [f32; 2],
    pub advance: f32,
    pub offset: [f32; 2],
    pub size: [f32; 2],
}

pub trait GlyphProvider {
    fn get_glyph(&self, codepoint: char) -> Option<&Glyph>;

    /// Same glyph for the same cell on every frame until the table is swapped.
    fn get_random_glyph(&self, x: ColumnIndex, y: RowIndex) -> &Glyph;

    /// Swap `count` random pairs in the lookup order used by [`Self::get_random_glyph`].
    fn swap_glyphs(&mut self, count: usize);
}

pub struct GlyphAtlas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    glyphs: Vec<Glyph>,
    by_codepoint: HashMap<char, usize>,
    order: Vec<usize>,
    rng: StdRng,
}

struct RasterizedGlyph {
    codepoint: char,
    width: u32,
    height: u32,
    coverage: Vec<u8>,
    advance: f32,
    offset: [f32; 2],
}

impl GlyphAtlas {
    pub fn from_font_file(path: &Path, charset: &str, pixel_size: f32, seed: u64) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("failed to read font file {}", path.display()))
            .map_err(|error| error.context(FatalError::Font(path.display().to_string())))?;
        Self::from_font_bytes(&bytes, charset, pixel_size, seed).map_err(|error| {
            let message = format!("{}: {error:#}", path.display());
            error.context(FatalError::Font(message))
        })
    }

    pub fn from_font_bytes(
        bytes: &[u8],
        charset: &str,
        pixel_size: f32,
        seed: u64,
    ) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font: {error}"))?;
        let ascent = font
            .horizontal_line_metrics(pixel_size)
            .map_or(pixel_size * 0.8, |metrics| metrics.ascent);

        let mut rasterized = Vec::new();
        for codepoint in unique_visible_chars(charset) {
            if font.lookup_glyph_index(codepoint) == 0 {
                debug!(%codepoint, "font has no glyph, skipping");
                continue;
            }
            let (metrics, coverage) = font.rasterize(codepoint, pixel_size);
            let width = metrics.width as u32;
            let height = metrics.height as u32;
            let left = (pixel_size - width as f32) * 0.5;
            let top = ascent - (metrics.ymin as f32 + height as f32);
            rasterized.push(RasterizedGlyph {
                codepoint,
                width,
                height,
                coverage,
                advance: metrics.advance_width / pixel_size,
                offset: [left / pixel_size, top / pixel_size],
            });
        }

        if rasterized.is_empty() {
            bail!("none of the configured characters exist in the font");
        }

        Ok(Self::pack(rasterized, pixel_size, seed))
    }

    /// Dot-matrix glyphs generated from a hash of the code point, used when no font is given.
    pub fn procedural(charset: &str, seed: u64) -> Self {
        const GRID_W: u32 = 5;
        const GRID_H: u32 = 7;
        const DOT: u32 = 3;
        const CELL: u32 = 24;

        let width = GRID_W * DOT;
        let height = GRID_H * DOT;
        let rasterized = unique_visible_chars(charset)
            .map(|codepoint| {
                let mut coverage = vec![0_u8; (width * height) as usize];
                for gy in 0..GRID_H {
                    for gx in 0..GRID_W {
                        if cell_hash(codepoint as i32, (gy * GRID_W + gx) as i32) % 5 < 2 {
                            continue;
                        }
                        for py in 0..DOT - 1 {
                            for px in 0..DOT - 1 {
                                let x = gx * DOT + px;
                                let y = gy * DOT + py;
                                coverage[(y * width + x) as usize] = 255;
                            }
                        }
                    }
                }
                RasterizedGlyph {
                    codepoint,
                    width,
                    height,
                    coverage,
                    advance: 1.0,
                    offset: [
                        (CELL - width) as f32 * 0.5 / CELL as f32,
                        (CELL - height) as f32 * 0.5 / CELL as f32,
                    ],
                }
            })
            .collect::<Vec<_>>();

        Self::pack(rasterized, CELL as f32, seed)
    }

    /// Shelf-pack rasterized glyphs left to right, top to bottom.
    fn pack(rasterized: Vec<RasterizedGlyph>, pixel_size: f32, seed: u64) -> Self {
        let mut placements = Vec::with_capacity(rasterized.len());
        let (mut cursor_x, mut cursor_y, mut shelf_height) = (ATLAS_PADDING, ATLAS_PADDING, 0);
        for glyph in &rasterized {
            if cursor_x + glyph.width + ATLAS_PADDING > ATLAS_WIDTH {
                cursor_x = ATLAS_PADDING;
                cursor_y += shelf_height + ATLAS_PADDING;
                shelf_height = 0;
            }
            placements.push((cursor_x, cursor_y));
            cursor_x += glyph.width + ATLAS_PADDING;
            shelf_height = shelf_height.max(glyph.height);
        }
        let height = (cursor_y + shelf_height + ATLAS_PADDING).next_power_of_two();

        let mut pixels = vec![0_u8; (ATLAS_WIDTH * height) as usize];
        let mut glyphs = Vec::with_capacity(rasterized.len());
        for (glyph, (x0, y0)) in rasterized.into_iter().zip(placements) {
            for row in 0..glyph.height {
                let src = (row * glyph.width) as usize;
                let dst = ((y0 + row) * ATLAS_WIDTH + x0) as usize;
                pixels[dst..dst + glyph.width as usize]
                    .copy_from_slice(&glyph.coverage[src..src + glyph.width as usize]);
            }

            glyphs.push(Glyph {
                codepoint: glyph.codepoint,
                uv0: [x0 as f32 / ATLAS_WIDTH as f32, y0 as f32 / height as f32],
                uv1: [
                    (x0 + glyph.width) as f32 / ATLAS_WIDTH as f32,
                    (y0 + glyph.height) as f32 / height as f32,
                ],
                advance: glyph.advance,
                offset: glyph.offset,
                size: [
                    glyph.width as f32 / pixel_size,
                    glyph.height as f32 / pixel_size,
                ],
            });
        }

        let by_codepoint = glyphs
            .iter()
            .enumerate()
            .map(|(index, glyph)| (glyph.codepoint, index))
            .collect();
        let order = (0..glyphs.len()).collect();
        debug!(
            glyphs = glyphs.len(),
            width = ATLAS_WIDTH,
            height,
            "packed glyph atlas"
        );

        Self {
            width: ATLAS_WIDTH,
            height,
            pixels,
            glyphs,
            by_codepoint,
            order,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// R8 coverage, `width * height` bytes, row-major, top row first.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

impl GlyphProvider for GlyphAtlas {
    fn get_glyph(&self, codepoint: char) -> Option<&Glyph> {
        self.by_codepoint
            .get(&codepoint)
            .map(|&index| &self.glyphs[index])
    }

    fn get_random_glyph(&self, x: ColumnIndex, y: RowIndex) -> &Glyph {
        assert!(!self.order.is_empty(), "glyph table is empty");
        let slot = cell_hash(x.0, y.0) as usize % self.order.len();
        &self.glyphs[self.order[slot]]
    }

    fn swap_glyphs(&mut self, count: usize) {
        let len = self.order.len();
        if len < 2 {
            return;
        }
        for _ in 0..count {
            let a = self.rng.random_range(0..len);
            let b = self.rng.random_range(0..len);
            self.order.swap(a, b);
        }
    }
}

fn unique_visible_chars(charset: &str) -> impl Iterator<Item = char> + '_ {
    let mut seen = Vec::new();
    charset.chars().filter(move |ch| {
        if ch.is_whitespace() || seen.contains(ch) {
            return false;
        }
        seen.push(*ch);
        true
    })
}

/// Integer hash of a cell coordinate pair.
fn cell_hash(x: i32, y: i32) -> u32 {
    let mut h = (x as u32).wrapping_mul(0x9E37_79B1) ^ (y as u32).wrapping_mul(0x85EB_CA77);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    h = h.wrapping_mul(0x297A_2D39);
    h ^= h >> 15;
    h
}
