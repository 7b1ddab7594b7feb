//! Falling-string simulation and depth-layer bucketing.
//!
//! Strings live in a fixed array of slots. A slot is respawned in place above
//! the view once its tail has scrolled past the bottom, and every slot is
//! reseeded when the viewport changes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::cell::{ActiveCell, GlyphChoice};
use crate::config::SimulationConfig;
use crate::palette::ColorPalette;
use crate::units::{ColumnIndex, RowIndex, ViewUnits, Viewport};

/// Exponent applied to the uniform layer sample; larger values make near layers rarer.
pub const DEPTH_BIAS_EXPONENT: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FallingString {
    pub x: ColumnIndex,
    /// Fractional head row, in cells of this string's layer.
    pub y: f32,
    /// Rows per second.
    pub speed: f32,
    pub length: u32,
    pub layer_index: usize,
}

impl FallingString {
    pub fn head_row(&self) -> RowIndex {
        RowIndex::from_head(self.y)
    }

    pub fn tail_row(&self) -> RowIndex {
        self.head_row().offset(1 - self.length as i32)
    }
}

/// A depth bucket and the cells it collected this frame.
#[derive(Debug, Clone)]
pub struct DepthLayer {
    pub depth: f32,
    pub cells: Vec<ActiveCell>,
}

/// Result of advancing one string by one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringStep {
    /// Head row the cells were emitted for.
    pub head: RowIndex,
    /// Head position after the advance, before any respawn.
    pub head_y: f32,
    pub respawned: bool,
}

pub struct RainSimulator {
    config: SimulationConfig,
    palette: ColorPalette,
    strings: Vec<FallingString>,
    layers: Vec<DepthLayer>,
    viewport: Viewport,
    rng: StdRng,
}

impl RainSimulator {
    pub fn new(config: &SimulationConfig, palette: ColorPalette, seed: u64) -> Self {
        let layers = config
            .depth_layers
            .iter()
            .map(|&depth| DepthLayer {
                depth,
                cells: Vec::new(),
            })
            .collect();
        Self {
            config: config.clone(),
            palette,
            strings: Vec::new(),
            layers,
            viewport: Viewport::from_pixels(0, 0, config.base_columns),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Populate `count` strings for a view of `view_height`, replacing any existing ones.
    pub fn initialize(&mut self, count: usize, view_height: ViewUnits) {
        self.viewport.height = view_height;
        self.strings.clear();
        self.strings.reserve(count);
        for _ in 0..count {
            let string = self.spawn();
            self.strings.push(string);
        }
        debug!(count, view_height = view_height.get(), "initialized falling strings");
    }

    /// Reseed every string for a new viewport.
    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        let count = self.config.string_count as usize;
        self.initialize(count, viewport.height);
    }

    /// Advance every string by `dt` seconds and refill the layer buckets.
    pub fn update(&mut self, dt: f32, viewport: &Viewport) {
        for layer in &mut self.layers {
            layer.cells.clear();
        }
        for index in 0..self.strings.len() {
            self.update_string(index, dt, viewport.width, viewport.height);
        }
    }

    /// Advance one string, emit its cells into its layer bucket, and respawn it
    /// if its tail has left the view.
    pub fn update_string(
        &mut self,
        index: usize,
        dt: f32,
        view_width: ViewUnits,
        view_height: ViewUnits,
    ) -> StringStep {
        let string = &mut self.strings[index];
        string.y += dt * string.speed;
        let string = *string;

        let cell_size = self.cell_size(string.layer_index, view_width);
        let head = string.head_row();
        let tail = string.tail_row();
        let alpha_scale = self.layers[string.layer_index].depth;
        let span = (head.0 - tail.0) as f32;

        let visible = |row: RowIndex| {
            let top = row.to_view(cell_size).get();
            top + cell_size.get() > 0.0 && top < view_height.get()
        };

        for row in tail.0..head.0 {
            let row = RowIndex(row);
            if !visible(row) {
                continue;
            }
            let t = (row.0 - tail.0) as f32 / span;
            let rgb = self.palette.sample(t);
            self.layers[string.layer_index].cells.push(ActiveCell {
                column: string.x,
                row,
                size: cell_size,
                color: [rgb[0], rgb[1], rgb[2], t * alpha_scale],
                glyph: GlyphChoice::Hashed,
            });
        }

        if visible(head) {
            let rgb = self.palette.head();
            self.layers[string.layer_index].cells.push(ActiveCell {
                column: string.x,
                row: head,
                size: cell_size,
                color: [rgb[0], rgb[1], rgb[2], 1.0],
                glyph: GlyphChoice::Hashed,
            });
        }

        let respawned = tail.to_view(cell_size).get() >= view_height.get();
        if respawned {
            self.strings[index] = self.spawn();
        }

        StringStep {
            head,
            head_y: string.y,
            respawned,
        }
    }

    fn spawn(&mut self) -> FallingString {
        let layer_count = self.layers.len();
        let t: f32 = self.rng.random();
        let layer_index = ((t.powi(DEPTH_BIAS_EXPONENT) * layer_count as f32) as usize)
            .min(layer_count - 1);

        let columns = self.column_count(layer_index);
        let x = ColumnIndex(self.rng.random_range(0..columns) as i32);
        let speed = if self.config.min_speed < self.config.max_speed {
            self.rng
                .random_range(self.config.min_speed..=self.config.max_speed)
        } else {
            self.config.min_speed
        };
        let length = self
            .rng
            .random_range(self.config.min_length..=self.config.max_length);
        let lead = self.rng.random_range(0..self.config.max_length);
        let y = -((length + lead) as f32);

        FallingString {
            x,
            y,
            speed,
            length,
            layer_index,
        }
    }

    /// Number of columns available to strings of `layer_index`.
    pub fn column_count(&self, layer_index: usize) -> u32 {
        let depth = self.layers[layer_index].depth;
        ((self.config.base_columns as f32 / depth).floor() as u32).max(1)
    }

    /// Edge length of a cell in `layer_index` for a view `view_width` wide.
    pub fn cell_size(&self, layer_index: usize, view_width: ViewUnits) -> ViewUnits {
        let column_width = view_width.get() / self.config.base_columns as f32;
        ViewUnits(column_width * self.layers[layer_index].depth)
    }

    pub fn strings(&self) -> &[FallingString] {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut [FallingString] {
        &mut self.strings
    }

    pub fn layers(&self) -> &[DepthLayer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn palette_mut(&mut self) -> &mut ColorPalette {
        &mut self.palette
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig {
            string_count: 200,
            base_columns: 40,
            min_length: 3,
            max_length: 12,
            min_speed: 5.0,
            max_speed: 15.0,
            depth_layers: vec![0.25, 0.5, 1.0],
        }
    }

    fn palette() -> ColorPalette {
        ColorPalette::new(vec![[0.0, 0.2, 0.0], [0.0, 1.0, 0.0]], [1.5, 1.5, 1.5])
    }

    #[test]
    fn cell_size_scales_with_depth() {
        let sim = RainSimulator::new(&config(), palette(), 1);
        assert_eq!(sim.cell_size(0, ViewUnits(40.0)), ViewUnits(0.25));
        assert_eq!(sim.cell_size(2, ViewUnits(40.0)), ViewUnits(1.0));
        assert_eq!(sim.column_count(0), 160);
        assert_eq!(sim.column_count(2), 40);
    }

    #[test]
    fn far_layers_are_more_common() {
        let mut sim = RainSimulator::new(&config(), palette(), 3);
        sim.initialize(3000, ViewUnits(30.0));
        let mut counts = [0_usize; 3];
        for string in sim.strings() {
            counts[string.layer_index] += 1;
        }
        assert!(counts[0] > counts[1], "{counts:?}");
        assert!(counts[1] > counts[2], "{counts:?}");
    }

    #[test]
    fn single_cell_string_emits_only_a_bright_head() {
        let mut cfg = config();
        cfg.min_length = 1;
        cfg.max_length = 1;
        cfg.depth_layers = vec![1.0];
        let mut sim = RainSimulator::new(&cfg, palette(), 9);
        sim.initialize(1, ViewUnits(30.0));
        sim.strings_mut()[0].y = 4.0;

        sim.update_string(0, 0.0, ViewUnits(40.0), ViewUnits(30.0));

        let cells = &sim.layers()[0].cells;
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].row, RowIndex(4));
        assert_eq!(cells[0].color, [1.5, 1.5, 1.5, 1.0]);
    }

    #[test]
    fn rows_above_and_below_the_view_are_culled() {
        let mut cfg = config();
        cfg.min_length = 10;
        cfg.max_length = 10;
        cfg.depth_layers = vec![1.0];
        let mut sim = RainSimulator::new(&cfg, palette(), 5);
        sim.initialize(1, ViewUnits(30.0));
        sim.strings_mut()[0].y = 3.0;

        sim.update_string(0, 0.0, ViewUnits(40.0), ViewUnits(30.0));

        let rows = sim.layers()[0]
            .cells
            .iter()
            .map(|cell| cell.row.0)
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![0, 1, 2, 3]);
    }

    #[test]
    fn resize_reseeds_every_slot() {
        let mut sim = RainSimulator::new(&config(), palette(), 21);
        sim.resize(Viewport::from_pixels(800, 600, 40));
        assert_eq!(sim.strings().len(), 200);
        for string in sim.strings_mut() {
            string.y = 500.0;
        }

        sim.resize(Viewport::from_pixels(400, 900, 40));
        assert_eq!(sim.strings().len(), 200);
        assert!(sim.strings().iter().all(|string| string.y < 0.0));
        assert!((sim.viewport().height.get() - 90.0).abs() < 1e-4);
    }
}
