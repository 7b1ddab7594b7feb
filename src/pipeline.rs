//! The frame owner: simulation, glyphs, passes and their targets.

use anyhow::{bail, Context, Result};
use tracing::{debug, info, instrument};

use crate::bloom::BloomEngine;
use crate::blur::BlurFilter;
use crate::cell::{ActiveCell, CellBatch};
use crate::cell_pass::CellPass;
use crate::composite::HdrComposite;
use crate::compositor::{BlurSettings, DepthCompositor, LayerDraw};
use crate::config::RainConfig;
use crate::glyphs::{GlyphAtlas, GlyphProvider};
use crate::gpu::{GpuContext, RenderTarget, TextureSampling};
use crate::intro::{IntroState, TerminalIntro};
use crate::palette::ColorPalette;
use crate::params::{ParameterSink, Tunables};
use crate::readback::read_texture_bytes;
use crate::simulation::RainSimulator;
use crate::units::Viewport;

/// Output format of offscreen renders.
pub const SNAPSHOT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Fixed-interval trigger for glyph swaps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlitchTimer {
    interval: f32,
    elapsed: f32,
}

impl GlitchTimer {
    /// A zero interval never fires.
    pub fn new(interval: f32) -> Self {
        Self {
            interval,
            elapsed: 0.0,
        }
    }

    /// Number of intervals completed during `dt`.
    pub fn tick(&mut self, dt: f32) -> u32 {
        if self.interval <= 0.0 {
            return 0;
        }
        self.elapsed += dt;
        let mut fired = 0;
        while self.elapsed >= self.interval {
            self.elapsed -= self.interval;
            fired += 1;
        }
        fired
    }
}

/// Owns every GPU resource of the effect.
///
/// Fields drop in declaration order, so passes and targets are released
/// before the device and queue in `ctx`.
pub struct RainPipeline {
    cells: CellPass,
    blur: BlurFilter,
    bloom: BloomEngine,
    composite: HdrComposite,
    compositor: DepthCompositor,
    offscreen: Option<RenderTarget>,
    sampling: TextureSampling,
    glyphs: GlyphAtlas,
    simulator: RainSimulator,
    intro: TerminalIntro,
    batch: CellBatch,
    draws: Vec<LayerDraw>,
    intro_cells: Vec<ActiveCell>,
    tunables: Tunables,
    glitch: GlitchTimer,
    swap_count: usize,
    viewport: Viewport,
    ctx: GpuContext,
}

impl RainPipeline {
    /// Build every pass for output `format` and size the targets for `width` x `height`.
    #[instrument(skip(ctx, config, glyphs))]
    pub fn new(
        ctx: GpuContext,
        config: &RainConfig,
        glyphs: GlyphAtlas,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        seed: u64,
    ) -> Result<Self> {
        let sampling = TextureSampling::new(&ctx.device);
        let cells = CellPass::new(&ctx, &sampling, &glyphs).context("failed to create glyph pass")?;
        let blur = BlurFilter::new(&ctx, &sampling).context("failed to create blur filter")?;
        let bloom = BloomEngine::new(&ctx, &sampling).context("failed to create bloom engine")?;
        let composite =
            HdrComposite::new(&ctx, &sampling, format).context("failed to create HDR composite")?;

        let tunables = Tunables::from_config(config);
        let palette = ColorPalette::from_config(&config.palette);
        let simulator = RainSimulator::new(&config.simulation, palette, seed);

        let mut pipeline = Self {
            cells,
            blur,
            bloom,
            composite,
            compositor: DepthCompositor::new(),
            offscreen: None,
            sampling,
            glyphs,
            simulator,
            intro: TerminalIntro::new(&config.intro),
            batch: CellBatch::new(),
            draws: Vec::new(),
            intro_cells: Vec::new(),
            tunables,
            glitch: GlitchTimer::new(config.glyphs.swap_interval_secs),
            swap_count: config.glyphs.swap_count as usize,
            viewport: Viewport::from_pixels(0, 0, config.simulation.base_columns),
            ctx,
        };
        pipeline.resize(width, height);
        info!(width, height, ?format, "rain pipeline ready");
        Ok(pipeline)
    }

    /// Reallocate every size-dependent target and reseed the strings.
    ///
    /// A zero-sized viewport (minimized window) only records the size; the
    /// next non-empty resize allocates.
    #[instrument(skip(self))]
    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = Viewport::from_pixels(width, height, self.simulator.config().base_columns);
        if self.viewport.is_empty() {
            debug!("viewport is empty, skipping target allocation");
            return;
        }
        self.compositor
            .resize(&self.ctx, &self.sampling, width, height);
        self.blur.resize(&self.ctx, &self.sampling, width, height);
        self.bloom.resize(&self.ctx, &self.sampling, width, height);
        self.offscreen = None;
        self.simulator.resize(self.viewport);
        self.rebuild_batch();
    }

    /// Advance the intro or the rain by `dt` seconds and rebuild the vertex batch.
    pub fn update(&mut self, dt: f32) {
        if self.intro.is_done() {
            self.simulator.update(dt, &self.viewport);
            for _ in 0..self.glitch.tick(dt) {
                self.glyphs.swap_glyphs(self.swap_count);
            }
        } else if self.intro.update(dt) == IntroState::Done {
            info!("intro finished, starting rain");
        }
        self.rebuild_batch();
    }

    fn rebuild_batch(&mut self) {
        self.batch.clear();
        self.draws.clear();
        if self.intro.is_done() {
            for layer in self.simulator.layers() {
                let range = self.batch.push_layer(&layer.cells, &self.glyphs);
                self.draws.push(LayerDraw {
                    depth: layer.depth,
                    range,
                });
            }
        } else {
            self.intro_cells.clear();
            self.intro.collect_cells(&mut self.intro_cells);
            let range = self.batch.push_layer(&self.intro_cells, &self.glyphs);
            self.draws.push(LayerDraw { depth: 1.0, range });
        }
    }

    /// Render the current batch into `output`, which must have the format the
    /// pipeline was built for.
    pub fn render(&mut self, output: &wgpu::TextureView) {
        if self.viewport.is_empty() {
            return;
        }
        self.cells.upload(&self.ctx, &self.batch, &self.viewport);

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rain-frame-encoder"),
            });
        let settings = BlurSettings {
            multiplier: self.tunables.blur_multiplier,
            iterations: self.tunables.blur_iterations,
        };
        let base = self.compositor.compose(
            &self.ctx,
            &mut encoder,
            &self.cells,
            &self.blur,
            &self.draws,
            settings,
        );
        let bloom = self.bloom.compute(
            &self.ctx,
            &mut encoder,
            base,
            self.tunables.bloom_threshold,
            self.tunables.bloom_knee,
        );
        self.composite.render(
            &self.ctx,
            &mut encoder,
            output,
            base,
            bloom,
            self.tunables.exposure,
        );
        self.ctx.queue.submit(Some(encoder.finish()));
    }

    /// Render into an owned sRGB target and return tightly packed RGBA8 rows.
    pub fn render_offscreen(&mut self) -> Result<Vec<u8>> {
        if self.composite.output_format() != SNAPSHOT_FORMAT {
            bail!(
                "offscreen rendering needs a pipeline built for {:?}, this one targets {:?}",
                SNAPSHOT_FORMAT,
                self.composite.output_format()
            );
        }
        if self.viewport.is_empty() {
            bail!("cannot render an empty viewport");
        }
        let (width, height) = (self.viewport.width_px.get(), self.viewport.height_px.get());

        let target = match self.offscreen.take() {
            Some(target) if target.size() == (width, height) => target,
            _ => RenderTarget::new(
                &self.ctx.device,
                &self.sampling,
                "rain-offscreen",
                width,
                height,
                SNAPSHOT_FORMAT,
            ),
        };
        self.render(target.view());
        let pixels = read_texture_bytes(&self.ctx, target.texture(), width, height, 4);
        self.offscreen = Some(target);
        pixels
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.ctx
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn batch(&self) -> &CellBatch {
        &self.batch
    }

    pub fn bloom(&self) -> &BloomEngine {
        &self.bloom
    }

    pub fn blur(&self) -> &BlurFilter {
        &self.blur
    }

    pub fn compositor(&self) -> &DepthCompositor {
        &self.compositor
    }
}

impl ParameterSink for RainPipeline {
    fn tunables(&self) -> Tunables {
        self.tunables.clone()
    }

    fn set_tunables(&mut self, tunables: Tunables) {
        let mut tunables = tunables.sanitized();
        if tunables.gradient.is_empty() {
            tunables.gradient = self.tunables.gradient.clone();
        }
        *self.simulator.palette_mut() =
            ColorPalette::new(tunables.gradient.clone(), tunables.head_color);
        self.tunables = tunables;
    }
}
