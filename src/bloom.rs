//! Multi-resolution bloom: soft-knee prefilter, box downsample chain and
//! tent-filter upsample chain with accumulation.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use tracing::{debug, instrument};

use crate::gpu::{
    begin_pass, uniform_layout, GpuContext, RenderTarget, TextureSampling, Uniform, HDR_FORMAT,
};

const BLOOM_WGSL: &str = include_str!("../shaders/wgsl/bloom.wgsl");

/// Matches `BloomParams` in bloom.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BloomParams {
    pub threshold: f32,
    pub knee: f32,
    pub _pad: [f32; 2],
}

/// Level sizes halving from `width` x `height` while both dimensions stay at least 1.
pub fn mip_chain_sizes(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut sizes = Vec::new();
    let (mut w, mut h) = (width, height);
    while w >= 1 && h >= 1 {
        sizes.push((w, h));
        w /= 2;
        h /= 2;
    }
    sizes
}

/// Paired targets of one mip level.
struct BloomLevel {
    downsample: RenderTarget,
    upsample: RenderTarget,
}

pub struct BloomEngine {
    prefilter: wgpu::RenderPipeline,
    downsample: wgpu::RenderPipeline,
    upsample: wgpu::RenderPipeline,
    params: Uniform<BloomParams>,
    levels: Vec<BloomLevel>,
    width: u32,
    height: u32,
}

impl BloomEngine {
    pub fn new(ctx: &GpuContext, sampling: &TextureSampling) -> Result<Self> {
        let params_layout = uniform_layout(&ctx.device, "rain-bloom-params");
        let module = ctx
            .create_fullscreen_shader("rain-bloom", BLOOM_WGSL)
            .context("failed to build bloom shader")?;

        let single = [&params_layout, sampling.layout()];
        let paired = [&params_layout, sampling.layout(), sampling.layout()];
        let prefilter = ctx.fullscreen_pipeline(
            "rain-bloom-prefilter",
            &module,
            "fs_prefilter",
            &single,
            HDR_FORMAT,
            None,
        )?;
        let downsample = ctx.fullscreen_pipeline(
            "rain-bloom-downsample",
            &module,
            "fs_downsample",
            &single,
            HDR_FORMAT,
            None,
        )?;
        let upsample = ctx.fullscreen_pipeline(
            "rain-bloom-upsample",
            &module,
            "fs_upsample",
            &paired,
            HDR_FORMAT,
            None,
        )?;
        let params = Uniform::new(
            &ctx.device,
            &params_layout,
            "rain-bloom-params",
            &BloomParams::zeroed(),
        );

        Ok(Self {
            prefilter,
            downsample,
            upsample,
            params,
            levels: Vec::new(),
            width: 0,
            height: 0,
        })
    }

    /// Replace the whole mip chain with one sized for `width` x `height`.
    #[instrument(skip(self, ctx, sampling))]
    pub fn resize(
        &mut self,
        ctx: &GpuContext,
        sampling: &TextureSampling,
        width: u32,
        height: u32,
    ) {
        self.levels = mip_chain_sizes(width, height)
            .into_iter()
            .enumerate()
            .map(|(index, (w, h))| BloomLevel {
                downsample: RenderTarget::new(
                    &ctx.device,
                    sampling,
                    &format!("rain-bloom-down-{index}"),
                    w,
                    h,
                    HDR_FORMAT,
                ),
                upsample: RenderTarget::new(
                    &ctx.device,
                    sampling,
                    &format!("rain-bloom-up-{index}"),
                    w,
                    h,
                    HDR_FORMAT,
                ),
            })
            .collect();
        self.width = width;
        self.height = height;
        debug!(levels = self.levels.len(), "resized bloom mip chain");
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Sizes of the allocated (downsample, upsample) targets per level.
    pub fn level_sizes(&self) -> Vec<((u32, u32), (u32, u32))> {
        self.levels
            .iter()
            .map(|level| (level.downsample.size(), level.upsample.size()))
            .collect()
    }

    pub fn downsample_target(&self, level: usize) -> &RenderTarget {
        &self.levels[level].downsample
    }

    pub fn upsample_target(&self, level: usize) -> &RenderTarget {
        &self.levels[level].upsample
    }

    /// Encode the full bloom computation for `source` and return the full-resolution result.
    pub fn compute(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        source: &RenderTarget,
        threshold: f32,
        knee: f32,
    ) -> &RenderTarget {
        assert!(
            self.width > 0 && self.height > 0,
            "bloom computed before resize"
        );
        assert_eq!(
            source.size(),
            (self.width, self.height),
            "bloom source does not match the mip chain"
        );

        self.params.write(
            &ctx.queue,
            &BloomParams {
                threshold,
                knee: knee.max(0.0),
                _pad: [0.0; 2],
            },
        );

        let first = &self.levels[0];
        self.draw(encoder, &self.prefilter, "rain-bloom-prefilter", &first.downsample, &[source]);

        for pair in self.levels.windows(2) {
            self.draw(
                encoder,
                &self.downsample,
                "rain-bloom-downsample",
                &pair[1].downsample,
                &[&pair[0].downsample],
            );
        }

        let last = &self.levels[self.levels.len() - 1];
        last.downsample.copy_to(encoder, &last.upsample);

        for pair in self.levels.windows(2).rev() {
            self.draw(
                encoder,
                &self.upsample,
                "rain-bloom-upsample",
                &pair[0].upsample,
                &[&pair[0].downsample, &pair[1].upsample],
            );
        }

        &first.upsample
    }

    fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        label: &str,
        destination: &RenderTarget,
        inputs: &[&RenderTarget],
    ) {
        let mut pass = begin_pass(
            encoder,
            label,
            destination.view(),
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        );
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, self.params.bind_group(), &[]);
        for (slot, input) in inputs.iter().enumerate() {
            pass.set_bind_group(slot as u32 + 1, input.bind_group(), &[]);
        }
        pass.draw(0..3, 0..1);
    }
}
