//! Separable 3-tap blur applied in place through one ping-pong scratch target.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use tracing::{debug, instrument};

use crate::gpu::{
    begin_pass, uniform_layout, GpuContext, RenderTarget, TextureSampling, Uniform, HDR_FORMAT,
};

const BLUR_WGSL: &str = include_str!("../shaders/wgsl/blur.wgsl");

/// Matches `BlurParams` in blur.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct BlurParams {
    pub strength: f32,
    pub _pad: [f32; 3],
}

/// One output texel of a blur pass: the 0.25/0.5/0.25 kernel over three
/// neighbours, mixed with the centre by `strength`. Strengths above 1
/// extrapolate past the blurred value.
pub fn blur_texel(previous: f32, center: f32, next: f32, strength: f32) -> f32 {
    let blurred = previous * 0.25 + center * 0.5 + next * 0.25;
    center + (blurred - center) * strength
}

pub struct BlurFilter {
    horizontal: wgpu::RenderPipeline,
    vertical: wgpu::RenderPipeline,
    params: Uniform<BlurParams>,
    scratch: Option<RenderTarget>,
}

impl BlurFilter {
    pub fn new(ctx: &GpuContext, sampling: &TextureSampling) -> Result<Self> {
        let params_layout = uniform_layout(&ctx.device, "rain-blur-params");
        let module = ctx
            .create_fullscreen_shader("rain-blur", BLUR_WGSL)
            .context("failed to build blur shader")?;
        let layouts = [&params_layout, sampling.layout()];
        let horizontal = ctx.fullscreen_pipeline(
            "rain-blur-horizontal",
            &module,
            "fs_horizontal",
            &layouts,
            HDR_FORMAT,
            None,
        )?;
        let vertical = ctx.fullscreen_pipeline(
            "rain-blur-vertical",
            &module,
            "fs_vertical",
            &layouts,
            HDR_FORMAT,
            None,
        )?;
        let params = Uniform::new(
            &ctx.device,
            &params_layout,
            "rain-blur-params",
            &BlurParams::zeroed(),
        );

        Ok(Self {
            horizontal,
            vertical,
            params,
            scratch: None,
        })
    }

    /// Reallocate the scratch target for targets of `width` x `height`.
    #[instrument(skip(self, ctx, sampling))]
    pub fn resize(
        &mut self,
        ctx: &GpuContext,
        sampling: &TextureSampling,
        width: u32,
        height: u32,
    ) {
        self.scratch = Some(RenderTarget::new(
            &ctx.device,
            sampling,
            "rain-blur-scratch",
            width,
            height,
            HDR_FORMAT,
        ));
        debug!(width, height, "resized blur scratch");
    }

    pub fn scratch_size(&self) -> Option<(u32, u32)> {
        self.scratch.as_ref().map(RenderTarget::size)
    }

    /// Run `iterations` horizontal + vertical rounds over `target` and submit them.
    ///
    /// Negative strengths are treated as zero, which reproduces the input.
    pub fn apply(&self, ctx: &GpuContext, target: &RenderTarget, strength: f32, iterations: u32) {
        if iterations == 0 {
            return;
        }
        let Some(scratch) = self.scratch.as_ref() else {
            panic!("blur applied before resize");
        };
        assert_eq!(
            scratch.size(),
            target.size(),
            "blur scratch is stale: resize the filter with its target"
        );

        self.params.write(
            &ctx.queue,
            &BlurParams {
                strength: strength.max(0.0),
                _pad: [0.0; 3],
            },
        );

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rain-blur-encoder"),
            });
        for _ in 0..iterations {
            self.pass(&mut encoder, &self.horizontal, target, scratch);
            self.pass(&mut encoder, &self.vertical, scratch, target);
        }
        ctx.queue.submit(Some(encoder.finish()));
    }

    fn pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        source: &RenderTarget,
        destination: &RenderTarget,
    ) {
        let mut pass = begin_pass(
            encoder,
            "rain-blur-pass",
            destination.view(),
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
        );
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, self.params.bind_group(), &[]);
        pass.set_bind_group(1, source.bind_group(), &[]);
        pass.draw(0..3, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_params_is_16_bytes() {
        assert_eq!(std::mem::size_of::<BlurParams>(), 16);
    }

    #[test]
    fn blur_texel_matches_kernel_at_full_strength() {
        assert!((blur_texel(0.0, 1.0, 0.0, 1.0) - 0.5).abs() < 1e-6);
        assert!((blur_texel(1.0, 0.0, 0.0, 1.0) - 0.25).abs() < 1e-6);
        assert_eq!(blur_texel(0.3, 0.7, 0.9, 0.0), 0.7);
    }

    #[test]
    fn strength_above_one_extrapolates() {
        // Far layer 0.15 with multiplier 2.0.
        let strength = (1.0 - 0.15) * 2.0;
        let value = blur_texel(0.0, 1.0, 0.0, strength);
        assert!((value - (1.0 - 0.5 * 1.7)).abs() < 1e-6, "{value}");
        assert!(value < blur_texel(0.0, 1.0, 0.0, 1.0));
    }

    #[test]
    fn blur_source_declares_both_directions() {
        assert!(BLUR_WGSL.contains("fn fs_horizontal"));
        assert!(BLUR_WGSL.contains("fn fs_vertical"));
        assert!(BLUR_WGSL.contains("struct BlurParams"));
    }
}
