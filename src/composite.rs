//! Final opaque write: base + bloom, exponential tonemap, sRGB output.

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};

use crate::gpu::{begin_pass, uniform_layout, GpuContext, RenderTarget, TextureSampling, Uniform};

const COMPOSITE_WGSL: &str = include_str!("../shaders/wgsl/composite.wgsl");

/// Matches `CompositeParams` in composite.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CompositeParams {
    pub exposure: f32,
    pub encode_srgb: u32,
    pub _pad: [f32; 2],
}

/// CPU reference of the shader's tonemap for one channel.
pub fn tonemap(value: f32, exposure: f32) -> f32 {
    1.0 - (-value.max(0.0) * exposure).exp()
}

pub struct HdrComposite {
    pipeline: wgpu::RenderPipeline,
    params: Uniform<CompositeParams>,
    output_format: wgpu::TextureFormat,
}

impl HdrComposite {
    /// Build the composite for `output_format`. Non-sRGB formats get the
    /// transfer function applied in the shader.
    pub fn new(
        ctx: &GpuContext,
        sampling: &TextureSampling,
        output_format: wgpu::TextureFormat,
    ) -> Result<Self> {
        let params_layout = uniform_layout(&ctx.device, "rain-composite-params");
        let module = ctx
            .create_fullscreen_shader("rain-composite", COMPOSITE_WGSL)
            .context("failed to build composite shader")?;
        let pipeline = ctx.fullscreen_pipeline(
            "rain-composite",
            &module,
            "fs_main",
            &[&params_layout, sampling.layout(), sampling.layout()],
            output_format,
            None,
        )?;
        let params = Uniform::new(
            &ctx.device,
            &params_layout,
            "rain-composite-params",
            &CompositeParams::zeroed(),
        );
        Ok(Self {
            pipeline,
            params,
            output_format,
        })
    }

    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    pub fn render(
        &self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        base: &RenderTarget,
        bloom: &RenderTarget,
        exposure: f32,
    ) {
        self.params.write(
            &ctx.queue,
            &CompositeParams {
                exposure,
                encode_srgb: u32::from(!self.output_format.is_srgb()),
                _pad: [0.0; 2],
            },
        );

        let mut pass = begin_pass(
            encoder,
            "rain-composite-pass",
            output,
            wgpu::LoadOp::Clear(wgpu::Color::BLACK),
        );
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, self.params.bind_group(), &[]);
        pass.set_bind_group(1, base.bind_group(), &[]);
        pass.set_bind_group(2, bloom.bind_group(), &[]);
        pass.draw(0..3, 0..1);
    }
}
