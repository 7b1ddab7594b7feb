//! Draws cell batch ranges over a render target with alpha blending.

use std::ops::Range;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::cell::{CellBatch, Vertex};
use crate::glyphs::GlyphAtlas;
use crate::gpu::{
    begin_pass, uniform_layout, GpuContext, RenderTarget, TextureSampling, Uniform, HDR_FORMAT,
};
use crate::units::Viewport;

const GLYPH_WGSL: &str = include_str!("../shaders/wgsl/glyph.wgsl");

const MIN_VERTEX_BUFFER_BYTES: u64 = 64 * 1024;

/// Matches `Globals` in glyph.wgsl.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlyphGlobals {
    pub view_size: [f32; 2],
    pub _pad: [f32; 2],
}

pub struct CellPass {
    pipeline: wgpu::RenderPipeline,
    globals: Uniform<GlyphGlobals>,
    _atlas_texture: wgpu::Texture,
    atlas_bind_group: wgpu::BindGroup,
    vertex_buffer: wgpu::Buffer,
    vertex_capacity: u64,
}

impl CellPass {
    pub fn new(ctx: &GpuContext, sampling: &TextureSampling, atlas: &GlyphAtlas) -> Result<Self> {
        let globals_layout = uniform_layout(&ctx.device, "rain-glyph-globals");
        let module = ctx
            .create_shader("rain-glyph", GLYPH_WGSL)
            .context("failed to build glyph shader")?;

        let pipeline = ctx.validated("rain-glyph", |device| {
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("rain-glyph-layout"),
                bind_group_layouts: &[&globals_layout, sampling.layout()],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("rain-glyph-pipeline"),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: "vs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<Vertex>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &wgpu::vertex_attr_array![
                            0 => Float32x2,
                            1 => Float32x2,
                            2 => Float32x4
                        ],
                    }],
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: "fs_main",
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: HDR_FORMAT,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            })
        })?;

        let extent = wgpu::Extent3d {
            width: atlas.width(),
            height: atlas.height(),
            depth_or_array_layers: 1,
        };
        let atlas_texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("rain-glyph-atlas"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &atlas_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            atlas.pixels(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(atlas.width()),
                rows_per_image: Some(atlas.height()),
            },
            extent,
        );
        let atlas_view = atlas_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let atlas_bind_group = sampling.bind(&ctx.device, "rain-glyph-atlas", &atlas_view);

        let globals = Uniform::new(
            &ctx.device,
            &globals_layout,
            "rain-glyph-globals",
            &GlyphGlobals::zeroed(),
        );
        let vertex_buffer = create_vertex_buffer(&ctx.device, MIN_VERTEX_BUFFER_BYTES);

        Ok(Self {
            pipeline,
            globals,
            _atlas_texture: atlas_texture,
            atlas_bind_group,
            vertex_buffer,
            vertex_capacity: MIN_VERTEX_BUFFER_BYTES,
        })
    }

    /// Upload the whole frame's vertices and the view size. Called once per frame
    /// before any layer is drawn.
    pub fn upload(&mut self, ctx: &GpuContext, batch: &CellBatch, viewport: &Viewport) {
        self.globals.write(
            &ctx.queue,
            &GlyphGlobals {
                view_size: [viewport.width.get(), viewport.height.get()],
                _pad: [0.0; 2],
            },
        );

        let needed = batch.byte_len();
        if needed == 0 {
            return;
        }
        if needed > self.vertex_capacity {
            self.vertex_capacity = needed.next_power_of_two();
            self.vertex_buffer = create_vertex_buffer(&ctx.device, self.vertex_capacity);
            debug!(bytes = self.vertex_capacity, "grew glyph vertex buffer");
        }
        ctx.queue
            .write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(batch.vertices()));
    }

    /// Blend the vertices in `range` over the current contents of `target`.
    pub fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &RenderTarget,
        range: Range<u32>,
    ) {
        if range.is_empty() {
            return;
        }
        let mut pass = begin_pass(encoder, "rain-glyph-pass", target.view(), wgpu::LoadOp::Load);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, self.globals.bind_group(), &[]);
        pass.set_bind_group(1, &self.atlas_bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(range, 0..1);
    }
}

fn create_vertex_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("rain-glyph-vertices"),
        size,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}
