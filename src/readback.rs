//! CPU access to GPU textures for snapshots and tests.

use std::sync::mpsc;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::gpu::{align_to, begin_pass, GpuContext, RenderTarget};

const CONVERT_WGSL: &str = include_str!("../shaders/wgsl/convert.wgsl");

const F32_TEXEL_BYTES: u32 = 16;

/// Copy a whole texture into host memory with row padding removed.
pub fn read_texture_bytes(
    ctx: &GpuContext,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
    bytes_per_texel: u32,
) -> Result<Vec<u8>> {
    let unpadded_bytes_per_row = width
        .checked_mul(bytes_per_texel)
        .ok_or_else(|| anyhow!("texture width overflow when computing row bytes"))?;
    let padded_bytes_per_row = align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
    let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("rain-readback-buffer"),
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("rain-readback-encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue.submit(Some(encoder.finish()));

    let buffer_slice = buffer.slice(..);
    let (sender, receiver) = mpsc::channel();
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    ctx.device.poll(wgpu::Maintain::Wait);

    receiver
        .recv()
        .map_err(|_| anyhow!("failed receiving GPU map callback"))?
        .context("GPU buffer mapping failed")?;

    let mapped = buffer_slice.get_mapped_range();
    let mut bytes = vec![0_u8; (unpadded_bytes_per_row * height) as usize];
    for (row_index, chunk) in mapped
        .chunks(padded_bytes_per_row as usize)
        .take(height as usize)
        .enumerate()
    {
        let dst_start = row_index * unpadded_bytes_per_row as usize;
        let dst_end = dst_start + unpadded_bytes_per_row as usize;
        bytes[dst_start..dst_end].copy_from_slice(&chunk[..unpadded_bytes_per_row as usize]);
    }

    drop(mapped);
    buffer.unmap();
    Ok(bytes)
}

/// Read an HDR target as linear RGBA texels, row-major from the top.
pub fn read_target_f32(ctx: &GpuContext, target: &RenderTarget) -> Result<Vec<[f32; 4]>> {
    let staging = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("rain-readback-f32"),
        size: target.extent(),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let staging_view = staging.create_view(&wgpu::TextureViewDescriptor::default());
    convert(
        ctx,
        target.view(),
        &staging_view,
        wgpu::TextureFormat::Rgba32Float,
    )?;

    let bytes = read_texture_bytes(
        ctx,
        &staging,
        target.width(),
        target.height(),
        F32_TEXEL_BYTES,
    )?;
    debug!(target = target.label(), bytes = bytes.len(), "read back target");
    Ok(bytes
        .chunks_exact(F32_TEXEL_BYTES as usize)
        .map(|texel| {
            let channel = |i: usize| {
                let bytes = &texel[i * 4..i * 4 + 4];
                f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            };
            [channel(0), channel(1), channel(2), channel(3)]
        })
        .collect())
}

/// Overwrite an HDR target with linear RGBA texels, row-major from the top.
pub fn upload_target_f32(
    ctx: &GpuContext,
    target: &RenderTarget,
    texels: &[[f32; 4]],
) -> Result<()> {
    let expected = (target.width() * target.height()) as usize;
    if texels.len() != expected {
        return Err(anyhow!(
            "upload to '{}' needs {} texels, got {}",
            target.label(),
            expected,
            texels.len()
        ));
    }

    let staging = ctx.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("rain-upload-f32"),
        size: target.extent(),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let bytes = texels
        .iter()
        .flat_map(|texel| texel.iter().flat_map(|channel| channel.to_le_bytes()))
        .collect::<Vec<u8>>();
    ctx.queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &staging,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &bytes,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(target.width() * F32_TEXEL_BYTES),
            rows_per_image: Some(target.height()),
        },
        target.extent(),
    );

    let staging_view = staging.create_view(&wgpu::TextureViewDescriptor::default());
    convert(ctx, &staging_view, target.view(), target.format())
}

/// Texel-exact copy from `source` into `destination` through a `textureLoad` pass.
fn convert(
    ctx: &GpuContext,
    source: &wgpu::TextureView,
    destination: &wgpu::TextureView,
    destination_format: wgpu::TextureFormat,
) -> Result<()> {
    let layout = ctx
        .device
        .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("rain-convert-bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });
    let module = ctx.create_fullscreen_shader("rain-convert", CONVERT_WGSL)?;
    let pipeline = ctx.fullscreen_pipeline(
        "rain-convert",
        &module,
        "fs_main",
        &[&layout],
        destination_format,
        None,
    )?;
    let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("rain-convert-bg"),
        layout: &layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::TextureView(source),
        }],
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("rain-convert-encoder"),
        });
    {
        let mut pass = begin_pass(
            &mut encoder,
            "rain-convert-pass",
            destination,
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
        );
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
    ctx.queue.submit(Some(encoder.finish()));
    Ok(())
}
