//! Back-to-front depth compositing with per-layer blur.
//!
//! Every layer but the nearest is drawn over the running composite, and the
//! result is blurred by `(1 - depth) * multiplier`, so later blurs also soften
//! what is already behind them. The nearest layer lands unblurred in the
//! output target that feeds the bloom.

use std::mem;
use std::ops::Range;

use tracing::{instrument, trace};

use crate::blur::BlurFilter;
use crate::cell_pass::CellPass;
use crate::gpu::{GpuContext, RenderTarget, TextureSampling, HDR_FORMAT};

/// One layer's vertex range in the uploaded batch and its depth factor.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDraw {
    pub depth: f32,
    pub range: Range<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurSettings {
    pub multiplier: f32,
    pub iterations: u32,
}

impl BlurSettings {
    /// Strength for a layer of `depth`; nearer layers blur less.
    pub fn strength(&self, depth: f32) -> f32 {
        ((1.0 - depth) * self.multiplier).max(0.0)
    }
}

struct CompositeTargets {
    current: RenderTarget,
    next: RenderTarget,
    output: RenderTarget,
}

#[derive(Default)]
pub struct DepthCompositor {
    targets: Option<CompositeTargets>,
}

impl DepthCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self, ctx, sampling))]
    pub fn resize(
        &mut self,
        ctx: &GpuContext,
        sampling: &TextureSampling,
        width: u32,
        height: u32,
    ) {
        let target = |label: &str| {
            RenderTarget::new(&ctx.device, sampling, label, width, height, HDR_FORMAT)
        };
        self.targets = Some(CompositeTargets {
            current: target("rain-composite-a"),
            next: target("rain-composite-b"),
            output: target("rain-final-render"),
        });
    }

    pub fn size(&self) -> Option<(u32, u32)> {
        self.targets.as_ref().map(|targets| targets.output.size())
    }

    /// Composite `layers`, furthest first. Background layers are submitted as
    /// they go; the nearest layer is encoded into `encoder` so the caller can
    /// chain bloom and tonemapping after it.
    pub fn compose(
        &mut self,
        ctx: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        cells: &CellPass,
        blur: &BlurFilter,
        layers: &[LayerDraw],
        settings: BlurSettings,
    ) -> &RenderTarget {
        let Some(targets) = self.targets.as_mut() else {
            panic!("compositor used before resize");
        };
        let Some((nearest, background)) = layers.split_last() else {
            panic!("compositor needs at least one layer");
        };

        let mut layer_encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rain-layer-encoder"),
            });
        targets.current.clear(&mut layer_encoder);

        for layer in background {
            targets.current.copy_to(&mut layer_encoder, &targets.next);
            cells.draw(&mut layer_encoder, &targets.next, layer.range.clone());
            ctx.queue.submit(Some(layer_encoder.finish()));

            let strength = settings.strength(layer.depth);
            trace!(depth = layer.depth, strength, "blurring layer");
            blur.apply(ctx, &targets.next, strength, settings.iterations);
            mem::swap(&mut targets.current, &mut targets.next);

            layer_encoder = ctx
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("rain-layer-encoder"),
                });
        }
        ctx.queue.submit(Some(layer_encoder.finish()));

        targets.current.copy_to(encoder, &targets.output);
        cells.draw(encoder, &targets.output, nearest.range.clone());
        &targets.output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn far_layers_blur_more_than_near_ones() {
        let settings = BlurSettings {
            multiplier: 1.0,
            iterations: 1,
        };
        let strengths = [0.15, 0.3, 0.5, 0.75, 1.0].map(|depth| settings.strength(depth));
        assert!(strengths.windows(2).all(|pair| pair[0] > pair[1]));
        assert_eq!(strengths[4], 0.0);
    }

    #[test]
    fn multiplier_scales_strength() {
        let settings = BlurSettings {
            multiplier: 2.0,
            iterations: 1,
        };
        assert!((settings.strength(0.5) - 1.0).abs() < 1e-6);
    }
}
