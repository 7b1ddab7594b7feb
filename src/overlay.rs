//! egui debug panel for [`Tunables`], applied through the pipeline's
//! `ParameterSink`. Toggled with F1.

use egui_wgpu::{Renderer as EguiRenderer, ScreenDescriptor};
use winit::event::WindowEvent;
use winit::window::Window;

use crate::gpu::{begin_pass, GpuContext};
use crate::params::Tunables;

pub struct DebugOverlay {
    ctx: egui::Context,
    state: egui_winit::State,
    renderer: EguiRenderer,
    visible: bool,
}

impl DebugOverlay {
    pub fn new(window: &Window, gpu: &GpuContext, format: wgpu::TextureFormat) -> Self {
        let ctx = egui::Context::default();
        let state =
            egui_winit::State::new(ctx.clone(), egui::ViewportId::ROOT, window, None, None);
        let renderer = EguiRenderer::new(&gpu.device, format, None, 1);
        Self {
            ctx,
            state,
            renderer,
            visible: false,
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Feed a window event to egui. Returns true when egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        if !self.visible {
            return false;
        }
        self.state.on_window_event(window, event).consumed
    }

    pub fn render(
        &mut self,
        window: &Window,
        gpu: &GpuContext,
        view: &wgpu::TextureView,
        size: [u32; 2],
        current: Tunables,
    ) -> Option<Tunables> {
        if !self.visible {
            return None;
        }

        let raw_input = self.state.take_egui_input(window);
        let mut tunables = current.clone();
        let full_output = self.ctx.run(raw_input, |ctx| {
            egui::Window::new("rain").default_width(260.0).show(ctx, |ui| {
                ui.add(egui::Slider::new(&mut tunables.exposure, 0.05..=6.0).text("exposure"));
                ui.add(
                    egui::Slider::new(&mut tunables.bloom_threshold, 0.0..=2.0)
                        .text("bloom threshold"),
                );
                ui.add(egui::Slider::new(&mut tunables.bloom_knee, 0.0..=1.0).text("bloom knee"));
                ui.add(
                    egui::Slider::new(&mut tunables.blur_multiplier, 0.0..=2.0)
                        .text("blur multiplier"),
                );
                ui.add(
                    egui::Slider::new(&mut tunables.blur_iterations, 0..=6).text("blur iterations"),
                );
                ui.separator();
                for (index, stop) in tunables.gradient.iter_mut().enumerate() {
                    ui.horizontal(|ui| {
                        ui.label(format!("stop {index}"));
                        ui.color_edit_button_rgb(stop);
                    });
                }
                ui.horizontal(|ui| {
                    ui.label("head");
                    ui.color_edit_button_rgb(&mut tunables.head_color);
                });
            });
        });

        self.state
            .handle_platform_output(window, full_output.platform_output);
        let pixels_per_point = window.scale_factor() as f32;
        let paint_jobs = self.ctx.tessellate(full_output.shapes, pixels_per_point);
        for (texture_id, delta) in &full_output.textures_delta.set {
            self.renderer
                .update_texture(&gpu.device, &gpu.queue, *texture_id, delta);
        }

        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("rain-overlay"),
            });
        let screen_descriptor = ScreenDescriptor {
            size_in_pixels: size,
            pixels_per_point,
        };
        self.renderer.update_buffers(
            &gpu.device,
            &gpu.queue,
            &mut encoder,
            &paint_jobs,
            &screen_descriptor,
        );
        {
            let mut pass = begin_pass(&mut encoder, "rain-overlay-pass", view, wgpu::LoadOp::Load);
            self.renderer.render(&mut pass, &paint_jobs, &screen_descriptor);
        }
        for texture_id in &full_output.textures_delta.free {
            self.renderer.free_texture(texture_id);
        }
        gpu.queue.submit(Some(encoder.finish()));

        (tunables != current).then_some(tunables)
    }
}
