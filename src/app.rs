//! Windowed runner: winit event loop, surface, input policy and frame pacing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event as WinitEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, WindowBuilder};

use crate::config::{LaunchConfig, RainConfig};
use crate::error::FatalError;
use crate::glyphs::GlyphAtlas;
use crate::gpu::GpuContext;
#[cfg(feature = "overlay")]
use crate::overlay::DebugOverlay;
#[cfg(feature = "overlay")]
use crate::params::ParameterSink;
use crate::pipeline::RainPipeline;

/// Input during this window after start-up never exits.
pub const INPUT_GRACE_PERIOD: Duration = Duration::from_millis(1500);

/// Longest simulation step taken after a stall.
const MAX_FRAME_DT: f32 = 0.1;

/// Decides whether user input should end the process.
#[derive(Debug, Clone, Copy)]
pub struct InputPolicy {
    exit_on_input: bool,
    started: Instant,
    grace: Duration,
}

impl InputPolicy {
    pub fn new(exit_on_input: bool, started: Instant) -> Self {
        Self {
            exit_on_input,
            started,
            grace: INPUT_GRACE_PERIOD,
        }
    }

    pub fn should_exit(&self, now: Instant) -> bool {
        self.exit_on_input && now.saturating_duration_since(self.started) >= self.grace
    }
}

pub fn run(config: &RainConfig, launch: LaunchConfig, glyphs: GlyphAtlas, seed: u64) -> Result<()> {
    let event_loop = EventLoop::new()
        .map_err(|error| FatalError::Window(error.to_string()))
        .context("failed to create event loop")?;

    let mut builder = WindowBuilder::new()
        .with_title("digital rain")
        .with_inner_size(PhysicalSize::new(1280, 720));
    if launch.full_screen {
        builder = builder.with_fullscreen(Some(Fullscreen::Borderless(None)));
    }
    let window = Arc::new(
        builder
            .build(&event_loop)
            .map_err(|error| FatalError::Window(error.to_string()))
            .context("failed to create window")?,
    );
    if launch.full_screen {
        window.set_cursor_visible(false);
    }

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let surface = instance
        .create_surface(window.clone())
        .map_err(|error| FatalError::Surface(error.to_string()))
        .context("failed to create wgpu surface")?;
    let gpu = pollster::block_on(GpuContext::new(instance, Some(&surface)))
        .context("failed to initialize GPU context")?;

    let caps = surface.get_capabilities(&gpu.adapter);
    let format = pick_surface_format(&caps.formats)
        .ok_or_else(|| FatalError::Surface("surface reports no formats".to_owned()))?;
    let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
        wgpu::PresentMode::Mailbox
    } else {
        wgpu::PresentMode::Fifo
    };
    let alpha_mode = caps
        .alpha_modes
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    let size = window.inner_size();
    let mut surface_config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&gpu.device, &surface_config);

    #[cfg(feature = "overlay")]
    let mut overlay = DebugOverlay::new(&window, &gpu, format);

    let mut pipeline =
        RainPipeline::new(gpu, config, glyphs, format, size.width, size.height, seed)?;
    let input = InputPolicy::new(launch.exit_on_input, Instant::now());
    let mut last_frame = Instant::now();

    info!(
        width = size.width,
        height = size.height,
        ?format,
        full_screen = launch.full_screen,
        exit_on_input = launch.exit_on_input,
        "window ready"
    );

    event_loop
        .run(move |event, target| {
            target.set_control_flow(ControlFlow::Poll);

            match event {
                WinitEvent::WindowEvent { window_id, event } if window_id == window.id() => {
                    #[cfg(feature = "overlay")]
                    if overlay.on_window_event(&window, &event) {
                        return;
                    }

                    match event {
                        WindowEvent::CloseRequested => target.exit(),
                        WindowEvent::KeyboardInput { event, .. } => {
                            if event.state != ElementState::Pressed {
                                return;
                            }
                            match event.physical_key {
                                PhysicalKey::Code(KeyCode::Escape) => target.exit(),
                                #[cfg(feature = "overlay")]
                                PhysicalKey::Code(KeyCode::F1) => {
                                    overlay.toggle();
                                    return;
                                }
                                _ => {}
                            }
                            if input.should_exit(Instant::now()) {
                                info!("keyboard input, exiting");
                                target.exit();
                            }
                        }
                        WindowEvent::CursorMoved { .. } | WindowEvent::MouseInput { .. } => {
                            #[cfg(feature = "overlay")]
                            if overlay.is_visible() {
                                return;
                            }
                            if input.should_exit(Instant::now()) {
                                info!("mouse input, exiting");
                                target.exit();
                            }
                        }
                        WindowEvent::Resized(size) => {
                            if size.width > 0 && size.height > 0 {
                                surface_config.width = size.width;
                                surface_config.height = size.height;
                                surface.configure(&pipeline.gpu().device, &surface_config);
                            }
                            pipeline.resize(size.width, size.height);
                        }
                        WindowEvent::RedrawRequested => {
                            let now = Instant::now();
                            let dt = now.duration_since(last_frame).as_secs_f32().min(MAX_FRAME_DT);
                            last_frame = now;
                            pipeline.update(dt);

                            if pipeline.viewport().is_empty() {
                                return;
                            }
                            let frame = match surface.get_current_texture() {
                                Ok(frame) => frame,
                                Err(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                                    surface.configure(&pipeline.gpu().device, &surface_config);
                                    return;
                                }
                                Err(wgpu::SurfaceError::Timeout) => return,
                                Err(wgpu::SurfaceError::OutOfMemory) => {
                                    warn!("surface out of memory, exiting");
                                    target.exit();
                                    return;
                                }
                            };
                            let view = frame
                                .texture
                                .create_view(&wgpu::TextureViewDescriptor::default());
                            pipeline.render(&view);

                            #[cfg(feature = "overlay")]
                            {
                                let size = [surface_config.width, surface_config.height];
                                let current = pipeline.tunables();
                                if let Some(edited) =
                                    overlay.render(&window, pipeline.gpu(), &view, size, current)
                                {
                                    pipeline.set_tunables(edited);
                                }
                            }

                            frame.present();
                        }
                        _ => {}
                    }
                }
                WinitEvent::AboutToWait => window.request_redraw(),
                _ => {}
            }
        })
        .map_err(|error| anyhow!("event loop terminated: {error}"))
}

fn pick_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|format| format.is_srgb())
        .or_else(|| formats.first().copied())
}
