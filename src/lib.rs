//! Layered digital rain on wgpu: a falling-string simulation drawn as glyph
//! cells into depth layers, blurred back to front, bloomed and tonemapped.

pub mod bloom;
pub mod blur;
pub mod cell;
pub mod cell_pass;
pub mod composite;
pub mod compositor;
pub mod config;
pub mod error;
pub mod glyphs;
pub mod gpu;
pub mod intro;
pub mod palette;
pub mod params;
pub mod pipeline;
pub mod readback;
pub mod simulation;
pub mod units;

#[cfg(feature = "window")]
pub mod app;
#[cfg(feature = "overlay")]
pub mod overlay;

pub use config::{LaunchConfig, RainConfig};
pub use error::FatalError;
pub use pipeline::RainPipeline;
