use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;

use crate::error::FatalError;

/// Process-level switches supplied by the CLI or the screensaver glue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchConfig {
    pub full_screen: bool,
    pub exit_on_input: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct RainConfig {
    /// Fixed RNG seed; a random one is drawn when absent.
    pub seed: Option<u64>,
    pub simulation: SimulationConfig,
    pub blur: BlurConfig,
    pub bloom: BloomConfig,
    pub composite: CompositeConfig,
    pub palette: PaletteConfig,
    pub glyphs: GlyphConfig,
    pub intro: IntroConfig,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            seed: None,
            simulation: SimulationConfig::default(),
            blur: BlurConfig::default(),
            bloom: BloomConfig::default(),
            composite: CompositeConfig::default(),
            palette: PaletteConfig::default(),
            glyphs: GlyphConfig::default(),
            intro: IntroConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct SimulationConfig {
    pub string_count: u32,
    /// Columns across the view for a layer with depth factor 1.0.
    pub base_columns: u32,
    pub min_length: u32,
    pub max_length: u32,
    /// Fall speed range in cells per second.
    pub min_speed: f32,
    pub max_speed: f32,
    /// Depth factors from furthest to nearest, strictly increasing, in (0, 1].
    pub depth_layers: Vec<f32>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            string_count: 1000,
            base_columns: 100,
            min_length: 5,
            max_length: 50,
            min_speed: 10.0,
            max_speed: 30.0,
            depth_layers: vec![0.15, 0.3, 0.5, 0.75, 1.0],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct BlurConfig {
    /// Scales `(1 - depth)` into the per-layer blur strength.
    pub multiplier: f32,
    pub iterations: u32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            iterations: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct BloomConfig {
    pub threshold: f32,
    pub knee: f32,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            knee: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct CompositeConfig {
    pub exposure: f32,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self { exposure: 1.6 }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct PaletteConfig {
    /// Tail-to-head gradient stops, linear RGB.
    pub gradient: Vec<[f32; 3]>,
    /// Color of the leading glyph. Values above 1.0 feed the bloom.
    pub head: [f32; 3],
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            gradient: vec![[0.0, 0.25, 0.05], [0.0, 0.8, 0.15], [0.35, 1.0, 0.45]],
            head: [1.3, 1.5, 1.3],
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct GlyphConfig {
    /// Characters rasterized into the atlas.
    pub charset: String,
    /// Rasterization size in atlas pixels.
    pub pixel_size: f32,
    /// Glyph pairs swapped per glitch tick.
    pub swap_count: u32,
    /// Seconds between glitch ticks; zero disables glitching.
    pub swap_interval_secs: f32,
}

impl Default for GlyphConfig {
    fn default() -> Self {
        Self {
            charset: "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ:.=*+-<>\"|".to_owned(),
            pixel_size: 32.0,
            swap_count: 4,
            swap_interval_secs: 0.25,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct IntroConfig {
    pub enabled: bool,
    pub lines: Vec<String>,
    /// Delay between characters within a line, seconds.
    pub char_delay_secs: f32,
    /// Pause at the end of a line, seconds.
    pub line_delay_secs: f32,
    /// Pause between moving to a new line and typing it, seconds.
    pub line_break_secs: f32,
    /// Glyph cell size in view units.
    pub cell_size: f32,
    pub color: [f32; 3],
}

impl Default for IntroConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lines: vec![
                "Wake up, Neo...".to_owned(),
                "The Matrix has you...".to_owned(),
                "Follow the white rabbit.".to_owned(),
                "Knock, knock, Neo.".to_owned(),
            ],
            char_delay_secs: 0.08,
            line_delay_secs: 1.4,
            line_break_secs: 0.3,
            cell_size: 2.0,
            color: [0.2, 1.0, 0.3],
        }
    }
}

impl RainConfig {
    pub fn validate(&self) -> Result<()> {
        self.simulation.validate().context("simulation")?;

        if self.blur.multiplier < 0.0 || !self.blur.multiplier.is_finite() {
            bail!("blur.multiplier must be >= 0, got {}", self.blur.multiplier);
        }
        if self.bloom.knee < 0.0 || !self.bloom.knee.is_finite() {
            bail!("bloom.knee must be >= 0, got {}", self.bloom.knee);
        }
        if !self.bloom.threshold.is_finite() {
            bail!("bloom.threshold must be finite");
        }
        if self.composite.exposure <= 0.0 || !self.composite.exposure.is_finite() {
            bail!(
                "composite.exposure must be > 0, got {}",
                self.composite.exposure
            );
        }
        if self.palette.gradient.is_empty() {
            bail!("palette.gradient must define at least one color");
        }
        if self.glyphs.charset.chars().all(char::is_whitespace) {
            bail!("glyphs.charset must contain at least one visible character");
        }
        if !(self.glyphs.pixel_size >= 4.0 && self.glyphs.pixel_size.is_finite()) {
            bail!("glyphs.pixel_size must be >= 4, got {}", self.glyphs.pixel_size);
        }
        let swap_interval = self.glyphs.swap_interval_secs;
        if !(swap_interval >= 0.0 && swap_interval.is_finite()) {
            bail!("glyphs.swap_interval_secs must be finite and >= 0, got {swap_interval}");
        }
        let delays = [
            ("char_delay_secs", self.intro.char_delay_secs),
            ("line_delay_secs", self.intro.line_delay_secs),
            ("line_break_secs", self.intro.line_break_secs),
        ];
        for (name, delay) in delays {
            if !(delay >= 0.0 && delay.is_finite()) {
                bail!("intro.{name} must be finite and >= 0, got {delay}");
            }
        }
        if !(self.intro.cell_size > 0.0 && self.intro.cell_size.is_finite()) {
            bail!("intro.cell_size must be finite and > 0, got {}", self.intro.cell_size);
        }
        let colors = self
            .palette
            .gradient
            .iter()
            .chain([&self.palette.head, &self.intro.color]);
        if colors.flatten().any(|channel| !channel.is_finite()) {
            bail!("palette and intro colors must be finite");
        }

        Ok(())
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_columns == 0 {
            bail!("base_columns must be > 0");
        }
        if self.min_length == 0 {
            bail!("min_length must be > 0");
        }
        if self.min_length > self.max_length {
            bail!(
                "min_length ({}) must not exceed max_length ({})",
                self.min_length,
                self.max_length
            );
        }
        if !(self.min_speed.is_finite() && self.max_speed.is_finite())
            || self.min_speed <= 0.0
            || self.min_speed > self.max_speed
        {
            bail!(
                "speed range must satisfy 0 < min_speed <= max_speed, got {}..{}",
                self.min_speed,
                self.max_speed
            );
        }
        if self.depth_layers.is_empty() {
            bail!("depth_layers must define at least one layer");
        }
        for depth in &self.depth_layers {
            if !(*depth > 0.0 && *depth <= 1.0) {
                bail!("depth factor {} is outside (0, 1]", depth);
            }
        }
        if self.depth_layers.windows(2).any(|pair| pair[0] >= pair[1]) {
            bail!(
                "depth_layers must be strictly increasing, got {:?}",
                self.depth_layers
            );
        }
        Ok(())
    }

    pub fn layer_count(&self) -> usize {
        self.depth_layers.len()
    }
}

/// Read, parse and validate a YAML config. Failures are tagged as fatal config errors.
pub fn load_config(path: &Path) -> Result<RainConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))
        .map_err(|error| error.context(FatalError::Config(path.display().to_string())))?;

    parse_config(&contents)
        .with_context(|| format!("invalid config {}", path.display()))
        .map_err(|error| {
            let message = format!("{error:#}");
            error.context(FatalError::Config(message))
        })
}

pub fn parse_config(contents: &str) -> Result<RainConfig> {
    let config: RainConfig = serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!("failed to parse yaml at {}: {}", location, error)
    })?;
    config.validate()?;
    Ok(config)
}
