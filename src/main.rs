use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use digital_rain::config::{load_config, RainConfig};
use digital_rain::error::{exit_status_for, find_fatal_error};
use digital_rain::glyphs::GlyphAtlas;
use digital_rain::gpu::GpuContext;
use digital_rain::pipeline::{RainPipeline, SNAPSHOT_FORMAT};

#[derive(Debug, Parser)]
#[command(name = "digital-rain")]
#[command(about = "Layered digital rain with depth blur and HDR bloom")]
#[command(version = env!("RAIN_BUILD_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    common: CommonArgs,
    #[command(flatten)]
    launch: LaunchArgs,
}

#[derive(Debug, Args, Clone, Default)]
struct CommonArgs {
    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// TTF/OTF font to rasterize glyphs from; a built-in dot-matrix set is used otherwise.
    #[arg(long, global = true)]
    font: Option<PathBuf>,
    /// Start the rain immediately.
    #[arg(long, global = true)]
    no_intro: bool,
    /// Fixed RNG seed, overriding the config.
    #[arg(long, global = true)]
    seed: Option<u64>,
    /// Debug-level logging unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Args, Clone, Copy, Default)]
struct LaunchArgs {
    #[arg(long)]
    fullscreen: bool,
    /// Exit on the first key or mouse event after start-up.
    #[arg(long)]
    exit_on_input: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open a window and run the effect (default).
    Run {
        #[command(flatten)]
        launch: LaunchArgs,
    },
    /// Render frames headlessly and write the last one as PNG.
    Snapshot {
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 720)]
        height: u32,
        /// Simulation steps before the captured frame.
        #[arg(long, default_value_t = 120)]
        frames: u32,
        /// Seconds per simulation step.
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f32,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
    /// Validate the `--config` file and print a summary.
    Check,
}

/// Outcome of screensaver-host arguments.
#[derive(Debug, PartialEq, Eq)]
enum HostArgs {
    Launch(Vec<OsString>),
    Exit,
}

/// Translate `/s`, `/p` and `/c` screensaver switches into CLI flags.
/// Preview and settings requests have nothing to show and exit cleanly.
fn map_host_args(args: Vec<OsString>) -> HostArgs {
    let Some(first) = args.get(1).and_then(|arg| arg.to_str()) else {
        return HostArgs::Launch(args);
    };
    let switch = first.to_ascii_lowercase();
    let switch = switch.split(':').next().unwrap_or_default();
    match switch {
        "/s" => {
            let mut mapped = vec![args[0].clone()];
            mapped.push("run".into());
            mapped.push("--fullscreen".into());
            mapped.push("--exit-on-input".into());
            mapped.extend(args.into_iter().skip(2));
            HostArgs::Launch(mapped)
        }
        "/p" | "/c" => HostArgs::Exit,
        _ => HostArgs::Launch(args),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let args = match map_host_args(std::env::args_os().collect()) {
        HostArgs::Launch(args) => args,
        HostArgs::Exit => return,
    };
    let cli = Cli::parse_from(args);
    init_tracing(cli.common.verbose);

    if let Err(err) = dispatch(cli) {
        let status = exit_status_for(&err);
        let code = find_fatal_error(&err).map_or("UNCLASSIFIED", |fatal| fatal.code());
        error!(code, status, "{err:#}");
        eprintln!("error [{code}]: {err:#}");
        process::exit(status);
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        None => run_window(&cli.common, cli.launch),
        Some(Commands::Run { launch }) => {
            let merged = LaunchArgs {
                fullscreen: launch.fullscreen || cli.launch.fullscreen,
                exit_on_input: launch.exit_on_input || cli.launch.exit_on_input,
            };
            run_window(&cli.common, merged)
        }
        Some(Commands::Snapshot {
            width,
            height,
            frames,
            dt,
            output,
        }) => run_snapshot(&cli.common, width, height, frames, dt, &output),
        Some(Commands::Check) => {
            let Some(path) = &cli.common.config else {
                bail!("check needs --config <FILE>");
            };
            run_check(path)
        }
    }
}

fn resolve_config(common: &CommonArgs) -> Result<RainConfig> {
    let mut config = match &common.config {
        Some(path) => load_config(path)?,
        None => RainConfig::default(),
    };
    if common.no_intro {
        config.intro.enabled = false;
    }
    Ok(config)
}

fn resolve_seed(common: &CommonArgs, config: &RainConfig) -> u64 {
    common
        .seed
        .or(config.seed)
        .unwrap_or_else(rand::random::<u64>)
}

fn load_glyphs(common: &CommonArgs, config: &RainConfig, seed: u64) -> Result<GlyphAtlas> {
    let atlas = match &common.font {
        Some(path) => GlyphAtlas::from_font_file(
            path,
            &config.glyphs.charset,
            config.glyphs.pixel_size,
            seed,
        )?,
        None => GlyphAtlas::procedural(&config.glyphs.charset, seed),
    };
    info!(
        glyphs = atlas.len(),
        width = atlas.width(),
        height = atlas.height(),
        "glyph atlas ready"
    );
    Ok(atlas)
}

#[cfg(feature = "window")]
fn run_window(common: &CommonArgs, launch: LaunchArgs) -> Result<()> {
    let config = resolve_config(common)?;
    let seed = resolve_seed(common, &config);
    let glyphs = load_glyphs(common, &config, seed)?;
    let launch = digital_rain::config::LaunchConfig {
        full_screen: launch.fullscreen,
        exit_on_input: launch.exit_on_input,
    };
    info!(seed, ?launch, "starting");
    digital_rain::app::run(&config, launch, glyphs, seed)
}

#[cfg(not(feature = "window"))]
fn run_window(_common: &CommonArgs, _launch: LaunchArgs) -> Result<()> {
    bail!("this build has no window support; use `snapshot` or enable the `window` feature")
}

fn run_snapshot(
    common: &CommonArgs,
    width: u32,
    height: u32,
    frames: u32,
    dt: f32,
    output: &Path,
) -> Result<()> {
    if width == 0 || height == 0 {
        bail!("snapshot size must be non-zero, got {width}x{height}");
    }
    if !(dt > 0.0 && dt.is_finite()) {
        bail!("--dt must be a positive number of seconds, got {dt}");
    }
    let config = resolve_config(common)?;
    let seed = resolve_seed(common, &config);
    let glyphs = load_glyphs(common, &config, seed)?;

    let gpu =
        pollster::block_on(GpuContext::headless()).context("failed to initialize GPU context")?;
    let mut pipeline =
        RainPipeline::new(gpu, &config, glyphs, SNAPSHOT_FORMAT, width, height, seed)?;
    for _ in 0..frames {
        pipeline.update(dt);
    }
    let pixels = pipeline.render_offscreen()?;

    let image = image::RgbaImage::from_raw(width, height, pixels)
        .context("readback size does not match the snapshot dimensions")?;
    image
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {} ({}x{}, seed {})", output.display(), width, height, seed);
    Ok(())
}

fn run_check(path: &Path) -> Result<()> {
    let config = load_config(path)?;
    let simulation = &config.simulation;
    println!(
        "OK: {} ({} strings, {} base columns, {} layers {:?})",
        path.display(),
        simulation.string_count,
        simulation.base_columns,
        simulation.layer_count(),
        simulation.depth_layers
    );
    println!(
        "Blur: x{} ({} iterations), bloom: threshold {} knee {}, exposure {}",
        config.blur.multiplier,
        config.blur.iterations,
        config.bloom.threshold,
        config.bloom.knee,
        config.composite.exposure
    );
    println!(
        "Intro: {} ({} lines)",
        if config.intro.enabled { "on" } else { "off" },
        config.intro.lines.len()
    );
    Ok(())
}
