//! Per-frame CPU cost: simulation step and vertex batch build.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use digital_rain::cell::CellBatch;
use digital_rain::config::RainConfig;
use digital_rain::glyphs::GlyphAtlas;
use digital_rain::palette::ColorPalette;
use digital_rain::simulation::RainSimulator;
use digital_rain::units::Viewport;

fn bench_rain_frame(c: &mut Criterion) {
    let config = RainConfig::default();
    let viewport = Viewport::from_pixels(1920, 1080, config.simulation.base_columns);
    let glyphs = GlyphAtlas::procedural(&config.glyphs.charset, 7);
    let mut sim = RainSimulator::new(
        &config.simulation,
        ColorPalette::from_config(&config.palette),
        7,
    );
    sim.resize(viewport);
    // Warm up so most strings are on screen.
    for _ in 0..300 {
        sim.update(1.0 / 60.0, &viewport);
    }

    let mut group = c.benchmark_group("rain_frame");
    group.sample_size(50);

    group.bench_function("simulate_1080p", |b| {
        b.iter(|| sim.update(black_box(1.0 / 60.0), &viewport));
    });

    let mut batch = CellBatch::new();
    group.bench_function("build_batch_1080p", |b| {
        b.iter(|| {
            batch.clear();
            for layer in sim.layers() {
                black_box(batch.push_layer(&layer.cells, &glyphs));
            }
            black_box(batch.byte_len())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_rain_frame);
criterion_main!(benches);
