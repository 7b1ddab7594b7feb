use digital_rain::config::SimulationConfig;
use digital_rain::palette::ColorPalette;
use digital_rain::simulation::{FallingString, RainSimulator};
use digital_rain::units::{ColumnIndex, RowIndex, Viewport};

fn palette() -> ColorPalette {
    ColorPalette::new(vec![[0.0, 0.2, 0.0], [0.0, 1.0, 0.0]], [1.5, 1.5, 1.5])
}

fn assert_spawn_bounds(sim: &RainSimulator, string: &FallingString) {
    let config = sim.config();
    assert!(string.layer_index < sim.layer_count());
    assert!(string.x.0 >= 0 && (string.x.0 as u32) < sim.column_count(string.layer_index));
    assert!(string.length >= config.min_length && string.length <= config.max_length);
    assert!(string.speed >= config.min_speed && string.speed <= config.max_speed);
    let length = string.length as f32;
    assert!(
        string.y <= -length && string.y > -(length + config.max_length as f32),
        "y {} outside spawn band for length {}",
        string.y,
        length
    );
}

#[test]
fn initialized_strings_start_above_the_view_within_bounds() {
    let config = SimulationConfig::default();
    let mut sim = RainSimulator::new(&config, palette(), 11);
    sim.resize(Viewport::from_pixels(1920, 1080, config.base_columns));

    assert_eq!(sim.strings().len(), config.string_count as usize);
    for string in sim.strings() {
        assert_spawn_bounds(&sim, string);
    }
}

#[test]
fn strings_past_the_bottom_respawn_within_bounds() {
    let config = SimulationConfig::default();
    let viewport = Viewport::from_pixels(800, 600, config.base_columns);
    let mut sim = RainSimulator::new(&config, palette(), 5);
    sim.resize(viewport);

    for index in 0..32 {
        let string = &mut sim.strings_mut()[index];
        string.y = 10_000.0;
        let step = sim.update_string(index, 0.0, viewport.width, viewport.height);
        assert!(step.respawned);
        let respawned = sim.strings()[index];
        assert_spawn_bounds(&sim, &respawned);
    }
}

#[test]
fn body_alpha_rises_toward_the_head() {
    let config = SimulationConfig {
        string_count: 1,
        depth_layers: vec![0.5, 1.0],
        ..SimulationConfig::default()
    };
    let viewport = Viewport::from_pixels(1000, 1000, config.base_columns);
    let mut sim = RainSimulator::new(&config, palette(), 3);
    sim.resize(viewport);
    sim.strings_mut()[0] = FallingString {
        x: ColumnIndex(4),
        y: 30.0,
        speed: 0.0,
        length: 12,
        layer_index: 0,
    };
    sim.update(0.0, &viewport);

    let cells = &sim.layers()[0].cells;
    assert_eq!(cells.len(), 12);
    let (head, body) = cells.split_last().expect("cells");
    assert_eq!(head.row, RowIndex(30));
    assert_eq!(head.color[3], 1.0);
    assert!(body.windows(2).all(|pair| pair[0].row.0 < pair[1].row.0));
    assert!(body.windows(2).all(|pair| pair[0].color[3] <= pair[1].color[3]));
    assert!(body.iter().all(|cell| cell.color[3] <= 0.5));
    assert_eq!(body[0].color[3], 0.0);
}

#[test]
fn single_string_scenario_advances_one_row_per_step() {
    let config = SimulationConfig {
        string_count: 1,
        min_length: 5,
        max_length: 5,
        min_speed: 10.0,
        max_speed: 10.0,
        depth_layers: vec![1.0],
        ..SimulationConfig::default()
    };
    let viewport = Viewport::from_pixels(800, 600, config.base_columns);
    let mut sim = RainSimulator::new(&config, palette(), 1);
    sim.resize(viewport);
    sim.strings_mut()[0] = FallingString {
        x: ColumnIndex(0),
        y: 0.0,
        speed: 10.0,
        length: 5,
        layer_index: 0,
    };

    let mut steps = 0;
    for expected in 1..=10 {
        let step = sim.update_string(0, 0.1, viewport.width, viewport.height);
        assert!((step.head_y - expected as f32).abs() < 1e-4, "step {expected}: {}", step.head_y);
        assert_eq!(step.head, RowIndex(expected));
        assert!(!step.respawned);
        steps += 1;
    }
    assert_eq!(steps, 10);

    // Head at row 10: four body cells in rows 6..=9 plus the head.
    sim.update(0.0, &viewport);
    let rows: Vec<i32> = sim.layers()[0].cells.iter().map(|cell| cell.row.0).collect();
    assert_eq!(rows, vec![6, 7, 8, 9, 10]);
}

#[test]
fn same_seed_gives_same_rain() {
    let config = SimulationConfig::default();
    let viewport = Viewport::from_pixels(640, 480, config.base_columns);
    let mut a = RainSimulator::new(&config, palette(), 99);
    let mut b = RainSimulator::new(&config, palette(), 99);
    a.resize(viewport);
    b.resize(viewport);
    for _ in 0..30 {
        a.update(1.0 / 30.0, &viewport);
        b.update(1.0 / 30.0, &viewport);
    }
    assert_eq!(a.strings(), b.strings());
}
