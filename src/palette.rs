use crate::config::PaletteConfig;

/// Linear RGB gradient sampled along a falling string, tail (t = 0) to head (t = 1).
#[derive(Debug, Clone, PartialEq)]
pub struct ColorPalette {
    stops: Vec<[f32; 3]>,
    head: [f32; 3],
}

impl ColorPalette {
    pub fn new(stops: Vec<[f32; 3]>, head: [f32; 3]) -> Self {
        assert!(!stops.is_empty(), "palette needs at least one gradient stop");
        Self { stops, head }
    }

    pub fn from_config(config: &PaletteConfig) -> Self {
        Self::new(config.gradient.clone(), config.head)
    }

    pub fn head(&self) -> [f32; 3] {
        self.head
    }

    /// Piecewise-linear sample. `t` is clamped to [0, 1]; `t >= 1` returns the last stop.
    pub fn sample(&self, t: f32) -> [f32; 3] {
        let last = self.stops.len() - 1;
        if last == 0 {
            return self.stops[0];
        }

        let pos = t.clamp(0.0, 1.0) * last as f32;
        let index = pos.floor() as usize;
        if index >= last {
            return self.stops[last];
        }

        let frac = pos - index as f32;
        lerp3(self.stops[index], self.stops[index + 1], frac)
    }
}

fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

#[cfg(test)]
mod tests {
    use super::ColorPalette;

    fn ramp() -> ColorPalette {
        ColorPalette::new(
            vec![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 1.0]],
            [2.0, 2.0, 2.0],
        )
    }

    #[test]
    fn endpoints_hit_first_and_last_stop() {
        let palette = ramp();
        assert_eq!(palette.sample(0.0), [0.0, 0.0, 0.0]);
        assert_eq!(palette.sample(1.0), [1.0, 1.0, 1.0]);
    }

    #[test]
    fn midpoint_interpolates_between_stops() {
        let palette = ramp();
        let quarter = palette.sample(0.25);
        assert!((quarter[1] - 0.5).abs() < 1e-6);
        assert_eq!(palette.sample(0.5), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn out_of_range_is_clamped() {
        let palette = ramp();
        assert_eq!(palette.sample(-3.0), palette.sample(0.0));
        assert_eq!(palette.sample(7.0), palette.sample(1.0));
    }

    #[test]
    fn single_stop_is_constant() {
        let palette = ColorPalette::new(vec![[0.2, 0.4, 0.6]], [1.0, 1.0, 1.0]);
        assert_eq!(palette.sample(0.0), [0.2, 0.4, 0.6]);
        assert_eq!(palette.sample(0.9), [0.2, 0.4, 0.6]);
    }
}
