use crate::config::RainConfig;

/// Runtime-adjustable rendering parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Tunables {
    pub exposure: f32,
    pub bloom_threshold: f32,
    pub bloom_knee: f32,
    pub blur_multiplier: f32,
    pub blur_iterations: u32,
    pub gradient: Vec<[f32; 3]>,
    pub head_color: [f32; 3],
}

impl Tunables {
    pub fn from_config(config: &RainConfig) -> Self {
        Self {
            exposure: config.composite.exposure,
            bloom_threshold: config.bloom.threshold,
            bloom_knee: config.bloom.knee,
            blur_multiplier: config.blur.multiplier,
            blur_iterations: config.blur.iterations,
            gradient: config.palette.gradient.clone(),
            head_color: config.palette.head,
        }
    }

    /// Clamp values into ranges the shaders accept.
    pub fn sanitized(mut self) -> Self {
        self.exposure = self.exposure.max(1e-3);
        self.bloom_knee = self.bloom_knee.max(0.0);
        self.blur_multiplier = self.blur_multiplier.max(0.0);
        self
    }
}

/// Read/write access to [`Tunables`] for debug front ends.
pub trait ParameterSink {
    fn tunables(&self) -> Tunables;

    fn set_tunables(&mut self, tunables: Tunables);

    fn set_exposure(&mut self, exposure: f32) {
        let mut tunables = self.tunables();
        tunables.exposure = exposure;
        self.set_tunables(tunables);
    }

    fn set_bloom(&mut self, threshold: f32, knee: f32) {
        let mut tunables = self.tunables();
        tunables.bloom_threshold = threshold;
        tunables.bloom_knee = knee;
        self.set_tunables(tunables);
    }

    fn set_blur_multiplier(&mut self, multiplier: f32) {
        let mut tunables = self.tunables();
        tunables.blur_multiplier = multiplier;
        self.set_tunables(tunables);
    }

    fn set_palette_color(&mut self, index: usize, color: [f32; 3]) {
        let mut tunables = self.tunables();
        if let Some(stop) = tunables.gradient.get_mut(index) {
            *stop = color;
            self.set_tunables(tunables);
        }
    }
}

impl ParameterSink for Tunables {
    fn tunables(&self) -> Tunables {
        self.clone()
    }

    fn set_tunables(&mut self, tunables: Tunables) {
        *self = tunables.sanitized();
    }
}
