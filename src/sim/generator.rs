use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

// SYNTHETIC RAIN SIGNAL -------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneratorConfig {
    pub baseline: u16,
    /// Uniform noise spread applied to every sample (+/- codes).
    pub noise_amplitude: u16,
    /// Chance of starting a drop, in 1/10000 per sample.
    pub drop_chance_per_10k: u32,
    pub min_drop_amplitude: u16,
    pub max_drop_amplitude: u16,
    pub full_scale: u16,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            baseline: 500,
            noise_amplitude: 10,
            drop_chance_per_10k: 2,
            min_drop_amplitude: 1200,
            max_drop_amplitude: 3200,
            full_scale: 4095,
        }
    }
}

/// Synthetic raindrop feed: a noisy baseline with randomized ramp pulses and
/// a damped ringing tail, close enough to the real sensor to exercise every
/// stage of the pipeline.
pub struct RainSignalGenerator {
    config: GeneratorConfig,
    rng: StdRng,
    pending: VecDeque<u16>,
}

impl RainSignalGenerator {
    /// A fixed seed makes the stream reproducible for tests and demos.
    pub fn new(config: GeneratorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            pending: VecDeque::new(),
        }
    }

    pub fn next_batch(&mut self, len: usize) -> Vec<u16> {
        (0..len).map(|_| self.next_sample()).collect()
    }

    pub fn next_sample(&mut self) -> u16 {
        if let Some(value) = self.pending.pop_front() {
            return self.jitter(value);
        }
        if self.rng.gen_range(0..10_000) < self.config.drop_chance_per_10k {
            self.queue_drop();
        }
        self.jitter(self.config.baseline)
    }

    /// Builds one impact waveform: sharp rise, slower decay, then a ringing
    /// tail that swings around the baseline before settling.
    fn queue_drop(&mut self) {
        let baseline = u32::from(self.config.baseline);
        let amplitude = u32::from(self.rng.gen_range(
            self.config.min_drop_amplitude..=self.config.max_drop_amplitude,
        ));
        let rise = self.rng.gen_range(6..18usize);
        let fall = self.rng.gen_range(18..40usize);
        let peak = baseline + amplitude;

        for k in 1..=rise {
            self.pending
                .push_back((baseline + amplitude * k as u32 / rise as u32) as u16);
        }
        for k in 1..=fall {
            self.pending
                .push_back((peak - amplitude * k as u32 / fall as u32) as u16);
        }

        // damped mechanical ringing
        let mut swing = (amplitude / 6) as i32;
        let period = self.rng.gen_range(6..12usize);
        while swing > i32::from(self.config.noise_amplitude) {
            for k in 0..period {
                let phase =
                    (k as f32 / period as f32 * std::f32::consts::TAU).sin();
                let value = baseline as i32 + (phase * swing as f32) as i32;
                self.pending.push_back(value.max(0) as u16);
            }
            swing /= 2;
        }
    }

    fn jitter(&mut self, value: u16) -> u16 {
        let spread = i32::from(self.config.noise_amplitude);
        let jittered = i32::from(value) + self.rng.gen_range(-spread..=spread);
        jittered.clamp(0, i32::from(self.config.full_scale)) as u16
    }
}
