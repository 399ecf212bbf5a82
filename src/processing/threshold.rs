use serde::{Deserialize, Serialize};

use super::ring_buffer::SampleRing;

// ADAPTIVE THRESHOLD CONTROLLER -----------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdaptiveThresholdConfig {
    pub initial: u16,
    pub min_threshold: u16,
    pub max_threshold: u16,
    /// Number of most-recent ring samples the noise statistics run over.
    pub noise_window: usize,
    /// Gain applied to the mean absolute deviation when forming the target.
    pub mad_gain: u32,
    /// The live threshold only moves when the target differs by more than
    /// this margin, so the hardware comparator is not rewritten on every
    /// sample-level fluctuation.
    pub hysteresis_margin: u16,
    /// Consumer ticks between recomputations.
    pub update_period_ticks: u64,
}

impl Default for AdaptiveThresholdConfig {
    fn default() -> Self {
        Self {
            initial: 620,
            min_threshold: 620,
            max_threshold: 3000,
            noise_window: 200,
            mad_gain: 3,
            hysteresis_margin: 15,
            update_period_ticks: 200,
        }
    }
}

/// Noise-following detection threshold.
///
/// Tracks the slowly drifting ambient floor as `mean + mad_gain * MAD` over
/// the most recent noise window, clamped to the configured bound.
pub struct AdaptiveThreshold {
    config: AdaptiveThresholdConfig,
    current: u16,
}

impl AdaptiveThreshold {
    pub fn new(config: AdaptiveThresholdConfig) -> Self {
        let current = config.initial.clamp(config.min_threshold, config.max_threshold);
        Self { config, current }
    }

    pub fn current(&self) -> u16 {
        self.current
    }

    pub fn config(&self) -> &AdaptiveThresholdConfig {
        &self.config
    }

    /// Manual override from the consumer API; still held to the bound.
    pub fn set(&mut self, value: u16) -> u16 {
        self.current = value.clamp(self.config.min_threshold, self.config.max_threshold);
        self.current
    }

    /// Recomputes the target from recent ring history and applies it when it
    /// clears the hysteresis margin. Returns the new threshold when it moved,
    /// so the caller can propagate it to the comparator.
    pub fn update_from_ring(&mut self, ring: &SampleRing) -> Option<u16> {
        let window = self.config.noise_window.min(ring.capacity());
        if window == 0 {
            return None;
        }

        let mut sum: i64 = 0;
        for value in ring.recent(window) {
            sum += i64::from(value);
        }
        let mean = sum / window as i64;

        let mut mad_sum: i64 = 0;
        for value in ring.recent(window) {
            mad_sum += (i64::from(value) - mean).abs();
        }
        let mad = mad_sum / window as i64;

        let target = (mean + i64::from(self.config.mad_gain) * mad).clamp(
            i64::from(self.config.min_threshold),
            i64::from(self.config.max_threshold),
        ) as u16;

        let delta = target.abs_diff(self.current);
        if delta > self.config.hysteresis_margin {
            self.current = target;
            Some(target)
        } else {
            None
        }
    }
}
