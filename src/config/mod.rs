// src/config/mod.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::processing::aggregator::AggregatorConfig;
use crate::processing::detectors::fast_peak::FastPeakConfig;
use crate::processing::snapshot::SnapshotConfig;
use crate::processing::threshold::AdaptiveThresholdConfig;
use crate::processing::triggers::diff::DiffTriggerConfig;
use crate::processing::validator::ValidatorConfig;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EngineConfig {
    pub sampling: SamplingConfig,
    pub threshold: AdaptiveThresholdConfig,
    pub diff_trigger: DiffTriggerConfig,
    pub fast_peak: FastPeakConfig,
    pub snapshot: SnapshotConfig,
    pub validator: ValidatorConfig,
    pub aggregator: AggregatorConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SamplingConfig {
    /// Slots per channel in the sample ring.
    pub ring_capacity: usize,
    /// Contexts are kept per channel; one is active in the deployed setup.
    pub channel_count: usize,
    pub active_channel: usize,
    /// Samples per producer batch (half/full transfer completion).
    pub batch_size: usize,
    pub sample_interval_us: f32,
    /// Converter full-scale code and reference, for voltage derivation.
    pub full_scale: u16,
    pub reference_voltage: f32,
    /// Consumer ticks between liveness checks.
    pub health_period_ticks: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1000,
            channel_count: 2,
            active_channel: 0,
            batch_size: 50,
            sample_interval_us: 42.0,
            full_scale: 4095,
            reference_voltage: 3.3,
            health_period_ticks: 100,
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, String> {
    let config_str =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

    serde_yaml::from_str(&config_str).map_err(|e| format!("Failed to parse config file: {}", e))
}

pub fn save_config<P: AsRef<Path>>(config: &EngineConfig, path: P) -> Result<(), String> {
    let yaml =
        serde_yaml::to_string(config).map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, yaml).map_err(|e| format!("Failed to write config file: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_survives_yaml_round_trip() {
        let config = EngineConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: EngineConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.sampling.ring_capacity, config.sampling.ring_capacity);
        assert_eq!(parsed.threshold.initial, config.threshold.initial);
        assert_eq!(parsed.validator.min_peak_amplitude, config.validator.min_peak_amplitude);
    }
}
