use std::error::Error;
use std::path::Path;

use log::info;

use crate::config::EngineConfig;
use crate::processing::engine::{DetectionEngine, EngineStats};
use crate::utils::export::{read_samples_csv, timestamped_name, write_snapshot_csv};

use super::feed_with_watchdog;

// OFFLINE TRACE REPLAY --------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub samples: usize,
    pub stats: EngineStats,
    pub final_threshold: u16,
    pub drop_count: u64,
    pub total_rain_mm: f32,
    pub intensity_mmh: f32,
    /// Where the last completed snapshot was exported, if any.
    pub snapshot_path: Option<String>,
}

/// Runs a recorded sample trace through the full pipeline at the deployed
/// cadence: producer batches interleaved with consumer ticks, one tick per
/// 10 ms worth of samples.
pub fn run<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<ReplaySummary, Box<dyn Error>> {
    let samples = read_samples_csv(&path)?;
    info!("replaying {} samples from {}", samples.len(), path.as_ref().display());

    let batch_size = config.sampling.batch_size.max(1);
    let tick_ms = config.aggregator.tick_ms.max(1);
    let samples_per_tick = ((tick_ms as f32 * 1000.0 / config.sampling.sample_interval_us.max(1.0))
        as usize)
        .max(1);

    let mut engine = DetectionEngine::new(config);
    let mut since_tick = 0usize;
    let mut fed = 0usize;

    for chunk in samples.chunks(batch_size) {
        feed_with_watchdog(&mut engine, chunk);
        fed += chunk.len();
        since_tick += chunk.len();
        while since_tick >= samples_per_tick {
            engine.tick();
            since_tick -= samples_per_tick;
        }
        if fed % 1_000_000 < batch_size {
            info!("replayed {fed} samples");
        }
    }

    // let a trailing completed snapshot through the consumer
    for _ in 0..4 {
        engine.tick();
    }

    let snapshot_path = match engine.last_snapshot() {
        Some(snapshot) => {
            let name = timestamped_name("snapshot");
            write_snapshot_csv(&name, snapshot)?;
            Some(name)
        }
        None => None,
    };

    Ok(ReplaySummary {
        samples: samples.len(),
        stats: engine.stats(),
        final_threshold: engine.threshold(),
        drop_count: engine.aggregator().drop_count(),
        total_rain_mm: engine.aggregator().total_rain_mm(),
        intensity_mmh: engine.aggregator().intensity_mmh(),
        snapshot_path,
    })
}
