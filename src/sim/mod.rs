pub mod generator;
pub mod replay;

use crate::processing::engine::DetectionEngine;

/// Feeds samples through the engine while emulating the converter's analog
/// watchdog: the comparator latch fires on each sample that crosses the
/// live threshold, just before the sample itself is delivered.
pub fn feed_with_watchdog(engine: &mut DetectionEngine, samples: &[u16]) {
    for &sample in samples {
        if sample > engine.threshold() {
            engine.on_watchdog_crossing();
        }
        engine.on_samples_ready(std::slice::from_ref(&sample));
    }
}
