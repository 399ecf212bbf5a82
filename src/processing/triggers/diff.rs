use serde::{Deserialize, Serialize};

// DIFFERENTIAL TRIGGER --------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DiffTriggerConfig {
    /// Minimum jump between adjacent samples that counts as a hit.
    pub threshold: u16,
    /// Hits required before the trigger fires.
    pub consec_hits: u8,
    /// Samples to ignore after a fire, so the same event's later slope does
    /// not retrigger.
    pub cooldown_samples: u16,
}

impl Default for DiffTriggerConfig {
    fn default() -> Self {
        Self {
            threshold: 100,
            consec_hits: 2,
            cooldown_samples: 150,
        }
    }
}

/// Software trigger on the sample-to-sample difference.
///
/// A hit counter climbs while `|sample[n] - sample[n-1]|` clears the
/// threshold and decays otherwise (floor 0); reaching the hit target outside
/// the cooldown fires the trigger.
pub struct DiffTrigger {
    config: DiffTriggerConfig,
    prev: Option<u16>,
    hit_counter: u8,
    cooldown: u16,
}

impl DiffTrigger {
    pub fn new(config: DiffTriggerConfig) -> Self {
        Self {
            config,
            prev: None,
            hit_counter: 0,
            cooldown: 0,
        }
    }

    /// Per-sample evaluation; returns true when the trigger fires.
    ///
    /// With `armed` false (a snapshot is already in flight) only the
    /// previous-sample tracking and the cooldown decay run, so the detector
    /// picks up seamlessly once the capture completes.
    pub fn process(&mut self, sample: u16, armed: bool) -> bool {
        if !armed {
            self.prev = Some(sample);
            if self.cooldown > 0 {
                self.cooldown -= 1;
            }
            return false;
        }

        let mut fired = false;
        if let Some(prev) = self.prev {
            let diff = sample.abs_diff(prev);
            if diff >= self.config.threshold {
                self.hit_counter = self.hit_counter.saturating_add(1);
            } else if self.hit_counter > 0 {
                self.hit_counter -= 1;
            }

            if self.hit_counter >= self.config.consec_hits && self.cooldown == 0 {
                fired = true;
                self.hit_counter = 0;
                self.cooldown = self.config.cooldown_samples;
            }
        }

        self.prev = Some(sample);
        if self.cooldown > 0 {
            self.cooldown -= 1;
        }
        fired
    }

    pub fn reset(&mut self) {
        self.prev = None;
        self.hit_counter = 0;
        self.cooldown = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger() -> DiffTrigger {
        DiffTrigger::new(DiffTriggerConfig::default())
    }

    #[test]
    fn fires_after_consecutive_jumps() {
        let mut t = trigger();
        assert!(!t.process(500, true)); // no previous sample yet
        assert!(!t.process(650, true)); // first hit
        assert!(t.process(900, true)); // second hit fires
    }

    #[test]
    fn small_differences_decay_the_hit_counter() {
        let mut t = trigger();
        t.process(500, true);
        assert!(!t.process(650, true)); // hit 1
        assert!(!t.process(655, true)); // decays back to 0
        assert!(!t.process(800, true)); // hit 1 again, no fire
        assert!(t.process(950, true));
    }

    #[test]
    fn cooldown_blocks_refiring() {
        let mut t = trigger();
        t.process(500, true);
        t.process(650, true);
        assert!(t.process(900, true));
        // keep jumping; the cooldown swallows every fire
        let mut v = 900u16;
        for _ in 0..148 {
            v = if v > 2000 { 500 } else { v + 150 };
            assert!(!t.process(v, true));
        }
        // cooldown expired, two fresh hits fire again
        assert!(!t.process(100, true));
        assert!(t.process(300, true));
    }

    #[test]
    fn disarmed_samples_still_track_the_previous_value() {
        let mut t = trigger();
        t.process(500, true);
        assert!(!t.process(700, false)); // in-flight, tracking only
        // the jump 700 -> 900 is seen relative to the tracked value
        assert!(!t.process(900, true));
        assert!(t.process(1100, true));
    }
}
