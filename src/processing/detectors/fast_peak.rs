use serde::{Deserialize, Serialize};

use super::PeakReport;

// FAST PEAK-DETECTION STATE MACHINE -------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FastPeakConfig {
    /// Rolling baseline window length (samples).
    pub baseline_window: usize,
    /// Hard cap on the Searching phase; reaching it force-locks the peak so
    /// tail ringing cannot be captured as the maximum.
    pub peak_window_size: u16,
    /// A pulse completes once the signal drops back below
    /// `baseline + return_threshold`.
    pub return_threshold: u16,
    pub dead_time_init: u16,
    pub dead_time_min: u16,
    pub dead_time_max: u16,
    /// Extra dead time per `dead_time_scale_unit` codes of peak above the
    /// unit itself.
    pub dead_time_scale_unit: u16,
    pub dead_time_scale_step: u16,
    /// Consecutive strictly-decreasing samples that lock the running maximum.
    pub peak_lock_decay_count: u8,
    /// Falling back within this delta of baseline locks the peak immediately.
    pub peak_lock_baseline_delta: u16,
    /// Arming requires samples above `threshold + idle_trigger_margin`.
    pub idle_trigger_margin: u16,
    /// ... for this many consecutive samples.
    pub idle_trigger_consec: u8,
    /// After a pulse, the signal must hold near baseline for this many
    /// samples before the detector re-arms.
    pub stable_period_count: u16,
    pub stable_baseline_delta: u16,
    /// A locked maximum is only published when it clears
    /// `baseline + publish_floor_margin`.
    pub publish_floor_margin: u16,
}

impl Default for FastPeakConfig {
    fn default() -> Self {
        Self {
            baseline_window: 100,
            peak_window_size: 60,
            return_threshold: 20,
            dead_time_init: 50,
            dead_time_min: 50,
            dead_time_max: 200,
            dead_time_scale_unit: 1000,
            dead_time_scale_step: 50,
            peak_lock_decay_count: 4,
            peak_lock_baseline_delta: 30,
            idle_trigger_margin: 50,
            idle_trigger_consec: 3,
            stable_period_count: 100,
            stable_baseline_delta: 50,
            publish_floor_margin: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeakState {
    Idle,
    Searching,
    WaitFall,
}

/// Per-channel, per-sample rise/fall tracker.
///
/// This is the low-latency path: it reports a completed pulse's maximum the
/// moment the signal falls back, independently of the snapshot pipeline. It
/// runs inside the producer context and must never block.
pub struct FastPeakDetector {
    config: FastPeakConfig,
    channel: usize,
    state: PeakState,
    baseline_buffer: Vec<u16>,
    baseline_sum: u32,
    baseline_index: usize,
    baseline_count: usize,
    baseline_value: u16,
    dead_time: u16,
    search_count: u16,
    local_max: u16,
    local_max_slot: usize,
    prev_value: u16,
    decay_count: u8,
    peak_locked: bool,
    stable_count: u16,
    idle_trigger_count: u8,
    last_peak_value: u16,
}

impl FastPeakDetector {
    pub fn new(channel: usize, config: FastPeakConfig) -> Self {
        assert!(config.baseline_window > 0, "baseline window must be non-empty");
        let baseline_buffer = vec![0; config.baseline_window];
        Self {
            config,
            channel,
            state: PeakState::Idle,
            baseline_buffer,
            baseline_sum: 0,
            baseline_index: 0,
            baseline_count: 0,
            baseline_value: 0,
            dead_time: 0,
            search_count: 0,
            local_max: 0,
            local_max_slot: 0,
            prev_value: 0,
            decay_count: 0,
            peak_locked: false,
            stable_count: 0,
            idle_trigger_count: 0,
            last_peak_value: 0,
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn state(&self) -> PeakState {
        self.state
    }

    pub fn baseline(&self) -> u16 {
        self.baseline_value
    }

    pub fn dead_time(&self) -> u16 {
        self.dead_time
    }

    pub fn last_peak_value(&self) -> u16 {
        self.last_peak_value
    }

    /// Advances the state machine by one sample. Returns a report when a
    /// complete pulse just finished and its maximum clears the noise floor.
    pub fn process_sample(&mut self, value: u16, slot: usize, threshold: u16) -> Option<PeakReport> {
        if self.dead_time > 0 {
            self.dead_time -= 1;
            if self.state == PeakState::Idle {
                self.update_baseline(value);
            }
            return None;
        }

        if self.state == PeakState::Idle {
            self.update_baseline(value);
        }

        match self.state {
            PeakState::Idle => {
                self.run_idle(value, slot, threshold);
                None
            }
            PeakState::Searching => {
                self.run_searching(value, slot);
                None
            }
            PeakState::WaitFall => self.run_wait_fall(value),
        }
    }

    fn update_baseline(&mut self, value: u16) {
        self.baseline_sum -= u32::from(self.baseline_buffer[self.baseline_index]);
        self.baseline_buffer[self.baseline_index] = value;
        self.baseline_sum += u32::from(value);
        self.baseline_index = (self.baseline_index + 1) % self.baseline_buffer.len();

        if self.baseline_count < self.baseline_buffer.len() {
            self.baseline_count += 1;
        }
        self.baseline_value = (self.baseline_sum / self.baseline_count as u32) as u16;
    }

    fn run_idle(&mut self, value: u16, slot: usize, threshold: u16) {
        // Post-pulse stability gate: the signal must sit near baseline for a
        // full period before re-arming, or tail ringing restarts detection.
        if self.stable_count > 0 {
            if value.abs_diff(self.baseline_value) <= self.config.stable_baseline_delta {
                self.stable_count -= 1;
            } else {
                self.stable_count = self.config.stable_period_count;
            }
            if self.stable_count > 0 {
                return;
            }
        }

        if value > threshold.saturating_add(self.config.idle_trigger_margin) {
            self.idle_trigger_count += 1;
            // several consecutive samples over the margin are required, so a
            // single noise sample cannot arm the search
            if self.idle_trigger_count >= self.config.idle_trigger_consec {
                self.state = PeakState::Searching;
                self.search_count = 0;
                self.local_max = value;
                self.local_max_slot = slot;
                self.prev_value = value;
                self.decay_count = 0;
                self.peak_locked = false;
                self.idle_trigger_count = 0;
            }
        } else {
            self.idle_trigger_count = 0;
        }
    }

    fn run_searching(&mut self, value: u16, slot: usize) {
        // Returning to baseline ends the front portion of the pulse at once.
        if value <= self.baseline_value.saturating_add(self.config.peak_lock_baseline_delta) {
            self.peak_locked = true;
            self.state = PeakState::WaitFall;
            return;
        }

        if !self.peak_locked {
            if value < self.prev_value {
                self.decay_count += 1;
                if self.decay_count >= self.config.peak_lock_decay_count {
                    self.peak_locked = true;
                }
            } else {
                self.decay_count = 0;
                if value > self.local_max {
                    self.local_max = value;
                    self.local_max_slot = slot;
                }
            }
        }
        // once locked, the maximum no longer moves, even for larger late
        // values; those belong to the ringing tail

        self.prev_value = value;
        self.search_count += 1;
        if self.search_count >= self.config.peak_window_size {
            self.peak_locked = true;
            self.state = PeakState::WaitFall;
        }
    }

    fn run_wait_fall(&mut self, value: u16) -> Option<PeakReport> {
        if value >= self.baseline_value.saturating_add(self.config.return_threshold) {
            return None;
        }

        // pulse complete; publish only if the maximum clearly exceeds the
        // noise floor above baseline
        let report = if self.local_max
            > self.baseline_value.saturating_add(self.config.publish_floor_margin)
        {
            Some(PeakReport {
                value: self.local_max,
                slot: self.local_max_slot,
                channel: self.channel,
            })
        } else {
            None
        };

        self.dead_time = self.scaled_dead_time();
        self.last_peak_value = self.local_max;

        self.state = PeakState::Idle;
        self.search_count = 0;
        self.local_max = 0;
        self.prev_value = 0;
        self.decay_count = 0;
        self.peak_locked = false;
        self.stable_count = self.config.stable_period_count;
        self.idle_trigger_count = 0;

        report
    }

    /// Larger pulses ring longer, so the dead time grows with the peak.
    fn scaled_dead_time(&self) -> u16 {
        let mut dead_time = self.config.dead_time_init;
        let unit = self.config.dead_time_scale_unit.max(1);
        if self.local_max > unit {
            let extra = (self.local_max - unit) / unit * self.config.dead_time_scale_step;
            dead_time = (self.config.dead_time_init.saturating_add(extra))
                .clamp(self.config.dead_time_min, self.config.dead_time_max);
        }
        dead_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: u16 = 620;

    fn detector() -> FastPeakDetector {
        FastPeakDetector::new(0, FastPeakConfig::default())
    }

    /// Runs `values` through the detector, returning the reports it emitted.
    fn feed(det: &mut FastPeakDetector, values: &[u16]) -> Vec<PeakReport> {
        values
            .iter()
            .enumerate()
            .filter_map(|(slot, &v)| det.process_sample(v, slot, THRESHOLD))
            .collect()
    }

    fn ramp_pulse(baseline: u16, peak: u16, rise: usize, fall: usize) -> Vec<u16> {
        let mut out = Vec::new();
        for k in 1..=rise {
            out.push(baseline + ((peak - baseline) as usize * k / rise) as u16);
        }
        for k in 1..=fall {
            out.push(peak - ((peak - baseline) as usize * k / fall) as u16);
        }
        out
    }

    #[test]
    fn single_spike_does_not_arm() {
        let mut det = detector();
        let mut signal = vec![500u16; 150];
        signal.push(2000); // one isolated over-threshold sample
        signal.extend(std::iter::repeat(500).take(150));
        assert!(feed(&mut det, &signal).is_empty());
        assert_eq!(det.state(), PeakState::Idle);
    }

    #[test]
    fn clean_pulse_reports_its_maximum_once() {
        let mut det = detector();
        let mut signal = vec![500u16; 150];
        signal.extend(ramp_pulse(500, 2000, 30, 30));
        signal.extend(std::iter::repeat(500).take(300));

        let reports = feed(&mut det, &signal);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].value, 2000);
        assert_eq!(reports[0].channel, 0);
        assert_eq!(det.last_peak_value(), 2000);
    }

    #[test]
    fn sub_floor_pulse_completes_silently() {
        let mut det = detector();
        // peaks only 80 over a ~500 baseline: below the publish floor margin
        // but still armable via threshold 500 in this test
        let mut signal = vec![500u16; 150];
        signal.extend(ramp_pulse(500, 578, 10, 10));
        signal.extend(std::iter::repeat(500).take(300));
        let reports: Vec<PeakReport> = signal
            .iter()
            .enumerate()
            .filter_map(|(slot, &v)| det.process_sample(v, slot, 500))
            .collect();
        assert!(reports.is_empty());
    }

    #[test]
    fn tail_ringing_is_blocked_by_stability_period() {
        let mut det = detector();
        let mut signal = vec![500u16; 150];
        signal.extend(ramp_pulse(500, 2500, 20, 20));
        // ringing: oscillation around baseline that keeps leaving the stable
        // band, so the detector must not re-arm on it
        for _ in 0..40 {
            signal.extend_from_slice(&[700, 500, 420, 500]);
        }
        signal.extend(std::iter::repeat(500).take(300));

        let reports = feed(&mut det, &signal);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].value, 2500);
    }

    #[test]
    fn locked_maximum_ignores_later_larger_values() {
        let mut det = detector();
        let mut signal = vec![500u16; 150];
        // rise to 1500, decay for 5 samples (locks after 4), then a late jump
        signal.extend_from_slice(&[800, 1100, 1500, 1450, 1400, 1350, 1300, 1250]);
        signal.extend_from_slice(&[2600, 2600, 2600, 2600, 2600]);
        // fall back so the pulse completes
        signal.extend(std::iter::repeat(490u16).take(10));
        signal.extend(std::iter::repeat(500).take(300));

        let reports = feed(&mut det, &signal);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].value, 1500);
    }

    #[test]
    fn dead_time_scales_with_peak_and_clamps() {
        let mut det = detector();
        let mut signal = vec![500u16; 150];
        signal.extend(ramp_pulse(500, 4000, 20, 20));
        signal.extend(std::iter::repeat(500u16).take(10));
        let mut reports = Vec::new();
        for (slot, &v) in signal.iter().enumerate() {
            if let Some(r) = det.process_sample(v, slot, THRESHOLD) {
                reports.push(r);
            }
            if !reports.is_empty() {
                break;
            }
        }
        assert_eq!(reports.len(), 1);
        // (4000 - 1000) / 1000 * 50 = 150 extra, 200 total, at the clamp
        assert_eq!(det.dead_time(), 200);
    }

    #[test]
    fn baseline_tracks_recent_idle_signal() {
        let mut det = detector();
        feed(&mut det, &vec![400u16; 200]);
        assert_eq!(det.baseline(), 400);
        feed(&mut det, &vec![600u16; 200]);
        assert_eq!(det.baseline(), 600);
    }
}
