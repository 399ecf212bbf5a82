use serde::{Deserialize, Serialize};

// SNAPSHOT EVENT VALIDATOR ----------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidatorConfig {
    /// Leading snapshot samples averaged into the baseline estimate.
    pub baseline_sample_count: usize,
    /// Coarse peak search reaches this far to either side of the trigger.
    pub search_halfspan: usize,
    /// Analysis window after the trigger; tail data beyond it is never
    /// examined, so secondary ringing cannot look like a new peak.
    /// 2 ms at 42 us per sample.
    pub front_window_samples: usize,
    /// Radius of the exact-maximum refinement around the smoothed peak.
    pub local_refinement_radius: usize,
    /// Consecutive at/below-baseline samples that confirm the fall-end.
    pub tail_settle_count: usize,
    pub min_peak_delta_over_threshold: u16,
    /// Absolute amplitude floor; anything smaller is treated as noise.
    pub min_peak_amplitude: u16,
    pub shape_window_pre: usize,
    pub shape_window_post: usize,
    pub min_rise_samples: usize,
    pub min_decay_samples: usize,
    /// Margin for the leave/return-to-baseline scans and the steep-local
    /// difference fallback.
    pub min_local_delta: u16,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            baseline_sample_count: 80,
            search_halfspan: 80,
            front_window_samples: 47,
            local_refinement_radius: 6,
            tail_settle_count: 5,
            min_peak_delta_over_threshold: 12,
            min_peak_amplitude: 1500,
            shape_window_pre: 12,
            shape_window_post: 24,
            min_rise_samples: 3,
            min_decay_samples: 3,
            min_local_delta: 8,
        }
    }
}

/// Outcome of a snapshot analysis. Produced for every completed snapshot,
/// accepted or not, so the diagnostic export can carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotAnalysis {
    pub accepted: bool,
    pub peak_index: usize,
    pub peak_value: u16,
    pub baseline: i32,
}

impl SnapshotAnalysis {
    fn rejected() -> Self {
        Self {
            accepted: false,
            peak_index: 0,
            peak_value: 0,
            baseline: 0,
        }
    }
}

/// Second, more expensive validation pass over a captured snapshot.
///
/// Where the fast path decides sample-by-sample, this one sees the whole
/// window at once: it re-estimates the baseline, re-locates the peak inside
/// a restricted front window and applies amplitude and shape checks before
/// the final accept/reject decision.
pub struct SnapshotValidator {
    config: ValidatorConfig,
}

impl SnapshotValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Analyzes a completed snapshot. `trigger_index` is the offset of the
    /// triggering sample; `threshold` the detection threshold active when
    /// the snapshot is consumed.
    pub fn analyze(&self, samples: &[u16], trigger_index: usize, threshold: u16) -> SnapshotAnalysis {
        let len = samples.len();
        if len == 0 || trigger_index >= len {
            return SnapshotAnalysis::rejected();
        }

        let baseline = self.compute_baseline(samples);
        let front_delta = i32::from(self.config.min_local_delta);

        // Everything from here on is confined to the front window; the
        // post-trigger tail beyond it is never analyzed.
        let front_start = trigger_index;
        let mut front_end = trigger_index + self.config.front_window_samples; // exclusive
        if front_end > len {
            front_end = len - 1;
        }
        if front_start + 1 >= front_end {
            return SnapshotAnalysis::rejected();
        }

        // Coarse search may dip into the pre-trigger region, but never past
        // the front window's end.
        let search_start = trigger_index.saturating_sub(self.config.search_halfspan);
        let search_end = front_end - 1;
        let (coarse_index, coarse_value) = self.find_peak(samples, baseline, search_start, search_end);

        // Rise start: first sample that leaves the baseline band, scanning
        // forward from the trigger.
        let mut start_index = front_start;
        while start_index < front_end && i32::from(samples[start_index]) <= baseline + front_delta {
            start_index += 1;
        }
        if start_index > coarse_index {
            start_index = if coarse_index > self.config.shape_window_pre {
                coarse_index - self.config.shape_window_pre
            } else {
                front_start
            };
        }
        if start_index < front_start {
            start_index = front_start;
        }

        // Fall end: forward from the peak until the signal holds at/below
        // the baseline band.
        let mut end_index = coarse_index.max(front_start);
        while end_index < front_end && i32::from(samples[end_index]) > baseline + front_delta {
            end_index += 1;
        }
        if end_index >= front_end {
            end_index = front_end - 1;
        }

        // Confirm the fall with a run of settled samples and trim the end to
        // where that run starts.
        let mut settle_index = coarse_index + 1;
        let mut settle_count = 0usize;
        let mut trimmed_end = end_index;
        while settle_index <= end_index && settle_index < front_end {
            if i32::from(samples[settle_index]) <= baseline + front_delta {
                settle_count += 1;
                if settle_count >= self.config.tail_settle_count {
                    trimmed_end = settle_index - (self.config.tail_settle_count - 1);
                    break;
                }
            } else {
                settle_count = 0;
            }
            settle_index += 1;
        }
        let mut end_index = trimmed_end;
        if end_index <= coarse_index {
            end_index = if coarse_index < len - 1 { coarse_index + 1 } else { coarse_index };
        }
        if end_index >= front_end {
            end_index = front_end - 1;
        }

        // Re-locate the peak strictly inside the front interval. If the
        // coarse peak fell into the pre-trigger region, search the whole
        // front window instead.
        let (peak_index, peak_value) = if coarse_index < front_start || coarse_index >= front_end {
            max_in(samples, front_start, front_end - 1)
        } else if end_index >= start_index {
            max_in(samples, start_index, end_index)
        } else {
            (coarse_index, coarse_value)
        };

        let accepted =
            self.validate_event(samples, peak_index, peak_value, threshold, start_index, end_index);

        SnapshotAnalysis {
            accepted,
            peak_index,
            peak_value,
            baseline,
        }
    }

    fn compute_baseline(&self, samples: &[u16]) -> i32 {
        let count = self.config.baseline_sample_count.min(samples.len());
        if count == 0 {
            return 0;
        }
        let sum: u32 = samples[..count].iter().map(|&v| u32::from(v)).sum();
        (sum / count as u32) as i32
    }

    /// Coarse peak via 3-point moving-average smoothing, then exact-maximum
    /// refinement within a small radius.
    fn find_peak(
        &self,
        samples: &[u16],
        baseline: i32,
        search_start: usize,
        search_end: usize,
    ) -> (usize, u16) {
        let len = samples.len();
        let search_start = if search_start >= len { 0 } else { search_start };
        let search_end = search_end.min(len - 1);
        let search_start = search_start.min(search_end);

        let mut max_delta = i64::MIN;
        let mut rough_index = search_start;
        for i in search_start..=search_end {
            let mut acc = i64::from(samples[i]);
            let mut denom = 1i64;
            if i > 0 {
                acc += i64::from(samples[i - 1]);
                denom += 1;
            }
            if i + 1 < len {
                acc += i64::from(samples[i + 1]);
                denom += 1;
            }
            let smooth = acc / denom;
            let delta = smooth - i64::from(baseline);
            if delta > max_delta {
                max_delta = delta;
                rough_index = i;
            }
        }

        let refine_start = rough_index
            .saturating_sub(self.config.local_refinement_radius)
            .max(search_start);
        let refine_end = (rough_index + self.config.local_refinement_radius)
            .min(len - 1)
            .min(search_end);
        max_in(samples, refine_start, refine_end)
    }

    /// Final amplitude and shape judgment over the refined interval.
    fn validate_event(
        &self,
        samples: &[u16],
        peak_index: usize,
        peak_value: u16,
        threshold: u16,
        start_index: usize,
        end_index: usize,
    ) -> bool {
        if start_index > end_index || end_index >= samples.len() {
            return false;
        }
        if peak_index < start_index || peak_index > end_index {
            return false;
        }

        // amplitude: over the live threshold with margin, and over the
        // absolute floor
        if peak_value <= threshold {
            return false;
        }
        if peak_value < threshold.saturating_add(self.config.min_peak_delta_over_threshold) {
            return false;
        }
        if peak_value < self.config.min_peak_amplitude {
            return false;
        }

        // shape: enough rising samples before the peak and falling after it
        let pre = (peak_index - start_index).min(self.config.shape_window_pre);
        let post = end_index.saturating_sub(peak_index).min(self.config.shape_window_post);
        if pre < self.config.min_rise_samples || post < self.config.min_decay_samples {
            return false;
        }

        let rise_from = (peak_index + 1 - pre).max(start_index + 1);
        let rise_ok = (rise_from..=peak_index)
            .filter(|&i| samples[i] > samples[i - 1])
            .count();
        let decay_to = (peak_index + post).min(end_index);
        let decay_ok = (peak_index + 1..=decay_to)
            .filter(|&i| samples[i] < samples[i - 1])
            .count();
        if rise_ok >= self.config.min_rise_samples && decay_ok >= self.config.min_decay_samples {
            return true;
        }

        // narrow pulses get a stricter fallback: the peak must tower over
        // its neighborhood by twice the local delta on both sides
        let min_diff = self.config.min_local_delta * 2;
        let left = if peak_index > start_index {
            samples[peak_index - 1]
        } else {
            samples[peak_index]
        };
        let right = if peak_index + 1 <= end_index {
            samples[peak_index + 1]
        } else {
            samples[peak_index]
        };
        if peak_value > left.saturating_add(min_diff) && peak_value > right.saturating_add(min_diff)
        {
            return true;
        }
        if peak_index > start_index + 1
            && peak_value > samples[peak_index - 2].saturating_add(min_diff)
            && peak_index + 2 <= end_index
            && peak_value > samples[peak_index + 2].saturating_add(min_diff)
        {
            return true;
        }
        false
    }
}

fn max_in(samples: &[u16], from: usize, to: usize) -> (usize, u16) {
    let mut max_index = from;
    let mut max_value = samples[from];
    for (i, &v) in samples.iter().enumerate().take(to + 1).skip(from + 1) {
        if v > max_value {
            max_value = v;
            max_index = i;
        }
    }
    (max_index, max_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIGGER: usize = 200;
    const THRESHOLD: u16 = 620;

    fn validator() -> SnapshotValidator {
        SnapshotValidator::new(ValidatorConfig::default())
    }

    /// Snapshot with a ramp pulse starting at the trigger offset.
    fn snapshot_with_pulse(baseline: u16, peak: u16, rise: usize, fall: usize) -> Vec<u16> {
        let mut buf = vec![baseline; 1000];
        let span = (peak - baseline) as usize;
        for k in 1..=rise {
            buf[TRIGGER + k - 1] = baseline + (span * k / rise) as u16;
        }
        for k in 1..=fall {
            buf[TRIGGER + rise + k - 1] = peak - (span * k / fall) as u16;
        }
        buf
    }

    #[test]
    fn clean_pulse_is_accepted_at_its_true_peak() {
        let buf = snapshot_with_pulse(500, 2000, 20, 20);
        let analysis = validator().analyze(&buf, TRIGGER, THRESHOLD);
        assert!(analysis.accepted);
        assert_eq!(analysis.peak_value, 2000);
        assert_eq!(analysis.peak_index, TRIGGER + 19);
        assert!((495..=505).contains(&analysis.baseline));
    }

    #[test]
    fn peak_is_always_reported_inside_the_front_window() {
        // genuine early pulse plus a much larger oscillation far in the tail
        let mut buf = snapshot_with_pulse(500, 1800, 15, 15);
        for k in 0..60 {
            buf[400 + k] = 3500;
        }
        let analysis = validator().analyze(&buf, TRIGGER, THRESHOLD);
        let front_end = TRIGGER + validator().config().front_window_samples;
        assert!(analysis.peak_index >= TRIGGER && analysis.peak_index < front_end);
        assert_eq!(analysis.peak_value, 1800);
    }

    #[test]
    fn flat_input_is_rejected_regardless_of_level() {
        let buf = vec![3000u16; 1000];
        let analysis = validator().analyze(&buf, TRIGGER, THRESHOLD);
        assert!(!analysis.accepted);
    }

    #[test]
    fn spike_without_local_margin_is_rejected() {
        let mut buf = vec![500u16; 1000];
        // short pedestal so the shape windows open up, then a plateau whose
        // neighbors sit within 2x the local delta of the peak: no sustained
        // rise run and no steep-difference escape
        for slot in buf.iter_mut().take(TRIGGER + 16).skip(TRIGGER + 4) {
            *slot = 520;
        }
        buf[TRIGGER + 8] = 1596;
        buf[TRIGGER + 9] = 1596;
        buf[TRIGGER + 10] = 1600;
        buf[TRIGGER + 11] = 1596;
        buf[TRIGGER + 12] = 1596;
        let analysis = validator().analyze(&buf, TRIGGER, THRESHOLD);
        assert!(!analysis.accepted);
    }

    #[test]
    fn narrow_spike_with_steep_margin_is_accepted() {
        let mut buf = vec![500u16; 1000];
        for slot in buf.iter_mut().take(TRIGGER + 16).skip(TRIGGER + 4) {
            *slot = 520;
        }
        // too narrow for the monotone rise check, but the peak towers over
        // both neighbors by far more than 2x the local delta
        buf[TRIGGER + 9] = 900;
        buf[TRIGGER + 10] = 1700;
        buf[TRIGGER + 11] = 900;
        let analysis = validator().analyze(&buf, TRIGGER, THRESHOLD);
        assert!(analysis.accepted);
        assert_eq!(analysis.peak_value, 1700);
    }

    #[test]
    fn amplitude_floor_rejects_small_pulses() {
        // well-shaped but peaks below the absolute floor
        let buf = snapshot_with_pulse(500, 1400, 15, 15);
        let analysis = validator().analyze(&buf, TRIGGER, THRESHOLD);
        assert!(!analysis.accepted);
    }

    #[test]
    fn peak_must_clear_threshold_with_margin() {
        let config = ValidatorConfig {
            min_peak_amplitude: 100,
            ..Default::default()
        };
        let v = SnapshotValidator::new(config);
        let buf = snapshot_with_pulse(500, 628, 10, 10);
        // 628 is above the 620 threshold but inside the 12-code margin
        let analysis = v.analyze(&buf, TRIGGER, THRESHOLD);
        assert!(!analysis.accepted);
    }

    #[test]
    fn empty_or_short_snapshots_are_rejected() {
        let v = validator();
        assert!(!v.analyze(&[], 0, THRESHOLD).accepted);
        assert!(!v.analyze(&[500, 600], 5, THRESHOLD).accepted);
    }
}
