use serde::{Deserialize, Serialize};

// RESULT AGGREGATOR -----------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AggregatorConfig {
    /// Consumer loop period in milliseconds; every timer below is counted in
    /// these ticks.
    pub tick_ms: u32,
    /// While the hold is active, only clearly larger peaks (or peaks within
    /// the hold ratio) replace the displayed value.
    pub peak_hold_time_ms: u32,
    pub peak_hold_min_delta: u16,
    pub peak_hold_min_ratio: f32,
    /// A much smaller peak arriving after the hold is queued as suspicious
    /// and only committed if nothing larger supersedes it in time.
    pub rapid_jump_filter_time_ms: u32,
    pub rapid_jump_ratio: f32,
    /// Small peaks this soon after the last update are dropped outright.
    pub rapid_jump_time_threshold_ticks: u64,
    /// Consumer ticks during which new snapshots are discarded after a
    /// counted event; coarse debounce above the sample-level dead time.
    pub event_deadtime_loops: u32,
    /// Rainfall volume credited per accepted drop (millimeters).
    pub mm_per_drop: f32,
    /// Length of the per-second drop-count window (seconds).
    pub seconds_window: usize,
    /// Fast-path peaks below this code never touch the display.
    pub display_min_amplitude: u16,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            peak_hold_time_ms: 200,
            peak_hold_min_delta: 200,
            peak_hold_min_ratio: 0.7,
            rapid_jump_filter_time_ms: 50,
            rapid_jump_ratio: 0.5,
            rapid_jump_time_threshold_ticks: 3,
            event_deadtime_loops: 50,
            mm_per_drop: 0.02,
            seconds_window: 60,
            display_min_amplitude: 1200,
        }
    }
}

/// Display-facing snapshot of the aggregate state.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisplayFields {
    pub peak_code: u16,
    pub peak_voltage: f32,
    pub voltage_sum: f32,
    pub total_rain_mm: f32,
    pub intensity_mmh: f32,
    pub drop_count: u64,
}

/// Debounced peak selection and rainfall statistics.
///
/// Fast-path reports and validated events both funnel through the same
/// hold/jump filter before touching the displayed peak; only validated
/// events advance the drop count, the rainfall total and the intensity
/// window.
pub struct ResultAggregator {
    config: AggregatorConfig,
    code_to_volts: f32,
    tick_counter: u64,
    current_peak: u16,
    current_voltage: f32,
    voltage_sum: f32,
    last_valid_peak: u16,
    peak_hold_ticks: u32,
    suspicious_peak: u16,
    suspicious_ticks: u32,
    last_update_tick: u64,
    drop_count: u64,
    total_rain_mm: f32,
    drops_per_second: Vec<u16>,
    sec_index: usize,
    ticks_into_second: u32,
    intensity_mmh: f32,
    event_deadtime: u32,
}

impl ResultAggregator {
    pub fn new(config: AggregatorConfig, code_to_volts: f32) -> Self {
        assert!(config.seconds_window > 0, "seconds window must be non-empty");
        let drops_per_second = vec![0; config.seconds_window];
        Self {
            config,
            code_to_volts,
            tick_counter: 0,
            current_peak: 0,
            current_voltage: 0.0,
            voltage_sum: 0.0,
            last_valid_peak: 0,
            peak_hold_ticks: 0,
            suspicious_peak: 0,
            suspicious_ticks: 0,
            last_update_tick: 0,
            drop_count: 0,
            total_rain_mm: 0.0,
            drops_per_second,
            sec_index: 0,
            ticks_into_second: 0,
            intensity_mmh: 0.0,
            event_deadtime: 0,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn drop_count(&self) -> u64 {
        self.drop_count
    }

    pub fn total_rain_mm(&self) -> f32 {
        self.total_rain_mm
    }

    pub fn intensity_mmh(&self) -> f32 {
        self.intensity_mmh
    }

    pub fn current_peak(&self) -> u16 {
        self.current_peak
    }

    pub fn drops_this_second(&self) -> u16 {
        self.drops_per_second[self.sec_index]
    }

    pub fn in_event_deadtime(&self) -> bool {
        self.event_deadtime > 0
    }

    pub fn display_fields(&self) -> DisplayFields {
        DisplayFields {
            peak_code: self.current_peak,
            peak_voltage: self.current_voltage,
            voltage_sum: self.voltage_sum,
            total_rain_mm: self.total_rain_mm,
            intensity_mmh: self.intensity_mmh,
            drop_count: self.drop_count,
        }
    }

    /// Fast-path report: display only, gated by the display floor.
    pub fn offer_fast_peak(&mut self, value: u16) {
        if value >= self.config.display_min_amplitude {
            self.apply_peak_hold(value);
        }
    }

    /// Validated snapshot event: updates the display and all counted
    /// statistics, then arms the event-level dead time.
    pub fn record_event(&mut self, peak_value: u16) {
        self.apply_peak_hold(peak_value);
        self.drop_count += 1;
        self.total_rain_mm += self.config.mm_per_drop;
        self.drops_per_second[self.sec_index] += 1;
        self.event_deadtime = self.config.event_deadtime_loops;
    }

    /// One consumer-loop step: timer decrements, suspicious-peak commit and
    /// the per-second window advance.
    pub fn tick(&mut self) {
        self.tick_counter += 1;

        if self.peak_hold_ticks > 0 {
            self.peak_hold_ticks -= 1;
        }

        if self.suspicious_ticks > 0 {
            self.suspicious_ticks -= 1;
            if self.suspicious_ticks == 0 && self.suspicious_peak > 0 {
                // nothing larger showed up in time, so it was a real small
                // drop after all
                let value = self.suspicious_peak;
                self.commit_update(value);
            }
        }

        if self.event_deadtime > 0 {
            self.event_deadtime -= 1;
        }

        self.ticks_into_second += 1;
        let ticks_per_second = (1000 / self.config.tick_ms.max(1)).max(1);
        if self.ticks_into_second >= ticks_per_second {
            self.ticks_into_second = 0;
            self.sec_index = (self.sec_index + 1) % self.drops_per_second.len();
            self.drops_per_second[self.sec_index] = 0;
            self.intensity_mmh = self.compute_intensity();
        }
    }

    /// Window drop count scaled to volume per hour.
    fn compute_intensity(&self) -> f32 {
        let drops: u32 = self.drops_per_second.iter().map(|&d| u32::from(d)).sum();
        drops as f32 * self.config.mm_per_drop * 60.0 / self.drops_per_second.len() as f32
    }

    fn apply_peak_hold(&mut self, value: u16) {
        if self.last_valid_peak == 0 {
            self.commit_update(value);
            return;
        }

        if self.peak_hold_ticks > 0 {
            // inside the hold window only clearly larger peaks, or peaks
            // within the hold ratio, replace the held value
            if value > self.last_valid_peak.saturating_add(self.config.peak_hold_min_delta)
                || value as f32 >= self.last_valid_peak as f32 * self.config.peak_hold_min_ratio
            {
                self.commit_update(value);
            }
            return;
        }

        if (value as f32) < self.last_valid_peak as f32 * self.config.rapid_jump_ratio {
            let since_update = self.tick_counter.saturating_sub(self.last_update_tick);
            if since_update > self.config.rapid_jump_time_threshold_ticks {
                // possibly a genuine small drop; confirm after a delay
                self.suspicious_peak = value;
                self.suspicious_ticks =
                    (self.config.rapid_jump_filter_time_ms / self.config.tick_ms.max(1)).max(1);
            }
            // a small value right after an update is tail ringing, dropped
            return;
        }

        self.commit_update(value);
    }

    fn commit_update(&mut self, value: u16) {
        self.current_peak = value;
        self.current_voltage = f32::from(value) * self.code_to_volts;
        self.voltage_sum += self.current_voltage;
        self.last_valid_peak = value;
        self.last_update_tick = self.tick_counter;
        self.peak_hold_ticks =
            (self.config.peak_hold_time_ms / self.config.tick_ms.max(1)).max(1);
        self.suspicious_peak = 0;
        self.suspicious_ticks = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE_TO_VOLTS: f32 = 3.3 / 4095.0;

    fn aggregator() -> ResultAggregator {
        ResultAggregator::new(AggregatorConfig::default(), CODE_TO_VOLTS)
    }

    #[test]
    fn first_peak_updates_immediately() {
        let mut agg = aggregator();
        agg.offer_fast_peak(1500);
        assert_eq!(agg.current_peak(), 1500);
        let v = agg.display_fields().peak_voltage;
        assert!((v - 1500.0 * CODE_TO_VOLTS).abs() < 1e-4);
    }

    #[test]
    fn display_floor_gates_fast_path_reports() {
        let mut agg = aggregator();
        agg.offer_fast_peak(1100);
        assert_eq!(agg.current_peak(), 0);
        agg.offer_fast_peak(1200);
        assert_eq!(agg.current_peak(), 1200);
    }

    #[test]
    fn hold_window_ignores_much_smaller_peaks() {
        let mut agg = aggregator();
        agg.offer_fast_peak(3000);
        // inside the hold window: 1300 < 70% of 3000, ignored
        agg.tick();
        agg.offer_fast_peak(1300);
        assert_eq!(agg.current_peak(), 3000);
        // but 80% of the held value passes
        agg.offer_fast_peak(2400);
        assert_eq!(agg.current_peak(), 2400);
    }

    #[test]
    fn small_peak_right_after_update_is_dropped() {
        let mut agg = aggregator();
        agg.offer_fast_peak(3000);
        // run the hold out, staying just past it
        for _ in 0..21 {
            agg.tick();
        }
        // two ticks since "last update" is within the rapid-jump threshold
        // only if an update happened recently; force one and retry quickly
        agg.offer_fast_peak(3000);
        for _ in 0..21 {
            agg.tick();
        }
        agg.offer_fast_peak(1300);
        // queued as suspicious rather than dropped or committed
        assert_eq!(agg.current_peak(), 3000);
        // a larger peak inside the filter window cancels the suspicion
        agg.offer_fast_peak(2900);
        assert_eq!(agg.current_peak(), 2900);
        for _ in 0..10 {
            agg.tick();
        }
        assert_eq!(agg.current_peak(), 2900);
    }

    #[test]
    fn suspicious_small_peak_commits_after_the_filter_delay() {
        let mut agg = aggregator();
        agg.offer_fast_peak(3000);
        for _ in 0..25 {
            agg.tick();
        }
        agg.offer_fast_peak(1300);
        assert_eq!(agg.current_peak(), 3000);
        // five filter ticks later the small drop is believed
        for _ in 0..5 {
            agg.tick();
        }
        assert_eq!(agg.current_peak(), 1300);
    }

    #[test]
    fn events_advance_counts_totals_and_current_second() {
        let mut agg = aggregator();
        agg.record_event(2000);
        agg.record_event(2000);
        assert_eq!(agg.drop_count(), 2);
        assert_eq!(agg.drops_this_second(), 2);
        assert!((agg.total_rain_mm() - 0.04).abs() < 1e-6);
        assert!(agg.in_event_deadtime());
    }

    #[test]
    fn event_deadtime_expires_after_configured_ticks() {
        let mut agg = aggregator();
        agg.record_event(2000);
        for _ in 0..49 {
            agg.tick();
        }
        assert!(agg.in_event_deadtime());
        agg.tick();
        assert!(!agg.in_event_deadtime());
    }

    #[test]
    fn intensity_follows_the_sliding_window() {
        let mut agg = aggregator();
        agg.record_event(2000);
        // one second elapses: intensity covers one drop over the window
        for _ in 0..100 {
            agg.tick();
        }
        let expected = 1.0 * 0.02 * 60.0 / 60.0;
        assert!((agg.intensity_mmh() - expected).abs() < 1e-6);

        // after the full window passes with no drops, intensity decays to 0
        for _ in 0..100 * 60 {
            agg.tick();
        }
        assert!(agg.intensity_mmh().abs() < 1e-6);
    }
}
