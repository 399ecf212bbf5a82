use log::{debug, info, warn};

use crate::config::EngineConfig;

use super::aggregator::{DisplayFields, ResultAggregator};
use super::detectors::fast_peak::FastPeakDetector;
use super::detectors::PeakReport;
use super::handoff::Handoff;
use super::ring_buffer::SampleRing;
use super::snapshot::SnapshotCapturer;
use super::threshold::AdaptiveThreshold;
use super::triggers::diff::DiffTrigger;
use super::triggers::watchdog::WatchdogLatch;
use super::validator::{SnapshotAnalysis, SnapshotValidator};

// -----------------------------------------------------------------------------
// DETECTION ENGINE
// -----------------------------------------------------------------------------

/// Converter-driver surface the engine talks back to: threshold propagation
/// for the hardware comparator and the acquisition restart used by the
/// liveness safeguard. Bring-up itself lives with the driver.
pub trait ConverterControl {
    fn set_threshold(&mut self, threshold: u16);
    fn restart(&mut self);
}

/// Diagnostic counters; none of these feed back into detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct EngineStats {
    pub samples_processed: u64,
    pub watchdog_crossings: u64,
    pub diff_trigger_fires: u64,
    pub snapshots_captured: u64,
    /// Ready snapshots discarded by the event-level dead time.
    pub snapshots_discarded: u64,
    /// Triggers that arrived while a snapshot was already in flight.
    pub triggers_swallowed: u64,
    pub events_accepted: u64,
    pub events_rejected: u64,
    /// Fast-path reports refused because the previous one was unconsumed.
    pub fast_reports_dropped: u64,
    pub restarts: u64,
}

/// A consumed snapshot handed to an external consumer via `poll_snapshot`.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    pub samples: Vec<u16>,
    pub trigger_offset: usize,
    pub trigger_slot: usize,
}

/// Read-only copy of the last completed snapshot, kept regardless of the
/// validation outcome (waveform inspection, offline tuning).
#[derive(Debug, Clone)]
pub struct ExportedSnapshot {
    pub samples: Vec<u16>,
    pub trigger_offset: usize,
    pub peak_index: usize,
    pub peak_value: u16,
    pub baseline: i32,
    pub accepted: bool,
    /// Monotone counter; 0 means nothing has been exported yet.
    pub sequence: u64,
}

struct ChannelContext {
    ring: SampleRing,
    detector: FastPeakDetector,
}

/// The full detection pipeline behind two entry points: the producer side
/// (`on_samples_ready`, `on_watchdog_crossing`) runs at sample rate and never
/// blocks; the consumer side (`tick`) runs on the 10 ms loop and performs the
/// expensive snapshot validation.
///
/// Contexts are kept per channel even though one channel is deployed, so a
/// gain-switching second channel stays a configuration change.
pub struct DetectionEngine {
    config: EngineConfig,
    channels: Vec<ChannelContext>,
    threshold: AdaptiveThreshold,
    watchdog: WatchdogLatch,
    diff_trigger: DiffTrigger,
    capturer: SnapshotCapturer,
    validator: SnapshotValidator,
    aggregator: ResultAggregator,
    fast_peak: Handoff<PeakReport>,
    converter: Option<Box<dyn ConverterControl>>,
    export: ExportedSnapshot,
    stats: EngineStats,
    sample_tick: u64,
    last_health_sample_tick: u64,
    system_normal: bool,
    tick_counter: u64,
}

impl DetectionEngine {
    pub fn new(config: EngineConfig) -> Self {
        let sampling = &config.sampling;
        assert!(
            sampling.active_channel < sampling.channel_count.max(1),
            "active channel out of range"
        );

        let channels = (0..sampling.channel_count.max(1))
            .map(|channel| ChannelContext {
                ring: SampleRing::new(sampling.ring_capacity),
                detector: FastPeakDetector::new(channel, config.fast_peak.clone()),
            })
            .collect();

        let capturer = SnapshotCapturer::new(config.snapshot.clone());
        let export = ExportedSnapshot {
            samples: Vec::with_capacity(config.snapshot.total_len()),
            trigger_offset: config.snapshot.pre_samples,
            peak_index: 0,
            peak_value: 0,
            baseline: 0,
            accepted: false,
            sequence: 0,
        };
        let code_to_volts = sampling.reference_voltage / f32::from(sampling.full_scale);

        Self {
            channels,
            threshold: AdaptiveThreshold::new(config.threshold.clone()),
            watchdog: WatchdogLatch::new(),
            diff_trigger: DiffTrigger::new(config.diff_trigger.clone()),
            capturer,
            validator: SnapshotValidator::new(config.validator.clone()),
            aggregator: ResultAggregator::new(config.aggregator.clone(), code_to_volts),
            fast_peak: Handoff::new(),
            converter: None,
            export,
            stats: EngineStats::default(),
            sample_tick: 0,
            last_health_sample_tick: 0,
            system_normal: true,
            tick_counter: 0,
            config,
        }
    }

    /// Attaches the converter driver and pushes the current threshold into
    /// its comparator.
    pub fn set_converter(&mut self, mut converter: Box<dyn ConverterControl>) {
        converter.set_threshold(self.threshold.current());
        self.converter = Some(converter);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn threshold(&self) -> u16 {
        self.threshold.current()
    }

    pub fn stats(&self) -> EngineStats {
        let mut stats = self.stats;
        stats.watchdog_crossings = self.watchdog.crossings();
        stats
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_tick
    }

    pub fn is_system_normal(&self) -> bool {
        self.system_normal
    }

    pub fn display_fields(&self) -> DisplayFields {
        self.aggregator.display_fields()
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    /// Last `n` samples of the active channel, oldest first.
    pub fn recent_waveform(&self, n: usize) -> Vec<u16> {
        self.channels[self.config.sampling.active_channel]
            .ring
            .recent(n)
            .collect()
    }

    // PRODUCER SIDE -----------------------------------------------------------

    /// Batch entry point for the converter feed (half/full transfer
    /// completions in the deployed configuration). Runs to completion
    /// without blocking.
    pub fn on_samples_ready(&mut self, samples: &[u16]) {
        let channel = self.config.sampling.active_channel;
        for &value in samples {
            self.process_sample(channel, value);
        }
    }

    /// Asynchronous hardware comparator crossing; latched here and consumed
    /// by the trigger evaluation on the next sample.
    pub fn on_watchdog_crossing(&mut self) {
        self.watchdog.notify_crossing();
    }

    fn process_sample(&mut self, channel: usize, value: u16) {
        let threshold = self.threshold.current();
        let ctx = &mut self.channels[channel];
        let slot = ctx.ring.push(value);
        self.sample_tick += 1;
        self.stats.samples_processed += 1;

        // fast path: independent of the trigger/snapshot machinery
        if let Some(report) = ctx.detector.process_sample(value, slot, threshold) {
            if channel == self.config.sampling.active_channel
                && self.fast_peak.try_publish(report).is_err()
            {
                self.stats.fast_reports_dropped += 1;
            }
        }

        let triggered = self.evaluate_triggers(channel, value, slot);
        // the triggering sample is placed by the capture itself; only the
        // samples after it are appended here
        if !triggered && self.capturer.is_collecting() {
            self.capturer.append(value);
        }
    }

    /// OR-combination of the hardware latch and the differential trigger.
    /// Returns true when a new capture started on this sample.
    fn evaluate_triggers(&mut self, channel: usize, value: u16, slot: usize) -> bool {
        let armed = !self.capturer.in_flight();

        // the latch is consumed either way: an overlapping trigger is
        // swallowed, not deferred
        let hardware = self.watchdog.take_pending();
        let differential = self.diff_trigger.process(value, armed);
        if differential {
            self.stats.diff_trigger_fires += 1;
        }

        if !(hardware || differential) {
            return false;
        }
        if !armed {
            self.stats.triggers_swallowed += 1;
            return false;
        }

        let started = self.capturer.begin(&self.channels[channel].ring, slot, value);
        if started {
            self.stats.snapshots_captured += 1;
            debug!(
                "snapshot capture started at slot {slot} (hw: {hardware}, diff: {differential})"
            );
        }
        started
    }

    // CONSUMER SIDE -----------------------------------------------------------

    /// One consumer-loop step (10 ms cadence): fast-path pickup, snapshot
    /// validation, adaptive threshold maintenance, statistics timers and the
    /// liveness check.
    pub fn tick(&mut self) {
        self.tick_counter += 1;

        // display favors the fast path; counting favors the validator
        if let Some(report) = self.fast_peak.try_take() {
            self.aggregator.offer_fast_peak(report.value);
        }

        self.process_snapshot_if_ready();

        let period = self.threshold.config().update_period_ticks;
        if period > 0 && self.tick_counter % period == 0 {
            let ring = &self.channels[self.config.sampling.active_channel].ring;
            if let Some(new_threshold) = self.threshold.update_from_ring(ring) {
                debug!("adaptive threshold moved to {new_threshold}");
                if let Some(converter) = self.converter.as_mut() {
                    converter.set_threshold(new_threshold);
                }
            }
        }

        self.aggregator.tick();

        let health_period = self.config.sampling.health_period_ticks;
        if health_period > 0 && self.tick_counter % health_period == 0 {
            self.check_liveness();
        }
    }

    fn process_snapshot_if_ready(&mut self) {
        if !self.capturer.is_ready() {
            return;
        }

        if self.aggregator.in_event_deadtime() {
            // still inside the previous drop's event window; this capture is
            // that drop's tail
            self.capturer.release();
            self.stats.snapshots_discarded += 1;
            return;
        }

        let analysis = self.validator.analyze(
            self.capturer.samples(),
            self.capturer.trigger_offset(),
            self.threshold.current(),
        );

        if analysis.accepted {
            self.stats.events_accepted += 1;
            self.aggregator.record_event(analysis.peak_value);
            info!(
                "drop accepted: peak {} at snapshot index {}",
                analysis.peak_value, analysis.peak_index
            );
        } else {
            self.stats.events_rejected += 1;
            debug!(
                "snapshot rejected: peak {} at snapshot index {}",
                analysis.peak_value, analysis.peak_index
            );
        }

        self.store_export(&analysis);
        self.capturer.release();
    }

    fn store_export(&mut self, analysis: &SnapshotAnalysis) {
        self.export.samples.clear();
        self.export.samples.extend_from_slice(self.capturer.samples());
        self.export.trigger_offset = self.capturer.trigger_offset();
        self.export.peak_index = analysis.peak_index;
        self.export.peak_value = analysis.peak_value;
        self.export.baseline = analysis.baseline;
        self.export.accepted = analysis.accepted;
        self.export.sequence += 1;
    }

    fn check_liveness(&mut self) {
        if self.sample_tick == self.last_health_sample_tick {
            self.system_normal = false;
            warn!("sample feed stalled, restarting acquisition");
            self.restart_acquisition();
        } else {
            self.system_normal = true;
        }
        self.last_health_sample_tick = self.sample_tick;
    }

    // CONSUMER API ------------------------------------------------------------

    /// Takes the pending fast-path peak, if any. Alternative to `tick` for
    /// embeddings that run their own consumer loop.
    pub fn poll_fast_peak(&mut self) -> Option<PeakReport> {
        self.fast_peak.try_take()
    }

    /// Takes a completed snapshot as an owned view, freeing the capture
    /// buffer for the next trigger.
    pub fn poll_snapshot(&mut self) -> Option<SnapshotView> {
        if !self.capturer.is_ready() {
            return None;
        }
        let view = SnapshotView {
            samples: self.capturer.samples().to_vec(),
            trigger_offset: self.capturer.trigger_offset(),
            trigger_slot: self.capturer.trigger_slot(),
        };
        self.capturer.release();
        Some(view)
    }

    /// Manual threshold override; clamped to the configured bound and
    /// propagated to the comparator.
    pub fn set_threshold(&mut self, value: u16) {
        let applied = self.threshold.set(value);
        if let Some(converter) = self.converter.as_mut() {
            converter.set_threshold(applied);
        }
    }

    /// Restarts the acquisition path after a stall: kicks the converter and
    /// clears the trigger latches so a stale crossing cannot fire a spurious
    /// capture on the first fresh sample.
    pub fn restart_acquisition(&mut self) {
        self.stats.restarts += 1;
        self.watchdog.reset();
        self.diff_trigger.reset();
        if let Some(converter) = self.converter.as_mut() {
            converter.restart();
        }
    }

    pub fn last_snapshot(&self) -> Option<&ExportedSnapshot> {
        if self.export.sequence == 0 {
            None
        } else {
            Some(&self.export)
        }
    }
}
