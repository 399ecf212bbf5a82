use serde::{Deserialize, Serialize};

use super::ring_buffer::SampleRing;

// SNAPSHOT CAPTURER -----------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SnapshotConfig {
    /// History copied from the ring, ending just before the trigger sample.
    pub pre_samples: usize,
    /// Live samples appended after the trigger.
    pub post_samples: usize,
}

impl SnapshotConfig {
    pub fn total_len(&self) -> usize {
        self.pre_samples + self.post_samples
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            pre_samples: 200,
            post_samples: 800,
        }
    }
}

/// Captures a fixed pre/post-trigger window around a candidate event.
///
/// The buffer is reused across captures; `collecting` and `ready` are never
/// simultaneously true, and `ready` is the last flag to change when a capture
/// completes, so an observer that sees it set always sees a fully populated
/// buffer.
pub struct SnapshotCapturer {
    config: SnapshotConfig,
    buffer: Vec<u16>,
    write_index: usize,
    collecting: bool,
    ready: bool,
    trigger_slot: usize,
}

impl SnapshotCapturer {
    pub fn new(config: SnapshotConfig) -> Self {
        assert!(config.post_samples > 0, "snapshot needs a post-trigger region");
        let buffer = vec![0; config.total_len()];
        Self {
            config,
            buffer,
            write_index: 0,
            collecting: false,
            ready: false,
            trigger_slot: 0,
        }
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// True while a capture is underway or waiting to be consumed; new
    /// triggers must be swallowed for the duration.
    pub fn in_flight(&self) -> bool {
        self.collecting || self.ready
    }

    /// Ring slot of the triggering sample (diagnostics).
    pub fn trigger_slot(&self) -> usize {
        self.trigger_slot
    }

    /// Offset of the triggering sample inside the snapshot buffer.
    pub fn trigger_offset(&self) -> usize {
        self.config.pre_samples
    }

    pub fn total_len(&self) -> usize {
        self.buffer.len()
    }

    /// Starts a capture anchored at the triggering sample: copies the
    /// pre-trigger history out of the ring, records the trigger value at the
    /// pre-offset and arms the post-trigger cursor. Returns false while a
    /// previous snapshot is still in flight.
    pub fn begin(&mut self, ring: &SampleRing, trigger_slot: usize, trigger_value: u16) -> bool {
        if self.in_flight() {
            return false;
        }

        let pre = self.config.pre_samples;
        let cap = ring.capacity();
        let start = (trigger_slot + cap - (pre % cap)) % cap;
        ring.copy_window(start, &mut self.buffer[..pre]);
        self.buffer[pre] = trigger_value;

        self.write_index = pre + 1;
        self.trigger_slot = trigger_slot;
        self.collecting = true;
        true
    }

    /// Appends one post-trigger sample while collecting. Completion clears
    /// `collecting` before raising `ready`.
    pub fn append(&mut self, sample: u16) {
        if !self.collecting || self.write_index >= self.buffer.len() {
            return;
        }
        self.buffer[self.write_index] = sample;
        self.write_index += 1;
        if self.write_index >= self.buffer.len() {
            self.collecting = false;
            self.ready = true;
        }
    }

    /// Full snapshot contents; only meaningful while `ready` is set.
    pub fn samples(&self) -> &[u16] {
        &self.buffer
    }

    /// Marks the snapshot consumed and the buffer reusable.
    pub fn release(&mut self) {
        self.collecting = false;
        self.ready = false;
        self.write_index = 0;
    }
}
