// HARDWARE COMPARATOR LATCH ---------------------------------------------------

/// Latch for the converter's analog-watchdog crossing notification.
///
/// The comparator interrupt sets the flag asynchronously; the trigger
/// evaluation consumes it on the next sample. Crossings are counted for
/// diagnostics independently of whether they end up starting a capture.
#[derive(Debug, Default)]
pub struct WatchdogLatch {
    pending: bool,
    crossings: u64,
}

impl WatchdogLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_crossing(&mut self) {
        self.pending = true;
        self.crossings += 1;
    }

    /// Consumes the latched flag.
    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    pub fn crossings(&self) -> u64 {
        self.crossings
    }

    pub fn reset(&mut self) {
        self.pending = false;
    }
}
