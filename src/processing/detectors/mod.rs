pub mod fast_peak;

// DETECTOR OUTPUT -------------------------------------------------------------

/// A completed-pulse peak published by the fast per-sample path.
///
/// The value/slot pair is only trustworthy once it has been observed through
/// its handoff cell; the fields travel together as one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakReport {
    pub value: u16,
    pub slot: usize,
    pub channel: usize,
}
