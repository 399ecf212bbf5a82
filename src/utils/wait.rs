use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};

// INITIALIZATION WAIT ---------------------------------------------------------

/// The condition did not come true before the deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeout;

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "condition not met before timeout")
    }
}

impl Error for WaitTimeout {}

/// Blocks until `condition` returns true or `timeout` elapses.
///
/// Bring-up helper for conditions like converter calibration or a feed
/// thread coming alive. It sleeps between polls and must never be called
/// from the sample-rate path.
pub fn wait_until<F>(mut condition: F, timeout: Duration) -> Result<(), WaitTimeout>
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return Err(WaitTimeout);
        }
        std::thread::sleep(Duration::from_micros(200));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_condition_returns_at_once() {
        assert_eq!(wait_until(|| true, Duration::from_millis(1)), Ok(()));
    }

    #[test]
    fn late_condition_is_caught_before_the_deadline() {
        let mut polls = 0;
        let result = wait_until(
            || {
                polls += 1;
                polls >= 3
            },
            Duration::from_secs(1),
        );
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn never_true_times_out() {
        assert_eq!(
            wait_until(|| false, Duration::from_millis(5)),
            Err(WaitTimeout)
        );
    }
}
