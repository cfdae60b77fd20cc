//! Reconnect pacing.

use std::time::Duration;

use blegate_domain::device::Timing;

/// How long to wait between connect attempts.
///
/// Every failure is followed by `interval`. Each time the running failure
/// count reaches a multiple of `threshold`, `extended_pause` is added on
/// top. The count is owned by the caller and reset on a successful
/// connect, so the extended pause recurs every `threshold` failures for as
/// long as the device stays unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub threshold: u32,
    pub interval: Duration,
    pub extended_pause: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn from_timing(timing: &Timing) -> Self {
        Self {
            threshold: timing.connect_retry,
            interval: timing.connect_retry_interval,
            extended_pause: timing.wait_after_connect_retries,
        }
    }

    /// Delay before the next attempt, after `failures` consecutive failed
    /// attempts (`failures >= 1`). A zero threshold disables the extended
    /// pause.
    #[must_use]
    pub fn delay_after(&self, failures: u32) -> Duration {
        if self.threshold > 0 && failures > 0 && failures % self.threshold == 0 {
            self.interval + self.extended_pause
        } else {
            self.interval
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            threshold: 5,
            interval: Duration::from_secs(2),
            extended_pause: Duration::from_secs(10),
        }
    }

    #[test]
    fn should_wait_interval_below_threshold() {
        let policy = policy();
        for failures in 1..5 {
            assert_eq!(policy.delay_after(failures), Duration::from_secs(2));
        }
    }

    #[test]
    fn should_add_extended_pause_at_threshold() {
        assert_eq!(policy().delay_after(5), Duration::from_secs(12));
    }

    #[test]
    fn should_repeat_extended_pause_every_threshold() {
        let policy = policy();
        assert_eq!(policy.delay_after(6), Duration::from_secs(2));
        assert_eq!(policy.delay_after(10), Duration::from_secs(12));
        assert_eq!(policy.delay_after(15), Duration::from_secs(12));
    }

    #[test]
    fn should_never_pause_extra_with_zero_threshold() {
        let policy = RetryPolicy {
            threshold: 0,
            ..policy()
        };
        assert_eq!(policy.delay_after(5), Duration::from_secs(2));
    }

    #[test]
    fn should_build_from_device_timing() {
        let timing = Timing {
            poll_period: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
            connect_retry: 3,
            connect_retry_interval: Duration::from_secs(1),
            wait_after_connect_retries: Duration::from_secs(30),
        };
        let policy = RetryPolicy::from_timing(&timing);
        assert_eq!(policy.threshold, 3);
        assert_eq!(policy.delay_after(3), Duration::from_secs(31));
    }
}
