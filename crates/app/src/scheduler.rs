//! Poll scheduling.

use std::time::Duration;

use tokio::time::Instant;

/// Upper bound on how long a worker sleeps before re-checking its
/// schedule, so stop requests and queued requests are picked up promptly.
pub const POLL_QUANTUM: Duration = Duration::from_millis(200);

/// What the scheduler decided at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// A poll cycle is due now.
    Due,
    /// Sleep this long, then tick again.
    Wait(Duration),
}

/// Enforces a minimum interval between poll cycles.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    period: Duration,
    last_polled: Option<Instant>,
}

impl PollScheduler {
    /// A scheduler whose first cycle is due immediately.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            last_polled: None,
        }
    }

    /// A cycle is due once `period` has elapsed since the last one. The
    /// wait is capped at [`POLL_QUANTUM`].
    #[must_use]
    pub fn tick(&self, now: Instant) -> Tick {
        let Some(last) = self.last_polled else {
            return Tick::Due;
        };
        let elapsed = now.saturating_duration_since(last);
        if elapsed >= self.period {
            Tick::Due
        } else {
            Tick::Wait((self.period - elapsed).min(POLL_QUANTUM))
        }
    }

    /// Record that a cycle started at `at`.
    pub fn mark_polled(&mut self, at: Instant) {
        self.last_polled = Some(at);
    }
}
