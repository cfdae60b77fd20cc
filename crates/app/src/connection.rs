//! Connection state machine of one device worker.

use std::time::Duration;

use blegate_domain::state::ConnectionState;
use tokio::sync::watch;

use crate::retry::RetryPolicy;

/// Tracks a device's [`ConnectionState`] and its run of failed connects.
///
/// Every accepted transition is published on a [`watch`] channel so the
/// rest of the gateway can observe the device without touching it.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    device: String,
    state: ConnectionState,
    failures: u32,
    policy: RetryPolicy,
    publisher: watch::Sender<ConnectionState>,
}

impl ConnectionStateMachine {
    /// A machine in [`ConnectionState::Disconnected`], and a receiver
    /// observing it.
    #[must_use]
    pub fn new(
        device: impl Into<String>,
        policy: RetryPolicy,
    ) -> (Self, watch::Receiver<ConnectionState>) {
        let (publisher, receiver) = watch::channel(ConnectionState::Disconnected);
        let machine = Self {
            device: device.into(),
            state: ConnectionState::Disconnected,
            failures: 0,
            policy,
            publisher,
        };
        (machine, receiver)
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed connect attempts since the last success.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Move to `next` if the transition is legal. Illegal transitions are
    /// logged and ignored.
    pub fn transition(&mut self, next: ConnectionState) -> bool {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                device = %self.device,
                from = %self.state,
                to = %next,
                "ignoring illegal state transition"
            );
            return false;
        }
        tracing::debug!(device = %self.device, from = %self.state, to = %next, "state transition");
        self.state = next;
        self.publisher.send_replace(next);
        true
    }

    /// A connect attempt starts.
    pub fn begin_connect(&mut self) -> bool {
        self.transition(ConnectionState::Connecting)
    }

    /// The connect attempt succeeded; the failure run ends.
    pub fn connected(&mut self) -> bool {
        let moved = self.transition(ConnectionState::Connected);
        if moved {
            self.failures = 0;
        }
        moved
    }

    /// The connect attempt failed. Returns how long to back off.
    pub fn connect_failed(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.transition(ConnectionState::ReconnectBackoff);
        self.policy.delay_after(self.failures)
    }

    /// The session was lost or closed.
    pub fn link_lost(&mut self) -> bool {
        self.transition(ConnectionState::Disconnected)
    }

    /// Terminal stop.
    pub fn stop(&mut self) -> bool {
        self.transition(ConnectionState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> (ConnectionStateMachine, watch::Receiver<ConnectionState>) {
        ConnectionStateMachine::new(
            "Thermometer",
            RetryPolicy {
                threshold: 2,
                interval: Duration::from_secs(1),
                extended_pause: Duration::from_secs(5),
            },
        )
    }

    #[test]
    fn should_start_disconnected() {
        let (sm, rx) = machine();
        assert_eq!(sm.state(), ConnectionState::Disconnected);
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }

    #[test]
    fn should_publish_transitions() {
        let (mut sm, rx) = machine();
        assert!(sm.begin_connect());
        assert!(sm.connected());
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
        assert!(sm.link_lost());
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }

    #[test]
    fn should_count_failures_and_pace_retries() {
        let (mut sm, _rx) = machine();
        sm.begin_connect();
        assert_eq!(sm.connect_failed(), Duration::from_secs(1));
        assert_eq!(sm.state(), ConnectionState::ReconnectBackoff);
        sm.begin_connect();
        assert_eq!(sm.connect_failed(), Duration::from_secs(6));
        sm.begin_connect();
        assert_eq!(sm.connect_failed(), Duration::from_secs(1));
        assert_eq!(sm.failures(), 3);
    }

    #[test]
    fn should_reset_failures_on_connect() {
        let (mut sm, _rx) = machine();
        sm.begin_connect();
        sm.connect_failed();
        sm.begin_connect();
        sm.connected();
        assert_eq!(sm.failures(), 0);
    }

    #[test]
    fn should_ignore_illegal_transition() {
        let (mut sm, rx) = machine();
        assert!(!sm.connected());
        assert_eq!(sm.state(), ConnectionState::Disconnected);
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }

    #[test]
    fn should_stay_stopped() {
        let (mut sm, rx) = machine();
        assert!(sm.stop());
        assert!(!sm.begin_connect());
        assert_eq!(sm.state(), ConnectionState::Stopped);
        assert_eq!(*rx.borrow(), ConnectionState::Stopped);
    }
}
