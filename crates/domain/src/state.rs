//! Lifecycle state of one device's link.

use std::fmt;

use serde::Serialize;

/// Where a device worker is in its connect / poll / reconnect cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session. Initial state, and the state after link loss.
    #[default]
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// A session is up; poll cycles and notifications run.
    Connected,
    /// Waiting before the next connect attempt.
    ReconnectBackoff,
    /// Terminal. The worker has released its client.
    Stopped,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Any non-terminal state may move to [`Stopped`](Self::Stopped);
    /// nothing leaves it.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Stopped, _) => false,
            (_, Self::Stopped)
            | (Self::Disconnected | Self::ReconnectBackoff, Self::Connecting)
            | (Self::Connecting, Self::Connected | Self::ReconnectBackoff)
            | (Self::Connected, Self::Disconnected) => true,
            _ => false,
        }
    }

    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ReconnectBackoff => "reconnect_backoff",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
