//! [`LinkConfig`] – timing knobs for one vehicle link.

use std::time::Duration;

use crate::protocol::HEARTBEAT_PERIOD;

/// Slack added on top of the heartbeat period for socket timeouts.
const TIMEOUT_SLACK: Duration = Duration::from_millis(500);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing configuration of a [`Connection`][crate::Connection].
///
/// Fixed for the lifetime of a session; changing it requires a new
/// connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// Dispatcher tick interval while the link is active.
    pub heartbeat_period: Duration,
    /// Upper bound for opening the TCP connection.
    pub connect_timeout: Duration,
    /// Socket read timeout.  Expiry is not a failure; the reader uses it to
    /// notice a stop request.
    pub read_poll_interval: Duration,
    /// Socket write timeout.  Expiry counts as a write failure.
    pub write_timeout: Duration,
}

impl LinkConfig {
    /// Derive the socket timeouts from `heartbeat_period` (period + 500 ms).
    pub fn with_heartbeat(heartbeat_period: Duration) -> Self {
        Self {
            heartbeat_period,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_poll_interval: heartbeat_period + TIMEOUT_SLACK,
            write_timeout: heartbeat_period + TIMEOUT_SLACK,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn read_poll_interval(mut self, interval: Duration) -> Self {
        self.read_poll_interval = interval;
        self
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::with_heartbeat(HEARTBEAT_PERIOD)
    }
}
