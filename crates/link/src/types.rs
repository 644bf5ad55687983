//! Public types for the link manager.

use std::fmt;
use std::time::Duration;

use bioreactor_protocol::ClientType;

/// Address used when none is configured.
pub const DEFAULT_URL: &str = "ws://localhost:8000/ws";

/// Fixed delay between a close and the next connection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capacity of the outbound frame queue of a single connection.
pub(crate) const WRITE_QUEUE_CAPACITY: usize = 64;

/// Connection status of the link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
        }
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of a [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// WebSocket address to connect to.
    pub url: String,
    /// Delay before each reconnect attempt. Constant, never grows.
    pub reconnect_delay: Duration,
    /// Kind announced in the identification payload.
    pub client_type: ClientType,
}

impl LinkConfig {
    /// Config for `url` with the default delay and client kind.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            client_type: ClientType::Frontend,
        }
    }
}
