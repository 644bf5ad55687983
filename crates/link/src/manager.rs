//! Connection manager owning the single link to the backend.
//!
//! Opens the socket on [`start`](ConnectionManager::start), publishes status
//! and received payloads through watch channels, identifies itself on every
//! open, and reconnects after a fixed delay whenever the socket closes.

use serde::Serialize;
use tracing::{debug, error, info};

use bioreactor_protocol::InboundPayload;

use crate::reconnection::{LinkContext, begin_attempt, halt};
use crate::state::LinkObservers;
use crate::types::{ConnectionStatus, LinkConfig};

/// Connection manager for the backend WebSocket.
pub struct ConnectionManager {
    ctx: LinkContext,
}

impl ConnectionManager {
    /// Creates a manager. Nothing is opened until [`start`](Self::start).
    pub fn new(config: LinkConfig) -> Self {
        Self {
            ctx: LinkContext::new(config),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.ctx.config
    }

    /// Opens a new connection to the configured address.
    ///
    /// Returns immediately; the attempt runs on the tokio runtime and its
    /// outcome shows up in the observables. A failed attempt is retried after
    /// the reconnect delay like any other close. Calling this while a handle
    /// is live replaces it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut slot = self.ctx.lock();
        begin_attempt(&self.ctx, &mut slot);
    }

    /// Serializes `message` to JSON and sends it if the connection is open.
    ///
    /// Never fails: when there is no open connection the message is dropped
    /// and logged. Returns whether the message was queued for transmission.
    pub fn send<T: Serialize + ?Sized>(&self, message: &T) -> bool {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(e) => {
                error!(error = %e, "failed to serialize message, not sent");
                return false;
            }
        };

        let slot = self.ctx.lock();
        match slot.client.as_ref() {
            Some(client) if client.is_open() => match client.send_text(json.clone()) {
                Ok(()) => {
                    debug!(message = %json, "sent message");
                    true
                }
                Err(e) => {
                    error!(error = %e, message = %json, "failed to send message");
                    false
                }
            },
            _ => {
                error!(message = %json, "WebSocket is not connected, message not sent");
                false
            }
        }
    }

    /// Closes the current connection, if any, and cancels a pending retry.
    ///
    /// The closed handle reports nothing afterwards, so the observables keep
    /// the values they had when this was called.
    pub fn stop(&self) {
        let mut slot = self.ctx.lock();
        if halt(&mut slot) {
            info!("WebSocket closed");
        } else {
            debug!("stop requested without an open connection");
        }
    }

    /// Receivers for the last message, the status and the connected flag.
    pub fn observe(&self) -> LinkObservers {
        self.ctx.state.observers()
    }

    /// Current connection status.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.ctx.state.status()
    }

    /// Current value of the connected flag.
    pub fn is_connected(&self) -> bool {
        self.ctx.state.is_connected()
    }

    /// Most recently received payload.
    pub fn last_message(&self) -> Option<InboundPayload> {
        self.ctx.state.last_message()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        halt(&mut self.ctx.lock());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connection_manager_new() {
        let mgr = ConnectionManager::new(LinkConfig::default());
        assert_eq!(mgr.connection_status(), ConnectionStatus::Disconnected);
        assert!(!mgr.is_connected());
        assert!(mgr.last_message().is_none());
        assert_eq!(mgr.config().url, crate::types::DEFAULT_URL);
    }

    #[tokio::test]
    async fn send_without_connection_is_dropped() {
        let mgr = ConnectionManager::new(LinkConfig::default());
        assert!(!mgr.send(&serde_json::json!({"program": "stop"})));
    }

    #[tokio::test]
    async fn stop_when_not_started_is_noop() {
        let mgr = ConnectionManager::new(LinkConfig::default());
        mgr.stop();
        mgr.stop();
        assert_eq!(mgr.connection_status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn observers_start_from_initial_values() {
        let mgr = ConnectionManager::new(LinkConfig::default());
        let obs = mgr.observe();
        assert_eq!(*obs.connection_status.borrow(), ConnectionStatus::Disconnected);
        assert!(!*obs.is_connected.borrow());
        assert!(obs.last_message.borrow().is_none());
    }

    #[tokio::test]
    async fn send_after_write_failure_is_not_queued() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let mgr = ConnectionManager::new(LinkConfig::default());
        let open = Arc::new(AtomicBool::new(true));
        let (client, mut queue) = crate::ws_client::detached_client(open.clone());
        mgr.ctx.lock().client = Some(client);

        assert!(mgr.send(&serde_json::json!({"program": "stop"})));
        assert!(queue.try_recv().is_ok());

        // What the write pump does when the socket rejects a frame.
        open.store(false, Ordering::Release);
        assert!(!mgr.send(&serde_json::json!({"program": "stop"})));
        assert!(queue.try_recv().is_err());
    }

    #[tokio::test]
    async fn unserializable_message_is_dropped() {
        use std::collections::HashMap;

        let mgr = ConnectionManager::new(LinkConfig::default());
        // Non-string map keys cannot be encoded as JSON.
        let mut bad = HashMap::new();
        bad.insert((1, 2), "value");
        assert!(!mgr.send(&bad));
    }
}
