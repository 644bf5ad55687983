//! Observable link state.
//!
//! Each observable is a [`watch`] channel. Status and the connected flag are
//! only published when their value actually changes; the last message is
//! published on every receipt, even when it repeats.

use tokio::sync::watch;

use bioreactor_protocol::InboundPayload;

use crate::types::ConnectionStatus;

/// Receivers handed to the host.
#[derive(Debug, Clone)]
pub struct LinkObservers {
    /// Most recently received payload; `None` until the first receipt.
    pub last_message: watch::Receiver<Option<InboundPayload>>,
    /// Current connection status.
    pub connection_status: watch::Receiver<ConnectionStatus>,
    /// Boolean mirror of the status, cleared early on transport errors.
    pub is_connected: watch::Receiver<bool>,
}

#[derive(Debug)]
pub(crate) struct LinkState {
    status: watch::Sender<ConnectionStatus>,
    connected: watch::Sender<bool>,
    last_message: watch::Sender<Option<InboundPayload>>,
}

impl LinkState {
    pub(crate) fn new() -> Self {
        Self {
            status: watch::Sender::new(ConnectionStatus::Disconnected),
            connected: watch::Sender::new(false),
            last_message: watch::Sender::new(None),
        }
    }

    pub(crate) fn observers(&self) -> LinkObservers {
        LinkObservers {
            last_message: self.last_message.subscribe(),
            connection_status: self.status.subscribe(),
            is_connected: self.connected.subscribe(),
        }
    }

    pub(crate) fn mark_open(&self) {
        self.set_status(ConnectionStatus::Connected);
        set_if_changed(&self.connected, true);
    }

    pub(crate) fn mark_closed(&self) {
        self.set_status(ConnectionStatus::Disconnected);
        set_if_changed(&self.connected, false);
    }

    /// Clears the flag only; the close that follows updates the status.
    pub(crate) fn mark_error(&self) {
        set_if_changed(&self.connected, false);
    }

    pub(crate) fn set_last_message(&self, payload: InboundPayload) {
        self.last_message.send_replace(Some(payload));
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub(crate) fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    pub(crate) fn last_message(&self) -> Option<InboundPayload> {
        self.last_message.borrow().clone()
    }

    fn set_status(&self, status: ConnectionStatus) {
        set_if_changed(&self.status, status);
    }
}

fn set_if_changed<T: PartialEq>(tx: &watch::Sender<T>, value: T) {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn initial_state_is_disconnected() {
        let state = LinkState::new();
        assert_eq!(state.status(), ConnectionStatus::Disconnected);
        assert!(!state.is_connected());
        assert!(state.last_message().is_none());
    }

    #[test]
    fn open_and_close_keep_flag_in_sync() {
        let state = LinkState::new();
        state.mark_open();
        assert_eq!(state.status(), ConnectionStatus::Connected);
        assert!(state.is_connected());

        state.mark_closed();
        assert_eq!(state.status(), ConnectionStatus::Disconnected);
        assert!(!state.is_connected());
    }

    #[test]
    fn error_clears_flag_but_not_status() {
        let state = LinkState::new();
        state.mark_open();
        state.mark_error();
        assert_eq!(state.status(), ConnectionStatus::Connected);
        assert!(!state.is_connected());
    }

    #[test]
    fn observers_see_changes() {
        let state = LinkState::new();
        let mut obs = state.observers();

        state.mark_open();
        assert!(obs.connection_status.has_changed().unwrap());
        assert_eq!(
            *obs.connection_status.borrow_and_update(),
            ConnectionStatus::Connected
        );
        assert!(*obs.is_connected.borrow_and_update());

        state.set_last_message(InboundPayload::Json(json!({"pH": 7})));
        assert_eq!(
            *obs.last_message.borrow_and_update(),
            Some(InboundPayload::Json(json!({"pH": 7})))
        );
    }

    #[test]
    fn unchanged_status_does_not_notify() {
        let state = LinkState::new();
        let mut obs = state.observers();

        state.mark_closed();
        assert!(!obs.connection_status.has_changed().unwrap());
        assert!(!obs.is_connected.has_changed().unwrap());

        state.mark_open();
        obs.connection_status.borrow_and_update();
        state.mark_open();
        assert!(!obs.connection_status.has_changed().unwrap());
    }

    #[test]
    fn repeated_message_still_notifies() {
        let state = LinkState::new();
        let mut obs = state.observers();

        state.set_last_message(InboundPayload::Raw("same".into()));
        obs.last_message.borrow_and_update();
        state.set_last_message(InboundPayload::Raw("same".into()));
        assert!(obs.last_message.has_changed().unwrap());
    }
}
