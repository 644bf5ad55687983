//! WebSocket client owning one transport handle.
//!
//! Frames are written by a write pump fed through a bounded queue, and read
//! by a read pump that reports [`TransportEvent`]s through a callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;

use crate::types::WRITE_QUEUE_CAPACITY;

/// Errors from the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection is not open")]
    NotOpen,

    #[error("outbound queue is full")]
    QueueFull,

    #[error("connection closed")]
    Closed,
}

/// Lifecycle events reported by the read pump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Message(String),
    /// The transport failed. Always followed by [`TransportEvent::Closed`].
    Error(String),
    /// The connection ended.
    Closed,
}

/// Callback receiving transport events, invoked from the read pump task.
pub type EventCallback = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// WebSocket client connected to the backend.
///
/// Events are held back until [`WsClient::start_reading`] is called, so the
/// owner can publish its open state before the first message is reported.
pub struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    open: Arc<AtomicBool>,
    start_tx: Option<oneshot::Sender<()>>,
    cancel: CancellationToken,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl WsClient {
    /// Opens a WebSocket to `url` and spawns its pumps.
    pub async fn connect(url: &str, on_event: EventCallback) -> Result<Self, WsError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_QUEUE_CAPACITY);
        let (start_tx, start_rx) = oneshot::channel();
        let open = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let write_handle = {
            let open = open.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, open, cancel))
        };

        let read_handle = {
            let open = open.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read, start_rx, on_event, open, write_tx, cancel,
            ))
        };

        Ok(Self {
            write_tx,
            open,
            start_tx: Some(start_tx),
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
        })
    }

    /// Lets the read pump start reporting events. Idempotent.
    pub fn start_reading(&mut self) {
        if let Some(tx) = self.start_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Returns `true` while the transport is open for writing.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.cancel.is_cancelled()
    }

    /// Queues a text frame.
    pub fn send_text(&self, text: String) -> Result<(), WsError> {
        if !self.is_open() {
            return Err(WsError::NotOpen);
        }
        self.write_tx
            .try_send(tungstenite::Message::Text(text.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => WsError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => WsError::Closed,
            })
    }

    /// Serializes `message` as JSON and queues it.
    pub fn send_json<T: serde::Serialize + ?Sized>(&self, message: &T) -> Result<(), WsError> {
        let json = serde_json::to_string(message)?;
        self.send_text(json)
    }

    /// Closes the connection. The read pump reports nothing afterwards and
    /// the write pump sends a close frame on its way out.
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.cancel.cancel();
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.close();
    }
}

/// Client without a socket: frames land in the returned queue and `open`
/// is the flag the pumps would share.
#[cfg(test)]
pub(crate) fn detached_client(
    open: Arc<AtomicBool>,
) -> (WsClient, mpsc::Receiver<tungstenite::Message>) {
    let (write_tx, write_rx) = mpsc::channel(2);
    let client = WsClient {
        write_tx,
        open,
        start_tx: None,
        cancel: CancellationToken::new(),
        _read_handle: tokio::spawn(async {}),
        _write_handle: tokio::spawn(async {}),
    };
    (client, write_rx)
}
