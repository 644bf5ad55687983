//! WebSocket read pump: turns incoming frames into transport events.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::ws_client::{EventCallback, TransportEvent};

/// Reads frames from the WebSocket and reports them through `on_event`.
///
/// Nothing is read until `start` fires, so the owner can finish its own
/// open handling first. A transport failure is reported as
/// [`TransportEvent::Error`] followed by [`TransportEvent::Closed`]; a clean
/// close or end of stream only as `Closed`. Once `cancel` fires no further
/// event is reported.
///
/// Only text frames become [`TransportEvent::Message`]. Binary frames are
/// logged and dropped; the backend never sends them.
pub(crate) async fn read_pump<S>(
    mut read: S,
    start: oneshot::Receiver<()>,
    on_event: EventCallback,
    open: Arc<AtomicBool>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        started = start => {
            if started.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        trace!(len = text.len(), "received text frame");
                        on_event(TransportEvent::Message(text.to_string()));
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        if let Err(e) = write_tx.try_send(tungstenite::Message::Pong(data)) {
                            debug!("pong not queued: {e}");
                        }
                    }
                    Some(Ok(tungstenite::Message::Pong(_))) => {
                        trace!("received pong");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(frame = ?frame, "received close frame");
                        break;
                    }
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        debug!(len = data.len(), "ignoring binary frame");
                    }
                    Some(Ok(tungstenite::Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        open.store(false, Ordering::Release);
                        if cancel.is_cancelled() {
                            return;
                        }
                        on_event(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    open.store(false, Ordering::Release);
    if !cancel.is_cancelled() {
        on_event(TransportEvent::Closed);
    }
}
