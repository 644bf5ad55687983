//! WebSocket write pump: drains the outbound queue into the socket.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Forwards queued frames to the socket until `cancel` fires or every sender
/// is gone, then sends a close frame.
///
/// A failed write clears `open`, so later sends are refused as "not
/// connected" rather than queued into a dead socket.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Message>,
    open: Arc<AtomicBool>,
    cancel: CancellationToken,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut written = 0usize;
    while let Some(frame) = next_frame(&mut queue, &cancel).await {
        if let Err(e) = sink.send(frame).await {
            open.store(false, Ordering::Release);
            warn!(written, "WebSocket write failed: {e}");
            return;
        }
        written += 1;
    }

    trace!(written, "outbound queue finished, closing");
    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!("close frame not sent: {e}");
    }
}

async fn next_frame(
    queue: &mut mpsc::Receiver<Message>,
    cancel: &CancellationToken,
) -> Option<Message> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        frame = queue.recv() => frame,
    }
}
