//! Connection attempts, transport event handling and the fixed-delay retry.
//!
//! Every attempt gets a new generation number. Events and timers carry the
//! generation they were created for and are dropped once it is stale, which
//! is how a superseded or stopped handle is kept from touching the state.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use bioreactor_protocol::inbound::{self, InboundKind};
use bioreactor_protocol::{ClientIdentification, InboundPayload};

use crate::state::LinkState;
use crate::types::LinkConfig;
use crate::ws_client::{EventCallback, TransportEvent, WsClient};

/// The live handle and everything that decides whether an event still
/// belongs to it. Guarded by a single lock so event handling, `start` and
/// `stop` never interleave.
#[derive(Debug, Default)]
pub(crate) struct Slot {
    pub(crate) generation: u64,
    pub(crate) client: Option<WsClient>,
    pub(crate) retry: Option<CancellationToken>,
}

/// Shared state passed to the connect task, event callbacks and the retry
/// timer.
#[derive(Clone)]
pub(crate) struct LinkContext {
    pub(crate) config: LinkConfig,
    pub(crate) state: Arc<LinkState>,
    pub(crate) slot: Arc<Mutex<Slot>>,
}

impl LinkContext {
    pub(crate) fn new(config: LinkConfig) -> Self {
        Self {
            config,
            state: Arc::new(LinkState::new()),
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cancels the pending retry timer, if any.
pub(crate) fn cancel_retry(slot: &mut Slot) {
    if let Some(token) = slot.retry.take() {
        token.cancel();
    }
}

/// Starts a new connection attempt, superseding the current handle and any
/// pending retry.
pub(crate) fn begin_attempt(ctx: &LinkContext, slot: &mut Slot) {
    slot.generation = slot.generation.wrapping_add(1);
    cancel_retry(slot);
    if let Some(old) = slot.client.take() {
        debug!("replacing existing connection");
        old.close();
    }
    tokio::spawn(connect_task(ctx.clone(), slot.generation));
}

/// Closes the current handle and cancels any pending retry. Returns `true`
/// if a handle was open.
pub(crate) fn halt(slot: &mut Slot) -> bool {
    slot.generation = slot.generation.wrapping_add(1);
    cancel_retry(slot);
    match slot.client.take() {
        Some(client) => {
            client.close();
            true
        }
        None => false,
    }
}

async fn connect_task(ctx: LinkContext, generation: u64) {
    info!(url = %ctx.config.url, generation, "connecting");
    let result = WsClient::connect(&ctx.config.url, event_handler(ctx.clone(), generation)).await;

    let mut slot = ctx.lock();
    if slot.generation != generation {
        debug!(generation, "connection attempt superseded, discarding");
        return;
    }

    match result {
        Ok(mut client) => {
            handle_open(&ctx, &client);
            client.start_reading();
            slot.client = Some(client);
        }
        Err(e) => {
            // A failed attempt is reported the way a browser socket reports
            // it: an error, then a close.
            handle_error(&ctx.state, &e.to_string());
            handle_close(&ctx, &mut slot);
        }
    }
}

/// Builds the callback the read pump of attempt `generation` reports to.
fn event_handler(ctx: LinkContext, generation: u64) -> EventCallback {
    Arc::new(move |event| {
        let mut slot = ctx.lock();
        if slot.generation != generation {
            trace!(generation, "ignoring event from a superseded connection");
            return;
        }
        match event {
            TransportEvent::Message(text) => handle_message(&ctx.state, &text),
            TransportEvent::Error(reason) => handle_error(&ctx.state, &reason),
            TransportEvent::Closed => handle_close(&ctx, &mut slot),
        }
    })
}

fn handle_open(ctx: &LinkContext, client: &WsClient) {
    ctx.state.mark_open();
    info!(url = %ctx.config.url, "WebSocket connected");

    let identification = ClientIdentification::new(ctx.config.client_type);
    match client.send_json(&identification) {
        Ok(()) => debug!(client_type = %ctx.config.client_type, "sent identification"),
        Err(e) => error!(error = %e, "failed to send identification"),
    }
}

/// Stores a received text payload as the last message, decoded when it is
/// JSON and verbatim otherwise. Binary frames never get here (see
/// `read_pump`), so they leave the last message untouched.
pub(crate) fn handle_message(state: &LinkState, text: &str) {
    trace!(raw = %text, "raw message received");
    let payload = match inbound::decode(text) {
        Ok(value) => {
            match inbound::classify(&value) {
                InboundKind::DeviceDisconnected => warn!("ESP32 disconnected"),
                kind => trace!(?kind, "decoded message"),
            }
            InboundPayload::Json(value)
        }
        Err(e) => {
            warn!(error = %e, "failed to parse message, keeping raw payload");
            InboundPayload::Raw(text.to_owned())
        }
    };
    state.set_last_message(payload);
}

pub(crate) fn handle_error(state: &LinkState, reason: &str) {
    error!(error = %reason, "WebSocket error");
    state.mark_error();
}

fn handle_close(ctx: &LinkContext, slot: &mut Slot) {
    slot.client = None;
    ctx.state.mark_closed();
    info!(
        retry_in_secs = ctx.config.reconnect_delay.as_secs_f64(),
        "WebSocket disconnected"
    );
    schedule_reconnect(ctx, slot);
}

fn schedule_reconnect(ctx: &LinkContext, slot: &mut Slot) {
    cancel_retry(slot);
    let token = CancellationToken::new();
    slot.retry = Some(token.clone());
    tokio::spawn(reconnect_after(ctx.clone(), token));
}

/// Waits the fixed delay, then starts one new attempt.
///
/// Returns a boxed future to break the recursive type cycle with
/// `connect_task` (which schedules this from its close handling).
fn reconnect_after(
    ctx: LinkContext,
    cancel: CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(ctx.config.reconnect_delay) => {}
        }

        let mut slot = ctx.lock();
        if cancel.is_cancelled() {
            return;
        }
        slot.retry = None;
        info!(url = %ctx.config.url, "reconnecting");
        begin_attempt(&ctx, &mut slot);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;

    use crate::types::ConnectionStatus;

    async fn refused_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("ws://{addr}/ws")
    }

    async fn wait_until(ctx: &LinkContext, mut cond: impl FnMut(&Slot) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let done = cond(&*ctx.lock());
                if done {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[test]
    fn cancel_retry_clears_token() {
        let token = CancellationToken::new();
        let mut slot = Slot {
            retry: Some(token.clone()),
            ..Slot::default()
        };

        cancel_retry(&mut slot);

        assert!(slot.retry.is_none());
        assert!(token.is_cancelled());
    }

    #[test]
    fn halt_without_client_only_bumps_generation() {
        let mut slot = Slot::default();
        assert!(!halt(&mut slot));
        assert_eq!(slot.generation, 1);
    }

    #[test]
    fn message_handling_falls_back_to_raw() {
        let state = LinkState::new();

        handle_message(&state, r#"{"sensorData":{"pH":6.9}}"#);
        assert_eq!(
            state.last_message(),
            Some(InboundPayload::Json(json!({"sensorData": {"pH": 6.9}})))
        );

        handle_message(&state, "Message received: hello");
        assert_eq!(
            state.last_message(),
            Some(InboundPayload::Raw("Message received: hello".into()))
        );
    }

    #[test]
    fn device_disconnect_only_updates_last_message() {
        let state = LinkState::new();
        state.mark_open();

        handle_message(&state, r#"{"status":"disconnected","type":"ESP32"}"#);

        assert_eq!(state.status(), ConnectionStatus::Connected);
        assert!(state.is_connected());
        assert_eq!(
            state.last_message(),
            Some(InboundPayload::Json(
                json!({"status": "disconnected", "type": "ESP32"})
            ))
        );
    }

    #[test]
    fn error_clears_flag_only() {
        let state = LinkState::new();
        state.mark_open();
        handle_error(&state, "reset by peer");
        assert_eq!(state.status(), ConnectionStatus::Connected);
        assert!(!state.is_connected());
    }

    #[tokio::test]
    async fn failed_attempts_retry_on_fixed_delay_until_halted() {
        let ctx = LinkContext::new(LinkConfig {
            reconnect_delay: Duration::from_millis(50),
            ..LinkConfig::new(refused_url().await)
        });

        begin_attempt(&ctx, &mut ctx.lock());
        wait_until(&ctx, |slot| slot.generation >= 3).await;

        assert_eq!(ctx.state.status(), ConnectionStatus::Disconnected);
        assert!(!ctx.state.is_connected());

        let generation = {
            let mut slot = ctx.lock();
            halt(&mut slot);
            assert!(slot.retry.is_none());
            slot.generation
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(ctx.lock().generation, generation);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_for_the_full_delay() {
        let ctx = LinkContext::new(LinkConfig::new(refused_url().await));
        ctx.state.mark_open();
        ctx.lock().generation = 1;

        event_handler(ctx.clone(), 1)(TransportEvent::Closed);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(ctx.lock().generation, 1);
        assert!(ctx.lock().retry.is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(ctx.lock().generation, 2);

        halt(&mut ctx.lock());
    }

    #[tokio::test]
    async fn stale_events_are_ignored() {
        let ctx = LinkContext::new(LinkConfig::default());
        ctx.lock().generation = 2;

        let stale = event_handler(ctx.clone(), 1);
        stale(TransportEvent::Message("{}".into()));
        stale(TransportEvent::Closed);

        assert!(ctx.state.last_message().is_none());
        assert!(ctx.lock().retry.is_none());
    }

    #[tokio::test]
    async fn close_event_schedules_one_retry() {
        let ctx = LinkContext::new(LinkConfig::default());
        ctx.state.mark_open();
        ctx.lock().generation = 1;

        let handler = event_handler(ctx.clone(), 1);
        handler(TransportEvent::Closed);

        assert_eq!(ctx.state.status(), ConnectionStatus::Disconnected);
        assert!(!ctx.state.is_connected());
        let first = ctx.lock().retry.clone().expect("retry scheduled");

        handler(TransportEvent::Closed);
        assert!(first.is_cancelled(), "a second close replaces the timer");
        assert!(ctx.lock().retry.is_some());

        halt(&mut ctx.lock());
    }
}
