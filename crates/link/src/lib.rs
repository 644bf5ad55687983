//! Reconnecting WebSocket link to the bioreactor backend.
//!
//! Provides the WebSocket client, the connection manager with its
//! observable state, and the fixed-delay reconnect logic.

pub mod manager;
mod pumps;
pub(crate) mod reconnection;
pub mod state;
pub mod types;
pub mod ws_client;

pub use bioreactor_protocol::InboundPayload;
pub use manager::ConnectionManager;
pub use state::LinkObservers;
pub use types::{ConnectionStatus, DEFAULT_RECONNECT_DELAY, DEFAULT_URL, LinkConfig};
pub use ws_client::{TransportEvent, WsClient, WsError};
