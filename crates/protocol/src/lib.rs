//! Wire types for the bioreactor frontend link.
//!
//! Covers the identification payload a client sends right after connecting,
//! best-effort decoding of inbound payloads, and the program commands the
//! backend relays to the bioreactor controller.

pub mod commands;
pub mod error;
pub mod inbound;
pub mod messages;

pub use commands::{FermentationParams, ProgramCommand};
pub use error::ProtocolError;
pub use inbound::{InboundKind, InboundPayload};
pub use messages::{ClientIdentification, ClientType};
