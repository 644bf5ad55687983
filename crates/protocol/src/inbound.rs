//! Best-effort decoding of inbound payloads.
//!
//! Nothing here validates a schema. A payload is either JSON or it is kept
//! verbatim; [`classify`] only recognises a few shapes the backend is known
//! to forward so callers can pick a diagnostic.

use std::fmt;

use serde_json::Value;

use crate::error::ProtocolError;

/// `status` value the backend reports when a device drops.
pub const DEVICE_DISCONNECTED_STATUS: &str = "disconnected";

/// `type` value identifying the controller board.
pub const DEVICE_TYPE_ESP32: &str = "ESP32";

/// The most recently received payload.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    /// Payload decoded as JSON.
    Json(Value),
    /// Payload that failed to decode, kept unmodified.
    Raw(String),
}

impl InboundPayload {
    /// Returns the decoded value, if the payload was JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Raw(_) => None,
        }
    }

    /// Returns the raw text, if the payload failed to decode.
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Raw(s) => Some(s),
        }
    }

    /// Shape of a decoded payload. `None` for raw payloads.
    pub fn kind(&self) -> Option<InboundKind> {
        self.as_json().map(classify)
    }
}

impl fmt::Display for InboundPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(v) => write!(f, "{v}"),
            Self::Raw(s) => f.write_str(s),
        }
    }
}

/// Known payload shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// `{"status":"disconnected","type":"ESP32"}`.
    DeviceDisconnected,
    /// Periodic controller report carrying `sensorData`.
    SensorSnapshot,
    /// Controller report about a program (carries `program`).
    ProgramEvent,
    /// Anything else.
    Other,
}

/// Decodes a text payload as JSON.
pub fn decode(text: &str) -> Result<Value, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Classifies a decoded payload.
pub fn classify(value: &Value) -> InboundKind {
    let Some(obj) = value.as_object() else {
        return InboundKind::Other;
    };

    let status = obj.get("status").and_then(Value::as_str);
    let device = obj.get("type").and_then(Value::as_str);
    if status == Some(DEVICE_DISCONNECTED_STATUS) && device == Some(DEVICE_TYPE_ESP32) {
        return InboundKind::DeviceDisconnected;
    }

    if obj.contains_key("sensorData") {
        InboundKind::SensorSnapshot
    } else if obj.contains_key("program") {
        InboundKind::ProgramEvent
    } else {
        InboundKind::Other
    }
}
