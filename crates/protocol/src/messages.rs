use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of peer announced to the backend.
///
/// The backend keeps one slot per kind and relays frontend traffic to the
/// controller slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientType {
    /// Operator UI or monitor.
    #[default]
    Frontend,
    /// Bioreactor controller board.
    #[serde(rename = "ESP32")]
    Esp32,
}

impl ClientType {
    /// Wire name of this client kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Frontend => "Frontend",
            Self::Esp32 => "ESP32",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identification sent once, immediately after the socket opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdentification {
    pub client_type: ClientType,
}

impl ClientIdentification {
    pub fn new(client_type: ClientType) -> Self {
        Self { client_type }
    }
}

impl Default for ClientIdentification {
    fn default() -> Self {
        Self::new(ClientType::Frontend)
    }
}
