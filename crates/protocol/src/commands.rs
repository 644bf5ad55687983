//! Program commands relayed by the backend to the bioreactor controller.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Parameters of a fermentation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FermentationParams {
    pub temperature: f64,
    #[serde(rename = "pH")]
    pub ph: f64,
    pub dissolved_oxygen: f64,
    pub nutrient_concentration: f64,
    pub base_concentration: f64,
    pub duration: i32,
    pub nutrient_delay: f64,
    pub experiment_name: String,
    #[serde(default)]
    pub comment: String,
}

/// A program command, tagged on the wire by its `program` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "program", rename_all = "lowercase")]
pub enum ProgramCommand {
    Mix { speed: i32 },
    Drain { rate: i32, duration: i32 },
    Fermentation(FermentationParams),
    Stop,
}

impl ProgramCommand {
    /// Wire name of the program.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Mix { .. } => "mix",
            Self::Drain { .. } => "drain",
            Self::Fermentation(_) => "fermentation",
            Self::Stop => "stop",
        }
    }
}

/// Parses the short textual form: `mix <speed>`, `drain <rate> <duration>`
/// or `stop`. Fermentation runs carry too many parameters and are only
/// accepted as JSON.
impl FromStr for ProgramCommand {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let Some(program) = parts.next() else {
            return Err(ProtocolError::InvalidCommand("empty command".into()));
        };
        let args: Vec<&str> = parts.collect();

        match (program.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("mix", [speed]) => Ok(Self::Mix {
                speed: parse_int("speed", speed)?,
            }),
            ("drain", [rate, duration]) => Ok(Self::Drain {
                rate: parse_int("rate", rate)?,
                duration: parse_int("duration", duration)?,
            }),
            ("stop", []) => Ok(Self::Stop),
            ("fermentation", _) => Err(ProtocolError::InvalidCommand(
                "fermentation parameters must be sent as JSON".into(),
            )),
            ("mix" | "drain" | "stop", _) => Err(ProtocolError::InvalidCommand(format!(
                "wrong number of arguments for {program}"
            ))),
            _ => Err(ProtocolError::InvalidCommand(format!(
                "unknown program: {program}"
            ))),
        }
    }
}

fn parse_int(name: &str, value: &str) -> Result<i32, ProtocolError> {
    value
        .parse()
        .map_err(|_| ProtocolError::InvalidCommand(format!("{name} must be an integer, got {value}")))
}
