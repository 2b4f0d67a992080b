//! Wire payloads
//!
//! Commands go out as JSON. Telemetry comes back as JSON from current
//! firmware, or as a bare numeric string from legacy firmware that predates
//! the JSON envelope; both forms must parse.

use crate::model::command::Command;
use crate::model::ids::DeviceId;
use crate::model::sensor::{SensorReading, SensorType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound command envelope published on `.../commands`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandPayload {
    pub command_id: String,
    #[serde(rename = "type")]
    pub command_type: String,
    pub params: Value,
    pub timestamp: DateTime<Utc>,
}

impl CommandPayload {
    pub fn from_command(command: &Command) -> Self {
        Self {
            command_id: command.command_id.to_string(),
            command_type: command.command_type.clone(),
            params: command.params.clone(),
            timestamp: command.created_at,
        }
    }
}

/// Inbound acknowledgment payload from `.../commands/response`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResponsePayload {
    #[serde(rename = "type")]
    pub command_type: String,
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// JSON form of a sensor reading
#[derive(Debug, Clone, Deserialize)]
struct SensorPayload {
    value: f64,
    #[serde(default)]
    raw: Option<f64>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Parse a sensor payload: JSON envelope preferred, bare numeric fallback.
///
/// `received_at` fills in for payloads without a timestamp.
pub fn parse_sensor_payload(
    device_id: DeviceId,
    sensor_type: SensorType,
    payload: &[u8],
    received_at: DateTime<Utc>,
) -> Option<SensorReading> {
    if let Ok(parsed) = serde_json::from_slice::<SensorPayload>(payload) {
        return Some(SensorReading {
            device_id,
            sensor_type,
            value: parsed.value,
            raw: parsed.raw,
            timestamp: parsed.timestamp.unwrap_or(received_at),
        });
    }
    let text = std::str::from_utf8(payload).ok()?;
    let value: f64 = text.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(SensorReading {
        device_id,
        sensor_type,
        value,
        raw: None,
        timestamp: received_at,
    })
}
