//! Actuator actions
//!
//! Actions are executed strictly in order by the rule engine and program
//! scheduler. Blocking semantics (pump, wait) are implemented by the
//! executors; the types here only carry the parameters.

use crate::model::ids::DeviceId;
use crate::model::sensor::SensorType;
use serde::{Deserialize, Serialize};

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

fn default_flow_rate() -> u32 {
    100
}

fn default_reading_sensors() -> Vec<SensorType> {
    vec![SensorType::Ph, SensorType::Tds, SensorType::Temperature]
}

/// A single step in an action sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Run a dosing pump for a fixed duration. The executor publishes the
    /// command and then blocks for `duration_ms` before the next action.
    Pump {
        device_id: DeviceId,
        pump_id: String,
        duration_ms: u64,
        /// Flow rate as percent of the pump's maximum
        #[serde(default = "default_flow_rate")]
        flow_rate: u32,
    },
    /// Sleep before the next action
    Wait { duration_ms: u64 },
    /// Emit a notification event without blocking
    Notification { message: String, severity: Severity },
    /// Request a fresh telemetry read without blocking
    SensorReading {
        device_id: DeviceId,
        #[serde(default = "default_reading_sensors")]
        sensor_types: Vec<SensorType>,
    },
}

impl Action {
    /// Structural validation of a single action
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Action::Pump {
                pump_id,
                duration_ms,
                flow_rate,
                ..
            } => {
                if pump_id.is_empty() {
                    return Err("pump action requires a pump_id".to_string());
                }
                if *duration_ms == 0 {
                    return Err("pump duration_ms must be > 0".to_string());
                }
                if *flow_rate == 0 || *flow_rate > 100 {
                    return Err(format!("pump flow_rate must be 1-100, got {flow_rate}"));
                }
                Ok(())
            }
            Action::Wait { duration_ms } => {
                if *duration_ms == 0 {
                    return Err("wait duration_ms must be > 0".to_string());
                }
                Ok(())
            }
            Action::Notification { message, .. } => {
                if message.is_empty() {
                    return Err("notification requires a message".to_string());
                }
                Ok(())
            }
            Action::SensorReading { sensor_types, .. } => {
                if sensor_types.is_empty() {
                    return Err("sensor_reading requires at least one sensor type".to_string());
                }
                Ok(())
            }
        }
    }
}
