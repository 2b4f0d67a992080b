//! Trigger conditions
//!
//! Conditions are pure data; evaluation lives in `engine::evaluator`. The
//! serialized form uses a `type` tag so stored rules stay readable.

use crate::model::ids::DeviceId;
use crate::model::sensor::SensorType;
use serde::{Deserialize, Serialize};

/// Comparison operator for sensor thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
}

impl ComparisonOp {
    /// Apply the operator. Equality uses a 0.01 epsilon because sensor values
    /// pass through float calibration on the firmware.
    pub fn compare(&self, actual: f64, expected: f64) -> bool {
        match self {
            ComparisonOp::Gt => actual > expected,
            ComparisonOp::Lt => actual < expected,
            ComparisonOp::Gte => actual >= expected,
            ComparisonOp::Lte => actual <= expected,
            ComparisonOp::Eq => (actual - expected).abs() < 0.01,
            ComparisonOp::Neq => (actual - expected).abs() >= 0.01,
        }
    }
}

/// Equality operator for device-status conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EqualityOp {
    Eq,
    Ne,
}

/// Reported device connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

/// Boolean combinator for compound conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompoundOp {
    And,
    Or,
    Not,
}

/// A single trigger condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Latest reading of one sensor channel compared against a threshold
    SensorThreshold {
        device_id: DeviceId,
        sensor_type: SensorType,
        operator: ComparisonOp,
        value: f64,
    },
    /// Current time-of-day inside an inclusive `HH:MM` window
    TimeWindow { start: String, end: String },
    /// Device connectivity compared against an expected state
    DeviceStatus {
        device_id: DeviceId,
        operator: EqualityOp,
        status: DeviceStatus,
    },
    /// Boolean combination of nested conditions
    Compound {
        operator: CompoundOp,
        conditions: Vec<Condition>,
    },
}

/// Parse an `HH:MM` time-of-day into minutes since midnight
pub fn parse_minute_of_day(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    let hours: u32 = h.parse().ok()?;
    let minutes: u32 = m.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

impl Condition {
    /// Structural validation. `not` must have exactly one operand, compound
    /// operand lists must be non-empty, and time windows must parse.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Condition::SensorThreshold { value, .. } => {
                if !value.is_finite() {
                    return Err("sensor threshold value must be finite".to_string());
                }
                Ok(())
            }
            Condition::TimeWindow { start, end } => {
                if parse_minute_of_day(start).is_none() {
                    return Err(format!("invalid time window start: {start}"));
                }
                if parse_minute_of_day(end).is_none() {
                    return Err(format!("invalid time window end: {end}"));
                }
                Ok(())
            }
            Condition::DeviceStatus { .. } => Ok(()),
            Condition::Compound {
                operator,
                conditions,
            } => {
                if conditions.is_empty() {
                    return Err("compound condition requires at least one operand".to_string());
                }
                if *operator == CompoundOp::Not && conditions.len() != 1 {
                    return Err(format!(
                        "'not' takes exactly one operand, got {}",
                        conditions.len()
                    ));
                }
                for condition in conditions {
                    condition.validate()?;
                }
                Ok(())
            }
        }
    }
}
