//! Sensor readings and health classification

use crate::model::ids::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor channels the firmware publishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Ph,
    Tds,
    Temperature,
    Humidity,
    WaterLevel,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Ph => "ph",
            SensorType::Tds => "tds",
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::WaterLevel => "water_level",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ph" => Some(SensorType::Ph),
            "tds" => Some(SensorType::Tds),
            "temperature" => Some(SensorType::Temperature),
            "humidity" => Some(SensorType::Humidity),
            "water_level" => Some(SensorType::WaterLevel),
            _ => None,
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single calibrated reading from one sensor channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub device_id: DeviceId,
    pub sensor_type: SensorType,
    /// Calibrated value in the channel's natural unit
    pub value: f64,
    /// Raw ADC value when the firmware reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    /// Whether the reading is older than `max_age_secs` at `now`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age_secs: u64) -> bool {
        now.signed_duration_since(self.timestamp)
            .num_seconds()
            .max(0) as u64
            > max_age_secs
    }
}

/// Health bucket for a reading relative to the channel's reference ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorHealth {
    Optimal,
    Warning,
    Critical,
    /// No reference ranges exist for this channel
    Unknown,
}

struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

fn reference_ranges(sensor_type: SensorType) -> Option<(Range, Range)> {
    match sensor_type {
        SensorType::Ph => Some((
            Range { min: 5.5, max: 6.5 },
            Range { min: 5.0, max: 7.0 },
        )),
        SensorType::Tds => Some((
            Range {
                min: 800.0,
                max: 1500.0,
            },
            Range {
                min: 600.0,
                max: 2000.0,
            },
        )),
        _ => None,
    }
}

/// Classify a value against the channel's optimal/warning ranges.
///
/// Inside the optimal range → `Optimal`, inside the wider warning range →
/// `Warning`, outside both → `Critical`. Channels without reference ranges
/// classify as `Unknown`.
pub fn classify(sensor_type: SensorType, value: f64) -> SensorHealth {
    let Some((optimal, warning)) = reference_ranges(sensor_type) else {
        return SensorHealth::Unknown;
    };
    if optimal.contains(value) {
        SensorHealth::Optimal
    } else if warning.contains(value) {
        SensorHealth::Warning
    } else {
        SensorHealth::Critical
    }
}
