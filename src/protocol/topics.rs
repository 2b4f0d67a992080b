//! MQTT topic grammar
//!
//! All device traffic lives under `{prefix}/{device_id}/...`:
//!
//! ```text
//! {prefix}/{device_id}/sensors/{sensor_type}   <- telemetry
//! {prefix}/{device_id}/heartbeat               <- liveness
//! {prefix}/{device_id}/status                  <- connectivity (retained by firmware)
//! {prefix}/{device_id}/commands                -> actuator commands
//! {prefix}/{device_id}/commands/response       <- acknowledgments
//! {prefix}/{device_id}/logs                    <- device log lines
//! ```
//!
//! Building and parsing are pure functions over the configured prefix.

use crate::model::ids::DeviceId;

/// Builds and parses topics under one prefix
#[derive(Debug, Clone)]
pub struct TopicGrammar {
    prefix: String,
}

/// A successfully parsed inbound topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedTopic {
    Sensor {
        device_id: DeviceId,
        sensor_type: String,
    },
    Heartbeat {
        device_id: DeviceId,
    },
    Status {
        device_id: DeviceId,
    },
    CommandResponse {
        device_id: DeviceId,
    },
    Log {
        device_id: DeviceId,
    },
}

impl TopicGrammar {
    /// `prefix` must be a literal topic path without wildcards and without a
    /// trailing slash (enforced at config validation).
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Topic commands to `device_id` are published on
    pub fn command_topic(&self, device_id: &DeviceId) -> String {
        format!("{}/{}/commands", self.prefix, device_id)
    }

    /// Wildcard filters covering all inbound device traffic
    pub fn subscription_filters(&self) -> Vec<String> {
        vec![
            format!("{}/+/sensors/+", self.prefix),
            format!("{}/+/heartbeat", self.prefix),
            format!("{}/+/status", self.prefix),
            format!("{}/+/commands/response", self.prefix),
            format!("{}/+/logs", self.prefix),
        ]
    }

    /// Parse an inbound topic. Returns `None` for topics outside the grammar,
    /// including the outbound `commands` topic itself.
    pub fn parse(&self, topic: &str) -> Option<ParsedTopic> {
        let rest = topic.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        let mut segments = rest.split('/');
        let device = segments.next().filter(|s| !s.is_empty())?;
        let device_id = DeviceId::new(device);
        let channel = segments.next()?;
        match (channel, segments.next(), segments.next()) {
            ("sensors", Some(sensor_type), None) if !sensor_type.is_empty() => {
                Some(ParsedTopic::Sensor {
                    device_id,
                    sensor_type: sensor_type.to_string(),
                })
            }
            ("heartbeat", None, None) => Some(ParsedTopic::Heartbeat { device_id }),
            ("status", None, None) => Some(ParsedTopic::Status { device_id }),
            ("commands", Some("response"), None) => {
                Some(ParsedTopic::CommandResponse { device_id })
            }
            ("logs", None, None) => Some(ParsedTopic::Log { device_id }),
            _ => None,
        }
    }
}
