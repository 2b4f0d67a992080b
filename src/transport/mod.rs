//! Transport layer for device communication
//!
//! This module provides the transport abstraction and the MQTT
//! implementation used to reach devices. The engine only sees the
//! `Transport` trait, which keeps it testable with an in-memory double.

use crate::model::condition::DeviceStatus;
use crate::model::ids::DeviceId;
use crate::model::sensor::SensorReading;
use crate::protocol::CommandPayload;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub mod mqtt;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Serialization error")]
    Serialization(#[source] serde_json::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected")]
    NotConnected,
}

/// Typed events decoded from inbound device traffic
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    SensorData(SensorReading),
    CommandResponse {
        device_id: DeviceId,
        command_type: String,
        status: String,
        message: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Heartbeat {
        device_id: DeviceId,
        timestamp: DateTime<Utc>,
    },
    DeviceStatus {
        device_id: DeviceId,
        status: DeviceStatus,
    },
    DeviceLog {
        device_id: DeviceId,
        message: String,
    },
}

/// Transport trait for device communication
///
/// Object-safe so the engine can hold `Arc<dyn Transport>` and tests can
/// inject a mock. Connection management stays on the concrete client; by the
/// time the engine sees a transport it is already connected.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Publish a command to a device's command topic at QoS 1.
    ///
    /// Failures surface to the caller; the transport never retries a publish
    /// on its own.
    async fn publish_command(
        &self,
        device_id: &DeviceId,
        payload: &CommandPayload,
    ) -> Result<(), TransportError>;

    /// Whether the underlying connection is currently up
    fn is_connected(&self) -> bool;
}
