//! Pure message routing and decoding for MQTT events
//!
//! Routing decisions and payload decoding are pure functions over the topic
//! grammar; the impure forwarding to the engine lives in `EventForwarder`.

use crate::model::condition::DeviceStatus;
use crate::model::sensor::SensorType;
use crate::protocol::{parse_sensor_payload, ParsedTopic, ResponsePayload, TopicGrammar};
use crate::transport::TransportEvent;
use chrono::{DateTime, Utc};
use rumqttc::v5::Event;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Routing decisions for MQTT events
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// Connection acknowledged, (re)subscribe and resume publishing
    ConnectionAcknowledged,
    /// Message received on a subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker-initiated disconnect
    Disconnected,
    /// Infrastructure event (SubAck, PingResp, ...)
    InfrastructureEvent,
    /// Outgoing event, handled by rumqttc
    OutgoingEvent,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
}

#[derive(Debug, Deserialize)]
struct HeartbeatPayload {
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Pure routing and decoding over MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route a rumqttc event to a handling decision (pure function)
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => {
                use rumqttc::v5::mqttbytes::v5::Packet;
                match incoming {
                    Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                    Packet::Publish(publish) => EventRoute::MessageReceived {
                        topic: String::from_utf8_lossy(&publish.topic).to_string(),
                        payload: publish.payload.to_vec(),
                    },
                    Packet::Disconnect(_) => EventRoute::Disconnected,
                    _ => EventRoute::InfrastructureEvent,
                }
            }
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Decode an inbound message into a typed event (pure function).
    ///
    /// Returns `None` for topics outside the grammar and payloads that fail
    /// to parse; both are logged and dropped, never errors.
    pub fn decode_message(
        grammar: &TopicGrammar,
        topic: &str,
        payload: &[u8],
        received_at: DateTime<Utc>,
    ) -> Option<TransportEvent> {
        let parsed = match grammar.parse(topic) {
            Some(parsed) => parsed,
            None => {
                debug!(topic, "Ignoring message outside topic grammar");
                return None;
            }
        };

        match parsed {
            ParsedTopic::Sensor {
                device_id,
                sensor_type,
            } => {
                let Some(sensor_type) = SensorType::parse(&sensor_type) else {
                    debug!(topic, sensor_type, "Ignoring unknown sensor channel");
                    return None;
                };
                match parse_sensor_payload(device_id, sensor_type, payload, received_at) {
                    Some(reading) => Some(TransportEvent::SensorData(reading)),
                    None => {
                        warn!(topic, "Dropping unparseable sensor payload");
                        None
                    }
                }
            }
            ParsedTopic::CommandResponse { device_id } => {
                match serde_json::from_slice::<ResponsePayload>(payload) {
                    Ok(response) => Some(TransportEvent::CommandResponse {
                        device_id,
                        command_type: response.command_type,
                        status: response.status,
                        message: response.message,
                        timestamp: response.timestamp.unwrap_or(received_at),
                    }),
                    Err(e) => {
                        warn!(topic, error = %e, "Dropping unparseable command response");
                        None
                    }
                }
            }
            ParsedTopic::Heartbeat { device_id } => {
                let timestamp = serde_json::from_slice::<HeartbeatPayload>(payload)
                    .ok()
                    .and_then(|p| p.timestamp)
                    .unwrap_or(received_at);
                Some(TransportEvent::Heartbeat {
                    device_id,
                    timestamp,
                })
            }
            ParsedTopic::Status { device_id } => {
                Self::decode_status(payload).map(|status| TransportEvent::DeviceStatus {
                    device_id,
                    status,
                })
            }
            ParsedTopic::Log { device_id } => Some(TransportEvent::DeviceLog {
                device_id,
                message: String::from_utf8_lossy(payload).to_string(),
            }),
        }
    }

    /// Status arrives either as JSON `{"status": "online"}` or a bare string
    fn decode_status(payload: &[u8]) -> Option<DeviceStatus> {
        let text = serde_json::from_slice::<StatusPayload>(payload)
            .map(|p| p.status)
            .unwrap_or_else(|_| String::from_utf8_lossy(payload).trim().to_string());
        match text.as_str() {
            "online" => Some(DeviceStatus::Online),
            "offline" => Some(DeviceStatus::Offline),
            other => {
                warn!(status = other, "Dropping unknown device status");
                None
            }
        }
    }
}

/// Forwards decoded events to the engine (impure I/O)
pub struct EventForwarder {
    event_sender: Option<mpsc::Sender<TransportEvent>>,
}

impl EventForwarder {
    pub fn new() -> Self {
        Self { event_sender: None }
    }

    pub fn set_event_sender(&mut self, sender: mpsc::Sender<TransportEvent>) {
        self.event_sender = Some(sender);
    }

    /// Forward a decoded event to the engine. Dropped with a warning when no
    /// sender is configured or the engine has shut down.
    pub async fn forward(&self, event: TransportEvent) {
        match &self.event_sender {
            Some(sender) => {
                if sender.send(event).await.is_err() {
                    warn!("Event channel closed - dropping transport event");
                }
            }
            None => {
                warn!("Received device message but no event sender configured - dropped");
            }
        }
    }
}

impl Default for EventForwarder {
    fn default() -> Self {
        Self::new()
    }
}
