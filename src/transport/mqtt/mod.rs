//! MQTT implementation of the transport layer

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, ConnectionState, ReconnectConfig};
pub use message_handler::{EventForwarder, EventRoute, MessageHandler};
