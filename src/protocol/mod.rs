//! Topic grammar and wire payloads shared by the transport and the engine

pub mod messages;
pub mod topics;

pub use messages::{parse_sensor_payload, CommandPayload, ResponsePayload};
pub use topics::{ParsedTopic, TopicGrammar};
