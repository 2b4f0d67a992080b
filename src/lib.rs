//! homegrowd - MQTT-driven hydroponics automation engine
//!
//! # Overview
//!
//! This crate provides the automation core of a hydroponics controller:
//! - Rule engine: reactive conditions over live telemetry, cooldown-guarded
//! - Program scheduler: interval/cron/sensor-triggered action sequences
//! - Command dispatcher: tracked device commands with timeout and retry
//! - MQTT transport with automatic reconnection
//!
//! # Quick Start
//!
//! ```rust
//! use homegrowd::model::{Action, ComparisonOp, Condition, DeviceId, Rule, SensorType, Severity};
//!
//! // Dose pH-down whenever pH drifts above 6.5, at most once per half hour
//! let mut rule = Rule::new(
//!     "ph guard",
//!     vec![Condition::SensorThreshold {
//!         device_id: DeviceId::new("esp32-a1"),
//!         sensor_type: SensorType::Ph,
//!         operator: ComparisonOp::Gt,
//!         value: 6.5,
//!     }],
//!     vec![Action::Pump {
//!         device_id: DeviceId::new("esp32-a1"),
//!         pump_id: "ph_down".to_string(),
//!         duration_ms: 2000,
//!         flow_rate: 100,
//!     }],
//! );
//! rule.cooldown_seconds = 1800;
//! assert!(rule.validate().is_ok());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod observability;
pub mod protocol;
pub mod store;
pub mod testing;
pub mod transport;

pub use config::EngineConfig;
pub use engine::{AutomationEngine, EngineEvent, EngineStatus};
pub use error::{EngineError, EngineResult};
pub use transport::mqtt::MqttClient;
