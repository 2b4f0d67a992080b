//! Action execution
//!
//! One executor shared by the rule engine and the program scheduler. Pump
//! and wait actions block the calling sequence; notification and sensor
//! reading return immediately. Each successful action yields a trace line
//! for the execution record.

use crate::engine::dispatcher::CommandDispatcher;
use crate::engine::events::EngineEvent;
use crate::error::{EngineError, EngineResult};
use crate::model::action::Action;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

pub struct ActionExecutor {
    dispatcher: Arc<CommandDispatcher>,
    events: mpsc::Sender<EngineEvent>,
}

impl ActionExecutor {
    pub fn new(dispatcher: Arc<CommandDispatcher>, events: mpsc::Sender<EngineEvent>) -> Self {
        Self { dispatcher, events }
    }

    /// Execute one action to completion. Returns a trace line describing
    /// what happened.
    pub async fn execute(&self, action: &Action) -> EngineResult<String> {
        match action {
            Action::Pump {
                device_id,
                pump_id,
                duration_ms,
                flow_rate,
            } => {
                let command = self
                    .dispatcher
                    .dispatch(
                        device_id.clone(),
                        "pump",
                        json!({
                            "pump_id": pump_id,
                            "duration_ms": duration_ms,
                            "flow_rate": flow_rate,
                        }),
                    )
                    .await?;
                // The sequence holds for the pump's runtime; the device ack
                // is tracked separately by the dispatcher
                debug!(command_id = %command.command_id, duration_ms, "Pump running");
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                Ok(format!(
                    "pump {pump_id} on {device_id} for {duration_ms}ms at {flow_rate}%"
                ))
            }
            Action::Wait { duration_ms } => {
                tokio::time::sleep(Duration::from_millis(*duration_ms)).await;
                Ok(format!("waited {duration_ms}ms"))
            }
            Action::Notification { message, severity } => {
                self.events
                    .send(EngineEvent::Notification {
                        message: message.clone(),
                        severity: *severity,
                    })
                    .await
                    .map_err(|_| EngineError::internal("event channel closed"))?;
                Ok(format!("notified: {message}"))
            }
            Action::SensorReading {
                device_id,
                sensor_types,
            } => {
                self.dispatcher
                    .dispatch(
                        device_id.clone(),
                        "read_sensor",
                        json!({ "sensors": sensor_types }),
                    )
                    .await?;
                Ok(format!(
                    "requested {} sensor readings from {device_id}",
                    sensor_types.len()
                ))
            }
        }
    }
}
