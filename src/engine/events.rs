//! Engine events
//!
//! Everything noteworthy the engine does is announced on an mpsc channel and
//! consumed by a single dispatch loop. Consumers that fall behind cause
//! back-pressure on the emitter, not dropped events.

use crate::model::action::Severity;
use crate::model::ids::{ProgramId, RuleId};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RuleTriggered {
        rule_id: RuleId,
        rule_name: String,
    },
    RuleError {
        rule_id: RuleId,
        rule_name: String,
        error: String,
    },
    ProgramStarted {
        program_id: ProgramId,
        program_name: String,
    },
    ProgramCompleted {
        program_id: ProgramId,
        program_name: String,
        duration_ms: u64,
    },
    ProgramFailed {
        program_id: ProgramId,
        program_name: String,
        error: String,
    },
    ProgramStopped {
        program_id: ProgramId,
    },
    Notification {
        message: String,
        severity: Severity,
    },
}

pub fn event_channel() -> (mpsc::Sender<EngineEvent>, mpsc::Receiver<EngineEvent>) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

/// Consume engine events and log them until the channel closes
pub async fn run_event_logger(mut receiver: mpsc::Receiver<EngineEvent>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            EngineEvent::RuleTriggered { rule_id, rule_name } => {
                info!(rule_id = %rule_id, rule_name, "Rule triggered");
            }
            EngineEvent::RuleError {
                rule_id,
                rule_name,
                error: message,
            } => {
                error!(rule_id = %rule_id, rule_name, error = message, "Rule execution failed");
            }
            EngineEvent::ProgramStarted {
                program_id,
                program_name,
            } => {
                info!(program_id = %program_id, program_name, "Program started");
            }
            EngineEvent::ProgramCompleted {
                program_id,
                program_name,
                duration_ms,
            } => {
                info!(
                    program_id = %program_id,
                    program_name,
                    duration_ms,
                    "Program completed"
                );
            }
            EngineEvent::ProgramFailed {
                program_id,
                program_name,
                error: message,
            } => {
                error!(
                    program_id = %program_id,
                    program_name,
                    error = message,
                    "Program failed"
                );
            }
            EngineEvent::ProgramStopped { program_id } => {
                info!(program_id = %program_id, "Program stopped");
            }
            EngineEvent::Notification { message, severity } => match severity {
                Severity::Info => info!(message, "Notification"),
                Severity::Warning => warn!(message, "Notification"),
                Severity::Critical => error!(message, "Notification"),
            },
        }
    }
}
