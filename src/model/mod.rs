//! Domain types for rules, programs, commands, and telemetry

pub mod action;
pub mod command;
pub mod condition;
pub mod execution;
pub mod ids;
pub mod program;
pub mod rule;
pub mod sensor;

pub use action::{Action, Severity};
pub use command::{Command, CommandMetadata, CommandStatus};
pub use condition::{ComparisonOp, CompoundOp, Condition, DeviceStatus, EqualityOp};
pub use execution::{ExecutionRecord, ExecutionStatus, ExecutionSubject};
pub use ids::{CommandId, DeviceId, ProgramId, RuleId};
pub use program::{Program, ProgramStats, Schedule};
pub use rule::Rule;
pub use sensor::{classify, SensorHealth, SensorReading, SensorType};
