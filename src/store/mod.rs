//! Persistence boundary
//!
//! The engine consumes these traits and never sees a concrete database. The
//! in-memory implementations in `memory` back the binary today and every
//! test; a future database adapter implements the same traits.

use crate::error::EngineResult;
use crate::model::condition::DeviceStatus;
use crate::model::execution::ExecutionRecord;
use crate::model::ids::{DeviceId, ProgramId, RuleId};
use crate::model::program::Program;
use crate::model::rule::Rule;
use crate::model::sensor::{SensorReading, SensorType};
use chrono::{DateTime, Utc};

pub mod memory;

pub use memory::{
    MemoryDeviceStore, MemoryExecutionLog, MemoryProgramStore, MemoryRuleStore, MemorySensorStore,
};

/// Rule persistence. `list` returns rules in insertion order; the rule
/// engine relies on that for deterministic evaluation.
#[async_trait::async_trait]
pub trait RuleStore: Send + Sync {
    async fn list(&self) -> EngineResult<Vec<Rule>>;
    async fn get(&self, id: &RuleId) -> EngineResult<Option<Rule>>;
    async fn insert(&self, rule: Rule) -> EngineResult<()>;
    /// Replace an existing rule; `NotFound` when the id is unknown
    async fn update(&self, rule: Rule) -> EngineResult<()>;
    async fn delete(&self, id: &RuleId) -> EngineResult<()>;
}

/// Program persistence
#[async_trait::async_trait]
pub trait ProgramStore: Send + Sync {
    async fn list(&self) -> EngineResult<Vec<Program>>;
    async fn get(&self, id: &ProgramId) -> EngineResult<Option<Program>>;
    async fn insert(&self, program: Program) -> EngineResult<()>;
    async fn update(&self, program: Program) -> EngineResult<()>;
    async fn delete(&self, id: &ProgramId) -> EngineResult<()>;
}

/// Latest-reading lookup per device and channel
#[async_trait::async_trait]
pub trait SensorStore: Send + Sync {
    async fn record(&self, reading: SensorReading) -> EngineResult<()>;
    async fn latest(
        &self,
        device_id: &DeviceId,
        sensor_type: SensorType,
    ) -> EngineResult<Option<SensorReading>>;
}

/// Device connectivity state
#[async_trait::async_trait]
pub trait DeviceStore: Send + Sync {
    async fn set_status(&self, device_id: &DeviceId, status: DeviceStatus) -> EngineResult<()>;
    /// A heartbeat marks the device online and refreshes its last-seen time
    async fn record_heartbeat(
        &self,
        device_id: &DeviceId,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<()>;
    async fn status(&self, device_id: &DeviceId) -> EngineResult<Option<DeviceStatus>>;
}

/// Append-only log of rule and program executions
#[async_trait::async_trait]
pub trait ExecutionLog: Send + Sync {
    async fn append(&self, record: ExecutionRecord) -> EngineResult<()>;
    /// Most recent records, newest first
    async fn recent(&self, limit: usize) -> EngineResult<Vec<ExecutionRecord>>;
}
