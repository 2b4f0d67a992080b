//! In-memory store implementations
//!
//! `RwLock`-guarded collections. Rules and programs keep insertion order in a
//! `Vec`; sensor and device lookups use maps keyed by id.

use crate::error::{EngineError, EngineResult};
use crate::model::condition::DeviceStatus;
use crate::model::execution::ExecutionRecord;
use crate::model::ids::{DeviceId, ProgramId, RuleId};
use crate::model::program::Program;
use crate::model::rule::Rule;
use crate::model::sensor::{SensorReading, SensorType};
use crate::store::{DeviceStore, ExecutionLog, ProgramStore, RuleStore, SensorStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Insertion-ordered rule store
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<Rule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list(&self) -> EngineResult<Vec<Rule>> {
        Ok(self.rules.read().await.clone())
    }

    async fn get(&self, id: &RuleId) -> EngineResult<Option<Rule>> {
        Ok(self.rules.read().await.iter().find(|r| &r.id == id).cloned())
    }

    async fn insert(&self, rule: Rule) -> EngineResult<()> {
        let mut rules = self.rules.write().await;
        if rules.iter().any(|r| r.id == rule.id) {
            return Err(EngineError::validation(format!(
                "rule {} already exists",
                rule.id
            )));
        }
        rules.push(rule);
        Ok(())
    }

    async fn update(&self, rule: Rule) -> EngineResult<()> {
        let mut rules = self.rules.write().await;
        match rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => {
                *existing = rule;
                Ok(())
            }
            None => Err(EngineError::not_found("rule", rule.id.to_string())),
        }
    }

    async fn delete(&self, id: &RuleId) -> EngineResult<()> {
        let mut rules = self.rules.write().await;
        let before = rules.len();
        rules.retain(|r| &r.id != id);
        if rules.len() == before {
            return Err(EngineError::not_found("rule", id.to_string()));
        }
        Ok(())
    }
}

/// Insertion-ordered program store
#[derive(Default)]
pub struct MemoryProgramStore {
    programs: RwLock<Vec<Program>>,
}

impl MemoryProgramStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProgramStore for MemoryProgramStore {
    async fn list(&self) -> EngineResult<Vec<Program>> {
        Ok(self.programs.read().await.clone())
    }

    async fn get(&self, id: &ProgramId) -> EngineResult<Option<Program>> {
        Ok(self
            .programs
            .read()
            .await
            .iter()
            .find(|p| &p.id == id)
            .cloned())
    }

    async fn insert(&self, program: Program) -> EngineResult<()> {
        let mut programs = self.programs.write().await;
        if programs.iter().any(|p| p.id == program.id) {
            return Err(EngineError::validation(format!(
                "program {} already exists",
                program.id
            )));
        }
        programs.push(program);
        Ok(())
    }

    async fn update(&self, program: Program) -> EngineResult<()> {
        let mut programs = self.programs.write().await;
        match programs.iter_mut().find(|p| p.id == program.id) {
            Some(existing) => {
                *existing = program;
                Ok(())
            }
            None => Err(EngineError::not_found("program", program.id.to_string())),
        }
    }

    async fn delete(&self, id: &ProgramId) -> EngineResult<()> {
        let mut programs = self.programs.write().await;
        let before = programs.len();
        programs.retain(|p| &p.id != id);
        if programs.len() == before {
            return Err(EngineError::not_found("program", id.to_string()));
        }
        Ok(())
    }
}

/// Latest reading per (device, channel)
#[derive(Default)]
pub struct MemorySensorStore {
    latest: RwLock<HashMap<(DeviceId, SensorType), SensorReading>>,
}

impl MemorySensorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SensorStore for MemorySensorStore {
    async fn record(&self, reading: SensorReading) -> EngineResult<()> {
        let key = (reading.device_id.clone(), reading.sensor_type);
        self.latest.write().await.insert(key, reading);
        Ok(())
    }

    async fn latest(
        &self,
        device_id: &DeviceId,
        sensor_type: SensorType,
    ) -> EngineResult<Option<SensorReading>> {
        Ok(self
            .latest
            .read()
            .await
            .get(&(device_id.clone(), sensor_type))
            .cloned())
    }
}

#[derive(Clone)]
struct DeviceRecord {
    status: DeviceStatus,
    last_seen: DateTime<Utc>,
}

/// Device connectivity tracking
#[derive(Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<HashMap<DeviceId, DeviceRecord>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn set_status(&self, device_id: &DeviceId, status: DeviceStatus) -> EngineResult<()> {
        let mut devices = self.devices.write().await;
        let entry = devices.entry(device_id.clone()).or_insert(DeviceRecord {
            status,
            last_seen: Utc::now(),
        });
        entry.status = status;
        Ok(())
    }

    async fn record_heartbeat(
        &self,
        device_id: &DeviceId,
        timestamp: DateTime<Utc>,
    ) -> EngineResult<()> {
        let mut devices = self.devices.write().await;
        devices.insert(
            device_id.clone(),
            DeviceRecord {
                status: DeviceStatus::Online,
                last_seen: timestamp,
            },
        );
        Ok(())
    }

    async fn status(&self, device_id: &DeviceId) -> EngineResult<Option<DeviceStatus>> {
        Ok(self.devices.read().await.get(device_id).map(|r| r.status))
    }
}

const EXECUTION_LOG_CAP: usize = 1000;

/// Bounded append-only execution log; oldest records fall off at the cap
#[derive(Default)]
pub struct MemoryExecutionLog {
    records: RwLock<Vec<ExecutionRecord>>,
}

impl MemoryExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ExecutionLog for MemoryExecutionLog {
    async fn append(&self, record: ExecutionRecord) -> EngineResult<()> {
        let mut records = self.records.write().await;
        records.push(record);
        if records.len() > EXECUTION_LOG_CAP {
            let excess = records.len() - EXECUTION_LOG_CAP;
            records.drain(..excess);
        }
        Ok(())
    }

    async fn recent(&self, limit: usize) -> EngineResult<Vec<ExecutionRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }
}
