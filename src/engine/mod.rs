//! Automation engine
//!
//! `AutomationEngine` is the facade the binary and tests drive: it owns the
//! stores, the dispatcher, the rule engine, and the program scheduler, wires
//! inbound transport events to them, and exposes the rule/program API. All
//! collaborators arrive by injection so every piece is testable in isolation.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::ids::{DeviceId, ProgramId, RuleId};
use crate::model::program::Program;
use crate::model::rule::Rule;
use crate::model::sensor::{classify, SensorHealth, SensorType};
use crate::store::{DeviceStore, ExecutionLog, ProgramStore, RuleStore, SensorStore};
use crate::transport::{Transport, TransportEvent};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub mod actions;
pub mod clock;
pub mod cooldown;
pub mod cron;
pub mod dispatcher;
pub mod evaluator;
pub mod events;
pub mod rules;
pub mod scheduler;

pub use actions::ActionExecutor;
pub use clock::{Clock, SystemClock};
pub use cooldown::CooldownTracker;
pub use cron::CronExpression;
pub use dispatcher::CommandDispatcher;
pub use evaluator::{evaluate, evaluate_all, EvalContext};
pub use events::{event_channel, run_event_logger, EngineEvent};
pub use rules::RuleEngine;
pub use scheduler::ProgramScheduler;

use crate::model::condition::Condition;
use evaluator::{collect_device_refs, collect_sensor_refs};

/// Build an evaluation snapshot covering everything the conditions reference
pub async fn build_eval_context(
    conditions: &[Condition],
    sensors: &dyn SensorStore,
    devices: &dyn DeviceStore,
    now: DateTime<Utc>,
    max_age_secs: u64,
) -> EngineResult<EvalContext> {
    let mut ctx = EvalContext::new(now, max_age_secs);

    let mut sensor_refs = Vec::new();
    let mut device_refs = Vec::new();
    for condition in conditions {
        collect_sensor_refs(condition, &mut sensor_refs);
        collect_device_refs(condition, &mut device_refs);
    }

    for (device_id, sensor_type) in sensor_refs {
        if let Some(reading) = sensors.latest(&device_id, sensor_type).await? {
            ctx.readings.insert((device_id, sensor_type), reading);
        }
    }
    for device_id in device_refs {
        if let Some(status) = devices.status(&device_id).await? {
            ctx.device_statuses.insert(device_id, status);
        }
    }
    Ok(ctx)
}

/// Snapshot of engine state for status queries
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub running: bool,
    pub active_programs: Vec<ProgramId>,
    pub in_flight_commands: usize,
    pub rule_poll_interval_secs: u64,
    pub program_poll_interval_secs: u64,
}

pub struct AutomationEngine {
    config: EngineConfig,
    rules_store: Arc<dyn RuleStore>,
    programs_store: Arc<dyn ProgramStore>,
    sensors_store: Arc<dyn SensorStore>,
    devices_store: Arc<dyn DeviceStore>,
    dispatcher: Arc<CommandDispatcher>,
    rule_engine: Arc<RuleEngine>,
    scheduler: Arc<ProgramScheduler>,
    cooldown: Arc<Mutex<CooldownTracker>>,
    running: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AutomationEngine {
    /// Wire the engine from injected collaborators. Returns the engine and
    /// the receiver of engine events for the caller's dispatch loop.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        rules_store: Arc<dyn RuleStore>,
        programs_store: Arc<dyn ProgramStore>,
        sensors_store: Arc<dyn SensorStore>,
        devices_store: Arc<dyn DeviceStore>,
        execution_log: Arc<dyn ExecutionLog>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (events_tx, events_rx) = events::event_channel();
        let cooldown = Arc::new(Mutex::new(CooldownTracker::new(
            config.cooldown.rate_window_secs,
            config.cooldown.max_per_window,
        )));
        let dispatcher = Arc::new(CommandDispatcher::new(
            transport,
            clock.clone(),
            config.dispatcher.clone(),
        ));
        let executor = Arc::new(ActionExecutor::new(dispatcher.clone(), events_tx.clone()));

        let rule_engine = Arc::new(RuleEngine::new(
            rules_store.clone(),
            sensors_store.clone(),
            devices_store.clone(),
            execution_log.clone(),
            executor.clone(),
            cooldown.clone(),
            clock.clone(),
            events_tx.clone(),
            config.rules.clone(),
            config.sensors.clone(),
        ));
        let scheduler = Arc::new(ProgramScheduler::new(
            programs_store.clone(),
            sensors_store.clone(),
            devices_store.clone(),
            execution_log,
            executor,
            cooldown.clone(),
            clock,
            events_tx,
            config.programs.clone(),
            config.sensors.clone(),
        ));

        let (shutdown_tx, _) = watch::channel(false);
        let engine = Self {
            config,
            rules_store,
            programs_store,
            sensors_store,
            devices_store,
            dispatcher,
            rule_engine,
            scheduler,
            cooldown,
            running: AtomicBool::new(false),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        };
        (engine, events_rx)
    }

    /// Spawn the telemetry pump, rule loop, scheduler loop, and dispatcher
    /// sweep. Idempotent start is an error.
    pub async fn start(
        &self,
        transport_events: mpsc::Receiver<TransportEvent>,
    ) -> EngineResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::internal("engine already started"));
        }
        info!("Automation engine starting");

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(Self::run_telemetry_pump(
            transport_events,
            self.sensors_store.clone(),
            self.devices_store.clone(),
            self.dispatcher.clone(),
            self.scheduler.clone(),
            self.shutdown_tx.subscribe(),
        )));
        tasks.push(tokio::spawn(
            self.rule_engine.clone().run_loop(self.shutdown_tx.subscribe()),
        ));
        tasks.push(tokio::spawn(
            self.scheduler.clone().run_loop(self.shutdown_tx.subscribe()),
        ));
        tasks.push(tokio::spawn(
            self.dispatcher
                .clone()
                .run_sweep_loop(self.shutdown_tx.subscribe()),
        ));
        Ok(())
    }

    /// Signal shutdown and wait for the background tasks to finish
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Automation engine stopping");
        let _ = self.shutdown_tx.send(true);
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "Engine task ended abnormally");
            }
        }
        info!("Automation engine stopped");
    }

    async fn run_telemetry_pump(
        mut transport_events: mpsc::Receiver<TransportEvent>,
        sensors: Arc<dyn SensorStore>,
        devices: Arc<dyn DeviceStore>,
        dispatcher: Arc<CommandDispatcher>,
        scheduler: Arc<ProgramScheduler>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Telemetry pump started");
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Telemetry pump stopping");
                        break;
                    }
                }
                event = transport_events.recv() => {
                    let Some(event) = event else {
                        info!("Transport event channel closed, telemetry pump stopping");
                        break;
                    };
                    Self::handle_transport_event(event, &sensors, &devices, &dispatcher, &scheduler)
                        .await;
                }
            }
        }
    }

    async fn handle_transport_event(
        event: TransportEvent,
        sensors: &Arc<dyn SensorStore>,
        devices: &Arc<dyn DeviceStore>,
        dispatcher: &Arc<CommandDispatcher>,
        scheduler: &Arc<ProgramScheduler>,
    ) {
        match event {
            TransportEvent::SensorData(reading) => {
                debug!(
                    device_id = %reading.device_id,
                    sensor_type = %reading.sensor_type,
                    value = reading.value,
                    "Sensor reading received"
                );
                if classify(reading.sensor_type, reading.value) == SensorHealth::Critical {
                    warn!(
                        device_id = %reading.device_id,
                        sensor_type = %reading.sensor_type,
                        value = reading.value,
                        "Sensor reading outside safe range"
                    );
                }
                if let Err(e) = sensors.record(reading.clone()).await {
                    warn!(error = %e, "Failed to record sensor reading");
                }
                if let Err(e) = scheduler.handle_sensor_reading(&reading).await {
                    warn!(error = %e, "Sensor-trigger handling failed");
                }
            }
            TransportEvent::CommandResponse {
                device_id,
                command_type,
                status,
                timestamp,
                ..
            } => {
                dispatcher
                    .handle_response(&device_id, &command_type, &status, timestamp)
                    .await;
            }
            TransportEvent::Heartbeat {
                device_id,
                timestamp,
            } => {
                if let Err(e) = devices.record_heartbeat(&device_id, timestamp).await {
                    warn!(error = %e, "Failed to record heartbeat");
                }
            }
            TransportEvent::DeviceStatus { device_id, status } => {
                if let Err(e) = devices.set_status(&device_id, status).await {
                    warn!(error = %e, "Failed to record device status");
                }
            }
            TransportEvent::DeviceLog { device_id, message } => {
                debug!(device_id = %device_id, message, "Device log");
            }
        }
    }

    // Rule API

    pub async fn create_rule(&self, rule: Rule) -> EngineResult<RuleId> {
        rule.validate().map_err(EngineError::validation)?;
        let id = rule.id.clone();
        self.rules_store.insert(rule).await?;
        Ok(id)
    }

    pub async fn update_rule(&self, rule: Rule) -> EngineResult<()> {
        rule.validate().map_err(EngineError::validation)?;
        self.rules_store.update(rule).await
    }

    pub async fn delete_rule(&self, id: &RuleId) -> EngineResult<()> {
        self.rules_store.delete(id).await?;
        self.cooldown.lock().await.clear(id.as_str());
        Ok(())
    }

    pub async fn toggle_rule(&self, id: &RuleId, enabled: bool) -> EngineResult<()> {
        let mut rule = self
            .rules_store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("rule", id.to_string()))?;
        rule.enabled = enabled;
        self.rules_store.update(rule).await
    }

    // Program API

    pub async fn create_program(&self, program: Program) -> EngineResult<ProgramId> {
        program.validate().map_err(EngineError::validation)?;
        let id = program.id.clone();
        self.programs_store.insert(program).await?;
        Ok(id)
    }

    pub async fn update_program(&self, program: Program) -> EngineResult<()> {
        program.validate().map_err(EngineError::validation)?;
        self.programs_store.update(program).await
    }

    pub async fn delete_program(&self, id: &ProgramId) -> EngineResult<()> {
        self.programs_store.delete(id).await?;
        self.cooldown.lock().await.clear(id.as_str());
        Ok(())
    }

    pub async fn toggle_program(&self, id: &ProgramId, enabled: bool) -> EngineResult<()> {
        let mut program = self
            .programs_store
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("program", id.to_string()))?;
        program.enabled = enabled;
        self.programs_store.update(program).await
    }

    pub async fn run_program_manually(&self, id: &ProgramId) -> EngineResult<()> {
        self.scheduler.run_program_manually(id).await
    }

    pub async fn stop_program(&self, id: &ProgramId) -> EngineResult<()> {
        self.scheduler.stop_program(id).await
    }

    // Introspection

    pub async fn get_status(&self) -> EngineStatus {
        EngineStatus {
            running: self.running.load(Ordering::SeqCst),
            active_programs: self.scheduler.active_programs().await,
            in_flight_commands: self.dispatcher.in_flight_count().await,
            rule_poll_interval_secs: self.config.rules.poll_interval_secs,
            program_poll_interval_secs: self.config.programs.poll_interval_secs,
        }
    }

    /// Latest stored reading for a device channel
    pub async fn latest_reading(
        &self,
        device_id: &DeviceId,
        sensor_type: SensorType,
    ) -> EngineResult<Option<crate::model::sensor::SensorReading>> {
        self.sensors_store.latest(device_id, sensor_type).await
    }
}
