//! Program scheduler
//!
//! Resolves interval and cron schedules on a fixed poll, reacts to inbound
//! telemetry for sensor-triggered programs, and runs programs manually on
//! request. A program is single-flight: while one execution is active, a
//! second start fails with `AlreadyRunning`. An action failure aborts the
//! run; stats are updated whatever the outcome.

use crate::config::{ProgramsSection, SensorsSection};
use crate::engine::actions::ActionExecutor;
use crate::engine::build_eval_context;
use crate::engine::clock::Clock;
use crate::engine::cooldown::CooldownTracker;
use crate::engine::cron::CronExpression;
use crate::engine::evaluator::evaluate_all;
use crate::engine::events::EngineEvent;
use crate::error::{EngineError, EngineResult};
use crate::model::condition::{parse_minute_of_day, Condition};
use crate::model::execution::{ExecutionRecord, ExecutionStatus, ExecutionSubject};
use crate::model::ids::ProgramId;
use crate::model::program::{Program, Schedule};
use crate::model::sensor::SensorReading;
use crate::store::{DeviceStore, ExecutionLog, ProgramStore, SensorStore};
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

pub struct ProgramScheduler {
    programs: Arc<dyn ProgramStore>,
    sensors: Arc<dyn SensorStore>,
    devices: Arc<dyn DeviceStore>,
    execution_log: Arc<dyn ExecutionLog>,
    executor: Arc<ActionExecutor>,
    cooldown: Arc<Mutex<CooldownTracker>>,
    clock: Arc<dyn Clock>,
    events: mpsc::Sender<EngineEvent>,
    config: ProgramsSection,
    sensors_config: SensorsSection,
    active: Mutex<HashSet<ProgramId>>,
}

impl ProgramScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        programs: Arc<dyn ProgramStore>,
        sensors: Arc<dyn SensorStore>,
        devices: Arc<dyn DeviceStore>,
        execution_log: Arc<dyn ExecutionLog>,
        executor: Arc<ActionExecutor>,
        cooldown: Arc<Mutex<CooldownTracker>>,
        clock: Arc<dyn Clock>,
        events: mpsc::Sender<EngineEvent>,
        config: ProgramsSection,
        sensors_config: SensorsSection,
    ) -> Self {
        Self {
            programs,
            sensors,
            devices,
            execution_log,
            executor,
            cooldown,
            clock,
            events,
            config,
            sensors_config,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Ids of programs currently executing
    pub async fn active_programs(&self) -> Vec<ProgramId> {
        self.active.lock().await.iter().cloned().collect()
    }

    /// Whether a program's schedule makes it due at `now` (pure over the
    /// program snapshot; sensor-triggered and manual programs are never due
    /// by polling)
    pub fn is_due(program: &Program, now: DateTime<Utc>) -> bool {
        match &program.schedule {
            Schedule::Interval {
                interval_minutes,
                start_time,
                end_time,
            } => {
                if !Self::within_daily_window(start_time.as_deref(), end_time.as_deref(), now) {
                    return false;
                }
                match program.stats.last_run {
                    None => true,
                    Some(last_run) => {
                        let elapsed = now.signed_duration_since(last_run).num_minutes();
                        elapsed >= *interval_minutes as i64
                    }
                }
            }
            Schedule::Cron { expression } => {
                let cron = match CronExpression::parse(expression) {
                    Ok(cron) => cron,
                    Err(e) => {
                        warn!(program_id = %program.id, error = %e, "Invalid cron expression");
                        return false;
                    }
                };
                if !cron.matches(now) {
                    return false;
                }
                // At most one run per matched minute
                match program.stats.last_run {
                    None => true,
                    Some(last_run) => last_run.timestamp() / 60 != now.timestamp() / 60,
                }
            }
            Schedule::SensorTrigger | Schedule::Manual => false,
        }
    }

    fn within_daily_window(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> bool {
        let (Some(start), Some(end)) = (start, end) else {
            // An open window never suppresses
            return true;
        };
        let (Some(start), Some(end)) = (parse_minute_of_day(start), parse_minute_of_day(end))
        else {
            warn!("Unparseable schedule window, suppressing run");
            return false;
        };
        let current = now.hour() * 60 + now.minute();
        if start <= end {
            current >= start && current <= end
        } else {
            current >= start || current <= end
        }
    }

    /// One scheduler pass: start every due program whose conditions hold
    pub async fn tick(self: &Arc<Self>) -> EngineResult<()> {
        let programs = self.programs.list().await?;
        let now = self.clock.now();
        for program in programs {
            if !program.enabled || !Self::is_due(&program, now) {
                continue;
            }
            if !self.conditions_hold(&program, now).await? {
                debug!(program_id = %program.id, "Program due but conditions not met");
                continue;
            }
            if self.rate_capped(&program, now).await {
                continue;
            }
            match self.try_start(program).await {
                Ok(()) | Err(EngineError::AlreadyRunning { .. }) => {}
                Err(e) => warn!(error = %e, "Failed to start scheduled program"),
            }
        }
        Ok(())
    }

    /// Start sensor-triggered programs matching an inbound reading.
    ///
    /// A program qualifies when at least one of its sensor conditions
    /// references the reading's channel and every such condition passes
    /// against the new value; remaining conditions are then evaluated
    /// normally.
    pub async fn handle_sensor_reading(
        self: &Arc<Self>,
        reading: &SensorReading,
    ) -> EngineResult<()> {
        let programs = self.programs.list().await?;
        let now = self.clock.now();
        for program in programs {
            if !program.enabled
                || program.schedule != Schedule::SensorTrigger
                || program.device_id != reading.device_id
            {
                continue;
            }
            if !Self::sensor_predicate_matches(&program.conditions, reading) {
                continue;
            }
            if !self.conditions_hold(&program, now).await? {
                continue;
            }
            if self.rate_capped(&program, now).await {
                continue;
            }
            match self.try_start(program).await {
                Ok(()) | Err(EngineError::AlreadyRunning { .. }) => {}
                Err(e) => warn!(error = %e, "Failed to start sensor-triggered program"),
            }
        }
        Ok(())
    }

    fn sensor_predicate_matches(conditions: &[Condition], reading: &SensorReading) -> bool {
        let mut referenced = false;
        for condition in conditions {
            if let Condition::SensorThreshold {
                device_id,
                sensor_type,
                operator,
                value,
            } = condition
            {
                if device_id == &reading.device_id && *sensor_type == reading.sensor_type {
                    referenced = true;
                    if !operator.compare(reading.value, *value) {
                        return false;
                    }
                }
            }
        }
        referenced
    }

    async fn conditions_hold(&self, program: &Program, now: DateTime<Utc>) -> EngineResult<bool> {
        if program.conditions.is_empty() {
            return Ok(true);
        }
        let ctx = build_eval_context(
            &program.conditions,
            self.sensors.as_ref(),
            self.devices.as_ref(),
            now,
            self.sensors_config.max_age_secs,
        )
        .await?;
        Ok(evaluate_all(&program.conditions, &ctx))
    }

    /// Programs carry no per-id cooldown seconds; only the shared rate cap
    /// bounds runaway triggers. Manual runs bypass this check.
    async fn rate_capped(&self, program: &Program, now: DateTime<Utc>) -> bool {
        let mut cooldown = self.cooldown.lock().await;
        if cooldown.is_on_cooldown(program.id.as_str(), 0, now) {
            warn!(program_id = %program.id, "Program rate-capped, skipping run");
            true
        } else {
            false
        }
    }

    /// Claim the program's single-flight slot and spawn its execution
    pub async fn try_start(self: &Arc<Self>, program: Program) -> EngineResult<()> {
        {
            let mut active = self.active.lock().await;
            if !active.insert(program.id.clone()) {
                return Err(EngineError::already_running(program.id.to_string()));
            }
        }
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.execute_program(program).await;
        });
        Ok(())
    }

    /// Run a program by id, bypassing schedule and rate cap
    pub async fn run_program_manually(self: &Arc<Self>, id: &ProgramId) -> EngineResult<()> {
        let program = self
            .programs
            .get(id)
            .await?
            .ok_or_else(|| EngineError::not_found("program", id.to_string()))?;
        self.try_start(program).await
    }

    /// Release a program's single-flight slot so it may start again.
    /// An in-flight action sequence finishes its current run undisturbed.
    pub async fn stop_program(&self, id: &ProgramId) -> EngineResult<()> {
        let removed = self.active.lock().await.remove(id);
        if !removed {
            return Err(EngineError::not_found("active program", id.to_string()));
        }
        if self
            .events
            .send(EngineEvent::ProgramStopped { program_id: id.clone() })
            .await
            .is_err()
        {
            warn!("Event channel closed, stop event dropped");
        }
        Ok(())
    }

    async fn execute_program(&self, program: Program) {
        let started_at = self.clock.now();
        info!(program_id = %program.id, program_name = %program.name, "Program starting");
        if self
            .events
            .send(EngineEvent::ProgramStarted {
                program_id: program.id.clone(),
                program_name: program.name.clone(),
            })
            .await
            .is_err()
        {
            warn!("Event channel closed, start event dropped");
        }

        let mut trace = Vec::new();
        let mut failure: Option<String> = None;
        for (index, action) in program.actions.iter().enumerate() {
            match self.executor.execute(action).await {
                Ok(line) => trace.push(line),
                Err(e) => {
                    warn!(
                        program_id = %program.id,
                        action_index = index,
                        error = %e,
                        "Program action failed, aborting run"
                    );
                    trace.push(format!("action {index} failed: {e}"));
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        let finished_at = self.clock.now();
        let duration_ms = finished_at
            .signed_duration_since(started_at)
            .num_milliseconds()
            .max(0) as u64;

        self.record_outcome(&program, started_at, finished_at, duration_ms, trace, failure)
            .await;
        self.active.lock().await.remove(&program.id);
    }

    async fn record_outcome(
        &self,
        program: &Program,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        duration_ms: u64,
        trace: Vec<String>,
        failure: Option<String>,
    ) {
        // Re-read the program so concurrent edits to its definition are not
        // clobbered by the stats write
        match self.programs.get(&program.id).await {
            Ok(Some(mut stored)) => {
                stored
                    .stats
                    .record_run(finished_at, duration_ms, failure.clone());
                if let Err(e) = self.programs.update(stored).await {
                    warn!(program_id = %program.id, error = %e, "Failed to persist program stats");
                }
            }
            Ok(None) => {
                debug!(program_id = %program.id, "Program deleted mid-run, stats dropped");
            }
            Err(e) => {
                warn!(program_id = %program.id, error = %e, "Failed to load program for stats");
            }
        }

        {
            let mut cooldown = self.cooldown.lock().await;
            cooldown.record_execution(program.id.as_str(), finished_at);
        }

        let status = if failure.is_none() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Error
        };
        let record = ExecutionRecord::new(
            ExecutionSubject::Program(program.id.clone()),
            started_at,
            duration_ms,
            status,
            trace,
        );
        if let Err(e) = self.execution_log.append(record).await {
            warn!(program_id = %program.id, error = %e, "Failed to append execution record");
        }

        let event = match failure {
            None => EngineEvent::ProgramCompleted {
                program_id: program.id.clone(),
                program_name: program.name.clone(),
                duration_ms,
            },
            Some(error) => EngineEvent::ProgramFailed {
                program_id: program.id.clone(),
                program_name: program.name.clone(),
                error,
            },
        };
        if self.events.send(event).await.is_err() {
            warn!("Event channel closed, program event dropped");
        }
    }

    /// Fixed-interval schedule resolution loop until shutdown
    pub async fn run_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "Program scheduler loop started"
        );
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Program scheduler loop stopping");
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Scheduler tick failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action::{Action, Severity};
    use crate::model::condition::ComparisonOp;
    use crate::model::ids::DeviceId;
    use crate::model::program::ProgramStats;
    use crate::model::sensor::SensorType;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 3, hour, minute, 0).unwrap()
    }

    fn interval_program(
        interval_minutes: u32,
        start: Option<&str>,
        end: Option<&str>,
        last_run: Option<DateTime<Utc>>,
    ) -> Program {
        let mut program = Program::new(
            "interval",
            DeviceId::new("dev-1"),
            Schedule::Interval {
                interval_minutes,
                start_time: start.map(str::to_string),
                end_time: end.map(str::to_string),
            },
            vec![Action::Notification {
                message: "run".to_string(),
                severity: Severity::Info,
            }],
        );
        program.stats = ProgramStats {
            last_run,
            ..ProgramStats::default()
        };
        program
    }

    #[test]
    fn test_interval_due_after_elapsed() {
        let program = interval_program(60, None, None, Some(at(9, 0)));
        assert!(!ProgramScheduler::is_due(&program, at(9, 59)));
        assert!(ProgramScheduler::is_due(&program, at(10, 0)));
    }

    #[test]
    fn test_interval_first_run_is_due() {
        let program = interval_program(60, None, None, None);
        assert!(ProgramScheduler::is_due(&program, at(3, 0)));
    }

    #[test]
    fn test_interval_window_suppresses_without_resetting() {
        let program = interval_program(60, Some("08:00"), Some("20:00"), Some(at(5, 0)));
        // Interval elapsed but outside the window
        assert!(!ProgramScheduler::is_due(&program, at(7, 0)));
        // Window opens and the overdue interval fires immediately
        assert!(ProgramScheduler::is_due(&program, at(8, 0)));
    }

    #[test]
    fn test_overnight_window() {
        let program = interval_program(30, Some("22:00"), Some("06:00"), None);
        assert!(ProgramScheduler::is_due(&program, at(23, 0)));
        assert!(ProgramScheduler::is_due(&program, at(3, 0)));
        assert!(!ProgramScheduler::is_due(&program, at(12, 0)));
    }

    #[test]
    fn test_cron_due_once_per_minute() {
        let mut program = Program::new(
            "cron",
            DeviceId::new("dev-1"),
            Schedule::Cron {
                expression: "*/15 * * * *".to_string(),
            },
            vec![Action::Notification {
                message: "run".to_string(),
                severity: Severity::Info,
            }],
        );
        assert!(ProgramScheduler::is_due(&program, at(10, 15)));
        program.stats.last_run = Some(at(10, 15));
        assert!(!ProgramScheduler::is_due(&program, at(10, 15)));
        assert!(ProgramScheduler::is_due(&program, at(10, 30)));
        assert!(!ProgramScheduler::is_due(&program, at(10, 16)));
    }

    #[test]
    fn test_manual_and_sensor_trigger_never_polled() {
        let manual = Program::new(
            "manual",
            DeviceId::new("dev-1"),
            Schedule::Manual,
            vec![Action::Notification {
                message: "run".to_string(),
                severity: Severity::Info,
            }],
        );
        assert!(!ProgramScheduler::is_due(&manual, at(10, 0)));

        let triggered = Program {
            schedule: Schedule::SensorTrigger,
            ..manual
        };
        assert!(!ProgramScheduler::is_due(&triggered, at(10, 0)));
    }

    #[test]
    fn test_sensor_predicate() {
        let device = DeviceId::new("dev-1");
        let conditions = vec![Condition::SensorThreshold {
            device_id: device.clone(),
            sensor_type: SensorType::Tds,
            operator: ComparisonOp::Lt,
            value: 800.0,
        }];
        let low = SensorReading {
            device_id: device.clone(),
            sensor_type: SensorType::Tds,
            value: 750.0,
            raw: None,
            timestamp: Utc::now(),
        };
        let high = SensorReading {
            value: 900.0,
            ..low.clone()
        };
        let other_channel = SensorReading {
            sensor_type: SensorType::Ph,
            value: 6.0,
            ..low.clone()
        };
        assert!(ProgramScheduler::sensor_predicate_matches(&conditions, &low));
        assert!(!ProgramScheduler::sensor_predicate_matches(&conditions, &high));
        assert!(!ProgramScheduler::sensor_predicate_matches(
            &conditions,
            &other_channel
        ));
    }
}
