//! Rule engine
//!
//! Polls on a fixed interval, evaluating enabled rules in insertion order.
//! A triggered rule runs its actions strictly in sequence with a fixed pause
//! between them; an action failure is logged and the sequence continues.
//! Every completed run records cooldown, stats, and an execution record
//! whatever the outcome.

use crate::config::{RulesSection, SensorsSection};
use crate::engine::actions::ActionExecutor;
use crate::engine::build_eval_context;
use crate::engine::clock::Clock;
use crate::engine::cooldown::CooldownTracker;
use crate::engine::evaluator::evaluate_all;
use crate::engine::events::EngineEvent;
use crate::error::EngineResult;
use crate::model::execution::{ExecutionRecord, ExecutionStatus, ExecutionSubject};
use crate::model::rule::Rule;
use crate::store::{DeviceStore, ExecutionLog, RuleStore, SensorStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

pub struct RuleEngine {
    rules: Arc<dyn RuleStore>,
    sensors: Arc<dyn SensorStore>,
    devices: Arc<dyn DeviceStore>,
    execution_log: Arc<dyn ExecutionLog>,
    executor: Arc<ActionExecutor>,
    cooldown: Arc<Mutex<CooldownTracker>>,
    clock: Arc<dyn Clock>,
    events: mpsc::Sender<EngineEvent>,
    config: RulesSection,
    sensors_config: SensorsSection,
}

impl RuleEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rules: Arc<dyn RuleStore>,
        sensors: Arc<dyn SensorStore>,
        devices: Arc<dyn DeviceStore>,
        execution_log: Arc<dyn ExecutionLog>,
        executor: Arc<ActionExecutor>,
        cooldown: Arc<Mutex<CooldownTracker>>,
        clock: Arc<dyn Clock>,
        events: mpsc::Sender<EngineEvent>,
        config: RulesSection,
        sensors_config: SensorsSection,
    ) -> Self {
        Self {
            rules,
            sensors,
            devices,
            execution_log,
            executor,
            cooldown,
            clock,
            events,
            config,
            sensors_config,
        }
    }

    /// Evaluate every enabled rule once. Failures inside one rule never
    /// affect the others.
    pub async fn tick(&self) -> EngineResult<()> {
        let rules = self.rules.list().await?;
        for rule in rules {
            if !rule.enabled {
                continue;
            }
            let now = self.clock.now();
            {
                let mut cooldown = self.cooldown.lock().await;
                if cooldown.is_on_cooldown(rule.id.as_str(), rule.cooldown_seconds, now) {
                    debug!(rule_id = %rule.id, "Rule on cooldown, skipping");
                    continue;
                }
            }

            let ctx = build_eval_context(
                &rule.conditions,
                self.sensors.as_ref(),
                self.devices.as_ref(),
                now,
                self.sensors_config.max_age_secs,
            )
            .await?;
            if !evaluate_all(&rule.conditions, &ctx) {
                continue;
            }

            info!(rule_id = %rule.id, rule_name = %rule.name, "Rule conditions met");
            self.run_rule(rule).await;
        }
        Ok(())
    }

    /// Execute a triggered rule's actions and record the outcome
    async fn run_rule(&self, mut rule: Rule) {
        let started_at = self.clock.now();
        let mut trace = Vec::new();
        let mut first_error: Option<String> = None;

        let last_index = rule.actions.len().saturating_sub(1);
        for (index, action) in rule.actions.iter().enumerate() {
            match self.executor.execute(action).await {
                Ok(line) => trace.push(line),
                Err(e) => {
                    warn!(
                        rule_id = %rule.id,
                        action_index = index,
                        error = %e,
                        "Rule action failed, continuing with remaining actions"
                    );
                    trace.push(format!("action {index} failed: {e}"));
                    if first_error.is_none() {
                        first_error = Some(e.to_string());
                    }
                }
            }
            if index < last_index {
                tokio::time::sleep(Duration::from_millis(self.config.action_pause_ms)).await;
            }
        }

        let finished_at = self.clock.now();
        let duration_ms = finished_at
            .signed_duration_since(started_at)
            .num_milliseconds()
            .max(0) as u64;

        rule.record_execution(finished_at);
        if let Err(e) = self.rules.update(rule.clone()).await {
            warn!(rule_id = %rule.id, error = %e, "Failed to persist rule stats");
        }
        {
            let mut cooldown = self.cooldown.lock().await;
            cooldown.record_execution(rule.id.as_str(), finished_at);
        }

        let status = if first_error.is_none() {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Error
        };
        let record = ExecutionRecord::new(
            ExecutionSubject::Rule(rule.id.clone()),
            started_at,
            duration_ms,
            status,
            trace,
        );
        if let Err(e) = self.execution_log.append(record).await {
            warn!(rule_id = %rule.id, error = %e, "Failed to append execution record");
        }

        let event = match first_error {
            None => EngineEvent::RuleTriggered {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
            },
            Some(error) => EngineEvent::RuleError {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                error,
            },
        };
        if self.events.send(event).await.is_err() {
            warn!("Event channel closed, rule event dropped");
        }
    }

    /// Fixed-interval evaluation loop until shutdown
    pub async fn run_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "Rule engine loop started"
        );
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Rule engine loop stopping");
                        break;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Rule tick failed");
                    }
                }
            }
        }
    }
}
