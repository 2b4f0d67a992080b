//! Scheduled programs
//!
//! A program is an ordered action sequence for one device, fired by a
//! schedule (interval, cron, sensor trigger, or manual-only) and gated by
//! optional conditions.

use crate::model::action::Action;
use crate::model::condition::{parse_minute_of_day, Condition};
use crate::model::ids::{DeviceId, ProgramId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// When a program fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Every `interval_minutes`, optionally only inside a daily `HH:MM` window.
    /// The window suppresses firing without resetting the interval clock.
    Interval {
        interval_minutes: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<String>,
    },
    /// 5-field cron expression, resolved at minute granularity
    Cron { expression: String },
    /// Fired synchronously when inbound telemetry satisfies the program's
    /// sensor conditions; never polled
    SensorTrigger,
    /// Only runs when invoked explicitly
    Manual,
}

/// Run statistics, updated after every execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgramStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub average_duration_ms: f64,
}

impl ProgramStats {
    /// Fold one run into the stats. The average uses the incremental form
    /// `avg' = (avg * n + d) / (n + 1)` over all runs, successful or not.
    pub fn record_run(
        &mut self,
        finished_at: DateTime<Utc>,
        duration_ms: u64,
        error: Option<String>,
    ) {
        let n = self.total_runs as f64;
        self.average_duration_ms = (self.average_duration_ms * n + duration_ms as f64) / (n + 1.0);
        self.total_runs += 1;
        self.last_run = Some(finished_at);
        match error {
            None => {
                self.successful_runs += 1;
                self.last_success = Some(finished_at);
            }
            Some(message) => {
                self.failed_runs += 1;
                self.last_failure = Some(finished_at);
                self.last_error = Some(message);
            }
        }
    }
}

/// A scheduled program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: ProgramId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub device_id: DeviceId,
    pub schedule: Schedule,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    pub enabled: bool,
    #[serde(default)]
    pub stats: ProgramStats,
}

impl Program {
    pub fn new<S: Into<String>>(
        name: S,
        device_id: DeviceId,
        schedule: Schedule,
        actions: Vec<Action>,
    ) -> Self {
        Self {
            id: ProgramId::generate(),
            name: name.into(),
            description: None,
            device_id,
            schedule,
            conditions: Vec::new(),
            actions: Vec::new(),
            enabled: true,
            stats: ProgramStats::default(),
        }
        .with_actions(actions)
    }

    fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// Structural validation before the program reaches the cache
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("program name must not be empty".to_string());
        }
        if self.actions.is_empty() {
            return Err("program requires at least one action".to_string());
        }
        match &self.schedule {
            Schedule::Interval {
                interval_minutes,
                start_time,
                end_time,
            } => {
                if *interval_minutes == 0 {
                    return Err("interval_minutes must be > 0".to_string());
                }
                for time in [start_time, end_time].into_iter().flatten() {
                    if parse_minute_of_day(time).is_none() {
                        return Err(format!("invalid schedule time: {time}"));
                    }
                }
            }
            Schedule::Cron { expression } => {
                crate::engine::cron::CronExpression::parse(expression)
                    .map_err(|e| format!("invalid cron expression: {e}"))?;
            }
            Schedule::SensorTrigger | Schedule::Manual => {}
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        for action in &self.actions {
            action.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action::Severity;

    fn notify() -> Action {
        Action::Notification {
            message: "run".to_string(),
            severity: Severity::Info,
        }
    }

    #[test]
    fn test_incremental_average() {
        let mut stats = ProgramStats::default();
        let now = Utc::now();
        stats.record_run(now, 100, None);
        stats.record_run(now, 200, None);
        stats.record_run(now, 300, Some("pump fault".to_string()));
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.successful_runs, 2);
        assert_eq!(stats.failed_runs, 1);
        assert!((stats.average_duration_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(stats.last_error.as_deref(), Some("pump fault"));
        assert_eq!(stats.last_failure, Some(now));
    }

    #[test]
    fn test_failure_keeps_last_success() {
        let mut stats = ProgramStats::default();
        let first = Utc::now();
        let second = first + chrono::Duration::minutes(5);
        stats.record_run(first, 100, None);
        stats.record_run(second, 100, Some("timeout".to_string()));
        assert_eq!(stats.last_success, Some(first));
        assert_eq!(stats.last_run, Some(second));
    }

    #[test]
    fn test_validate_interval_schedule() {
        let mut program = Program::new(
            "daily dose",
            DeviceId::new("dev-1"),
            Schedule::Interval {
                interval_minutes: 60,
                start_time: Some("06:00".to_string()),
                end_time: Some("22:00".to_string()),
            },
            vec![notify()],
        );
        assert!(program.validate().is_ok());

        program.schedule = Schedule::Interval {
            interval_minutes: 0,
            start_time: None,
            end_time: None,
        };
        assert!(program.validate().is_err());

        program.schedule = Schedule::Interval {
            interval_minutes: 60,
            start_time: Some("25:00".to_string()),
            end_time: None,
        };
        assert!(program.validate().is_err());
    }

    #[test]
    fn test_validate_cron_schedule() {
        let mut program = Program::new(
            "quarter hourly",
            DeviceId::new("dev-1"),
            Schedule::Cron {
                expression: "*/15 * * * *".to_string(),
            },
            vec![notify()],
        );
        assert!(program.validate().is_ok());

        program.schedule = Schedule::Cron {
            expression: "* * *".to_string(),
        };
        assert!(program.validate().is_err());
    }

    #[test]
    fn test_manual_program_needs_actions() {
        let program = Program::new(
            "manual flush",
            DeviceId::new("dev-1"),
            Schedule::Manual,
            vec![],
        );
        assert!(program.validate().is_err());
    }
}
