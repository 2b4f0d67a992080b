//! Automation rules

use crate::model::action::Action;
use crate::model::condition::Condition;
use crate::model::ids::RuleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_priority() -> u8 {
    5
}

/// A reactive automation rule: when all conditions hold, run the actions.
///
/// `conditions` is an implicit AND. `priority` is stored and validated but
/// does not affect evaluation order; rules run in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
    /// Minimum seconds between executions of this rule
    pub cooldown_seconds: u32,
    /// 1 (lowest) to 10 (highest), advisory only
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_triggered: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_count: u64,
}

impl Rule {
    pub fn new<S: Into<String>>(name: S, conditions: Vec<Condition>, actions: Vec<Action>) -> Self {
        Self {
            id: RuleId::generate(),
            name: name.into(),
            description: None,
            enabled: true,
            conditions,
            actions,
            cooldown_seconds: 0,
            priority: default_priority(),
            last_triggered: None,
            execution_count: 0,
        }
    }

    /// Structural validation before the rule reaches the cache
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("rule name must not be empty".to_string());
        }
        if self.conditions.is_empty() {
            return Err("rule requires at least one condition".to_string());
        }
        if self.actions.is_empty() {
            return Err("rule requires at least one action".to_string());
        }
        if !(1..=10).contains(&self.priority) {
            return Err(format!("priority must be 1-10, got {}", self.priority));
        }
        for condition in &self.conditions {
            condition.validate()?;
        }
        for action in &self.actions {
            action.validate()?;
        }
        Ok(())
    }

    /// Record one completed execution at `now`
    pub fn record_execution(&mut self, now: DateTime<Utc>) {
        self.last_triggered = Some(now);
        self.execution_count += 1;
    }
}
