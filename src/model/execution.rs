//! Append-only execution records

use crate::model::ids::{ProgramId, RuleId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What produced an execution record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ExecutionSubject {
    Rule(RuleId),
    Program(ProgramId),
}

/// Outcome of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// One completed rule or program run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub subject: ExecutionSubject,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: ExecutionStatus,
    /// Per-action log lines, in execution order
    pub trace: Vec<String>,
}

impl ExecutionRecord {
    pub fn new(
        subject: ExecutionSubject,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        status: ExecutionStatus,
        trace: Vec<String>,
    ) -> Self {
        Self {
            subject,
            started_at,
            duration_ms,
            status,
            trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_serialization() {
        let subject = ExecutionSubject::Rule(RuleId::new("rule-1"));
        let json = serde_json::to_value(&subject).unwrap();
        assert_eq!(json["kind"], "rule");
        assert_eq!(json["id"], "rule-1");
    }
}
