//! Device commands and their lifecycle
//!
//! A command moves forward-only through
//! `pending -> sent -> acknowledged -> executing -> completed|failed|timeout`.
//! A retry never reuses the original: it creates a fresh command that points
//! back via `metadata.retry_of`.

use crate::model::ids::{CommandId, DeviceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Lifecycle state of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Sent,
    Acknowledged,
    Executing,
    Completed,
    Failed,
    Timeout,
}

impl CommandStatus {
    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Timeout
        )
    }

    fn rank(&self) -> u8 {
        match self {
            CommandStatus::Pending => 0,
            CommandStatus::Sent => 1,
            CommandStatus::Acknowledged => 2,
            CommandStatus::Executing => 3,
            CommandStatus::Completed | CommandStatus::Failed | CommandStatus::Timeout => 4,
        }
    }

    /// Forward-only transition check
    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Map a status string from a device response. Unknown strings map to
    /// `None` and leave the command untouched.
    pub fn from_response(status: &str) -> Option<Self> {
        match status {
            "acknowledged" | "ack" => Some(CommandStatus::Acknowledged),
            "executing" | "running" => Some(CommandStatus::Executing),
            "completed" | "success" | "ok" => Some(CommandStatus::Completed),
            "failed" | "error" => Some(CommandStatus::Failed),
            _ => None,
        }
    }
}

/// Extra command bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CommandMetadata {
    /// Id of the command this one retries, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<CommandId>,
}

/// A tracked device command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command_id: CommandId,
    pub device_id: DeviceId,
    pub command_type: String,
    pub params: Value,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default)]
    pub metadata: CommandMetadata,
}

impl Command {
    pub fn new<S: Into<String>>(
        device_id: DeviceId,
        command_type: S,
        params: Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            command_id: CommandId::generate(),
            device_id,
            command_type: command_type.into(),
            params,
            status: CommandStatus::Pending,
            created_at,
            sent_at: None,
            completed_at: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            metadata: CommandMetadata::default(),
        }
    }

    /// Move to `sent` after a successful publish
    pub fn mark_sent(&mut self, now: DateTime<Utc>) {
        if self.status.can_transition_to(CommandStatus::Sent) {
            self.status = CommandStatus::Sent;
            self.sent_at = Some(now);
        }
    }

    /// Apply a device response status. Returns true when the command moved.
    pub fn apply_status(&mut self, next: CommandStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        true
    }

    /// Whether the sent command has outlived its timeout at `now`
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.sent_at {
            Some(sent_at) => {
                now.signed_duration_since(sent_at).num_milliseconds() >= self.timeout_ms as i64
            }
            None => false,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Build the replacement command for a retry. The caller must check
    /// `can_retry` first.
    pub fn build_retry(&self, now: DateTime<Utc>) -> Command {
        Command {
            command_id: CommandId::generate(),
            device_id: self.device_id.clone(),
            command_type: self.command_type.clone(),
            params: self.params.clone(),
            status: CommandStatus::Pending,
            created_at: now,
            sent_at: None,
            completed_at: None,
            timeout_ms: self.timeout_ms,
            retry_count: self.retry_count + 1,
            max_retries: self.max_retries,
            metadata: CommandMetadata {
                retry_of: Some(self.command_id.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command() -> Command {
        Command::new(
            DeviceId::new("dev-1"),
            "pump",
            json!({"pump_id": "ph_down", "duration_ms": 2000}),
            Utc::now(),
        )
    }

    #[test]
    fn test_forward_only_transitions() {
        assert!(CommandStatus::Pending.can_transition_to(CommandStatus::Sent));
        assert!(CommandStatus::Sent.can_transition_to(CommandStatus::Completed));
        assert!(CommandStatus::Acknowledged.can_transition_to(CommandStatus::Executing));
        assert!(!CommandStatus::Executing.can_transition_to(CommandStatus::Sent));
        assert!(!CommandStatus::Completed.can_transition_to(CommandStatus::Failed));
        assert!(!CommandStatus::Timeout.can_transition_to(CommandStatus::Executing));
    }

    #[test]
    fn test_apply_status_sets_completed_at() {
        let mut cmd = command();
        let now = Utc::now();
        cmd.mark_sent(now);
        assert!(cmd.apply_status(CommandStatus::Completed, now));
        assert_eq!(cmd.completed_at, Some(now));
        assert!(!cmd.apply_status(CommandStatus::Failed, now));
    }

    #[test]
    fn test_regressive_status_ignored() {
        let mut cmd = command();
        let now = Utc::now();
        cmd.mark_sent(now);
        assert!(cmd.apply_status(CommandStatus::Executing, now));
        assert!(!cmd.apply_status(CommandStatus::Acknowledged, now));
        assert_eq!(cmd.status, CommandStatus::Executing);
    }

    #[test]
    fn test_timeout_requires_sent() {
        let cmd = command();
        let later = cmd.created_at + chrono::Duration::hours(1);
        assert!(!cmd.is_timed_out(later));

        let mut sent = command();
        sent.mark_sent(sent.created_at);
        let not_yet = sent.created_at + chrono::Duration::milliseconds(29_999);
        let elapsed = sent.created_at + chrono::Duration::milliseconds(30_000);
        assert!(!sent.is_timed_out(not_yet));
        assert!(sent.is_timed_out(elapsed));
    }

    #[test]
    fn test_retry_links_to_original() {
        let mut cmd = command();
        cmd.mark_sent(cmd.created_at);
        let retry = cmd.build_retry(Utc::now());
        assert_ne!(retry.command_id, cmd.command_id);
        assert_eq!(retry.metadata.retry_of, Some(cmd.command_id.clone()));
        assert_eq!(retry.retry_count, 1);
        assert_eq!(retry.status, CommandStatus::Pending);
        assert_eq!(retry.params, cmd.params);
    }

    #[test]
    fn test_retry_cap() {
        let mut cmd = command();
        cmd.retry_count = 3;
        assert!(!cmd.can_retry());
    }

    #[test]
    fn test_response_status_mapping() {
        assert_eq!(
            CommandStatus::from_response("ack"),
            Some(CommandStatus::Acknowledged)
        );
        assert_eq!(
            CommandStatus::from_response("success"),
            Some(CommandStatus::Completed)
        );
        assert_eq!(
            CommandStatus::from_response("error"),
            Some(CommandStatus::Failed)
        );
        assert_eq!(CommandStatus::from_response("rebooting"), None);
    }
}
