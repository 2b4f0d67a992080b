//! Command dispatch and acknowledgment tracking
//!
//! The dispatcher owns the in-flight command map: publish moves a command
//! `pending -> sent`, device responses move it forward through the
//! lifecycle, and a periodic sweep times out commands the device never
//! answered. Retries are explicit and bounded; each retry is a fresh command
//! linked to the original via `metadata.retry_of`.

use crate::config::DispatcherSection;
use crate::engine::clock::Clock;
use crate::error::{EngineError, EngineResult};
use crate::model::command::{Command, CommandStatus};
use crate::model::ids::{CommandId, DeviceId};
use crate::protocol::CommandPayload;
use crate::transport::Transport;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Terminal commands are kept this long for inspection before pruning
const TERMINAL_RETENTION_SECS: i64 = 3600;

pub struct CommandDispatcher {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: DispatcherSection,
    commands: Mutex<HashMap<CommandId, Command>>,
}

impl CommandDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: DispatcherSection,
    ) -> Self {
        Self {
            transport,
            clock,
            config,
            commands: Mutex::new(HashMap::new()),
        }
    }

    /// Create and publish a command. On publish success the returned command
    /// is `sent`; on failure it is marked `failed` and the error propagates.
    pub async fn dispatch(
        &self,
        device_id: DeviceId,
        command_type: &str,
        params: Value,
    ) -> EngineResult<Command> {
        let now = self.clock.now();
        let mut command = Command::new(device_id.clone(), command_type, params, now);
        command.timeout_ms = self.config.command_timeout_ms;
        command.max_retries = self.config.max_retries;

        let payload = CommandPayload::from_command(&command);
        match self.transport.publish_command(&device_id, &payload).await {
            Ok(()) => {
                command.mark_sent(self.clock.now());
                info!(
                    command_id = %command.command_id,
                    device_id = %device_id,
                    command_type,
                    "Command sent"
                );
                self.commands
                    .lock()
                    .await
                    .insert(command.command_id.clone(), command.clone());
                Ok(command)
            }
            Err(e) => {
                warn!(
                    command_id = %command.command_id,
                    device_id = %device_id,
                    error = %e,
                    "Command publish failed"
                );
                command.apply_status(CommandStatus::Failed, self.clock.now());
                self.commands
                    .lock()
                    .await
                    .insert(command.command_id.clone(), command);
                Err(EngineError::Transport(e))
            }
        }
    }

    /// Retry a command as a fresh command linked via `metadata.retry_of`
    pub async fn retry(&self, command_id: &CommandId) -> EngineResult<Command> {
        let original = {
            let commands = self.commands.lock().await;
            commands
                .get(command_id)
                .cloned()
                .ok_or_else(|| EngineError::not_found("command", command_id.to_string()))?
        };
        if !original.can_retry() {
            return Err(EngineError::MaxRetriesExceeded {
                command_id: command_id.to_string(),
                max_retries: original.max_retries,
            });
        }

        let mut retry = original.build_retry(self.clock.now());
        let payload = CommandPayload::from_command(&retry);
        match self
            .transport
            .publish_command(&retry.device_id, &payload)
            .await
        {
            Ok(()) => {
                retry.mark_sent(self.clock.now());
                info!(
                    command_id = %retry.command_id,
                    retry_of = %command_id,
                    retry_count = retry.retry_count,
                    "Retry sent"
                );
            }
            Err(e) => {
                retry.apply_status(CommandStatus::Failed, self.clock.now());
                self.commands
                    .lock()
                    .await
                    .insert(retry.command_id.clone(), retry);
                return Err(EngineError::Transport(e));
            }
        }
        self.commands
            .lock()
            .await
            .insert(retry.command_id.clone(), retry.clone());
        Ok(retry)
    }

    /// Correlate a device response with an in-flight command.
    ///
    /// Devices do not echo command ids, so correlation is a heuristic: the
    /// most recently created non-terminal command for the same device and
    /// command type, created inside the lookback window. Returns the id of
    /// the command that moved, if any.
    pub async fn handle_response(
        &self,
        device_id: &DeviceId,
        command_type: &str,
        status: &str,
        timestamp: DateTime<Utc>,
    ) -> Option<CommandId> {
        let Some(next_status) = CommandStatus::from_response(status) else {
            warn!(device_id = %device_id, command_type, status, "Unknown response status");
            return None;
        };

        let now = self.clock.now();
        let lookback = Duration::seconds(self.config.ack_lookback_secs as i64);
        let mut commands = self.commands.lock().await;
        let candidate = commands
            .values_mut()
            .filter(|c| {
                &c.device_id == device_id
                    && c.command_type == command_type
                    && !c.status.is_terminal()
                    && now.signed_duration_since(c.created_at) <= lookback
            })
            .max_by_key(|c| c.created_at)?;

        if candidate.apply_status(next_status, timestamp) {
            debug!(
                command_id = %candidate.command_id,
                status = ?next_status,
                "Response correlated"
            );
            Some(candidate.command_id.clone())
        } else {
            debug!(
                command_id = %candidate.command_id,
                current = ?candidate.status,
                attempted = ?next_status,
                "Response ignored, would move command backwards"
            );
            None
        }
    }

    /// Mark overdue commands as timed out and prune old terminal commands.
    /// Returns the commands that timed out in this sweep.
    pub async fn sweep_timeouts(&self) -> Vec<Command> {
        let now = self.clock.now();
        let mut commands = self.commands.lock().await;
        let mut timed_out = Vec::new();
        for command in commands.values_mut() {
            if command.is_timed_out(now) && command.apply_status(CommandStatus::Timeout, now) {
                warn!(
                    command_id = %command.command_id,
                    device_id = %command.device_id,
                    timeout_ms = command.timeout_ms,
                    "Command timed out"
                );
                timed_out.push(command.clone());
            }
        }
        let retention = Duration::seconds(TERMINAL_RETENTION_SECS);
        commands.retain(|_, c| {
            !c.status.is_terminal()
                || c.completed_at
                    .map(|t| now.signed_duration_since(t) < retention)
                    .unwrap_or(true)
        });
        timed_out
    }

    pub async fn get(&self, command_id: &CommandId) -> Option<Command> {
        self.commands.lock().await.get(command_id).cloned()
    }

    /// Number of commands not yet in a terminal state
    pub async fn in_flight_count(&self) -> usize {
        self.commands
            .lock()
            .await
            .values()
            .filter(|c| !c.status.is_terminal())
            .count()
    }

    /// Periodic timeout sweep until shutdown
    pub async fn run_sweep_loop(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.sweep_interval_secs,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Dispatcher sweep loop stopping");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.sweep_timeouts().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{ManualClock, MockTransport};
    use serde_json::json;

    fn dispatcher_with(
        transport: Arc<MockTransport>,
        clock: Arc<ManualClock>,
    ) -> CommandDispatcher {
        CommandDispatcher::new(transport, clock, DispatcherSection::default())
    }

    fn device() -> DeviceId {
        DeviceId::new("dev-1")
    }

    #[tokio::test]
    async fn test_dispatch_marks_sent_and_publishes() {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = dispatcher_with(transport.clone(), clock);

        let command = dispatcher
            .dispatch(device(), "pump", json!({"pump_id": "ph_down"}))
            .await
            .unwrap();
        assert_eq!(command.status, CommandStatus::Sent);
        assert!(command.sent_at.is_some());
        assert_eq!(transport.published_count(), 1);
        assert_eq!(transport.published()[0].1.command_type, "pump");
    }

    #[tokio::test]
    async fn test_dispatch_failure_marks_failed() {
        let transport = Arc::new(MockTransport::new());
        transport.set_fail_publishes(true);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = dispatcher_with(transport, clock);

        let result = dispatcher.dispatch(device(), "pump", json!({})).await;
        assert!(matches!(result, Err(EngineError::Transport(_))));
    }

    #[tokio::test]
    async fn test_sweep_times_out_overdue_commands() {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = dispatcher_with(transport, clock.clone());

        let command = dispatcher.dispatch(device(), "pump", json!({})).await.unwrap();

        clock.advance(Duration::milliseconds(29_999));
        assert!(dispatcher.sweep_timeouts().await.is_empty());

        clock.advance(Duration::milliseconds(1));
        let timed_out = dispatcher.sweep_timeouts().await;
        assert_eq!(timed_out.len(), 1);
        assert_eq!(timed_out[0].command_id, command.command_id);
        assert_eq!(
            dispatcher.get(&command.command_id).await.unwrap().status,
            CommandStatus::Timeout
        );
    }

    #[tokio::test]
    async fn test_response_correlates_to_most_recent() {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = dispatcher_with(transport, clock.clone());

        let first = dispatcher.dispatch(device(), "pump", json!({})).await.unwrap();
        clock.advance(Duration::seconds(5));
        let second = dispatcher.dispatch(device(), "pump", json!({})).await.unwrap();

        let moved = dispatcher
            .handle_response(&device(), "pump", "completed", clock.now())
            .await;
        assert_eq!(moved, Some(second.command_id.clone()));
        assert_eq!(
            dispatcher.get(&second.command_id).await.unwrap().status,
            CommandStatus::Completed
        );
        assert_eq!(
            dispatcher.get(&first.command_id).await.unwrap().status,
            CommandStatus::Sent
        );
    }

    #[tokio::test]
    async fn test_response_outside_lookback_ignored() {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = dispatcher_with(transport, clock.clone());

        dispatcher.dispatch(device(), "pump", json!({})).await.unwrap();
        clock.advance(Duration::seconds(121));
        let moved = dispatcher
            .handle_response(&device(), "pump", "completed", clock.now())
            .await;
        assert_eq!(moved, None);
    }

    #[tokio::test]
    async fn test_response_for_other_type_ignored() {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = dispatcher_with(transport, clock.clone());

        dispatcher.dispatch(device(), "pump", json!({})).await.unwrap();
        let moved = dispatcher
            .handle_response(&device(), "read_sensor", "completed", clock.now())
            .await;
        assert_eq!(moved, None);
    }

    #[tokio::test]
    async fn test_retry_chain_and_cap() {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = dispatcher_with(transport, clock.clone());

        let original = dispatcher.dispatch(device(), "pump", json!({})).await.unwrap();
        let mut current = original.clone();
        for expected_count in 1..=3u32 {
            let retry = dispatcher.retry(&current.command_id).await.unwrap();
            assert_eq!(retry.retry_count, expected_count);
            assert_eq!(retry.metadata.retry_of, Some(current.command_id.clone()));
            current = retry;
        }
        let result = dispatcher.retry(&current.command_id).await;
        assert!(matches!(
            result,
            Err(EngineError::MaxRetriesExceeded { max_retries: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_unknown_command() {
        let transport = Arc::new(MockTransport::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = dispatcher_with(transport, clock);

        let result = dispatcher.retry(&CommandId::new("ghost")).await;
        assert!(matches!(result, Err(EngineError::NotFound { .. })));
    }
}
