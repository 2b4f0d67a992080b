//! Test doubles
//!
//! `MockTransport` records published commands and can fail on demand;
//! `ManualClock` serves a settable instant. Both are used by unit tests and
//! the integration suite.

use crate::engine::clock::Clock;
use crate::model::ids::DeviceId;
use crate::protocol::CommandPayload;
use crate::transport::{Transport, TransportError};
use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-memory transport that records every published command
#[derive(Default)]
pub struct MockTransport {
    published: Mutex<Vec<(DeviceId, CommandPayload)>>,
    fail_publishes: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail
    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of all published commands, in publish order
    pub fn published(&self) -> Vec<(DeviceId, CommandPayload)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn publish_command(
        &self,
        device_id: &DeviceId,
        payload: &CommandPayload,
    ) -> Result<(), TransportError> {
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.published
            .lock()
            .unwrap()
            .push((device_id.clone(), payload.clone()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.fail_publishes.load(Ordering::SeqCst)
    }
}

/// Clock serving a settable instant
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
