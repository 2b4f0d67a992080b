//! Cooldown and rate-limit tracking
//!
//! Tracks execution timestamps per subject id. A subject is on cooldown when
//! either too little time has passed since its most recent execution, or it
//! has hit the rate cap inside the sliding window. History is process-local
//! and resets on restart.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

pub struct CooldownTracker {
    history: HashMap<String, Vec<DateTime<Utc>>>,
    rate_window: Duration,
    max_per_window: usize,
}

impl CooldownTracker {
    pub fn new(rate_window_secs: u64, max_per_window: usize) -> Self {
        Self {
            history: HashMap::new(),
            rate_window: Duration::seconds(rate_window_secs as i64),
            max_per_window,
        }
    }

    /// Record one execution of `id` at `now`
    pub fn record_execution(&mut self, id: &str, now: DateTime<Utc>) {
        self.history.entry(id.to_string()).or_default().push(now);
    }

    /// Whether `id` may not execute at `now`.
    ///
    /// True when less than `cooldown_seconds` has elapsed since the most
    /// recent execution, or when executions inside the rate window have
    /// reached the cap. Prunes history older than the tracking window as a
    /// side effect.
    pub fn is_on_cooldown(&mut self, id: &str, cooldown_seconds: u32, now: DateTime<Utc>) -> bool {
        let cooldown = Duration::seconds(cooldown_seconds as i64);
        let tracking_window = self.rate_window.max(cooldown);

        let Some(timestamps) = self.history.get_mut(id) else {
            return false;
        };
        timestamps.retain(|t| now.signed_duration_since(*t) <= tracking_window);
        if timestamps.is_empty() {
            self.history.remove(id);
            return false;
        }

        if let Some(latest) = timestamps.iter().max() {
            if now.signed_duration_since(*latest) < cooldown {
                return true;
            }
        }

        let in_window = timestamps
            .iter()
            .filter(|t| now.signed_duration_since(**t) <= self.rate_window)
            .count();
        in_window >= self.max_per_window
    }

    /// Drop all history for `id` (used when a rule or program is deleted)
    pub fn clear(&mut self, id: &str) {
        self.history.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> CooldownTracker {
        CooldownTracker::new(300, 5)
    }

    #[test]
    fn test_unknown_id_not_on_cooldown() {
        let mut t = tracker();
        assert!(!t.is_on_cooldown("rule-1", 60, Utc::now()));
    }

    #[test]
    fn test_spacing_cooldown() {
        let mut t = tracker();
        let start = Utc::now();
        t.record_execution("rule-1", start);
        assert!(t.is_on_cooldown("rule-1", 60, start + Duration::seconds(59)));
        assert!(!t.is_on_cooldown("rule-1", 60, start + Duration::seconds(60)));
    }

    #[test]
    fn test_zero_cooldown_only_rate_capped() {
        let mut t = tracker();
        let start = Utc::now();
        t.record_execution("prog-1", start);
        assert!(!t.is_on_cooldown("prog-1", 0, start + Duration::seconds(1)));
    }

    #[test]
    fn test_rate_cap_within_window() {
        let mut t = tracker();
        let start = Utc::now();
        for i in 0..5 {
            t.record_execution("rule-1", start + Duration::seconds(i * 10));
        }
        // Spacing satisfied but the 5-per-window cap is hit
        let now = start + Duration::seconds(200);
        assert!(t.is_on_cooldown("rule-1", 30, now));
        // Once the window slides past the oldest entries, it frees up
        let later = start + Duration::seconds(340);
        assert!(!t.is_on_cooldown("rule-1", 30, later));
    }

    #[test]
    fn test_history_pruned_beyond_tracking_window() {
        let mut t = tracker();
        let start = Utc::now();
        t.record_execution("rule-1", start);
        let much_later = start + Duration::seconds(10_000);
        assert!(!t.is_on_cooldown("rule-1", 60, much_later));
    }

    #[test]
    fn test_cooldown_longer_than_rate_window() {
        let mut t = tracker();
        let start = Utc::now();
        t.record_execution("rule-1", start);
        // 600s cooldown outlives the 300s rate window; the entry must not be
        // pruned before the cooldown has elapsed
        assert!(t.is_on_cooldown("rule-1", 600, start + Duration::seconds(400)));
        assert!(!t.is_on_cooldown("rule-1", 600, start + Duration::seconds(600)));
    }

    #[test]
    fn test_clear_resets_history() {
        let mut t = tracker();
        let start = Utc::now();
        t.record_execution("rule-1", start);
        t.clear("rule-1");
        assert!(!t.is_on_cooldown("rule-1", 600, start + Duration::seconds(1)));
    }
}
