//! Condition evaluation
//!
//! Evaluation is a pure function over a point-in-time snapshot of sensor
//! readings and device statuses. Missing or stale data makes a condition
//! false with a warning; it never raises an error, so one silent sensor
//! cannot take the whole engine down.

use crate::model::condition::{
    parse_minute_of_day, CompoundOp, Condition, DeviceStatus, EqualityOp,
};
use crate::model::ids::DeviceId;
use crate::model::sensor::{SensorReading, SensorType};
use chrono::{DateTime, Timelike, Utc};
use std::collections::HashMap;
use tracing::warn;

/// Snapshot the evaluator runs against
pub struct EvalContext {
    pub readings: HashMap<(DeviceId, SensorType), SensorReading>,
    pub device_statuses: HashMap<DeviceId, DeviceStatus>,
    pub now: DateTime<Utc>,
    pub max_age_secs: u64,
}

impl EvalContext {
    pub fn new(now: DateTime<Utc>, max_age_secs: u64) -> Self {
        Self {
            readings: HashMap::new(),
            device_statuses: HashMap::new(),
            now,
            max_age_secs,
        }
    }

    fn fresh_reading(&self, device_id: &DeviceId, sensor_type: SensorType) -> Option<&SensorReading> {
        let reading = self.readings.get(&(device_id.clone(), sensor_type))?;
        if reading.is_stale(self.now, self.max_age_secs) {
            return None;
        }
        Some(reading)
    }
}

/// Collect every (device, sensor) pair a condition tree references
pub fn collect_sensor_refs(condition: &Condition, refs: &mut Vec<(DeviceId, SensorType)>) {
    match condition {
        Condition::SensorThreshold {
            device_id,
            sensor_type,
            ..
        } => refs.push((device_id.clone(), *sensor_type)),
        Condition::Compound { conditions, .. } => {
            for nested in conditions {
                collect_sensor_refs(nested, refs);
            }
        }
        Condition::TimeWindow { .. } | Condition::DeviceStatus { .. } => {}
    }
}

/// Collect every device id a condition tree checks the status of
pub fn collect_device_refs(condition: &Condition, refs: &mut Vec<DeviceId>) {
    match condition {
        Condition::DeviceStatus { device_id, .. } => refs.push(device_id.clone()),
        Condition::Compound { conditions, .. } => {
            for nested in conditions {
                collect_device_refs(nested, refs);
            }
        }
        Condition::TimeWindow { .. } | Condition::SensorThreshold { .. } => {}
    }
}

/// Evaluate one condition against the snapshot
pub fn evaluate(condition: &Condition, ctx: &EvalContext) -> bool {
    match condition {
        Condition::SensorThreshold {
            device_id,
            sensor_type,
            operator,
            value,
        } => match ctx.fresh_reading(device_id, *sensor_type) {
            Some(reading) => operator.compare(reading.value, *value),
            None => {
                warn!(
                    device_id = %device_id,
                    sensor_type = %sensor_type,
                    "No fresh reading for condition, evaluating to false"
                );
                false
            }
        },
        Condition::TimeWindow { start, end } => {
            let (Some(start), Some(end)) = (parse_minute_of_day(start), parse_minute_of_day(end))
            else {
                warn!(start, end, "Unparseable time window, evaluating to false");
                return false;
            };
            let current = ctx.now.hour() * 60 + ctx.now.minute();
            if start <= end {
                current >= start && current <= end
            } else {
                // Overnight window, e.g. 22:00-06:00
                current >= start || current <= end
            }
        }
        Condition::DeviceStatus {
            device_id,
            operator,
            status,
        } => match ctx.device_statuses.get(device_id) {
            Some(actual) => match operator {
                EqualityOp::Eq => actual == status,
                EqualityOp::Ne => actual != status,
            },
            None => {
                warn!(
                    device_id = %device_id,
                    "Unknown device status for condition, evaluating to false"
                );
                false
            }
        },
        Condition::Compound {
            operator,
            conditions,
        } => match operator {
            CompoundOp::And => conditions.iter().all(|c| evaluate(c, ctx)),
            CompoundOp::Or => conditions.iter().any(|c| evaluate(c, ctx)),
            CompoundOp::Not => match conditions.first() {
                Some(first) => !evaluate(first, ctx),
                None => {
                    warn!("'not' condition without operand, evaluating to false");
                    false
                }
            },
        },
    }
}

/// Evaluate a condition list as an implicit AND; an empty list is true
pub fn evaluate_all(conditions: &[Condition], ctx: &EvalContext) -> bool {
    conditions.iter().all(|c| evaluate(c, ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::condition::ComparisonOp;
    use chrono::TimeZone;

    fn device() -> DeviceId {
        DeviceId::new("dev-1")
    }

    fn ctx_with_ph(value: f64, now: DateTime<Utc>) -> EvalContext {
        let mut ctx = EvalContext::new(now, 300);
        ctx.readings.insert(
            (device(), SensorType::Ph),
            SensorReading {
                device_id: device(),
                sensor_type: SensorType::Ph,
                value,
                raw: None,
                timestamp: now,
            },
        );
        ctx
    }

    fn ph_below(value: f64) -> Condition {
        Condition::SensorThreshold {
            device_id: device(),
            sensor_type: SensorType::Ph,
            operator: ComparisonOp::Lt,
            value,
        }
    }

    #[test]
    fn test_threshold_operators() {
        let now = Utc::now();
        let ctx = ctx_with_ph(6.0, now);
        assert!(evaluate(&ph_below(6.5), &ctx));
        assert!(!evaluate(&ph_below(6.0), &ctx));

        let eq = Condition::SensorThreshold {
            device_id: device(),
            sensor_type: SensorType::Ph,
            operator: ComparisonOp::Eq,
            value: 6.005,
        };
        assert!(evaluate(&eq, &ctx));
    }

    #[test]
    fn test_missing_reading_is_false() {
        let ctx = EvalContext::new(Utc::now(), 300);
        assert!(!evaluate(&ph_below(7.0), &ctx));
    }

    #[test]
    fn test_stale_reading_is_false() {
        let now = Utc::now();
        let mut ctx = ctx_with_ph(6.0, now);
        let key = (device(), SensorType::Ph);
        if let Some(reading) = ctx.readings.get_mut(&key) {
            reading.timestamp = now - chrono::Duration::seconds(301);
        }
        assert!(!evaluate(&ph_below(7.0), &ctx));
    }

    #[test]
    fn test_time_window_inclusive() {
        let at = |h, m| Utc.with_ymd_and_hms(2026, 8, 3, h, m, 0).unwrap();
        let window = Condition::TimeWindow {
            start: "06:00".to_string(),
            end: "22:00".to_string(),
        };
        for (h, m, expected) in [
            (6, 0, true),
            (22, 0, true),
            (12, 30, true),
            (5, 59, false),
            (22, 1, false),
        ] {
            let ctx = EvalContext::new(at(h, m), 300);
            assert_eq!(evaluate(&window, &ctx), expected, "{h:02}:{m:02}");
        }
    }

    #[test]
    fn test_overnight_time_window() {
        let at = |h, m| Utc.with_ymd_and_hms(2026, 8, 3, h, m, 0).unwrap();
        let window = Condition::TimeWindow {
            start: "22:00".to_string(),
            end: "06:00".to_string(),
        };
        for (h, m, expected) in [(23, 0, true), (3, 0, true), (12, 0, false)] {
            let ctx = EvalContext::new(at(h, m), 300);
            assert_eq!(evaluate(&window, &ctx), expected, "{h:02}:{m:02}");
        }
    }

    #[test]
    fn test_device_status_condition() {
        let mut ctx = EvalContext::new(Utc::now(), 300);
        ctx.device_statuses.insert(device(), DeviceStatus::Online);
        let online = Condition::DeviceStatus {
            device_id: device(),
            operator: EqualityOp::Eq,
            status: DeviceStatus::Online,
        };
        let not_offline = Condition::DeviceStatus {
            device_id: device(),
            operator: EqualityOp::Ne,
            status: DeviceStatus::Offline,
        };
        assert!(evaluate(&online, &ctx));
        assert!(evaluate(&not_offline, &ctx));

        let unknown_device = Condition::DeviceStatus {
            device_id: DeviceId::new("ghost"),
            operator: EqualityOp::Eq,
            status: DeviceStatus::Online,
        };
        assert!(!evaluate(&unknown_device, &ctx));
    }

    #[test]
    fn test_compound_truth_table() {
        let now = Utc::now();
        let ctx = ctx_with_ph(6.0, now);
        let truthy = ph_below(6.5);
        let falsy = ph_below(5.5);

        let and = |conds| Condition::Compound {
            operator: CompoundOp::And,
            conditions: conds,
        };
        let or = |conds| Condition::Compound {
            operator: CompoundOp::Or,
            conditions: conds,
        };
        let not = |cond: Condition| Condition::Compound {
            operator: CompoundOp::Not,
            conditions: vec![cond],
        };

        assert!(evaluate(&and(vec![truthy.clone(), truthy.clone()]), &ctx));
        assert!(!evaluate(&and(vec![truthy.clone(), falsy.clone()]), &ctx));
        assert!(evaluate(&or(vec![falsy.clone(), truthy.clone()]), &ctx));
        assert!(!evaluate(&or(vec![falsy.clone(), falsy.clone()]), &ctx));
        assert!(evaluate(&not(falsy.clone()), &ctx));
        assert!(!evaluate(&not(truthy.clone()), &ctx));
    }

    #[test]
    fn test_empty_not_is_false() {
        let ctx = EvalContext::new(Utc::now(), 300);
        let empty_not = Condition::Compound {
            operator: CompoundOp::Not,
            conditions: vec![],
        };
        assert!(!evaluate(&empty_not, &ctx));
    }

    #[test]
    fn test_evaluate_all_empty_is_true() {
        let ctx = EvalContext::new(Utc::now(), 300);
        assert!(evaluate_all(&[], &ctx));
    }

    #[test]
    fn test_collect_refs() {
        let condition = Condition::Compound {
            operator: CompoundOp::And,
            conditions: vec![
                ph_below(5.5),
                Condition::DeviceStatus {
                    device_id: DeviceId::new("dev-2"),
                    operator: EqualityOp::Eq,
                    status: DeviceStatus::Online,
                },
            ],
        };
        let mut sensors = Vec::new();
        collect_sensor_refs(&condition, &mut sensors);
        assert_eq!(sensors, vec![(device(), SensorType::Ph)]);

        let mut devices = Vec::new();
        collect_device_refs(&condition, &mut devices);
        assert_eq!(devices, vec![DeviceId::new("dev-2")]);
    }
}
