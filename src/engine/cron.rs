//! 5-field cron expressions at minute granularity
//!
//! Field order: minute, hour, day-of-month, month, day-of-week. Supported
//! forms per field: `*`, a value, `a-b`, a comma list, and `*/n`. The step
//! form matches when `value % n == 0`, so `*/15` fires at minutes
//! 0, 15, 30 and 45.

use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldPart {
    Any,
    Value(u32),
    Range(u32, u32),
    Step(u32),
}

impl FieldPart {
    fn matches(&self, value: u32) -> bool {
        match self {
            FieldPart::Any => true,
            FieldPart::Value(v) => value == *v,
            FieldPart::Range(lo, hi) => (*lo..=*hi).contains(&value),
            FieldPart::Step(n) => value % n == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CronField {
    parts: Vec<FieldPart>,
}

impl CronField {
    fn parse(field: &str, min: u32, max: u32) -> Result<Self, String> {
        let mut parts = Vec::new();
        for part in field.split(',') {
            parts.push(Self::parse_part(part, min, max)?);
        }
        Ok(Self { parts })
    }

    fn parse_part(part: &str, min: u32, max: u32) -> Result<FieldPart, String> {
        if part == "*" {
            return Ok(FieldPart::Any);
        }
        if let Some(step) = part.strip_prefix("*/") {
            let n: u32 = step
                .parse()
                .map_err(|_| format!("invalid step '{part}'"))?;
            if n == 0 {
                return Err(format!("step must be > 0 in '{part}'"));
            }
            return Ok(FieldPart::Step(n));
        }
        if let Some((lo, hi)) = part.split_once('-') {
            let lo: u32 = lo.parse().map_err(|_| format!("invalid range '{part}'"))?;
            let hi: u32 = hi.parse().map_err(|_| format!("invalid range '{part}'"))?;
            if lo > hi || lo < min || hi > max {
                return Err(format!("range '{part}' outside {min}-{max}"));
            }
            return Ok(FieldPart::Range(lo, hi));
        }
        let value: u32 = part
            .parse()
            .map_err(|_| format!("invalid field value '{part}'"))?;
        if value < min || value > max {
            return Err(format!("value {value} outside {min}-{max}"));
        }
        Ok(FieldPart::Value(value))
    }

    fn matches(&self, value: u32) -> bool {
        self.parts.iter().any(|p| p.matches(value))
    }
}

/// A parsed cron expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(format!(
                "expected 5 fields, got {} in '{expression}'",
                fields.len()
            ));
        }
        Ok(Self {
            minute: CronField::parse(fields[0], 0, 59)?,
            hour: CronField::parse(fields[1], 0, 23)?,
            day_of_month: CronField::parse(fields[2], 1, 31)?,
            month: CronField::parse(fields[3], 1, 12)?,
            day_of_week: CronField::parse(fields[4], 0, 6)?,
        })
    }

    /// Whether the expression matches the given instant's minute
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        self.minute.matches(at.minute())
            && self.hour.matches(at.hour())
            && self.day_of_month.matches(at.day())
            && self.month.matches(at.month())
            && self
                .day_of_week
                .matches(at.weekday().num_days_from_sunday())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        // 2026-08-03 is a Monday
        Utc.with_ymd_and_hms(2026, 8, 3, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_wildcard_matches_every_minute() {
        let cron = CronExpression::parse("* * * * *").unwrap();
        assert!(cron.matches(at(0, 0)));
        assert!(cron.matches(at(23, 59)));
    }

    #[test]
    fn test_step_minutes() {
        let cron = CronExpression::parse("*/15 * * * *").unwrap();
        for minute in [0, 15, 30, 45] {
            assert!(cron.matches(at(10, minute)), "minute {minute}");
        }
        for minute in [1, 14, 16, 44, 59] {
            assert!(!cron.matches(at(10, minute)), "minute {minute}");
        }
    }

    #[test]
    fn test_exact_time() {
        let cron = CronExpression::parse("30 6 * * *").unwrap();
        assert!(cron.matches(at(6, 30)));
        assert!(!cron.matches(at(6, 31)));
        assert!(!cron.matches(at(7, 30)));
    }

    #[test]
    fn test_ranges_and_lists() {
        let cron = CronExpression::parse("0 9-17 * * 1,3,5").unwrap();
        // 2026-08-03 is a Monday (day_of_week 1)
        assert!(cron.matches(at(9, 0)));
        assert!(cron.matches(at(17, 0)));
        assert!(!cron.matches(at(8, 0)));
        assert!(!cron.matches(at(18, 0)));
        // 2026-08-04 is a Tuesday
        let tuesday = Utc.with_ymd_and_hms(2026, 8, 4, 9, 0, 0).unwrap();
        assert!(!cron.matches(tuesday));
    }

    #[test]
    fn test_parse_errors() {
        assert!(CronExpression::parse("* * * *").is_err());
        assert!(CronExpression::parse("60 * * * *").is_err());
        assert!(CronExpression::parse("*/0 * * * *").is_err());
        assert!(CronExpression::parse("5-2 * * * *").is_err());
        assert!(CronExpression::parse("x * * * *").is_err());
        assert!(CronExpression::parse("* * * * 7").is_err());
    }

    #[test]
    fn test_comma_list_with_range() {
        let cron = CronExpression::parse("0,30 * * * *").unwrap();
        assert!(cron.matches(at(12, 0)));
        assert!(cron.matches(at(12, 30)));
        assert!(!cron.matches(at(12, 15)));
    }
}
