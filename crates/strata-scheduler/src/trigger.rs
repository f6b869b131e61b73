//! Cron trigger expressions.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use strata_core::{Error, Result};

/// A parsed trigger expression, evaluated in UTC.
///
/// Accepts five-field cron (`min hour dom mon dow`), six or seven fields with
/// seconds (and year), and the `@hourly`, `@daily`, `@weekly`, `@monthly`
/// and `@yearly` descriptors. Day-of-week numbers follow the `cron` crate
/// (1 = Sunday); names such as `MON-FRI` are unambiguous.
#[derive(Clone)]
pub struct TriggerExpression {
    source: String,
    schedule: cron::Schedule,
}

impl TriggerExpression {
    pub fn parse(expr: &str) -> Result<Self> {
        let source = expr.trim();
        if source.is_empty() {
            return Err(Error::Validation("trigger expression is empty".into()));
        }
        let normalized = normalize(source)?;
        let schedule = cron::Schedule::from_str(&normalized).map_err(|e| {
            Error::Validation(format!("invalid trigger expression '{source}': {e}"))
        })?;
        Ok(Self {
            source: source.to_string(),
            schedule,
        })
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

fn normalize(expr: &str) -> Result<String> {
    if expr.starts_with('@') {
        return Ok(expr.to_string());
    }
    match expr.split_whitespace().count() {
        5 => Ok(format!("0 {expr}")),
        6 | 7 => Ok(expr.to_string()),
        n => Err(Error::Validation(format!(
            "invalid trigger expression '{expr}': expected 5 to 7 fields, found {n}"
        ))),
    }
}

impl fmt::Debug for TriggerExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TriggerExpression").field(&self.source).finish()
    }
}

impl fmt::Display for TriggerExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, m, s).unwrap()
    }

    #[test]
    fn test_five_field_hourly() {
        let expr = TriggerExpression::parse("0 * * * *").unwrap();
        assert_eq!(expr.next_after(at(10, 15, 0)), Some(at(11, 0, 0)));
    }

    #[test]
    fn test_next_is_strictly_after() {
        let expr = TriggerExpression::parse("0 * * * *").unwrap();
        assert_eq!(expr.next_after(at(11, 0, 0)), Some(at(12, 0, 0)));
    }

    #[test]
    fn test_seconds_and_descriptors() {
        let every_ten = TriggerExpression::parse("*/10 * * * * *").unwrap();
        assert_eq!(every_ten.next_after(at(9, 0, 3)), Some(at(9, 0, 10)));

        let daily = TriggerExpression::parse("@daily").unwrap();
        assert_eq!(
            daily.next_after(at(9, 0, 0)),
            Some(Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "* * *", "61 * * * *", "not a cron", "@sometimes"] {
            assert!(
                matches!(TriggerExpression::parse(bad), Err(Error::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
