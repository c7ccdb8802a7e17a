//! Interval parsing (spec §4.A).
//!
//! Intervals are written as `<int><unit>` with `unit` one of `m`, `h`, `d`,
//! `w` (case-insensitive), e.g. `"1h"`, `"24d"`, `"1w"`. This module only
//! ever converts to minutes; it has no notion of calendar arithmetic.

use crate::error::SchedulerError;

/// Convert an interval string to minutes. `None` in, `None` out.
pub fn convert_interval(interval: Option<&str>) -> Result<Option<i64>, SchedulerError> {
    match interval {
        None => Ok(None),
        Some(s) => parse_interval(s).map(Some),
    }
}

fn parse_interval(s: &str) -> Result<i64, SchedulerError> {
    if s.is_empty() {
        return Err(SchedulerError::InvalidInterval(s.to_string()));
    }

    let (value_part, unit_char) = s.split_at(s.len() - 1);
    let unit = unit_char.to_ascii_lowercase();
    let minutes_per_unit = match unit.as_str() {
        "m" => 1,
        "h" => 60,
        "d" => 1440,
        "w" => 10080,
        _ => return Err(SchedulerError::InvalidInterval(s.to_string())),
    };

    let value: i64 = value_part
        .parse()
        .map_err(|_| SchedulerError::InvalidInterval(s.to_string()))?;

    Ok(value * minutes_per_unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_units() {
        assert_eq!(convert_interval(Some("1m")).unwrap(), Some(1));
        assert_eq!(convert_interval(Some("30m")).unwrap(), Some(30));
        assert_eq!(convert_interval(Some("4h")).unwrap(), Some(240));
        assert_eq!(convert_interval(Some("1d")).unwrap(), Some(1440));
        assert_eq!(convert_interval(Some("1w")).unwrap(), Some(10080));
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(convert_interval(Some("2H")).unwrap(), Some(120));
    }

    #[test]
    fn absent_is_absent() {
        assert_eq!(convert_interval(None).unwrap(), None);
    }

    #[test]
    fn zero_minutes_is_valid_and_always_stale() {
        assert_eq!(convert_interval(Some("0m")).unwrap(), Some(0));
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(convert_interval(Some("1z")).is_err());
    }

    #[test]
    fn rejects_non_numeric_value() {
        assert!(convert_interval(Some("xh")).is_err());
    }
}
