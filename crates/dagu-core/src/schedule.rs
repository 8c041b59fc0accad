//! Multi-shape `schedule` field parsing and cron validation.
//!
//! The `schedule` key accepts three shapes: a single cron string, a
//! sequence of cron strings, or a mapping with `start`/`stop`/`restart`
//! keys whose values are again a string or a sequence of strings. Every
//! expression must be a valid 5-field cron pattern
//! (minute hour day-of-month month day-of-week).

use croner::Cron;
use dagu_types::dag::Schedule;
use serde_yaml_ng::Value;

use crate::error::LoadError;

// ---------------------------------------------------------------------------
// ScheduleSet
// ---------------------------------------------------------------------------

/// The three independent schedule lists produced from one `schedule` field.
#[derive(Debug, Default)]
pub struct ScheduleSet {
    pub start: Vec<Schedule>,
    pub stop: Vec<Schedule>,
    pub restart: Vec<Schedule>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Resolve a raw `schedule` value into its three schedule lists.
///
/// Scalar and sequence shapes populate only `start`; the mapping shape
/// fills whichever of `start`/`stop`/`restart` it names. Any other key,
/// a non-string entry, or an invalid cron expression is an error.
pub fn parse_schedule_field(value: &Value) -> Result<ScheduleSet, LoadError> {
    match value {
        Value::String(_) | Value::Sequence(_) => Ok(ScheduleSet {
            start: parse_entries(value)?,
            ..ScheduleSet::default()
        }),
        Value::Mapping(map) => {
            let mut set = ScheduleSet::default();
            for (key, entries) in map {
                let Value::String(key) = key else {
                    return Err(LoadError::Validation(format!(
                        "invalid schedule key: {}",
                        value_kind(key)
                    )));
                };
                match key.as_str() {
                    "start" => set.start = parse_entries(entries)?,
                    "stop" => set.stop = parse_entries(entries)?,
                    "restart" => set.restart = parse_entries(entries)?,
                    other => {
                        return Err(LoadError::Validation(format!(
                            "invalid schedule key: {other}"
                        )));
                    }
                }
            }
            Ok(set)
        }
        other => Err(LoadError::Validation(format!(
            "schedule must be a string, a list of strings, or a start/stop/restart mapping, got {}",
            value_kind(other)
        ))),
    }
}

fn parse_entries(value: &Value) -> Result<Vec<Schedule>, LoadError> {
    match value {
        Value::String(expr) => Ok(vec![parse_cron(expr)?]),
        Value::Sequence(items) => items
            .iter()
            .map(|item| match item {
                Value::String(expr) => parse_cron(expr),
                other => Err(LoadError::Validation(format!(
                    "schedule entries must be strings, got {}",
                    value_kind(other)
                ))),
            })
            .collect(),
        other => Err(LoadError::Validation(format!(
            "schedule entries must be a string or a list of strings, got {}",
            value_kind(other)
        ))),
    }
}

/// Validate a single 5-field cron expression.
pub fn parse_cron(expr: &str) -> Result<Schedule, LoadError> {
    let expr = expr.trim();
    if expr.split_whitespace().count() != 5 {
        return Err(LoadError::Validation(format!(
            "invalid schedule: {expr:?} is not a 5-field cron expression"
        )));
    }
    expr.parse::<Cron>()
        .map_err(|e| LoadError::Validation(format!("invalid schedule: {e}")))?;
    Ok(Schedule {
        expression: expr.to_string(),
    })
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(text: &str) -> Result<ScheduleSet, LoadError> {
        let value: Value = serde_yaml_ng::from_str(text).expect("valid yaml");
        parse_schedule_field(&value)
    }

    // -----------------------------------------------------------------------
    // Scalar and sequence shapes
    // -----------------------------------------------------------------------

    #[test]
    fn test_single_expression() {
        let set = parse_str("\"*/5 * * * *\"").expect("should parse");
        assert_eq!(set.start.len(), 1);
        assert_eq!(set.start[0].expression, "*/5 * * * *");
        assert!(set.stop.is_empty());
        assert!(set.restart.is_empty());
    }

    #[test]
    fn test_expression_list() {
        let set = parse_str("- \"*/5 * * * *\"\n- \"* * * * *\"\n").expect("should parse");
        assert_eq!(set.start.len(), 2);
    }

    #[test]
    fn test_non_string_entry_is_an_error() {
        let err = parse_str("- true\n- \"* * * * *\"\n").unwrap_err();
        assert!(matches!(err, LoadError::Validation(_)), "got: {err:?}");
    }

    // -----------------------------------------------------------------------
    // Mapping shape
    // -----------------------------------------------------------------------

    #[test]
    fn test_start_stop_restart_mapping() {
        let set = parse_str(
            "start: \"0 8 * * *\"\nrestart: \"0 12 * * *\"\nstop: \"0 20 * * *\"\n",
        )
        .expect("should parse");
        assert_eq!(set.start.len(), 1);
        assert_eq!(set.stop.len(), 1);
        assert_eq!(set.restart.len(), 1);
    }

    #[test]
    fn test_mapping_with_lists() {
        let set = parse_str(
            r#"
start:
  - "0 1 * * *"
  - "0 18 * * *"
stop:
  - "0 2 * * *"
  - "0 20 * * *"
"#,
        )
        .expect("should parse");
        assert_eq!(set.start.len(), 2);
        assert_eq!(set.stop.len(), 2);
        assert!(set.restart.is_empty());
    }

    #[test]
    fn test_unknown_mapping_key_is_an_error() {
        let err = parse_str("invalid: \"* * * * *\"\n").unwrap_err();
        assert!(err.to_string().contains("invalid schedule key"), "got: {err}");
    }

    // -----------------------------------------------------------------------
    // Cron validation
    // -----------------------------------------------------------------------

    #[test]
    fn test_rejects_wrong_field_count() {
        assert!(parse_cron("1").is_err());
        assert!(parse_cron("* * * * * * *").is_err());
        assert!(parse_cron("").is_err());
    }

    #[test]
    fn test_rejects_invalid_field_values() {
        let err = parse_cron("99 * * * *").unwrap_err();
        assert!(matches!(err, LoadError::Validation(_)), "got: {err:?}");
    }

    #[test]
    fn test_accepts_standard_expressions() {
        for expr in ["* * * * *", "*/5 * * * *", "0 1 * * *", "30 4 1,15 * 5"] {
            assert_eq!(parse_cron(expr).expect("valid").expression, expr);
        }
    }
}
