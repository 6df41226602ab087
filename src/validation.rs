//! Column value validation from declared type and constraints.

use crate::error::OrmError;
use crate::schema::{ColumnDef, ColumnType, ValueFormat};
use chrono::DateTime;
use regex::Regex;
use serde_json::Value;

/// Validate one value for `col` of entity `entity`. Null is accepted only on nullable columns.
pub fn validate_value(entity: &str, col: &ColumnDef, v: &Value) -> Result<(), OrmError> {
    let fail = |reason: String| Err(OrmError::invalid_value(entity, &col.name, reason));
    if v.is_null() {
        if col.nullable {
            return Ok(());
        }
        return fail("must not be null".into());
    }
    check_type(col, v).or_else(|reason| fail(reason))?;
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = col.max_length {
            if len > max as usize {
                return fail(format!("must be at most {} characters", max));
            }
        }
        if let Some(min) = col.min_length {
            if len < min as usize {
                return fail(format!("must be at least {} characters", min));
            }
        }
        if let Some(pattern) = &col.pattern {
            let re = Regex::new(pattern).map_err(|_| {
                OrmError::invalid_value(entity, &col.name, "declared pattern does not compile")
            })?;
            if !re.is_match(s) {
                return fail("does not match required pattern".into());
            }
        }
        if let Some(ValueFormat::Email) = col.format {
            if !s.contains('@') || s.len() < 3 {
                return fail("must be a valid email".into());
            }
        }
    }
    Ok(())
}

fn check_type(col: &ColumnDef, v: &Value) -> Result<(), String> {
    match col.type_ {
        ColumnType::Increments | ColumnType::Integer => {
            let n = v
                .as_i64()
                .or_else(|| v.as_u64().and_then(|u| i64::try_from(u).ok()))
                .ok_or_else(|| "must be an integer".to_string())?;
            if col.unsigned && n < 0 {
                return Err("must not be negative".into());
            }
        }
        ColumnType::Float => {
            if !v.is_number() {
                return Err("must be a number".into());
            }
        }
        ColumnType::Decimal => {
            let ok = v.is_number()
                || v
                    .as_str()
                    .and_then(|s| s.trim().parse::<f64>().ok())
                    .map(f64::is_finite)
                    .unwrap_or(false);
            if !ok {
                return Err("must be a number or numeric string".into());
            }
        }
        ColumnType::String | ColumnType::Text => {
            if !v.is_string() {
                return Err("must be a string".into());
            }
        }
        ColumnType::Boolean => {
            if !v.is_boolean() {
                return Err("must be a boolean".into());
            }
        }
        ColumnType::DateTime => {
            let ok = v
                .as_str()
                .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
                .unwrap_or(false);
            if !ok {
                return Err("must be an RFC 3339 timestamp".into());
            }
        }
    }
    Ok(())
}
