//! Argument validation and coercion.
//!
//! The single checkpoint between the LLM's loosely-typed arguments and
//! the typed pipeline. Pure and synchronous: no database or network
//! access happens here. Coercions are narrow and explicit; anything
//! outside the allow-list below is a validation error, not a guess.
//!
//! Allowed coercions per declared type:
//! - Integer: integral float, or a string that parses as an integer
//! - Boolean: the strings "true" / "false"
//! - Timestamp: RFC 3339 string, or `YYYY-MM-DD` taken as midnight UTC

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};

use crate::error::{Result, ServerError};
use crate::registry::{FieldSpec, FieldType, ToolDefinition};

/// Arguments after coercion and default application. Invariant: every
/// required field present and type-correct, every optional field either
/// absent or defaulted, no fields beyond the schema unless it is open.
#[derive(Debug, Clone, Default)]
pub struct ValidatedArguments {
    values: BTreeMap<String, Value>,
}

impl ValidatedArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(Value::as_i64)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: Vec<(&str, Value)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ServerError {
    ServerError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Check and coerce raw call arguments against a tool's declared schema.
pub fn validate(def: &ToolDefinition, raw: &Map<String, Value>) -> Result<ValidatedArguments> {
    if !def.input.is_open() {
        for key in raw.keys() {
            if def.input.get(key).is_none() {
                return Err(invalid(key, "unknown argument not declared by this tool"));
            }
        }
    }

    let mut values = BTreeMap::new();
    for (name, spec) in def.input.fields() {
        match raw.get(name) {
            Some(Value::Null) | None => {
                if spec.required {
                    return Err(invalid(name, "required argument is missing"));
                }
                if let Some(default) = &spec.default {
                    values.insert(name.to_string(), default.clone());
                }
            }
            Some(value) => {
                let coerced = coerce(name, spec, value)?;
                check_allowed(name, spec, &coerced)?;
                values.insert(name.to_string(), coerced);
            }
        }
    }

    Ok(ValidatedArguments { values })
}

fn coerce(field: &str, spec: &FieldSpec, value: &Value) -> Result<Value> {
    match spec.ty {
        FieldType::String => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(invalid(field, "expected a string")),
        },
        FieldType::Integer => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::from(i))
                } else if let Some(f) = n.as_f64()
                    && f.fract() == 0.0
                    && f.abs() < i64::MAX as f64
                {
                    Ok(Value::from(f as i64))
                } else {
                    Err(invalid(field, "expected an integer"))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid(field, "expected an integer")),
            _ => Err(invalid(field, "expected an integer")),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) if s == "true" => Ok(Value::from(true)),
            Value::String(s) if s == "false" => Ok(Value::from(false)),
            _ => Err(invalid(field, "expected a boolean")),
        },
        FieldType::Timestamp => match value {
            Value::String(s) => parse_timestamp(s)
                .map(|ts| Value::from(ts.to_rfc3339()))
                .ok_or_else(|| {
                    invalid(field, "expected an RFC 3339 timestamp or YYYY-MM-DD date")
                }),
            _ => Err(invalid(field, "expected a timestamp string")),
        },
    }
}

/// Parse the timestamp forms the schema admits.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn check_allowed(field: &str, spec: &FieldSpec, value: &Value) -> Result<()> {
    let Some(allowed) = spec.allowed_values else {
        return Ok(());
    };
    let Some(s) = value.as_str() else {
        return Ok(());
    };
    if allowed.contains(&s) {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ))
    }
}
