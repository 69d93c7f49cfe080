//! QuerySpec construction from validated arguments.
//!
//! The primary injection defense lives here: arguments select entries
//! from the tool's startup-time template, so a query can only ever name
//! whitelisted columns. Anything unsupported (unknown sort column, a
//! cursor that does not match the sort) fails as a validation error
//! before the database is touched.

use serde_json::Value;

use super::{Cursor, Filter, QuerySpec, ScalarKind, ScalarValue, Sort, SortDirection};
use crate::config::RowLimits;
use crate::error::{Result, ServerError};
use crate::registry::{FieldType, ToolDefinition, ValueTransform};
use crate::validate::{ValidatedArguments, parse_timestamp};

fn invalid(field: &str, message: impl Into<String>) -> ServerError {
    ServerError::Validation {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Map validated arguments onto a tool's query template.
pub fn build(
    def: &ToolDefinition,
    args: &ValidatedArguments,
    limits: &RowLimits,
) -> Result<QuerySpec> {
    let template = &def.query;

    let mut filters = Vec::new();
    for binding in template.bindings {
        let Some(value) = args.get(binding.arg) else {
            continue;
        };
        let ty = def
            .input
            .get(binding.arg)
            .map(|spec| spec.ty)
            .unwrap_or(FieldType::String);
        let scalar = to_scalar(binding.arg, ty, value)?;
        let scalar = apply_transform(binding.transform, scalar);
        filters.push(Filter {
            column: binding.column,
            op: binding.op,
            value: scalar,
        });
    }

    let sort = resolve_sort(def, args)?;

    if template.single {
        return Ok(QuerySpec {
            table: template.table,
            columns: template.columns,
            filters,
            sort,
            key_column: template.key_column,
            limit: 1,
            cursor: None,
            kind: template.kind,
            single: true,
        });
    }

    let limit = match args.get_i64("limit") {
        Some(n) if n < 1 => return Err(invalid("limit", "must be at least 1")),
        Some(n) => (n as u64).min(limits.max as u64) as u32,
        None => limits.default,
    };

    let cursor = match args.get_str("cursor") {
        Some(token) => {
            let cursor = Cursor::decode(token)?;
            check_cursor_matches_sort(&cursor, &sort)?;
            Some(cursor)
        }
        None => None,
    };

    Ok(QuerySpec {
        table: template.table,
        columns: template.columns,
        filters,
        sort,
        key_column: template.key_column,
        limit,
        cursor,
        kind: template.kind,
        single: false,
    })
}

fn to_scalar(field: &str, ty: FieldType, value: &Value) -> Result<ScalarValue> {
    match ty {
        FieldType::String => value
            .as_str()
            .map(|s| ScalarValue::Text(s.to_string()))
            .ok_or_else(|| invalid(field, "expected a string")),
        FieldType::Integer => value
            .as_i64()
            .map(ScalarValue::Int)
            .ok_or_else(|| invalid(field, "expected an integer")),
        FieldType::Boolean => value
            .as_bool()
            .map(ScalarValue::Bool)
            .ok_or_else(|| invalid(field, "expected a boolean")),
        FieldType::Timestamp => value
            .as_str()
            .and_then(parse_timestamp)
            .map(ScalarValue::Timestamp)
            .ok_or_else(|| invalid(field, "expected a timestamp")),
    }
}

fn apply_transform(transform: ValueTransform, value: ScalarValue) -> ScalarValue {
    match (transform, value) {
        (ValueTransform::Uppercase, ScalarValue::Text(s)) => {
            ScalarValue::Text(s.to_ascii_uppercase())
        }
        (ValueTransform::Contains, ScalarValue::Text(s)) => {
            ScalarValue::Text(format!("%{}%", escape_like(&s)))
        }
        (_, value) => value,
    }
}

/// Escape LIKE metacharacters so a pattern argument matches literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn resolve_sort(def: &ToolDefinition, args: &ValidatedArguments) -> Result<Sort> {
    let template = &def.query;
    let (column, kind) = match args.get_str("sort") {
        Some(requested) => template.sort_kind(requested).ok_or_else(|| {
            invalid(
                "sort",
                format!("'{requested}' is not sortable for this tool"),
            )
        })?,
        None => template
            .sort_kind(template.default_sort)
            .unwrap_or((template.default_sort, ScalarKind::Timestamp)),
    };

    let direction = match args.get_str("order") {
        Some("asc") => SortDirection::Asc,
        Some("desc") => SortDirection::Desc,
        Some(other) => return Err(invalid("order", format!("'{other}' is not a direction"))),
        None => {
            if args.contains("sort") {
                SortDirection::Asc
            } else {
                template.default_direction
            }
        }
    };

    Ok(Sort {
        column,
        kind,
        direction,
    })
}

/// A cursor minted under one ordering cannot resume a query ordered
/// differently; the boundary would be applied to the wrong column.
fn check_cursor_matches_sort(cursor: &Cursor, sort: &Sort) -> Result<()> {
    let mismatch = || {
        invalid(
            "cursor",
            "continuation token does not match the requested sort",
        )
    };
    if cursor.column != sort.column || cursor.direction != sort.direction {
        return Err(mismatch());
    }
    // A None boundary sits in the NULL tail; no value to type-check.
    let value_matches = match &cursor.sort_value {
        None => true,
        Some(value) => matches!(
            (value, sort.kind),
            (ScalarValue::Text(_), ScalarKind::Text)
                | (ScalarValue::Int(_), ScalarKind::Int)
                | (ScalarValue::Timestamp(_), ScalarKind::Timestamp)
        ),
    };
    if value_matches { Ok(()) } else { Err(mismatch()) }
}
