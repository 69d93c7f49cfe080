//! Parameterized SQL text generation.
//!
//! Produces statement text plus an ordered bind list from a
//! [`QuerySpec`]. Identifiers come exclusively from the spec's static
//! template strings; every caller-influenced value is a `?` placeholder.

use crate::query::{Cursor, QuerySpec, ScalarValue, SortDirection};

/// A statement plus its binds, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub text: String,
    pub binds: Vec<ScalarValue>,
}

/// SELECT one page. Fetches `limit + 1` rows so the executor can detect
/// a continuation without a second query.
pub fn select_page(spec: &QuerySpec) -> SqlQuery {
    let mut text = format!(
        "SELECT {} FROM {}",
        spec.columns.join(", "),
        spec.table
    );
    let mut binds = Vec::new();

    let mut conditions: Vec<String> = spec
        .filters
        .iter()
        .map(|f| {
            binds.push(f.value.clone());
            format!("{} {} ?", f.column, f.op.sql())
        })
        .collect();

    if let Some(cursor) = &spec.cursor {
        conditions.push(keyset_predicate(spec, cursor, &mut binds));
    }

    if !conditions.is_empty() {
        text.push_str(" WHERE ");
        text.push_str(&conditions.join(" AND "));
    }

    // NULL sort values always order last, whatever the direction, so the
    // NULL tail is reachable by keyset in both ASC and DESC walks.
    let dir = spec.sort.direction.sql();
    text.push_str(&format!(
        " ORDER BY ({col} IS NULL), {col} {dir}, {key} {dir} LIMIT ?",
        col = spec.sort.column,
        key = spec.key_column
    ));
    binds.push(ScalarValue::Int(i64::from(spec.limit) + 1));

    SqlQuery { text, binds }
}

/// COUNT matching rows with the same filters (no cursor, no limit).
pub fn count_rows(spec: &QuerySpec) -> SqlQuery {
    let mut text = format!("SELECT COUNT(*) FROM {}", spec.table);
    let mut binds = Vec::new();

    if !spec.filters.is_empty() {
        let conditions: Vec<String> = spec
            .filters
            .iter()
            .map(|f| {
                binds.push(f.value.clone());
                format!("{} {} ?", f.column, f.op.sql())
            })
            .collect();
        text.push_str(" WHERE ");
        text.push_str(&conditions.join(" AND "));
    }

    SqlQuery { text, binds }
}

/// Strict-inequality keyset boundary: rows after the cursor position in
/// sort order, with the primary key breaking ties on equal sort values.
/// NULL sort values order last, so a non-NULL boundary also admits the
/// whole NULL tail, and a NULL boundary walks within it by key.
fn keyset_predicate(spec: &QuerySpec, cursor: &Cursor, binds: &mut Vec<ScalarValue>) -> String {
    let cmp = match spec.sort.direction {
        SortDirection::Asc => ">",
        SortDirection::Desc => "<",
    };
    match &cursor.sort_value {
        Some(value) => {
            binds.push(value.clone());
            binds.push(value.clone());
            binds.push(ScalarValue::Text(cursor.key.clone()));
            format!(
                "({col} IS NULL OR {col} {cmp} ? OR ({col} = ? AND {key} {cmp} ?))",
                col = spec.sort.column,
                key = spec.key_column,
            )
        }
        None => {
            binds.push(ScalarValue::Text(cursor.key.clone()));
            format!(
                "({col} IS NULL AND {key} {cmp} ?)",
                col = spec.sort.column,
                key = spec.key_column,
            )
        }
    }
}
