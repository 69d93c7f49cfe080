//! Query plan types and construction.
//!
//! A [`QuerySpec`] is the only thing the execution engine accepts. Column
//! and table names in it are `&'static str` taken from per-tool templates
//! fixed at startup, so a spec can never reference a column an argument
//! named; values travel separately as bound parameters.

mod builder;
mod cursor;


pub use builder::build;
pub use cursor::Cursor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::warehouse::RecordKind;

/// Comparison operator a filter may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Like,
    Gte,
    Lte,
}

impl FilterOp {
    pub fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Like => "LIKE",
            FilterOp::Gte => ">=",
            FilterOp::Lte => "<=",
        }
    }
}

/// A typed value bound into the query. Never interpolated into SQL text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarValue {
    Text(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

/// Type of a sortable column, needed to read the keyset boundary back out
/// of the last row of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Text,
    Int,
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Sort key: a whitelisted column plus direction.
#[derive(Debug, Clone, Copy)]
pub struct Sort {
    pub column: &'static str,
    pub kind: ScalarKind,
    pub direction: SortDirection,
}

/// One filter predicate. The column is always drawn from the tool's
/// template, the value from validated arguments.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: &'static str,
    pub op: FilterOp,
    pub value: ScalarValue,
}

/// Fully-built query plan handed to the execution engine.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub table: &'static str,
    pub columns: &'static [&'static str],
    pub filters: Vec<Filter>,
    pub sort: Sort,
    /// Primary-key column used as the pagination tie-break.
    pub key_column: &'static str,
    /// Already clamped to the server maximum.
    pub limit: u32,
    pub cursor: Option<Cursor>,
    pub kind: RecordKind,
    /// Point lookup (`get_*` tools): exactly one record or NotFound.
    pub single: bool,
}
