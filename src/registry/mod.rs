//! The fixed tool catalog.
//!
//! Built once at startup and immutable afterwards, so lookups need no locking.
//! Each [`ToolDefinition`] binds a declared input schema to a
//! [`QueryTemplate`], so a single pipeline (validate → build → execute →
//! assemble) serves every tool; there is no per-tool handler code.

mod catalog;
mod schema;

#[cfg(test)]
mod catalog_test;

pub use catalog::builtin_catalog;
pub use schema::{FieldSpec, FieldType, InputSchema};

use std::collections::BTreeMap;

use crate::error::{ServerError, StartupError};
use crate::query::{FilterOp, ScalarKind, SortDirection};
use crate::warehouse::RecordKind;

/// How an argument value is rewritten before binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTransform {
    None,
    /// Warehouse enum columns store uppercase values (OPEN, MERGED, ...).
    Uppercase,
    /// Wrap in `%...%` for LIKE matching, escaping LIKE metacharacters.
    Contains,
}

/// Binding of one argument to a filterable column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBinding {
    pub arg: &'static str,
    pub column: &'static str,
    pub op: FilterOp,
    pub transform: ValueTransform,
}

impl ColumnBinding {
    pub const fn eq(arg: &'static str, column: &'static str) -> Self {
        Self {
            arg,
            column,
            op: FilterOp::Eq,
            transform: ValueTransform::None,
        }
    }

    pub const fn eq_upper(arg: &'static str, column: &'static str) -> Self {
        Self {
            arg,
            column,
            op: FilterOp::Eq,
            transform: ValueTransform::Uppercase,
        }
    }

    pub const fn contains(arg: &'static str, column: &'static str) -> Self {
        Self {
            arg,
            column,
            op: FilterOp::Like,
            transform: ValueTransform::Contains,
        }
    }

    pub const fn gte(arg: &'static str, column: &'static str) -> Self {
        Self {
            arg,
            column,
            op: FilterOp::Gte,
            transform: ValueTransform::None,
        }
    }

    pub const fn lte(arg: &'static str, column: &'static str) -> Self {
        Self {
            arg,
            column,
            op: FilterOp::Lte,
            transform: ValueTransform::None,
        }
    }
}

/// Startup-time whitelist describing how a tool's arguments map onto one
/// warehouse table. Arguments can never name a column directly; they only
/// select entries from this template.
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    pub table: &'static str,
    /// Output columns, matching the record struct for `kind`.
    pub columns: &'static [&'static str],
    pub bindings: &'static [ColumnBinding],
    /// Columns the caller may sort on, with the type needed to re-read the
    /// keyset boundary from result rows.
    pub sortable: &'static [(&'static str, ScalarKind)],
    pub default_sort: &'static str,
    pub default_direction: SortDirection,
    /// Primary key, used as the pagination tie-break.
    pub key_column: &'static str,
    pub kind: RecordKind,
    /// Point lookup: exactly one record, no paging arguments.
    pub single: bool,
}

impl QueryTemplate {
    /// Look up a sortable column by name.
    pub fn sort_kind(&self, column: &str) -> Option<(&'static str, ScalarKind)> {
        self.sortable
            .iter()
            .find(|(name, _)| *name == column)
            .copied()
    }
}

/// One entry in the catalog. Immutable after registry construction.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input: InputSchema,
    pub query: QueryTemplate,
}

/// Name → definition table, built once at startup.
#[derive(Debug)]
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, ToolDefinition>,
}

impl ToolRegistry {
    /// Build from a list of definitions. Duplicate names and templates
    /// whose default sort is outside their own whitelist are fatal.
    pub fn new(definitions: Vec<ToolDefinition>) -> Result<Self, StartupError> {
        let mut tools = BTreeMap::new();
        for def in definitions {
            if def.query.sort_kind(def.query.default_sort).is_none() {
                return Err(StartupError::BadCatalog {
                    tool: def.name.to_string(),
                    column: def.query.default_sort.to_string(),
                });
            }
            let name = def.name;
            if tools.insert(name, def).is_some() {
                return Err(StartupError::DuplicateTool {
                    name: name.to_string(),
                });
            }
        }
        Ok(Self { tools })
    }

    /// The built-in warehouse catalog.
    pub fn builtin() -> Result<Self, StartupError> {
        Self::new(builtin_catalog())
    }

    pub fn lookup(&self, name: &str) -> crate::error::Result<&ToolDefinition> {
        self.tools.get(name).ok_or_else(|| ServerError::UnknownTool {
            name: name.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
