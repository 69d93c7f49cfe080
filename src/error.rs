//! Error taxonomy for the tool-dispatch engine.
//!
//! Call-level errors (`ServerError`) are always converted into a completed
//! response envelope by the assembler; they never terminate the session.
//! `StartupError` is the only fatal class and exists solely for registry
//! and pool construction.

use miette::Diagnostic;
use thiserror::Error;

/// Errors a single tool call can surface.
#[derive(Error, Diagnostic, Debug)]
pub enum ServerError {
    #[error("Unknown tool: '{name}'")]
    #[diagnostic(code(lakeview::registry::unknown_tool))]
    UnknownTool { name: String },

    #[error("Invalid argument '{field}': {message}")]
    #[diagnostic(code(lakeview::validate::invalid_argument))]
    Validation { field: String, message: String },

    #[error("No matching record in {entity} where {key} = '{value}'")]
    #[diagnostic(code(lakeview::exec::not_found))]
    NotFound {
        entity: &'static str,
        key: &'static str,
        value: String,
    },

    #[error("Connection pool exhausted")]
    #[diagnostic(code(lakeview::exec::pool_exhausted))]
    PoolExhausted,

    #[error("Query exceeded its deadline")]
    #[diagnostic(code(lakeview::exec::query_timeout))]
    QueryTimeout,

    /// Non-retryable database failure. The source is logged but never
    /// forwarded to the caller.
    #[error("Query execution failed")]
    #[diagnostic(code(lakeview::exec::execution))]
    Execution {
        #[source]
        source: sqlx::Error,
    },

    #[error("Server overloaded: dispatch queue full")]
    #[diagnostic(code(lakeview::router::overloaded))]
    Overloaded,

    #[error("Internal error: {message}")]
    #[diagnostic(code(lakeview::internal))]
    Internal { message: String },
}

impl ServerError {
    /// Transient failures are retried once by the execution engine with the
    /// same query plan before surfacing.
    pub fn is_transient(&self) -> bool {
        match self {
            ServerError::Execution { source } => matches!(source, sqlx::Error::Io(_)),
            _ => false,
        }
    }
}

/// Result type for call-level operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Fatal startup failures. Anything here terminates the process.
#[derive(Error, Diagnostic, Debug)]
pub enum StartupError {
    #[error("Duplicate tool name in catalog: '{name}'")]
    #[diagnostic(code(lakeview::startup::duplicate_tool))]
    DuplicateTool { name: String },

    #[error("Tool '{tool}' declares default sort '{column}' outside its whitelist")]
    #[diagnostic(code(lakeview::startup::bad_catalog))]
    BadCatalog { tool: String, column: String },

    #[error("Failed to initialize warehouse pool: {0}")]
    #[diagnostic(code(lakeview::startup::pool))]
    Pool(#[from] sqlx::Error),
}
