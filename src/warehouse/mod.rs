//! Warehouse access layer.
//!
//! Typed record models, SQL text generation, and the pooled execution
//! engine. The warehouse schema itself is externally owned; this layer
//! only reads it.

mod executor;
mod models;
mod sql;


pub use executor::{MySqlExecutor, QueryExecutor, ResultPage};
pub use models::{Commit, Issue, PipelineRun, Project, PullRequest, RecordKind};
pub use sql::{SqlQuery, count_rows, select_page};
