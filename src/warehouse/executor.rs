//! Query execution against the pooled warehouse connection.
//!
//! [`QueryExecutor`] is the seam the router dispatches through; the
//! production implementation runs over a shared `MySqlPool`. Tests swap
//! in fakes. Connections are held only for the duration of one query,
//! and a call cut off by its deadline drops the connection future so
//! the pool gets it back without waiting for the server.

use serde_json::Value;
use sqlx::mysql::{MySql, MySqlPool, MySqlRow};
use sqlx::query::Query;
use sqlx::{FromRow, Row};
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use super::models::{Commit, Issue, PipelineRun, Project, PullRequest, RecordKind};
use super::sql;
use crate::error::{Result, ServerError};
use crate::query::{Cursor, QuerySpec, ScalarKind, ScalarValue};

/// One page of typed records.
#[derive(Debug, Clone, Default)]
pub struct ResultPage {
    pub records: Vec<Value>,
    /// Present when the page was truncated at the row limit.
    pub next_cursor: Option<String>,
    /// Best-effort match count, computed on the first page only.
    pub total: Option<i64>,
}

/// Execution seam between the router and the warehouse.
pub trait QueryExecutor: Send + Sync {
    fn fetch_page(
        &self,
        spec: &QuerySpec,
        deadline: Instant,
    ) -> impl Future<Output = Result<ResultPage>> + Send;
}

/// Production executor over the shared connection pool.
pub struct MySqlExecutor {
    pool: MySqlPool,
    acquire_timeout: Duration,
}

impl MySqlExecutor {
    pub fn new(pool: MySqlPool, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            acquire_timeout,
        }
    }

    async fn run_once(&self, spec: &QuerySpec, deadline: Instant) -> Result<ResultPage> {
        let wait_until = Instant::now() + self.acquire_timeout;
        let acquire_deadline = deadline.min(wait_until);
        let mut conn = match timeout_at(acquire_deadline, self.pool.acquire()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(sqlx::Error::PoolTimedOut)) => return Err(ServerError::PoolExhausted),
            Ok(Err(source)) => return Err(ServerError::Execution { source }),
            Err(_) if acquire_deadline == deadline => return Err(ServerError::QueryTimeout),
            Err(_) => return Err(ServerError::PoolExhausted),
        };

        // Count only on the first page; a failed count never fails the call.
        let total = if spec.cursor.is_none() && !spec.single {
            let count = sql::count_rows(spec);
            let query = bind_all(sqlx::query(&count.text), &count.binds);
            match timeout_at(deadline, query.fetch_one(&mut *conn)).await {
                Ok(Ok(row)) => row.try_get::<i64, _>(0).ok(),
                Ok(Err(e)) => {
                    warn!(table = spec.table, error = %e, "count query failed");
                    None
                }
                Err(_) => return Err(ServerError::QueryTimeout),
            }
        } else {
            None
        };

        let page_sql = sql::select_page(spec);
        debug!(table = spec.table, sql = %page_sql.text, "executing page query");
        let query = bind_all(sqlx::query(&page_sql.text), &page_sql.binds);
        let mut rows = match timeout_at(deadline, query.fetch_all(&mut *conn)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(source)) => return Err(ServerError::Execution { source }),
            Err(_) => return Err(ServerError::QueryTimeout),
        };

        if spec.single {
            let Some(row) = rows.first() else {
                let value = spec
                    .filters
                    .first()
                    .map(|f| scalar_display(&f.value))
                    .unwrap_or_default();
                return Err(ServerError::NotFound {
                    entity: spec.table,
                    key: spec.key_column,
                    value,
                });
            };
            return Ok(ResultPage {
                records: vec![record_from_row(spec.kind, row)?],
                next_cursor: None,
                total: None,
            });
        }

        let truncated = rows.len() as u64 > u64::from(spec.limit);
        rows.truncate(spec.limit as usize);

        let next_cursor = if truncated {
            rows.last().and_then(|row| boundary_cursor(spec, row))
        } else {
            None
        };

        let records = rows
            .iter()
            .map(|row| record_from_row(spec.kind, row))
            .collect::<Result<Vec<_>>>()?;

        Ok(ResultPage {
            records,
            next_cursor: next_cursor.map(|c| c.encode()),
            total,
        })
    }
}

impl QueryExecutor for MySqlExecutor {
    async fn fetch_page(&self, spec: &QuerySpec, deadline: Instant) -> Result<ResultPage> {
        match self.run_once(spec, deadline).await {
            Err(e) if e.is_transient() => {
                warn!(table = spec.table, error = %e, "transient failure, retrying once");
                self.run_once(spec, deadline).await
            }
            result => result,
        }
    }
}

type MySqlQuery<'q> = Query<'q, MySql, sqlx::mysql::MySqlArguments>;

fn bind_all<'q>(mut query: MySqlQuery<'q>, binds: &'q [ScalarValue]) -> MySqlQuery<'q> {
    for bind in binds {
        query = match bind {
            ScalarValue::Text(s) => query.bind(s.as_str()),
            ScalarValue::Int(i) => query.bind(*i),
            ScalarValue::Bool(b) => query.bind(*b),
            ScalarValue::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}

/// Map one row into the tool's declared output shape.
fn record_from_row(kind: RecordKind, row: &MySqlRow) -> Result<Value> {
    fn to_value<T: serde::Serialize>(record: T) -> Result<Value> {
        serde_json::to_value(record).map_err(|e| ServerError::Internal {
            message: format!("record serialization failed: {e}"),
        })
    }

    let decoded = match kind {
        RecordKind::Project => Project::from_row(row).map(to_value),
        RecordKind::Commit => Commit::from_row(row).map(to_value),
        RecordKind::PullRequest => PullRequest::from_row(row).map(to_value),
        RecordKind::Issue => Issue::from_row(row).map(to_value),
        RecordKind::PipelineRun => PipelineRun::from_row(row).map(to_value),
    };
    decoded.map_err(|source| ServerError::Execution { source })?
}

/// Build the continuation cursor from the last row kept on this page.
/// A NULL sort value yields a NULL-tail boundary; the query orders NULL
/// values last and resumes within them by key.
fn boundary_cursor(spec: &QuerySpec, row: &MySqlRow) -> Option<Cursor> {
    let key: String = row.try_get(spec.key_column).ok()?;
    let sort_value = match spec.sort.kind {
        ScalarKind::Text => row
            .try_get::<Option<String>, _>(spec.sort.column)
            .ok()?
            .map(ScalarValue::Text),
        ScalarKind::Int => row
            .try_get::<Option<i64>, _>(spec.sort.column)
            .ok()?
            .map(ScalarValue::Int),
        ScalarKind::Timestamp => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(spec.sort.column)
            .ok()?
            .map(ScalarValue::Timestamp),
    };
    Some(Cursor {
        column: spec.sort.column.to_string(),
        direction: spec.sort.direction,
        sort_value,
        key,
    })
}

fn scalar_display(value: &ScalarValue) -> String {
    match value {
        ScalarValue::Text(s) => s.clone(),
        ScalarValue::Int(i) => i.to_string(),
        ScalarValue::Bool(b) => b.to_string(),
        ScalarValue::Timestamp(ts) => ts.to_rfc3339(),
    }
}
