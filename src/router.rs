//! Call routing and concurrency control.
//!
//! Each inbound tool call runs the pipeline lookup → validate → build →
//! execute → assemble as one task under a global concurrency ceiling.
//! Calls beyond the ceiling wait in a bounded queue (backpressure);
//! queue overflow is shed immediately with an overloaded error. Every
//! request produces exactly one result with its own call id, whatever
//! happens inside.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::assemble::{ToolCallResult, assemble};
use crate::config::{RowLimits, ServerConfig};
use crate::error::{Result, ServerError};
use crate::query;
use crate::registry::ToolRegistry;
use crate::validate::validate;
use crate::warehouse::{QueryExecutor, ResultPage};

/// One inbound tool-call message. The id is caller-supplied and opaque;
/// the router only echoes it back.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub tool: String,
    pub arguments: Map<String, Value>,
    /// Optional caller deadline; clamped to the server per-call timeout.
    pub timeout_ms: Option<u64>,
}

pub struct Router<E: QueryExecutor> {
    registry: Arc<ToolRegistry>,
    executor: Arc<E>,
    permits: Arc<Semaphore>,
    waiting: AtomicUsize,
    queue_limit: usize,
    limits: RowLimits,
    call_timeout: Duration,
}

impl<E: QueryExecutor> Router<E> {
    pub fn new(registry: Arc<ToolRegistry>, executor: Arc<E>, config: &ServerConfig) -> Self {
        Self {
            registry,
            executor,
            permits: Arc::new(Semaphore::new(config.concurrency_limit)),
            waiting: AtomicUsize::new(0),
            queue_limit: config.queue_limit,
            limits: config.limits,
            call_timeout: config.call_timeout,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one call to completion. Infallible at this level: every
    /// failure becomes a structured error in the returned envelope.
    pub async fn dispatch(&self, request: ToolCallRequest, cancel: CancellationToken) -> ToolCallResult {
        let id = request.id.clone();
        debug!(call_id = %id, tool = %request.tool, "received");
        let outcome = self.run(request, cancel).await;
        assemble(id, outcome)
    }

    async fn run(&self, request: ToolCallRequest, cancel: CancellationToken) -> Result<ResultPage> {
        let _permit = self.acquire_slot(&cancel).await?;

        let timeout = request
            .timeout_ms
            .map(Duration::from_millis)
            .map(|t| t.min(self.call_timeout))
            .unwrap_or(self.call_timeout);
        let deadline = Instant::now() + timeout;

        let def = self.registry.lookup(&request.tool)?;
        let args = validate(def, &request.arguments)?;
        debug!(call_id = %request.id, tool = def.name, "validated");
        let spec = query::build(def, &args, &self.limits)?;

        debug!(call_id = %request.id, table = spec.table, "executing");
        tokio::select! {
            page = self.executor.fetch_page(&spec, deadline) => page,
            _ = cancel.cancelled() => {
                // Transport-level cancellation: treat as a cut-short deadline.
                // The execute future is dropped, which aborts the query and
                // returns its connection.
                debug!(call_id = %request.id, "cancelled in flight");
                Err(ServerError::QueryTimeout)
            }
        }
    }

    /// Acquire an execution slot, waiting in the bounded queue if the
    /// ceiling is reached. Overflow fails fast.
    async fn acquire_slot(
        &self,
        cancel: &CancellationToken,
    ) -> Result<tokio::sync::SemaphorePermit<'_>> {
        if let Ok(permit) = self.permits.try_acquire() {
            return Ok(permit);
        }

        if self.waiting.fetch_add(1, Ordering::SeqCst) >= self.queue_limit {
            self.waiting.fetch_sub(1, Ordering::SeqCst);
            return Err(ServerError::Overloaded);
        }

        let acquired = tokio::select! {
            permit = self.permits.acquire() => permit.map_err(|_| ServerError::Internal {
                message: "dispatch semaphore closed".to_string(),
            }),
            _ = cancel.cancelled() => Err(ServerError::QueryTimeout),
        };
        self.waiting.fetch_sub(1, Ordering::SeqCst);
        acquired
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use super::*;
    use crate::query::QuerySpec;

    /// Fake executor: records concurrency, optionally stalls, and answers
    /// with one record naming the queried table.
    struct FakeExecutor {
        delay: Duration,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeExecutor {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl QueryExecutor for FakeExecutor {
        async fn fetch_page(&self, spec: &QuerySpec, deadline: Instant) -> Result<ResultPage> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let finish = Instant::now() + self.delay;
            if finish > deadline {
                tokio::time::sleep_until(deadline).await;
                self.running.fetch_sub(1, Ordering::SeqCst);
                return Err(ServerError::QueryTimeout);
            }
            tokio::time::sleep(self.delay).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(ResultPage {
                records: vec![json!({"table": spec.table})],
                next_cursor: None,
                total: Some(1),
            })
        }
    }

    fn config(concurrency: usize, queue: usize) -> ServerConfig {
        ServerConfig {
            concurrency_limit: concurrency,
            queue_limit: queue,
            ..ServerConfig::default()
        }
    }

    fn router(delay: Duration, cfg: ServerConfig) -> Arc<Router<FakeExecutor>> {
        Arc::new(Router::new(
            Arc::new(ToolRegistry::builtin().unwrap()),
            Arc::new(FakeExecutor::new(delay)),
            &cfg,
        ))
    }

    fn request(id: &str, tool: &str, args: &[(&str, Value)]) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            tool: tool.to_string(),
            arguments: args
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            timeout_ms: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn result_carries_originating_call_id() {
        let router = router(Duration::ZERO, config(4, 4));
        let result = router
            .dispatch(
                request("call-99", "list_projects", &[]),
                CancellationToken::new(),
            )
            .await;
        assert_eq!(result.id, "call-99");
        assert!(result.outcome.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_tool_is_a_completed_error_response() {
        let router = router(Duration::ZERO, config(4, 4));
        let result = router
            .dispatch(request("1", "drop_tables", &[]), CancellationToken::new())
            .await;
        let envelope = result.to_envelope();
        assert_eq!(envelope["id"], "1");
        assert_eq!(envelope["error"]["code"], "not_found");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn validation_failure_short_circuits_execution() {
        let router = router(Duration::ZERO, config(4, 4));
        let result = router
            .dispatch(
                request("2", "list_pull_requests", &[]),
                CancellationToken::new(),
            )
            .await;
        let envelope = result.to_envelope();
        assert_eq!(envelope["error"]["code"], "validation_error");
        assert_eq!(envelope["error"]["field"], "project");
        assert_eq!(router.executor.peak.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrency_ceiling_is_enforced() {
        let router = router(Duration::from_millis(50), config(2, 32));
        let mut handles = Vec::new();
        for i in 0..8 {
            let router = Arc::clone(&router);
            handles.push(tokio::spawn(async move {
                router
                    .dispatch(
                        request(&format!("c{i}"), "list_projects", &[]),
                        CancellationToken::new(),
                    )
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().outcome.is_ok());
        }
        assert!(router.executor.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_calls_stay_correlated() {
        let router = router(Duration::from_millis(10), config(8, 32));
        let mut handles = Vec::new();
        for i in 0..16 {
            let router = Arc::clone(&router);
            handles.push(tokio::spawn(async move {
                let id = format!("call-{i}");
                let result = router
                    .dispatch(
                        request(&id, "list_projects", &[]),
                        CancellationToken::new(),
                    )
                    .await;
                (id, result)
            }));
        }
        for handle in handles {
            let (id, result) = handle.await.unwrap();
            assert_eq!(result.id, id);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_overflow_sheds_with_overloaded() {
        let router = router(Duration::from_millis(200), config(1, 1));
        // Saturate the single slot and the single queue seat.
        let mut handles = Vec::new();
        for i in 0..2 {
            let router = Arc::clone(&router);
            handles.push(tokio::spawn(async move {
                router
                    .dispatch(
                        request(&format!("busy-{i}"), "list_projects", &[]),
                        CancellationToken::new(),
                    )
                    .await
            }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let shed = router
            .dispatch(request("late", "list_projects", &[]), CancellationToken::new())
            .await;
        let envelope = shed.to_envelope();
        assert_eq!(envelope["error"]["code"], "overloaded");
        assert_eq!(envelope["error"]["retryable"], true);

        for handle in handles {
            assert!(handle.await.unwrap().outcome.is_ok());
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn caller_timeout_shortens_the_deadline() {
        let router = router(Duration::from_millis(500), config(4, 4));
        let mut req = request("t", "list_projects", &[]);
        req.timeout_ms = Some(20);
        let started = std::time::Instant::now();
        let result = router.dispatch(req, CancellationToken::new()).await;
        assert!(started.elapsed() < Duration::from_millis(400));
        let envelope = result.to_envelope();
        assert_eq!(envelope["error"]["code"], "query_timeout");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn transport_cancellation_resolves_the_call() {
        let router = router(Duration::from_millis(500), config(4, 4));
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let handle = {
            let router = Arc::clone(&router);
            tokio::spawn(async move {
                router.dispatch(request("x", "list_projects", &[]), child).await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        let result = handle.await.unwrap();
        assert_eq!(result.id, "x");
        assert!(result.outcome.is_err());
    }

    /// Keyset-paging fake: five open pull requests, newest first, honoring
    /// the spec's cursor and limit exactly as the warehouse would.
    struct SeededExecutor {
        rows: Vec<(chrono::DateTime<chrono::Utc>, String)>,
    }

    impl SeededExecutor {
        fn five_open_prs() -> Self {
            use chrono::TimeZone;
            let rows = (1..=5)
                .map(|i| {
                    (
                        chrono::Utc.with_ymd_and_hms(2026, 1, i, 12, 0, 0).unwrap(),
                        format!("pr-{i}"),
                    )
                })
                .collect();
            Self { rows }
        }
    }

    impl QueryExecutor for SeededExecutor {
        async fn fetch_page(&self, spec: &QuerySpec, _deadline: Instant) -> Result<ResultPage> {
            use crate::query::{Cursor, ScalarValue, SortDirection};
            assert_eq!(spec.sort.direction, SortDirection::Desc);

            let mut rows = self.rows.clone();
            rows.sort_by(|a, b| b.cmp(a));
            let after_cursor: Vec<_> = rows
                .into_iter()
                .filter(|(ts, key)| match &spec.cursor {
                    None => true,
                    Some(Cursor {
                        sort_value: Some(ScalarValue::Timestamp(boundary)),
                        key: bkey,
                        ..
                    }) => ts < boundary || (ts == boundary && key < bkey),
                    Some(_) => false,
                })
                .collect();

            let total = spec.cursor.is_none().then(|| self.rows.len() as i64);
            let truncated = after_cursor.len() > spec.limit as usize;
            let kept = &after_cursor[..after_cursor.len().min(spec.limit as usize)];
            let next_cursor = truncated.then(|| {
                let (ts, key) = kept.last().unwrap();
                Cursor {
                    column: spec.sort.column.to_string(),
                    direction: spec.sort.direction,
                    sort_value: Some(ScalarValue::Timestamp(*ts)),
                    key: key.clone(),
                }
                .encode()
            });

            Ok(ResultPage {
                records: kept
                    .iter()
                    .map(|(ts, key)| json!({"id": key, "created_date": ts}))
                    .collect(),
                next_cursor,
                total,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cursor_walk_is_stable_and_complete() {
        // Five open PRs walked with limit 2 must yield pages of 2, 2, 1.
        let router = Arc::new(Router::new(
            Arc::new(ToolRegistry::builtin().unwrap()),
            Arc::new(SeededExecutor::five_open_prs()),
            &config(4, 4),
        ));

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        let mut pages = Vec::new();
        loop {
            let mut args = vec![
                ("project", json!("konflux")),
                ("state", json!("open")),
                ("limit", json!(2)),
            ];
            if let Some(token) = &cursor {
                args.push(("cursor", json!(token)));
            }
            let result = router
                .dispatch(request("1", "list_pull_requests", &args), CancellationToken::new())
                .await;
            let page = result.outcome.expect("page should succeed");
            pages.push(page.records.len());
            for record in &page.records {
                seen.push(record["id"].as_str().unwrap().to_string());
            }
            match page.next_cursor {
                Some(token) => cursor = Some(token),
                None => break,
            }
        }

        assert_eq!(pages, vec![2, 2, 1]);
        assert_eq!(seen, vec!["pr-5", "pr-4", "pr-3", "pr-2", "pr-1"]);
        let mut unique = seen.clone();
        unique.dedup();
        assert_eq!(unique.len(), 5, "no duplicates across pages");
    }

    /// Keyset-paging fake over a nullable sort column: merged pull
    /// requests carry a merged date, open ones a NULL. Rows order with
    /// NULL values last, matching the generated SQL.
    struct NullableSortExecutor {
        rows: Vec<(Option<chrono::DateTime<chrono::Utc>>, String)>,
    }

    impl NullableSortExecutor {
        fn merged_and_open_prs() -> Self {
            use chrono::TimeZone;
            let mut rows: Vec<_> = (1..=3)
                .map(|i| {
                    (
                        Some(chrono::Utc.with_ymd_and_hms(2026, 1, i, 12, 0, 0).unwrap()),
                        format!("pr-m{i}"),
                    )
                })
                .collect();
            rows.extend((1..=3).map(|i| (None, format!("pr-o{i}"))));
            Self { rows }
        }
    }

    impl QueryExecutor for NullableSortExecutor {
        async fn fetch_page(&self, spec: &QuerySpec, _deadline: Instant) -> Result<ResultPage> {
            use crate::query::{Cursor, ScalarValue, SortDirection};
            use std::cmp::Ordering as CmpOrdering;
            assert_eq!(spec.sort.column, "merged_date");
            assert_eq!(spec.sort.direction, SortDirection::Asc);

            let mut rows = self.rows.clone();
            rows.sort_by(|a, b| match (&a.0, &b.0) {
                (Some(x), Some(y)) => x.cmp(y).then_with(|| a.1.cmp(&b.1)),
                (Some(_), None) => CmpOrdering::Less,
                (None, Some(_)) => CmpOrdering::Greater,
                (None, None) => a.1.cmp(&b.1),
            });
            let after_cursor: Vec<_> = rows
                .into_iter()
                .filter(|(ts, key)| match &spec.cursor {
                    None => true,
                    Some(Cursor {
                        sort_value: Some(ScalarValue::Timestamp(boundary)),
                        key: bkey,
                        ..
                    }) => match ts {
                        Some(t) => t > boundary || (t == boundary && key > bkey),
                        None => true,
                    },
                    Some(Cursor {
                        sort_value: None,
                        key: bkey,
                        ..
                    }) => ts.is_none() && key > bkey,
                    Some(_) => false,
                })
                .collect();

            let truncated = after_cursor.len() > spec.limit as usize;
            let kept = &after_cursor[..after_cursor.len().min(spec.limit as usize)];
            let next_cursor = truncated.then(|| {
                let (ts, key) = kept.last().unwrap();
                Cursor {
                    column: spec.sort.column.to_string(),
                    direction: spec.sort.direction,
                    sort_value: ts.map(ScalarValue::Timestamp),
                    key: key.clone(),
                }
                .encode()
            });

            Ok(ResultPage {
                records: kept
                    .iter()
                    .map(|(ts, key)| json!({"id": key, "merged_date": ts}))
                    .collect(),
                next_cursor,
                total: None,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn null_sorted_tail_is_fully_paginated() {
        // Ascending merged_date over 3 merged and 3 open PRs: the open
        // rows have no merged date and must still all be returned, each
        // exactly once, after the dated rows.
        let router = Arc::new(Router::new(
            Arc::new(ToolRegistry::builtin().unwrap()),
            Arc::new(NullableSortExecutor::merged_and_open_prs()),
            &config(4, 4),
        ));

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut args = vec![
                ("project", json!("konflux")),
                ("sort", json!("merged_date")),
                ("order", json!("asc")),
                ("limit", json!(2)),
            ];
            if let Some(token) = &cursor {
                args.push(("cursor", json!(token)));
            }
            let result = router
                .dispatch(
                    request("1", "list_pull_requests", &args),
                    CancellationToken::new(),
                )
                .await;
            let page = result.outcome.expect("page should succeed");
            for record in &page.records {
                seen.push(record["id"].as_str().unwrap().to_string());
            }
            match page.next_cursor {
                Some(token) => cursor = Some(token),
                None => break,
            }
        }

        assert_eq!(
            seen,
            vec!["pr-m1", "pr-m2", "pr-m3", "pr-o1", "pr-o2", "pr-o3"]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn first_page_carries_total_hint() {
        let router = Arc::new(Router::new(
            Arc::new(ToolRegistry::builtin().unwrap()),
            Arc::new(SeededExecutor::five_open_prs()),
            &config(4, 4),
        ));
        let result = router
            .dispatch(
                request(
                    "1",
                    "list_pull_requests",
                    &[("project", json!("konflux")), ("limit", json!(2))],
                ),
                CancellationToken::new(),
            )
            .await;
        let page = result.outcome.unwrap();
        assert_eq!(page.total, Some(5));
        assert!(page.next_cursor.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_request_is_idempotent_against_fake() {
        let router = router(Duration::ZERO, config(4, 4));
        let first = router
            .dispatch(request("a", "list_projects", &[]), CancellationToken::new())
            .await;
        let second = router
            .dispatch(request("a", "list_projects", &[]), CancellationToken::new())
            .await;
        assert_eq!(
            first.to_envelope()["result"],
            second.to_envelope()["result"]
        );
    }
}
