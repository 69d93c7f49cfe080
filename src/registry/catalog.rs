//! Built-in tool catalog for the warehouse.
//!
//! Nine tools over five domain views. List tools share the paging
//! arguments (`limit`, `cursor`, `sort`, `order`); `get_*` tools are
//! point lookups on the view's primary key.

use serde_json::json;

use super::{ColumnBinding, FieldSpec, FieldType, InputSchema, QueryTemplate, ToolDefinition};
use crate::query::{ScalarKind, SortDirection};
use crate::warehouse::RecordKind;

const PROJECT_COLUMNS: &[&str] = &["name", "description", "created_at"];

const COMMIT_COLUMNS: &[&str] = &[
    "sha",
    "project_name",
    "author_name",
    "author_email",
    "message",
    "additions",
    "deletions",
    "authored_date",
    "committed_date",
];

const PULL_REQUEST_COLUMNS: &[&str] = &[
    "id",
    "project_name",
    "title",
    "status",
    "author_name",
    "url",
    "created_date",
    "merged_date",
    "closed_date",
];

const ISSUE_COLUMNS: &[&str] = &[
    "id",
    "issue_key",
    "project_name",
    "title",
    "type",
    "status",
    "priority",
    "creator_name",
    "assignee_name",
    "created_date",
    "resolution_date",
];

const PIPELINE_RUN_COLUMNS: &[&str] = &[
    "id",
    "project_name",
    "name",
    "status",
    "result",
    "duration_sec",
    "started_date",
    "finished_date",
];

const PROJECT_BINDINGS: &[ColumnBinding] = &[ColumnBinding::contains("name_pattern", "name")];

const COMMIT_LIST_BINDINGS: &[ColumnBinding] = &[
    ColumnBinding::eq("project", "project_name"),
    ColumnBinding::eq("author", "author_name"),
    ColumnBinding::gte("since", "committed_date"),
    ColumnBinding::lte("until", "committed_date"),
];

const COMMIT_GET_BINDINGS: &[ColumnBinding] = &[ColumnBinding::eq("sha", "sha")];

const PULL_REQUEST_LIST_BINDINGS: &[ColumnBinding] = &[
    ColumnBinding::eq("project", "project_name"),
    ColumnBinding::eq_upper("state", "status"),
    ColumnBinding::eq("author", "author_name"),
    ColumnBinding::gte("since", "created_date"),
];

const PULL_REQUEST_GET_BINDINGS: &[ColumnBinding] = &[ColumnBinding::eq("id", "id")];

const ISSUE_LIST_BINDINGS: &[ColumnBinding] = &[
    ColumnBinding::eq("project", "project_name"),
    ColumnBinding::eq_upper("status", "status"),
    ColumnBinding::eq_upper("type", "type"),
    ColumnBinding::eq("assignee", "assignee_name"),
];

const ISSUE_GET_BINDINGS: &[ColumnBinding] = &[ColumnBinding::eq("id", "id")];

const PIPELINE_RUN_LIST_BINDINGS: &[ColumnBinding] = &[
    ColumnBinding::eq("project", "project_name"),
    ColumnBinding::eq_upper("result", "result"),
    ColumnBinding::eq_upper("status", "status"),
    ColumnBinding::gte("since", "started_date"),
];

const PIPELINE_RUN_GET_BINDINGS: &[ColumnBinding] = &[ColumnBinding::eq("id", "id")];

/// Append the shared paging arguments to a list tool's schema.
fn with_paging(schema: InputSchema, sortable: &'static [&'static str]) -> InputSchema {
    schema
        .field(
            "limit",
            FieldSpec::optional(
                FieldType::Integer,
                "Maximum number of records to return (default 10, capped by the server)",
            )
            .with_default(json!(10)),
        )
        .field(
            "cursor",
            FieldSpec::optional(
                FieldType::String,
                "Opaque continuation token from a previous page",
            ),
        )
        .field(
            "sort",
            FieldSpec::optional(FieldType::String, "Column to sort by").with_allowed(sortable),
        )
        .field(
            "order",
            FieldSpec::optional(FieldType::String, "Sort direction")
                .with_allowed(&["asc", "desc"]),
        )
}

fn required_project() -> FieldSpec {
    FieldSpec::required(
        FieldType::String,
        "Project name to scope the query to (as registered in the warehouse)",
    )
}

pub fn builtin_catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "list_projects",
            description: "List projects registered in the warehouse. \
                          Optionally filter by a name substring.",
            input: with_paging(
                InputSchema::new().field(
                    "name_pattern",
                    FieldSpec::optional(FieldType::String, "Substring to match project names"),
                ),
                &["name", "created_at"],
            ),
            query: QueryTemplate {
                table: "projects",
                columns: PROJECT_COLUMNS,
                bindings: PROJECT_BINDINGS,
                sortable: &[
                    ("name", ScalarKind::Text),
                    ("created_at", ScalarKind::Timestamp),
                ],
                default_sort: "name",
                default_direction: SortDirection::Asc,
                key_column: "name",
                kind: RecordKind::Project,
                single: false,
            },
        },
        ToolDefinition {
            name: "list_commits",
            description: "List commits for a project, newest first. Filter by author \
                          or a committed-date window (since/until).",
            input: with_paging(
                InputSchema::new()
                    .field("project", required_project())
                    .field(
                        "author",
                        FieldSpec::optional(FieldType::String, "Filter by commit author name"),
                    )
                    .field(
                        "since",
                        FieldSpec::optional(
                            FieldType::Timestamp,
                            "Only commits committed at or after this time",
                        ),
                    )
                    .field(
                        "until",
                        FieldSpec::optional(
                            FieldType::Timestamp,
                            "Only commits committed at or before this time",
                        ),
                    ),
                &["committed_date", "authored_date"],
            ),
            query: QueryTemplate {
                table: "commits",
                columns: COMMIT_COLUMNS,
                bindings: COMMIT_LIST_BINDINGS,
                sortable: &[
                    ("committed_date", ScalarKind::Timestamp),
                    ("authored_date", ScalarKind::Timestamp),
                ],
                default_sort: "committed_date",
                default_direction: SortDirection::Desc,
                key_column: "sha",
                kind: RecordKind::Commit,
                single: false,
            },
        },
        ToolDefinition {
            name: "get_commit",
            description: "Fetch a single commit by SHA.",
            input: InputSchema::new().field(
                "sha",
                FieldSpec::required(FieldType::String, "Full commit SHA"),
            ),
            query: QueryTemplate {
                table: "commits",
                columns: COMMIT_COLUMNS,
                bindings: COMMIT_GET_BINDINGS,
                sortable: &[("committed_date", ScalarKind::Timestamp)],
                default_sort: "committed_date",
                default_direction: SortDirection::Desc,
                key_column: "sha",
                kind: RecordKind::Commit,
                single: true,
            },
        },
        ToolDefinition {
            name: "list_pull_requests",
            description: "List pull/merge requests for a project, newest first. \
                          Filter by state (open, merged, closed), author, or creation time.",
            input: with_paging(
                InputSchema::new()
                    .field("project", required_project())
                    .field(
                        "state",
                        FieldSpec::optional(FieldType::String, "Pull request state")
                            .with_allowed(&["open", "merged", "closed"]),
                    )
                    .field(
                        "author",
                        FieldSpec::optional(FieldType::String, "Filter by author name"),
                    )
                    .field(
                        "since",
                        FieldSpec::optional(
                            FieldType::Timestamp,
                            "Only pull requests created at or after this time",
                        ),
                    ),
                &["created_date", "merged_date"],
            ),
            query: QueryTemplate {
                table: "pull_requests",
                columns: PULL_REQUEST_COLUMNS,
                bindings: PULL_REQUEST_LIST_BINDINGS,
                sortable: &[
                    ("created_date", ScalarKind::Timestamp),
                    ("merged_date", ScalarKind::Timestamp),
                ],
                default_sort: "created_date",
                default_direction: SortDirection::Desc,
                key_column: "id",
                kind: RecordKind::PullRequest,
                single: false,
            },
        },
        ToolDefinition {
            name: "get_pull_request",
            description: "Fetch a single pull request by warehouse id.",
            input: InputSchema::new().field(
                "id",
                FieldSpec::required(FieldType::String, "Warehouse pull request id"),
            ),
            query: QueryTemplate {
                table: "pull_requests",
                columns: PULL_REQUEST_COLUMNS,
                bindings: PULL_REQUEST_GET_BINDINGS,
                sortable: &[("created_date", ScalarKind::Timestamp)],
                default_sort: "created_date",
                default_direction: SortDirection::Desc,
                key_column: "id",
                kind: RecordKind::PullRequest,
                single: true,
            },
        },
        ToolDefinition {
            name: "list_issues",
            description: "List issues for a project, newest first. Filter by status \
                          (todo, in_progress, done), type (bug, story, task, incident), \
                          or assignee.",
            input: with_paging(
                InputSchema::new()
                    .field("project", required_project())
                    .field(
                        "status",
                        FieldSpec::optional(FieldType::String, "Issue status")
                            .with_allowed(&["todo", "in_progress", "done"]),
                    )
                    .field(
                        "type",
                        FieldSpec::optional(FieldType::String, "Issue type")
                            .with_allowed(&["bug", "story", "task", "incident"]),
                    )
                    .field(
                        "assignee",
                        FieldSpec::optional(FieldType::String, "Filter by assignee name"),
                    ),
                &["created_date", "resolution_date"],
            ),
            query: QueryTemplate {
                table: "issues",
                columns: ISSUE_COLUMNS,
                bindings: ISSUE_LIST_BINDINGS,
                sortable: &[
                    ("created_date", ScalarKind::Timestamp),
                    ("resolution_date", ScalarKind::Timestamp),
                ],
                default_sort: "created_date",
                default_direction: SortDirection::Desc,
                key_column: "id",
                kind: RecordKind::Issue,
                single: false,
            },
        },
        ToolDefinition {
            name: "get_issue",
            description: "Fetch a single issue by warehouse id.",
            input: InputSchema::new().field(
                "id",
                FieldSpec::required(FieldType::String, "Warehouse issue id"),
            ),
            query: QueryTemplate {
                table: "issues",
                columns: ISSUE_COLUMNS,
                bindings: ISSUE_GET_BINDINGS,
                sortable: &[("created_date", ScalarKind::Timestamp)],
                default_sort: "created_date",
                default_direction: SortDirection::Desc,
                key_column: "id",
                kind: RecordKind::Issue,
                single: true,
            },
        },
        ToolDefinition {
            name: "list_pipeline_runs",
            description: "List CI pipeline runs for a project, newest first. Filter by \
                          result (success, failure, abort), status (running, done), or \
                          start time.",
            input: with_paging(
                InputSchema::new()
                    .field("project", required_project())
                    .field(
                        "result",
                        FieldSpec::optional(FieldType::String, "Pipeline result")
                            .with_allowed(&["success", "failure", "abort"]),
                    )
                    .field(
                        "status",
                        FieldSpec::optional(FieldType::String, "Pipeline status")
                            .with_allowed(&["running", "done"]),
                    )
                    .field(
                        "since",
                        FieldSpec::optional(
                            FieldType::Timestamp,
                            "Only runs started at or after this time",
                        ),
                    ),
                &["started_date", "finished_date"],
            ),
            query: QueryTemplate {
                table: "cicd_pipelines",
                columns: PIPELINE_RUN_COLUMNS,
                bindings: PIPELINE_RUN_LIST_BINDINGS,
                sortable: &[
                    ("started_date", ScalarKind::Timestamp),
                    ("finished_date", ScalarKind::Timestamp),
                ],
                default_sort: "started_date",
                default_direction: SortDirection::Desc,
                key_column: "id",
                kind: RecordKind::PipelineRun,
                single: false,
            },
        },
        ToolDefinition {
            name: "get_pipeline_run",
            description: "Fetch a single CI pipeline run by warehouse id.",
            input: InputSchema::new().field(
                "id",
                FieldSpec::required(FieldType::String, "Warehouse pipeline run id"),
            ),
            query: QueryTemplate {
                table: "cicd_pipelines",
                columns: PIPELINE_RUN_COLUMNS,
                bindings: PIPELINE_RUN_GET_BINDINGS,
                sortable: &[("started_date", ScalarKind::Timestamp)],
                default_sort: "started_date",
                default_direction: SortDirection::Desc,
                key_column: "id",
                kind: RecordKind::PipelineRun,
                single: true,
            },
        },
    ]
}
