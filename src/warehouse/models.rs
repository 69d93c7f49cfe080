//! Typed records for the warehouse's domain tables.
//!
//! The schema is externally owned (a DevLake-style lake); these structs
//! mirror the per-entity views the server consumes read-only. Every view
//! carries a `project_name` column so tools can scope by project without
//! the core knowing about the lake's mapping tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Which record type a tool's rows map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Project,
    Commit,
    PullRequest,
    Issue,
    PipelineRun,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Commit {
    pub sha: String,
    pub project_name: String,
    pub author_name: String,
    pub author_email: String,
    pub message: String,
    pub additions: i64,
    pub deletions: i64,
    pub authored_date: DateTime<Utc>,
    pub committed_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PullRequest {
    pub id: String,
    pub project_name: String,
    pub title: String,
    pub status: String,
    pub author_name: String,
    pub url: String,
    pub created_date: DateTime<Utc>,
    pub merged_date: Option<DateTime<Utc>>,
    pub closed_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Issue {
    pub id: String,
    pub issue_key: String,
    pub project_name: String,
    pub title: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub issue_type: String,
    pub status: String,
    pub priority: Option<String>,
    pub creator_name: String,
    pub assignee_name: Option<String>,
    pub created_date: DateTime<Utc>,
    pub resolution_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PipelineRun {
    pub id: String,
    pub project_name: String,
    pub name: String,
    pub status: String,
    pub result: Option<String>,
    pub duration_sec: Option<f64>,
    pub started_date: DateTime<Utc>,
    pub finished_date: Option<DateTime<Utc>>,
}
