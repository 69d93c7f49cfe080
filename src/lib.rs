//! lakeview: MCP server for a software-engineering analytics warehouse.
//!
//! An LLM client queries a pre-populated DevLake-style lake (commits,
//! pull requests, issues, CI pipeline runs, projects) through a fixed
//! catalog of typed tools. The pipeline for every call is
//! lookup → validate → build → execute → assemble, run as one task
//! under a global concurrency ceiling.

pub mod assemble;
pub mod config;
pub mod error;
pub mod mcp;
pub mod query;
pub mod registry;
pub mod router;
pub mod validate;
pub mod warehouse;
