//! Model Context Protocol surface.
//!
//! - `server`: ServerHandler adapter over the core router
//! - `service`: stdio and Streamable HTTP transport wiring

pub mod server;
mod service;


pub use server::McpServer;
pub use service::{create_mcp_service, serve_http, serve_stdio};
