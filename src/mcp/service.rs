//! Transport wiring for the MCP server.
//!
//! Two front-ends over the same handler: a stdio session for local
//! clients, and a Streamable HTTP service nested into an Axum router.
//! Both are thin; the core stays transport-agnostic.

use std::net::IpAddr;
use std::sync::Arc;

use rmcp::ServiceExt;
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::server::McpServer;
use crate::router::Router;
use crate::warehouse::QueryExecutor;

/// Create the Streamable HTTP service for nesting into an Axum router.
pub fn create_mcp_service<E: QueryExecutor + 'static>(
    router: Arc<Router<E>>,
    cancellation_token: CancellationToken,
) -> StreamableHttpService<McpServer<E>, LocalSessionManager> {
    // Service factory: one handler instance per session.
    let service_factory = move || -> Result<McpServer<E>, std::io::Error> {
        Ok(McpServer::new(Arc::clone(&router)))
    };

    let config = StreamableHttpServerConfig::default()
        .with_sse_keep_alive(None)
        .with_sse_retry(None)
        .with_stateful_mode(true)
        .with_cancellation_token(cancellation_token);

    StreamableHttpService::new(
        service_factory,
        LocalSessionManager::default().into(),
        config,
    )
}

/// Serve a single MCP session over stdin/stdout. Returns when the client
/// closes the stream.
pub async fn serve_stdio<E: QueryExecutor + 'static>(
    router: Arc<Router<E>>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("serving MCP over stdio");
    let service = McpServer::new(router).serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}

/// Serve MCP over Streamable HTTP at `/mcp`.
pub async fn serve_http<E: QueryExecutor + 'static>(
    router: Arc<Router<E>>,
    host: IpAddr,
    port: u16,
    cancellation_token: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let mcp_service = create_mcp_service(router, cancellation_token);
    let app = axum::Router::new()
        .nest_service("/mcp", mcp_service)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("MCP server listening on http://{addr}/mcp");
    axum::serve(listener, app).await?;
    Ok(())
}
