//! MCP server adapter.
//!
//! Thin boundary between rmcp's protocol machinery and the
//! transport-agnostic core: `tools/list` renders the registry's declared
//! schemas, `tools/call` converts the protocol request into a
//! [`ToolCallRequest`] and hands it to the router. All outcomes come
//! back as completed responses; a failing call never fails the session.

use std::sync::Arc;

use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParams, ServerCapabilities, ServerInfo, Tool, ToolsCapability,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer};

use crate::router::{Router, ToolCallRequest};
use crate::warehouse::QueryExecutor;

pub struct McpServer<E: QueryExecutor> {
    router: Arc<Router<E>>,
}

impl<E: QueryExecutor> Clone for McpServer<E> {
    fn clone(&self) -> Self {
        Self {
            router: Arc::clone(&self.router),
        }
    }
}

impl<E: QueryExecutor> McpServer<E> {
    pub fn new(router: Arc<Router<E>>) -> Self {
        Self { router }
    }
}

impl<E: QueryExecutor + 'static> ServerHandler for McpServer<E> {
    fn get_info(&self) -> ServerInfo {
        let mut capabilities = ServerCapabilities::default();
        capabilities.tools = Some(ToolsCapability { list_changed: None });
        let mut info = ServerInfo::new(capabilities);
        info.server_info = Implementation::new("lakeview", env!("CARGO_PKG_VERSION"))
            .with_title("Lakeview warehouse");
        info.instructions = Some(
            "Query a software-engineering analytics warehouse: commits, pull \
             requests, issues, CI pipeline runs, and projects. List tools are \
             paginated; pass the returned next_cursor to continue a listing."
                .to_string(),
        );
        info
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self
            .router
            .registry()
            .iter()
            .map(|def| Tool::new(def.name, def.description, def.input.to_json_schema()))
            .collect();

        Ok(ListToolsResult {
            next_cursor: None,
            tools,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let call = ToolCallRequest {
            id: context.id.to_string(),
            tool: request.name.to_string(),
            arguments: request.arguments.unwrap_or_default(),
            timeout_ms: None,
        };

        let result = self.router.dispatch(call, context.ct.clone()).await;
        let envelope = result.to_envelope();
        let is_error = result.outcome.is_err();

        let text =
            serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| envelope.to_string());
        if is_error {
            Ok(CallToolResult::error(vec![Content::text(text)]))
        } else {
            Ok(CallToolResult::success(vec![Content::text(text)]))
        }
    }
}
