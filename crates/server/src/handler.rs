//! MCP server handler.
//!
//! Routes tool calls to the interceptor and the host coordinator. Failures
//! come back as MCP errors whose data carries the offgrid error `kind`, and
//! `queued` when a mutation was kept for replay.
use std::sync::Arc;

use offgrid_client::{HostCoordinator, Interceptor};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::{
    DeclineUpdateParams, FetchParams, LifecycleParams, RecoverParams, accept_update_impl, activate_waiting_impl,
    decline_update_impl, fetch_impl, lifecycle_impl, load_impl, namespaces_impl, purge_impl, recover_impl,
    state_impl, sync_impl,
};

#[derive(Clone)]
pub struct OffgridServer {
    interceptor: Arc<Interceptor>,
    coordinator: Arc<HostCoordinator>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl OffgridServer {
    pub fn new(interceptor: Arc<Interceptor>, coordinator: Arc<HostCoordinator>) -> Self {
        Self { interceptor, coordinator, tool_router: Self::tool_router() }
    }

    /// Route one request through the offline layer.
    #[tool(description = "Fetch a URL through the offline interception layer. Uses the matching route's caching strategy; failed mutations are queued for replay.")]
    async fn fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.interceptor, params.0).await
    }

    #[tool(description = "Connectivity regained: replay every queued mutation once and report the outcome.")]
    async fn sync(&self) -> Result<CallToolResult, McpError> {
        sync_impl(&self.interceptor).await
    }

    #[tool(description = "Report an interceptor lifecycle event (installing, installed, activating, activated, error) from the hosting runtime.")]
    async fn lifecycle(&self, params: Parameters<LifecycleParams>) -> Result<CallToolResult, McpError> {
        lifecycle_impl(&self.interceptor, params.0).await
    }

    #[tool(description = "Activate the waiting interceptor version, if any, without reloading.")]
    async fn activate_waiting(&self) -> Result<CallToolResult, McpError> {
        activate_waiting_impl(&self.interceptor).await
    }

    #[tool(description = "Accept the pending update: activate the waiting version and schedule a reload.")]
    async fn accept_update(&self) -> Result<CallToolResult, McpError> {
        accept_update_impl(&self.coordinator).await
    }

    #[tool(description = "Decline an update; the version is not offered again.")]
    async fn decline_update(&self, params: Parameters<DeclineUpdateParams>) -> Result<CallToolResult, McpError> {
        decline_update_impl(&self.coordinator, params.0).await
    }

    /// Page-load checks. Runs once per session unless a manual action resets it.
    #[tool(description = "Run the page-load recovery checks: critical resource integrity and malformed response watch.")]
    async fn load(&self) -> Result<CallToolResult, McpError> {
        load_impl(&self.coordinator).await
    }

    #[tool(description = "Perform a manual recovery action: reload, restart_interceptor or clear_caches.")]
    async fn recover(&self, params: Parameters<RecoverParams>) -> Result<CallToolResult, McpError> {
        recover_impl(&self.coordinator, params.0).await
    }

    #[tool(description = "Report lifecycle state, versions, recovery retry count and pending queue lengths.")]
    async fn state(&self) -> Result<CallToolResult, McpError> {
        state_impl(&self.interceptor, &self.coordinator).await
    }

    #[tool(description = "Delete every cached response.")]
    async fn purge(&self) -> Result<CallToolResult, McpError> {
        purge_impl(self.interceptor.db()).await
    }

    #[tool(description = "List cache namespaces that hold entries.")]
    async fn namespaces(&self) -> Result<CallToolResult, McpError> {
        namespaces_impl(self.interceptor.db()).await
    }
}

impl ServerHandler for OffgridServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "offgrid-agent".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_logging().enable_tools().build(),
            instructions: Some(
                "Host events (SW_ACTIVATED, OFFLINE_READY, UPDATE_AVAILABLE, SW_RESOURCE_ERROR, \
                 REGISTRATION_ERROR), RELOAD requests and background SYNC/LOAD reports arrive as \
                 logging notifications from logger \"offgrid\"."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router.call(ToolCallContext::new(self, request, context)).await
    }
}
