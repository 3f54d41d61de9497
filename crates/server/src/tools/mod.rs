//! MCP tool implementations.
//!
//! Each tool takes its parameters, drives the interceptor or the host
//! coordinator and answers with one JSON text block.

pub mod fetch;
pub mod lifecycle;
pub mod recovery;
pub mod store;
pub mod sync;

use offgrid_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

pub use fetch::{FetchParams, fetch_impl};
pub use lifecycle::{
    DeclineUpdateParams, LifecycleParams, accept_update_impl, activate_waiting_impl, decline_update_impl,
    lifecycle_impl,
};
pub use recovery::{RecoverParams, load_impl, recover_impl, state_impl};
pub use store::{namespaces_impl, purge_impl};
pub use sync::sync_impl;

/// Wrap `output` as the tool's single JSON text block.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::Serialization(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
