//! Recovery and status tools.

use std::collections::BTreeMap;

use offgrid_client::{HostCoordinator, Interceptor, LifecycleState, ManualAction};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::json_result;

/// A manual recovery action offered in the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    Reload,
    RestartInterceptor,
    ClearCaches,
}

impl From<RecoveryAction> for ManualAction {
    fn from(action: RecoveryAction) -> Self {
        match action {
            RecoveryAction::Reload => ManualAction::Reload,
            RecoveryAction::RestartInterceptor => ManualAction::RestartInterceptor,
            RecoveryAction::ClearCaches => ManualAction::ClearCaches,
        }
    }
}

/// Parameters for the recover tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RecoverParams {
    pub action: RecoveryAction,
}

/// Snapshot of the agent's state.
#[derive(Debug, Clone, Serialize)]
pub struct StateOutput {
    pub lifecycle: LifecycleState,
    pub active_version: Option<String>,
    pub waiting_version: Option<String>,
    pub retry_count: u32,
    pub reload_pending: bool,
    /// Pending replay records per retry queue.
    pub pending: BTreeMap<String, u64>,
}

/// Run the page-load recovery checks.
pub async fn load_impl(coordinator: &HostCoordinator) -> Result<CallToolResult, McpError> {
    let outcome = coordinator.run_on_load().await?;
    json_result(&outcome)
}

pub async fn recover_impl(coordinator: &HostCoordinator, params: RecoverParams) -> Result<CallToolResult, McpError> {
    coordinator.perform(params.action.into()).await?;
    json_result(&json!({ "performed": params.action }))
}

pub async fn state_impl(interceptor: &Interceptor, coordinator: &HostCoordinator) -> Result<CallToolResult, McpError> {
    let lifecycle = interceptor.lifecycle();
    let db = interceptor.db();
    let mut pending = BTreeMap::new();
    for queue in db.queue_names().await? {
        let n = db.queue_len(&queue).await?;
        pending.insert(queue, n);
    }

    json_result(&StateOutput {
        lifecycle: lifecycle.current_state(),
        active_version: lifecycle.active_version(),
        waiting_version: lifecycle.waiting_version(),
        retry_count: coordinator.retry_count().await?,
        reload_pending: coordinator.scheduler().is_pending(),
        pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fixture::{UNREACHABLE, fixture, next_notification, output};

    #[tokio::test]
    async fn test_load_against_unreachable_origin_requests_reload() {
        let mut f = fixture(UNREACHABLE).await;

        let result = output(&load_impl(&f.coordinator).await.unwrap());

        assert_eq!(result["outcome"], "reload_scheduled");
        assert_eq!(next_notification(&mut f.out_rx).await["type"], "RELOAD");
        let state = output(&state_impl(&f.interceptor, &f.coordinator).await.unwrap());
        assert_eq!(state["retry_count"], 1);
    }

    #[tokio::test]
    async fn test_manual_reload_reaches_host() {
        let mut f = fixture(UNREACHABLE).await;

        let result =
            output(&recover_impl(&f.coordinator, RecoverParams { action: RecoveryAction::Reload }).await.unwrap());

        assert_eq!(result["performed"], "reload");
        assert_eq!(next_notification(&mut f.out_rx).await["type"], "RELOAD");
    }

    #[tokio::test]
    async fn test_state_of_fresh_agent() {
        let f = fixture(UNREACHABLE).await;

        let state = output(&state_impl(&f.interceptor, &f.coordinator).await.unwrap());

        assert_eq!(state["lifecycle"], "redundant");
        assert!(state["active_version"].is_null());
        assert_eq!(state["retry_count"], 0);
        assert_eq!(state["pending"], json!({}));
    }
}
