//! sync tool implementation.

use offgrid_client::Interceptor;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::json_result;

/// Connectivity regained: drain every retry queue once.
pub async fn sync_impl(interceptor: &Interceptor) -> Result<CallToolResult, McpError> {
    let report = interceptor.sync().await;
    json_result(&report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fetch::{FetchParams, fetch_impl};
    use crate::tools::fixture::{UNREACHABLE, fixture, output};
    use crate::tools::state_impl;

    #[tokio::test]
    async fn test_sync_while_offline_keeps_record() {
        let f = fixture(UNREACHABLE).await;
        let create = FetchParams {
            method: "POST".into(),
            url: "/task/create".into(),
            destination: None,
            headers: Default::default(),
            body: Some(r#"{"body":"buy milk"}"#.into()),
        };
        fetch_impl(&f.interceptor, create).await.unwrap_err();

        let report = output(&sync_impl(&f.interceptor).await.unwrap());

        assert_eq!(report["failed"].as_array().unwrap().len(), 1);
        assert_eq!(report["failed"][0]["attempt_count"], 1);
        let state = output(&state_impl(&f.interceptor, &f.coordinator).await.unwrap());
        assert_eq!(state["pending"]["task-queue"], 1);
    }
}
