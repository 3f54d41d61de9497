//! Durable store maintenance tools.

use offgrid_core::CacheDb;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use serde_json::json;

use super::json_result;

/// Delete every cached response.
pub async fn purge_impl(db: &CacheDb) -> Result<CallToolResult, McpError> {
    let deleted = db.purge_all().await?;
    json_result(&json!({ "deleted": deleted }))
}

pub async fn namespaces_impl(db: &CacheDb) -> Result<CallToolResult, McpError> {
    let namespaces = db.list_namespaces().await?;
    json_result(&json!({ "namespaces": namespaces }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::fetch::{FetchParams, fetch_impl};
    use crate::tools::fixture::{fixture, output};

    #[tokio::test]
    async fn test_namespaces_then_purge() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/img/a.png").with_status(200).with_body("A").create_async().await;
        let f = fixture(&server.url()).await;
        let image = FetchParams {
            method: "GET".into(),
            url: "/img/a.png".into(),
            destination: Some("image".into()),
            headers: Default::default(),
            body: None,
        };
        fetch_impl(&f.interceptor, image).await.unwrap();

        let listed = output(&namespaces_impl(f.interceptor.db()).await.unwrap());
        let purged = output(&purge_impl(f.interceptor.db()).await.unwrap());
        let after = output(&namespaces_impl(f.interceptor.db()).await.unwrap());

        assert_eq!(listed["namespaces"], json!(["images"]));
        assert_eq!(purged["deleted"], 1);
        assert_eq!(after["namespaces"], json!([]));
    }
}
