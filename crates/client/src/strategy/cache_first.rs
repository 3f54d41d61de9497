use std::sync::Arc;

use async_trait::async_trait;
use offgrid_core::{Error, NamespaceHandle};

use super::{Strategy, lookup, store};
use crate::fetch::{Request, Response, Transport};

/// Serve from cache; go to the network only on a miss and remember the answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheFirst;

#[async_trait]
impl Strategy for CacheFirst {
    fn name(&self) -> &'static str {
        "cache-first"
    }

    async fn execute(
        &self, transport: &Arc<dyn Transport>, request: &Request, namespace: &NamespaceHandle,
    ) -> Result<Response, Error> {
        if let Some(cached) = lookup(namespace, request).await? {
            return Ok(cached);
        }

        let response = transport.fetch(request).await?;
        store(namespace, request, &response).await;
        Ok(response)
    }
}
