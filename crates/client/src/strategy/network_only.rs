use std::sync::Arc;

use async_trait::async_trait;
use offgrid_core::{Error, NamespaceHandle};

use super::Strategy;
use crate::fetch::{Request, Response, Transport};

/// Straight to the network; the namespace is never read or written.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkOnly;

#[async_trait]
impl Strategy for NetworkOnly {
    fn name(&self) -> &'static str {
        "network-only"
    }

    async fn execute(
        &self, transport: &Arc<dyn Transport>, request: &Request, _namespace: &NamespaceHandle,
    ) -> Result<Response, Error> {
        transport.fetch(request).await
    }
}
