use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use offgrid_core::{Error, NamespaceHandle};

use super::{Strategy, lookup, store};
use crate::fetch::{Request, Response, Transport};

/// Race the network against a timer; fall back to the cache when the timer
/// wins or the network fails.
///
/// The timeout is wall-clock from the start of the request. A network
/// answer that loses the race is still written to the cache when it lands.
#[derive(Debug, Clone, Copy)]
pub struct NetworkFirst {
    timeout: Duration,
}

impl NetworkFirst {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Strategy for NetworkFirst {
    fn name(&self) -> &'static str {
        "network-first"
    }

    async fn execute(
        &self, transport: &Arc<dyn Transport>, request: &Request, namespace: &NamespaceHandle,
    ) -> Result<Response, Error> {
        let network = {
            let transport = Arc::clone(transport);
            let request = request.clone();
            let namespace = namespace.clone();
            tokio::spawn(async move {
                let response = transport.fetch(&request).await?;
                store(&namespace, &request, &response).await;
                Ok::<_, Error>(response)
            })
        };

        let failure = match tokio::time::timeout(self.timeout, network).await {
            Ok(Ok(Ok(response))) => return Ok(response),
            Ok(Ok(Err(e))) => e,
            Ok(Err(join)) => Error::NetworkFailure(format!("network task failed: {join}")),
            Err(_) => Error::FetchTimeout(format!("no network response for {} within {:?}", request.url, self.timeout)),
        };

        match lookup(namespace, request).await {
            Ok(Some(cached)) => {
                tracing::warn!(url = %request.url, error = %failure, "network-first falling back to cache");
                Ok(cached)
            }
            Ok(None) => Err(failure),
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache lookup failed during fallback");
                Err(failure)
            }
        }
    }
}
