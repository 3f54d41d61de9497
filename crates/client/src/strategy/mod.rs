//! Caching strategies.
//!
//! A strategy decides how a route's response is produced and how its
//! namespace is updated. Strategies are the only writers of cache entries.

mod cache_first;
mod network_first;
mod network_only;
mod stale_while_revalidate;

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use offgrid_core::{Error, NamespaceHandle};

use crate::fetch::{Request, Response, Transport};

pub use cache_first::CacheFirst;
pub use network_first::NetworkFirst;
pub use network_only::NetworkOnly;
pub use stale_while_revalidate::StaleWhileRevalidate;

#[async_trait]
pub trait Strategy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    async fn execute(
        &self, transport: &Arc<dyn Transport>, request: &Request, namespace: &NamespaceHandle,
    ) -> Result<Response, Error>;
}

/// Cached response for `request`, if any.
pub(crate) async fn lookup(namespace: &NamespaceHandle, request: &Request) -> Result<Option<Response>, Error> {
    let entry = namespace.get(&request.request_key()).await?;
    match &entry {
        Some(_) => tracing::debug!(namespace = namespace.name(), url = %request.url, "cache hit"),
        None => tracing::debug!(namespace = namespace.name(), url = %request.url, "cache miss"),
    }
    Ok(entry.map(Response::from_entry))
}

/// Store a network response. A failed write is logged; the response is still served.
pub(crate) async fn store(namespace: &NamespaceHandle, request: &Request, response: &Response) {
    if !response.is_cacheable() {
        tracing::debug!(url = %request.url, "opaque response not cached");
        return;
    }
    if let Err(e) = namespace.put(&response.to_entry(namespace.name(), request)).await {
        tracing::warn!(namespace = namespace.name(), url = %request.url, error = %e, "cache write failed");
    }
}
