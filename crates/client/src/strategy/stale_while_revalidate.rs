use std::sync::Arc;

use async_trait::async_trait;
use offgrid_core::{Error, NamespaceHandle};

use super::{Strategy, lookup, store};
use crate::fetch::{Request, Response, Transport};

/// Answer from cache immediately and refresh the entry in the background.
///
/// On a miss the caller waits for the network and the result seeds the cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaleWhileRevalidate;

#[async_trait]
impl Strategy for StaleWhileRevalidate {
    fn name(&self) -> &'static str {
        "stale-while-revalidate"
    }

    async fn execute(
        &self, transport: &Arc<dyn Transport>, request: &Request, namespace: &NamespaceHandle,
    ) -> Result<Response, Error> {
        let cached = match lookup(namespace, request).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "cache lookup failed, going to network");
                None
            }
        };

        let Some(cached) = cached else {
            let response = transport.fetch(request).await?;
            store(namespace, request, &response).await;
            return Ok(response);
        };

        let transport = Arc::clone(transport);
        let request = request.clone();
        let namespace = namespace.clone();
        tokio::spawn(async move {
            match transport.fetch(&request).await {
                Ok(fresh) => store(&namespace, &request, &fresh).await,
                Err(e) => tracing::warn!(url = %request.url, error = %e, "revalidation failed"),
            }
        });

        Ok(cached)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fetch::{Destination, ResponseSource};
    use crate::testing::MockTransport;
    use offgrid_core::CacheDb;

    const APP_JS: &str = "http://localhost:3000/assets/app.js";

    fn script() -> Request {
        Request::get(APP_JS).unwrap().with_destination(Destination::Script)
    }

    async fn wait_for_body(ns: &NamespaceHandle, key: &str, body: &[u8]) -> bool {
        for _ in 0..100 {
            if let Some(entry) = ns.get(key).await.unwrap()
                && entry.body == body
            {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_miss_blocks_on_network_and_seeds_cache() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.respond(APP_JS, 200, "v1");
        let transport: Arc<dyn Transport> = mock.clone();
        let ns = db.open_namespace("static-resources");

        let response = StaleWhileRevalidate.execute(&transport, &script(), &ns).await.unwrap();

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.body.as_ref(), b"v1");
        assert_eq!(ns.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hit_returns_stale_then_refreshes() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.respond(APP_JS, 200, "v1");
        let transport: Arc<dyn Transport> = mock.clone();
        let ns = db.open_namespace("static-resources");
        let request = script();
        StaleWhileRevalidate.execute(&transport, &request, &ns).await.unwrap();

        mock.respond(APP_JS, 200, "v2");
        let stale = StaleWhileRevalidate.execute(&transport, &request, &ns).await.unwrap();

        assert_eq!(stale.source, ResponseSource::Cache);
        assert_eq!(stale.body.as_ref(), b"v1");
        assert!(wait_for_body(&ns, &request.request_key(), b"v2").await);
    }

    #[tokio::test]
    async fn test_hit_does_not_wait_for_slow_network() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.respond(APP_JS, 200, "v1");
        let transport: Arc<dyn Transport> = mock.clone();
        let ns = db.open_namespace("static-resources");
        let request = script();
        StaleWhileRevalidate.execute(&transport, &request, &ns).await.unwrap();

        mock.set_latency(Duration::from_secs(5));
        let started = std::time::Instant::now();
        let response = StaleWhileRevalidate.execute(&transport, &request, &ns).await.unwrap();

        assert_eq!(response.body.as_ref(), b"v1");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_failed_revalidation_keeps_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.respond(APP_JS, 200, "v1");
        let transport: Arc<dyn Transport> = mock.clone();
        let ns = db.open_namespace("static-resources");
        let request = script();
        StaleWhileRevalidate.execute(&transport, &request, &ns).await.unwrap();

        mock.set_online(false);
        let response = StaleWhileRevalidate.execute(&transport, &request, &ns).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(response.body.as_ref(), b"v1");
        assert_eq!(ns.get(&request.request_key()).await.unwrap().unwrap().body, b"v1");
    }

    #[tokio::test]
    async fn test_miss_while_offline_propagates() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let mock = Arc::new(MockTransport::new());
        mock.set_online(false);
        let transport: Arc<dyn Transport> = mock.clone();
        let ns = db.open_namespace("static-resources");

        let err = StaleWhileRevalidate.execute(&transport, &script(), &ns).await.unwrap_err();
        assert!(err.is_transient());
    }
}
