//! The interception layer assembled: router, retry queue, lifecycle and signals.

use std::sync::Arc;

use offgrid_core::{AppConfig, CacheDb, Error};
use reqwest::Method;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use url::Url;

use crate::fetch::{Destination, Request, Response, Transport, normalize_url};
use crate::lifecycle::{LifecycleController, Registration};
use crate::queue::{DrainReport, RetryPolicy, RetryQueue};
use crate::router::{Router, default_rules};
use crate::signals::ErrorSignals;

pub struct Interceptor {
    origin: Url,
    db: CacheDb,
    router: Router,
    queue: Arc<RetryQueue>,
    lifecycle: Arc<LifecycleController>,
    signals: ErrorSignals,
}

impl std::fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor").field("origin", &self.origin.as_str()).finish_non_exhaustive()
    }
}

impl Interceptor {
    /// Build the standard route table over `transport`.
    pub fn from_config(
        config: &AppConfig, db: CacheDb, transport: Arc<dyn Transport>, signals: ErrorSignals,
        registration: Arc<dyn Registration>,
    ) -> Result<Self, Error> {
        let origin = normalize_url(&config.origin, None)?;
        let queue = Arc::new(RetryQueue::new(db.clone(), Arc::clone(&transport), RetryPolicy::from(config)));
        let router = Router::builder(db.clone(), transport)
            .rules(default_rules(config))
            .retry_queue(Arc::clone(&queue))
            .build();
        let lifecycle = Arc::new(LifecycleController::new(registration));

        Ok(Self { origin, db, router, queue, lifecycle, signals })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn db(&self) -> &CacheDb {
        &self.db
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    pub fn lifecycle(&self) -> &Arc<LifecycleController> {
        &self.lifecycle
    }

    pub fn signals(&self) -> &ErrorSignals {
        &self.signals
    }

    /// Parse a host request, resolving relative URLs against the origin.
    pub fn request(&self, method: Method, url: &str, destination: Destination) -> Result<Request, Error> {
        Ok(Request::parse(method, url, Some(&self.origin))?.with_destination(destination))
    }

    pub async fn handle(&self, request: &Request) -> Result<Response, Error> {
        self.router.route(request).await
    }

    /// Connectivity is back: replay everything queued.
    pub async fn sync(&self) -> DrainReport {
        self.queue.drain().await
    }

    /// Republish error signals to the host as resource errors.
    pub fn forward_signals(&self) -> JoinHandle<()> {
        let mut rx = self.signals.subscribe();
        let lifecycle = Arc::clone(&self.lifecycle);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) => lifecycle.report_resource_error(signal.to_string()),
                    Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "error signals dropped"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::fetch::ResponseSource;
    use crate::lifecycle::{HostEvent, InProcessRegistration};
    use crate::signals::ErrorSignal;
    use crate::testing::MockTransport;

    async fn setup() -> (Arc<MockTransport>, Interceptor) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let signals = ErrorSignals::new();
        let mock = Arc::new(MockTransport::with_signals(signals.clone()));
        let interceptor = Interceptor::from_config(
            &AppConfig::default(),
            db,
            mock.clone(),
            signals,
            Arc::new(InProcessRegistration::new()),
        )
        .unwrap();
        (mock, interceptor)
    }

    #[tokio::test]
    async fn test_logo_cached_on_first_fetch() {
        let (mock, interceptor) = setup().await;
        mock.respond_with("http://localhost:3000/img/logo.png", 200, vec![("content-type", "image/png")], "PNG");

        let request = interceptor.request(Method::GET, "/img/logo.png", Destination::Image).unwrap();
        let first = interceptor.handle(&request).await.unwrap();
        let second = interceptor.handle(&request).await.unwrap();

        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(first.body, second.body);
        assert_eq!(mock.calls_to("http://localhost:3000/img/logo.png"), 1);
    }

    #[tokio::test]
    async fn test_offline_task_create_is_queued_then_synced() {
        let (mock, interceptor) = setup().await;
        let body = serde_json::json!({"body": "buy milk", "priority": 1});
        let request = interceptor
            .request(Method::POST, "/task/create", Destination::Empty)
            .unwrap()
            .with_json(&body)
            .unwrap();

        mock.set_online(false);
        let err = interceptor.handle(&request).await.unwrap_err();
        let pending = interceptor.queue().pending("task-queue").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(err.queued(), Some(("task-queue", pending[0].id)));

        mock.set_online(true);
        let report = interceptor.sync().await;

        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(mock.calls_to("http://localhost:3000/task/create"), 2);
        assert_eq!(mock.calls().last().unwrap().body, request.body);
        assert!(interceptor.queue().pending("task-queue").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signals_forwarded_as_resource_errors() {
        let (_mock, interceptor) = setup().await;
        let mut events = interceptor.lifecycle().subscribe();
        let forwarder = interceptor.forward_signals();

        interceptor.signals().emit(ErrorSignal::MalformedResponse {
            url: "http://localhost:3000/assets/app.js".into(),
            expected: "application/javascript".into(),
            actual: "text/html".into(),
        });

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, HostEvent::ResourceError { ref error } if error.contains("app.js")));
        forwarder.abort();
    }
}
