//! Test doubles shared by the module tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use offgrid_core::Error;

use crate::fetch::{Request, Response, Transport};
use crate::host::Reloader;
use crate::signals::{ErrorSignal, ErrorSignals};

#[derive(Debug, Clone)]
struct Canned {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
}

/// Scriptable transport: canned responses per URL, an online switch,
/// artificial latency and a call log. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MockTransport {
    offline: AtomicBool,
    latency: Mutex<Duration>,
    routes: Mutex<HashMap<String, Canned>>,
    calls: Mutex<Vec<Request>>,
    signals: Option<ErrorSignals>,
    failures_left: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a malformed-response signal for script requests answered with HTML.
    pub fn with_signals(signals: ErrorSignals) -> Self {
        Self { signals: Some(signals), ..Self::default() }
    }

    pub fn respond(&self, url: &str, status: u16, body: &'static str) {
        self.respond_with(url, status, vec![], body);
    }

    pub fn respond_with(&self, url: &str, status: u16, headers: Vec<(&str, &str)>, body: &'static str) {
        let headers = headers.into_iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Canned { status, headers, body: Bytes::from_static(body.as_bytes()) });
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Fail the next `n` calls with a network error, then recover.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|r| r.url.as_str() == url).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        self.calls.lock().unwrap().push(request.clone());

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::NetworkFailure(format!("offline: {}", request.url)));
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::NetworkFailure(format!("flaky: {}", request.url)));
        }

        let canned = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
        let response = match canned {
            Some(c) => Response { headers: c.headers, ..Response::new(c.status, request.url.as_str(), c.body) },
            None => Response::new(404, request.url.as_str(), Bytes::new()),
        };

        if let Some(signals) = &self.signals
            && request.destination == crate::fetch::Destination::Script
            && response.content_type() == Some("text/html")
        {
            signals.emit(ErrorSignal::MalformedResponse {
                url: request.url.to_string(),
                expected: "application/javascript".into(),
                actual: "text/html".into(),
            });
        }

        Ok(response)
    }
}

/// Counts reloads.
#[derive(Debug, Default)]
pub struct CountingReloader {
    reloads: AtomicUsize,
}

impl CountingReloader {
    pub fn count(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Reloader for CountingReloader {
    async fn reload(&self) {
        self.reloads.fetch_add(1, Ordering::SeqCst);
    }
}
