//! Network transport.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use offgrid_core::{AppConfig, Error};
use reqwest::Client;

use super::{Destination, Request, Response};
use crate::signals::{ErrorSignal, ErrorSignals};

/// Anything that can put a request on the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// User agent string (default: "offgrid/0.1")
    pub user_agent: String,

    /// Hard request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { user_agent: "offgrid/0.1".to_string(), timeout: Duration::from_millis(20_000), max_redirects: 5 }
    }
}

impl From<&AppConfig> for TransportConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.timeout(), ..Default::default() }
    }
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http: Client,
    signals: ErrorSignals,
}

impl HttpTransport {
    /// Create a transport that reports classification mismatches on `signals`.
    pub fn new(config: TransportConfig, signals: ErrorSignals) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::NetworkFailure(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, signals })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let mut builder = self.http.request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| classify_send_error(request, &e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();

        let body = response.bytes().await.map_err(|e| classify_send_error(request, &e))?;

        let response = Response { headers, ..Response::new(status, final_url, body) };

        if let Some(expected) = expected_content_type(request.destination) {
            let actual = response.content_type().unwrap_or("").to_string();
            if !matches_classification(request.destination, &actual) {
                tracing::warn!(url = %request.url, expected, actual = %actual, "response classification mismatch");
                self.signals.emit(ErrorSignal::MalformedResponse {
                    url: request.url.to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        tracing::debug!(
            "{} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status,
            start.elapsed().as_millis(),
            response.body.len()
        );

        Ok(response)
    }
}

fn classify_send_error(request: &Request, err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{} {}: {err}", request.method, request.url))
    } else {
        Error::NetworkFailure(format!("{} {}: {err}", request.method, request.url))
    }
}

/// Content type a destination must be served with, if it is checked at all.
pub fn expected_content_type(destination: Destination) -> Option<&'static str> {
    match destination {
        Destination::Script | Destination::Worker => Some("application/javascript"),
        Destination::Style => Some("text/css"),
        _ => None,
    }
}

/// Whether `content_type` is acceptable for `destination`.
pub fn matches_classification(destination: Destination, content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    match destination {
        Destination::Script | Destination::Worker => essence.ends_with("javascript") || essence.ends_with("ecmascript"),
        Destination::Style => essence == "text/css",
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.user_agent, "offgrid/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20_000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_transport_config_from_app_config() {
        let app = AppConfig { user_agent: "tasks/2".into(), timeout_ms: 1_500, ..Default::default() };
        let config = TransportConfig::from(&app);
        assert_eq!(config.user_agent, "tasks/2");
        assert_eq!(config.timeout, Duration::from_millis(1_500));
    }

    #[test]
    fn test_classification() {
        assert!(matches_classification(Destination::Script, "application/javascript; charset=utf-8"));
        assert!(matches_classification(Destination::Script, "text/javascript"));
        assert!(!matches_classification(Destination::Script, "text/html"));
        assert!(!matches_classification(Destination::Worker, ""));
        assert!(matches_classification(Destination::Style, "text/css"));
        assert!(!matches_classification(Destination::Style, "text/plain"));
        assert!(matches_classification(Destination::Image, "text/html"));
    }

    #[tokio::test]
    async fn test_http_fetch_returns_non_success_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/img/missing.png")
            .with_status(404)
            .with_header("content-type", "text/plain")
            .with_body("nope")
            .create_async()
            .await;

        let transport = HttpTransport::new(TransportConfig::default(), ErrorSignals::new()).unwrap();
        let request = Request::get(&format!("{}/img/missing.png", server.url())).unwrap();
        let response = transport.fetch(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.status, 404);
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.body.as_ref(), b"nope");
    }

    #[tokio::test]
    async fn test_http_post_sends_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/task/create")
            .match_body(mockito::Matcher::JsonString(r#"{"body":"buy milk","priority":1}"#.into()))
            .with_status(201)
            .create_async()
            .await;

        let transport = HttpTransport::new(TransportConfig::default(), ErrorSignals::new()).unwrap();
        let request = Request::post(&format!("{}/task/create", server.url()))
            .unwrap()
            .with_json(&serde_json::json!({"body": "buy milk", "priority": 1}))
            .unwrap();

        let response = transport.fetch(&request).await.unwrap();
        mock.assert_async().await;
        assert_eq!(response.status, 201);
    }

    #[tokio::test]
    async fn test_script_served_as_html_emits_signal() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/assets/app.js")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<!doctype html>")
            .create_async()
            .await;

        let signals = ErrorSignals::new();
        let mut rx = signals.subscribe();
        let transport = HttpTransport::new(TransportConfig::default(), signals).unwrap();
        let request = Request::get(&format!("{}/assets/app.js", server.url()))
            .unwrap()
            .with_destination(Destination::Script);

        let response = transport.fetch(&request).await.unwrap();
        assert_eq!(response.status, 200);

        match rx.try_recv().unwrap() {
            ErrorSignal::MalformedResponse { expected, actual, .. } => {
                assert_eq!(expected, "application/javascript");
                assert_eq!(actual, "text/html");
            }
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_failure() {
        let transport = HttpTransport::new(
            TransportConfig { timeout: Duration::from_secs(2), ..Default::default() },
            ErrorSignals::new(),
        )
        .unwrap();
        let request = Request::get("http://127.0.0.1:9/unreachable").unwrap();
        let err = transport.fetch(&request).await.unwrap_err();
        assert!(err.is_transient(), "{err}");
    }
}
