//! Request/response model and the network transport.
//!
//! ### Request keys
//! - URLs are normalized before they reach a strategy (host lowercased,
//!   fragment dropped, query preserved, relative paths resolved against the
//!   application origin).
//! - The cache key is `sha256(METHOD \n URL \n VARY)`; the retry-queue
//!   resource key is the normalized URL itself.
//!
//! ### Transport
//! - Any HTTP status is a response; only transport failures are errors.
//! - Script, worker and style responses are classified by content type and
//!   mismatches are published on the error-signal channel.

pub mod transport;
pub mod url;

use bytes::Bytes;
use offgrid_core::cache::compute_request_key;
use offgrid_core::{CacheEntry, Error, QueuedMutation};
pub use reqwest::Method;
use serde::{Deserialize, Serialize};

pub use self::url::{UrlError, normalize_url, same_origin};
pub use transport::{HttpTransport, Transport, TransportConfig};

/// Resource-type hint of a request, as the browser reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    Worker,
    /// fetch()/XHR and anything without a more specific type.
    #[default]
    Empty,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: ::url::Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
    pub destination: Destination,
    pub same_origin: bool,
    /// Header names whose values take part in the cache key.
    pub vary: Vec<String>,
}

impl Request {
    pub fn new(method: Method, url: ::url::Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
            destination: Destination::Empty,
            same_origin: true,
            vary: Vec::new(),
        }
    }

    /// Parse and normalize `input` (absolute, or relative to `origin`).
    ///
    /// The same-origin flag is derived from `origin` when given.
    pub fn parse(method: Method, input: &str, origin: Option<&::url::Url>) -> Result<Self, Error> {
        let url = normalize_url(input, origin)?;
        let same_origin = origin.is_none_or(|o| same_origin(o, &url));
        Ok(Self { same_origin, ..Self::new(method, url) })
    }

    pub fn get(url: &str) -> Result<Self, Error> {
        Self::parse(Method::GET, url, None)
    }

    pub fn head(url: &str) -> Result<Self, Error> {
        Self::parse(Method::HEAD, url, None)
    }

    pub fn post(url: &str) -> Result<Self, Error> {
        Self::parse(Method::POST, url, None)
    }

    pub fn patch(url: &str) -> Result<Self, Error> {
        Self::parse(Method::PATCH, url, None)
    }

    pub fn delete(url: &str) -> Result<Self, Error> {
        Self::parse(Method::DELETE, url, None)
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `value` as the JSON body and set the content type.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value)?;
        Ok(self.with_header("content-type", "application/json").with_body(body))
    }

    /// Key cache entries on the values of `names` as well as method and URL.
    pub fn varying_on(mut self, names: &[String]) -> Self {
        self.vary = names.to_vec();
        self
    }

    pub fn cross_origin(mut self) -> Self {
        self.same_origin = false;
        self
    }

    /// Non-idempotent methods that are eligible for the retry queue.
    pub fn is_mutating(&self) -> bool {
        matches!(self.method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Cache key for this request. Absent vary headers count as empty.
    pub fn request_key(&self) -> String {
        let vary: Vec<String> = self
            .vary
            .iter()
            .map(|name| format!("{}={}", name.to_ascii_lowercase(), self.header(name).unwrap_or_default()))
            .collect();
        compute_request_key(self.method.as_str(), self.url.as_str(), &vary.join("\n"))
    }

    /// Mutations with equal resource keys must replay in order.
    pub fn resource_key(&self) -> String {
        self.url.as_str().to_string()
    }

    /// Rebuild the original request from a queued mutation.
    pub fn from_mutation(mutation: &QueuedMutation) -> Result<Self, Error> {
        let method = Method::from_bytes(mutation.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("bad method {:?}: {e}", mutation.method)))?;
        let url = ::url::Url::parse(&mutation.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            headers: mutation.headers.clone(),
            body: mutation.body.clone().map(Bytes::from),
            ..Self::new(method, url)
        })
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
}

/// A response handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Final URL of the response.
    pub url: String,
    /// Opaque responses (cross-origin, no-cors) are never cached.
    pub opaque: bool,
    pub source: ResponseSource,
}

impl Response {
    pub fn new(status: u16, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            url: url.into(),
            opaque: false,
            source: ResponseSource::Network,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Every non-opaque response is cache-worthy, 404s and 500s included.
    pub fn is_cacheable(&self) -> bool {
        !self.opaque
    }

    pub fn from_entry(entry: CacheEntry) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers,
            body: Bytes::from(entry.body),
            url: entry.url,
            opaque: false,
            source: ResponseSource::Cache,
        }
    }

    pub fn to_entry(&self, namespace: &str, request: &Request) -> CacheEntry {
        CacheEntry::new(
            namespace,
            request.request_key(),
            request.method.as_str(),
            request.url.as_str(),
            self.status,
            self.headers.clone(),
            self.body.to_vec(),
        )
    }
}
