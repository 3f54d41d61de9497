//! fetch tool implementation.
//!
//! Routes one host request through the interceptor.

use std::collections::BTreeMap;

use offgrid_client::{Destination, Interceptor, Method, Response, ResponseSource};
use offgrid_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// HTTP method (default GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Absolute URL, or a path relative to the configured origin.
    pub url: String,

    /// Resource type: document, image, script, style, font, manifest, worker or empty.
    #[serde(default)]
    pub destination: Option<String>,

    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body as text.
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output of the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchOutput {
    pub status: u16,
    /// Final URL of the response.
    pub url: String,
    /// "network" or "cache".
    pub source: String,
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8, lossily.
    pub body: String,
}

impl From<&Response> for FetchOutput {
    fn from(response: &Response) -> Self {
        let source = match response.source {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
        };
        Self {
            status: response.status,
            url: response.url.clone(),
            source: source.into(),
            headers: response.headers.iter().cloned().collect(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }
    }
}

fn parse_destination(raw: &str) -> Result<Destination, Error> {
    serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase()))
        .map_err(|_| Error::InvalidInput(format!("unknown destination {raw:?}")))
}

/// Implementation of the fetch tool.
///
/// A mutation that failed offline and was queued comes back as an error
/// whose data carries `queued: {queue, id}`.
pub async fn fetch_impl(interceptor: &Interceptor, params: FetchParams) -> Result<CallToolResult, McpError> {
    let method = Method::from_bytes(params.method.to_ascii_uppercase().as_bytes())
        .map_err(|e| Error::InvalidInput(format!("bad method {:?}: {e}", params.method)))?;
    let destination = params.destination.as_deref().map(parse_destination).transpose()?.unwrap_or_default();

    let mut request = interceptor.request(method, &params.url, destination)?;
    for (name, value) in params.headers {
        request = request.with_header(name, value);
    }
    if let Some(body) = params.body {
        request = request.with_body(body);
    }

    let response = interceptor.handle(&request).await?;
    json_result(&FetchOutput::from(&response))
}
