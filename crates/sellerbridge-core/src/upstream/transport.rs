//! HTTP transport for the marketplace API, backed by reqwest.

use reqwest::{header, Client, Method};
use sellerbridge_types::UpstreamError;
use std::time::Duration;

use crate::external::{TransportRequest, TransportResponse, UpstreamTransport};

/// Per-attempt wire deadline, separate from the caller's overall budget.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// reqwest-backed [`UpstreamTransport`].
///
/// Hands back every HTTP status as a response; only transport-level
/// failures (connect, DNS, TLS, deadline) become errors. The protected
/// client owns status classification.
pub struct HttpTransport {
    http_client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport against the given marketplace base URL.
    ///
    /// Accepts a pre-built `reqwest::Client` so TLS initialization happens
    /// once at startup, not inside the request path.
    pub fn new(http_client: Client, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn parse_retry_after(headers: &header::HeaderMap) -> Option<u64> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

#[async_trait::async_trait]
impl UpstreamTransport for HttpTransport {
    async fn call(
        &self,
        request: &TransportRequest,
        token: &str,
    ) -> Result<TransportResponse, UpstreamError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| UpstreamError::Network {
                message: format!("invalid HTTP method: {}", request.method),
            })?;

        let url = self.build_url(&request.path);
        let mut builder = self
            .http_client
            .request(method, &url)
            .bearer_auth(token)
            .timeout(self.request_timeout);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout { budget_ms: self.request_timeout.as_millis() as u64 }
            } else {
                UpstreamError::Network { message: e.to_string() }
            }
        })?;

        let status = response.status().as_u16();
        let retry_after_secs = parse_retry_after(response.headers());
        let raw = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw));

        Ok(TransportResponse { status, body, retry_after_secs })
    }
}
