//! HTTP probe logic.
//!
//! Performs one request against an endpoint with its configured method,
//! headers, body and timeout, and folds every outcome (including transport
//! failures) into a `CheckResult`.

use std::error::Error as _;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use tracing::debug;

use vigil_state::{CheckResult, EndpointConfig, epoch_millis};

/// Identifying header sent with every probe unless the endpoint overrides it.
pub const USER_AGENT: &str = concat!("vigil-monitor/", env!("CARGO_PKG_VERSION"));

/// Executes a single check against an endpoint.
///
/// Implementations must never fail: every failure mode is captured in the
/// returned `CheckResult`. They must be safe to call concurrently for
/// different endpoints.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn execute(&self, endpoint: &EndpointConfig) -> CheckResult;
}

/// Only a terminal 2xx counts as up. Redirects are followed by the client,
/// so a 3xx seen here means the chain ended somewhere unexpected.
pub fn is_success_status(code: u16) -> bool {
    (200..300).contains(&code)
}

/// Probe backed by a shared reqwest connection pool.
#[derive(Clone)]
pub struct HttpChecker {
    client: Client,
}

impl HttpChecker {
    /// Create a checker with the default redirect policy.
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn build_request(&self, endpoint: &EndpointConfig) -> Result<RequestBuilder, String> {
        let method = Method::from_bytes(endpoint.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| format!("invalid method {:?}: {e}", endpoint.method))?;

        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(USER_AGENT),
        );
        // User-supplied values replace the defaults on collision.
        for (key, value) in endpoint.headers.iter().flatten() {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| format!("invalid header name {key:?}: {e}"))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| format!("invalid header value for {key:?}: {e}"))?;
            headers.insert(name, value);
        }

        let mut request = self
            .client
            .request(method, &endpoint.url)
            .headers(headers)
            .timeout(endpoint.timeout());
        if let Some(body) = &endpoint.body {
            request = request.json(body);
        }
        Ok(request)
    }
}

#[async_trait]
impl Probe for HttpChecker {
    async fn execute(&self, endpoint: &EndpointConfig) -> CheckResult {
        let started = Instant::now();
        let request = match self.build_request(endpoint) {
            Ok(request) => request,
            Err(error) => {
                debug!(endpoint_id = %endpoint.id, %error, "probe request rejected");
                return CheckResult::failed(&endpoint.id, error, epoch_millis());
            }
        };

        let outcome = tokio::time::timeout(endpoint.timeout(), async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            // Completion includes reading the body.
            response.bytes().await?;
            Ok::<u16, reqwest::Error>(status)
        })
        .await;

        let checked_at = epoch_millis();
        match outcome {
            Ok(Ok(status)) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                let success = is_success_status(status);
                if !success {
                    debug!(endpoint_id = %endpoint.id, status, "probe non-2xx");
                }
                CheckResult::completed(&endpoint.id, status, success, elapsed_ms, checked_at)
            }
            Ok(Err(e)) if e.is_timeout() => {
                debug!(endpoint_id = %endpoint.id, "probe timed out");
                CheckResult::failed(&endpoint.id, "Timeout", checked_at)
            }
            Ok(Err(e)) => {
                let error = describe(&e);
                debug!(endpoint_id = %endpoint.id, %error, "probe failed");
                CheckResult::failed(&endpoint.id, error, checked_at)
            }
            Err(_) => {
                debug!(endpoint_id = %endpoint.id, "probe timed out");
                CheckResult::failed(&endpoint.id, "Timeout", checked_at)
            }
        }
    }
}

/// Flatten an error and its sources into one line.
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
