//! HTTP dispatch of queued operations
//!
//! One [`HttpExecutor`] serves one operation kind: feature modules build an
//! executor per endpoint and register it under that kind. The executor does
//! no retrying of its own; it classifies each outcome into a
//! [`DispatchError`] and leaves scheduling to the sync engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client as ReqwestClient, Method, StatusCode};
use tideline_core::ports::OperationExecutor;
use tideline_core::sync::DispatchError;
use tideline_domain::{QueuedOperation, Result, TidelineError};
use tracing::{debug, instrument};

/// Bearer-token provider, supplied by the auth layer.
///
/// Token acquisition itself lives outside this crate; the executor only
/// attaches whatever token is currently available.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current bearer token, or `None` when unauthenticated.
    async fn bearer_token(&self) -> Option<String>;
}

/// Configuration shared by the executors of one backend.
#[derive(Debug, Clone)]
pub struct HttpExecutorConfig {
    /// Base URL for the backend (e.g. `https://api.example.com/v1`)
    pub base_url: String,
    /// Per-request timeout; the engine applies its own dispatch timeout on top
    pub timeout: Duration,
    /// User-Agent header sent with every request
    pub user_agent: String,
}

impl Default for HttpExecutorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            timeout: Duration::from_secs(30),
            user_agent: concat!("tideline/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// HTTP executor for one operation kind.
pub struct HttpExecutor {
    client: ReqwestClient,
    method: Method,
    url: String,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl HttpExecutor {
    /// Build an executor that sends each payload to `path` under the
    /// configured base URL.
    pub fn new(config: &HttpExecutorConfig, method: Method, path: &str) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|err| TidelineError::Config(format!("failed to build HTTP client: {err}")))?;

        let url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        Ok(Self { client, method, url, token_source: None })
    }

    /// Attach a bearer-token source. Requests without one are sent
    /// unauthenticated.
    #[must_use]
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Target URL, for diagnostics.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl OperationExecutor for HttpExecutor {
    #[instrument(skip(self, op), fields(id = %op.id, kind = %op.kind))]
    async fn execute(&self, op: &QueuedOperation) -> std::result::Result<(), DispatchError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .header(header::CONTENT_TYPE, "application/json")
            // The queue guarantees at-least-once delivery; the stable
            // operation id lets the service deduplicate replays.
            .header("Idempotency-Key", &op.id)
            .body(op.payload_json.clone());

        if let Some(source) = &self.token_source {
            if let Some(token) = source.bearer_token().await {
                request = request.bearer_auth(token);
            }
        }

        debug!(url = %self.url, "dispatching operation");

        let response = request.send().await.map_err(map_send_error)?;
        let status = response.status();
        debug!(url = %self.url, %status, "received dispatch response");

        classify_status(status)
    }
}

fn map_send_error(err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        return DispatchError::Network("HTTP request timed out".into());
    }
    if err.is_connect() {
        return DispatchError::Network("HTTP connection failure".into());
    }
    DispatchError::Network(err.to_string())
}

fn classify_status(status: StatusCode) -> std::result::Result<(), DispatchError> {
    if status.is_success() {
        return Ok(());
    }

    let message =
        format!("HTTP {} {}", status.as_u16(), status.canonical_reason().unwrap_or("unknown"));

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DispatchError::AuthExpired(message),
        StatusCode::TOO_MANY_REQUESTS => DispatchError::RateLimit(message),
        StatusCode::REQUEST_TIMEOUT => DispatchError::Network(message),
        _ if status.is_server_error() => DispatchError::Server(message),
        _ if status.is_client_error() => DispatchError::Client(message),
        _ => DispatchError::Network(message),
    })
}

#[cfg(test)]
mod tests {
    use tideline_core::sync::FailureKind;

    use super::*;

    #[test]
    fn status_classification_drives_the_retry_state_machine() {
        assert!(classify_status(StatusCode::OK).is_ok());
        assert!(classify_status(StatusCode::CREATED).is_ok());

        let unauthorized = classify_status(StatusCode::UNAUTHORIZED).unwrap_err();
        assert_eq!(unauthorized.kind(), FailureKind::AuthExpired);

        let rate_limited = classify_status(StatusCode::TOO_MANY_REQUESTS).unwrap_err();
        assert_eq!(rate_limited.kind(), FailureKind::Transient);

        let server = classify_status(StatusCode::BAD_GATEWAY).unwrap_err();
        assert_eq!(server.kind(), FailureKind::Transient);

        let client = classify_status(StatusCode::UNPROCESSABLE_ENTITY).unwrap_err();
        assert_eq!(client.kind(), FailureKind::Permanent);
    }

    #[test]
    fn url_joins_base_and_path_without_double_slash() {
        let config = HttpExecutorConfig {
            base_url: "https://api.example.com/v1/".into(),
            ..HttpExecutorConfig::default()
        };
        let executor = HttpExecutor::new(&config, Method::POST, "/journal/entries").unwrap();
        assert_eq!(executor.url(), "https://api.example.com/v1/journal/entries");
    }
}
