//! Resilient outbound call path
//!
//! One total deadline covers the whole call including the single retry a
//! GET gets after a 5xx. Non-idempotent methods are never retried: a
//! duplicated POST could double an order. Whatever happens, the caller
//! gets a `{success, ...}` envelope back, never a panic or a hang.

use super::{failure_envelope, success_envelope, CredentialSource};
use crate::config::{BackendConfig, Service};
use crate::error::Error;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Pause before the one idempotent retry, charged against the deadline
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Per-call options
#[derive(Debug, Clone)]
pub struct CallOptions {
    pub method: Method,
    /// JSON body for non-GET calls
    pub body: Option<Value>,
    /// Query pairs for GET calls
    pub query: Option<Vec<(String, String)>>,
    /// Override of the default total deadline
    pub timeout: Option<Duration>,
    /// Skip the Authorization header (login and health endpoints)
    pub skip_auth: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            query: None,
            timeout: None,
            skip_auth: false,
        }
    }
}

/// Client for the protected backends
pub struct UpstreamClient {
    http: reqwest::Client,
    backends: BackendConfig,
    credentials: Arc<dyn CredentialSource>,
    default_timeout: Duration,
}

impl UpstreamClient {
    pub fn new(
        backends: BackendConfig,
        credentials: Arc<dyn CredentialSource>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            backends,
            credentials,
            default_timeout,
        }
    }

    /// Perform one backend call and normalize the response
    ///
    /// Always returns an envelope: a backend body that already carries a
    /// `success` field passes through unchanged, any other 2xx payload is
    /// wrapped as data, and every failure mode (non-2xx, timeout, network,
    /// unparseable body) is folded into `{success: false, error}`.
    pub async fn call(&self, service: Service, path: &str, opts: CallOptions) -> Value {
        let Some(base) = self.backends.base_url(service) else {
            return failure_envelope(format!(
                "no base URL configured for {} backend",
                service.name()
            ));
        };
        let url = format!("{}{}", base, path);

        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let timeout_ms = timeout.as_millis() as u64;
        let deadline = Instant::now() + timeout;

        let bearer = if opts.skip_auth {
            None
        } else {
            let token = self.credentials.bearer_token().await;
            (!token.is_empty()).then_some(token)
        };

        let mut attempt = 0u8;
        loop {
            attempt += 1;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return failure_envelope(Error::Timeout { timeout_ms }.to_string());
            }

            let mut request = self
                .http
                .request(opts.method.clone(), &url)
                .timeout(remaining);
            if let Some(token) = &bearer {
                request = request.bearer_auth(token);
            }
            if let Some(query) = &opts.query {
                request = request.query(query);
            }
            if let Some(body) = &opts.body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let message = if e.is_timeout() {
                        Error::Timeout { timeout_ms }.to_string()
                    } else {
                        Error::Network(e).to_string()
                    };
                    warn!(url = %url, error = %message, "Backend call failed");
                    return failure_envelope(message);
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    return failure_envelope(Error::Network(e).to_string());
                }
            };
            let payload: Value =
                serde_json::from_str(&text).unwrap_or_else(|_| json!({ "message": text }));

            // One retry for idempotent reads; writes must not be duplicated
            if status.is_server_error() && opts.method == Method::GET && attempt == 1 {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining > RETRY_BACKOFF {
                    debug!(
                        status = status.as_u16(),
                        url = %url,
                        "Retrying GET after server error"
                    );
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    continue;
                }
            }

            if !status.is_success() {
                let message = extract_error_message(&payload, status.as_u16());
                debug!(status = status.as_u16(), url = %url, error = %message, "Backend rejected call");
                return failure_envelope(message);
            }

            // The backend's own envelope wins
            return if payload.get("success").is_some() {
                payload
            } else {
                success_envelope(payload)
            };
        }
    }
}

fn extract_error_message(payload: &Value, status: u16) -> String {
    for key in ["error", "detail", "message"] {
        if let Some(message) = payload.get(key).and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }
    format!("HTTP {}", status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::testutil::{spawn_server, CannedResponse, StaticCredentials};
    use std::collections::HashMap;

    fn client_for(url: &str, token: &str, timeout: Duration) -> UpstreamClient {
        let mut urls = HashMap::new();
        urls.insert(Service::Trading, url.to_string());
        UpstreamClient::new(
            BackendConfig::with_urls(urls),
            Arc::new(StaticCredentials(token.to_string())),
            timeout,
        )
    }

    #[tokio::test]
    async fn get_retries_once_after_server_error() {
        let (url, received) = spawn_server(vec![
            CannedResponse::json(500, r#"{"error": "hiccup"}"#),
            CannedResponse::json(200, r#"{"price": 42}"#),
        ])
        .await;
        let client = client_for(&url, "tok", Duration::from_secs(5));

        let envelope = client
            .call(Service::Trading, "/api/v1/market/ticker", CallOptions::default())
            .await;

        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["data"]["price"], 42);
        assert_eq!(received.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn get_retry_is_bounded_to_one() {
        let (url, received) =
            spawn_server(vec![CannedResponse::json(503, r#"{"error": "down"}"#)]).await;
        let client = client_for(&url, "tok", Duration::from_secs(5));

        let envelope = client
            .call(Service::Trading, "/api/v1/market/ticker", CallOptions::default())
            .await;

        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["error"], "down");
        assert_eq!(received.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn post_is_never_retried() {
        let (url, received) =
            spawn_server(vec![CannedResponse::json(500, r#"{"error": "boom"}"#)]).await;
        let client = client_for(&url, "tok", Duration::from_secs(5));

        let envelope = client
            .call(
                Service::Trading,
                "/api/v1/orders",
                CallOptions {
                    method: Method::POST,
                    body: Some(json!({"symbol": "BTCUSDT", "qty": 1})),
                    ..CallOptions::default()
                },
            )
            .await;

        assert_eq!(envelope["success"], false);
        assert_eq!(received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let (url, _received) = spawn_server(vec![CannedResponse::delayed(
            200,
            "{}",
            Duration::from_millis(500),
        )])
        .await;
        let client = client_for(&url, "tok", Duration::from_secs(5));

        let envelope = client
            .call(
                Service::Trading,
                "/api/v1/market/ticker",
                CallOptions {
                    timeout: Some(Duration::from_millis(100)),
                    ..CallOptions::default()
                },
            )
            .await;

        assert_eq!(envelope["success"], false);
        assert!(envelope["error"].as_str().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn error_message_extracted_from_detail() {
        let (url, _received) =
            spawn_server(vec![CannedResponse::json(400, r#"{"detail": "bad symbol"}"#)]).await;
        let client = client_for(&url, "tok", Duration::from_secs(5));

        let envelope = client
            .call(
                Service::Trading,
                "/api/v1/orders",
                CallOptions {
                    method: Method::POST,
                    ..CallOptions::default()
                },
            )
            .await;

        assert_eq!(envelope["error"], "bad symbol");
    }

    #[tokio::test]
    async fn status_fallback_when_body_has_no_message() {
        let (url, _received) = spawn_server(vec![CannedResponse::json(404, "{}")]).await;
        let client = client_for(&url, "tok", Duration::from_secs(5));

        let envelope = client
            .call(
                Service::Trading,
                "/api/v1/nowhere",
                CallOptions {
                    method: Method::POST,
                    ..CallOptions::default()
                },
            )
            .await;

        assert_eq!(envelope["error"], "HTTP 404");
    }

    #[tokio::test]
    async fn backend_envelope_passes_through() {
        let (url, _received) = spawn_server(vec![CannedResponse::json(
            200,
            r#"{"success": false, "error": "insufficient margin"}"#,
        )])
        .await;
        let client = client_for(&url, "tok", Duration::from_secs(5));

        let envelope = client
            .call(
                Service::Trading,
                "/api/v1/orders",
                CallOptions {
                    method: Method::POST,
                    ..CallOptions::default()
                },
            )
            .await;

        // The backend already spoke the envelope; it is not re-wrapped
        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["error"], "insufficient margin");
        assert!(envelope.get("data").is_none());
    }

    #[tokio::test]
    async fn non_json_body_wrapped_as_message() {
        let (url, _received) = spawn_server(vec![CannedResponse::json(200, "pong")]).await;
        let client = client_for(&url, "tok", Duration::from_secs(5));

        let envelope = client
            .call(Service::Trading, "/health", CallOptions::default())
            .await;

        assert_eq!(envelope["success"], true);
        assert_eq!(envelope["data"]["message"], "pong");
    }

    #[tokio::test]
    async fn bearer_token_attached_unless_skipped() {
        let (url, received) = spawn_server(vec![CannedResponse::json(200, "{}")]).await;
        let client = client_for(&url, "tok-abc", Duration::from_secs(5));

        client
            .call(Service::Trading, "/api/v1/account/balance", CallOptions::default())
            .await;
        client
            .call(
                Service::Trading,
                "/health",
                CallOptions {
                    skip_auth: true,
                    ..CallOptions::default()
                },
            )
            .await;

        let requests = received.lock().await;
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer tok-abc"));
        assert_eq!(requests[1].authorization, None);
    }

    #[tokio::test]
    async fn empty_credential_sends_no_header() {
        let (url, received) = spawn_server(vec![CannedResponse::json(200, "{}")]).await;
        let client = client_for(&url, "", Duration::from_secs(5));

        client
            .call(Service::Trading, "/api/v1/account/balance", CallOptions::default())
            .await;

        assert_eq!(received.lock().await[0].authorization, None);
    }

    #[tokio::test]
    async fn backend_401_surfaces_after_failed_login() {
        // With no usable credential the request goes out bare and the
        // backend's rejection becomes the caller's error
        let (url, received) = spawn_server(vec![CannedResponse::json(
            401,
            r#"{"detail": "Not authenticated"}"#,
        )])
        .await;
        let client = client_for(&url, "", Duration::from_secs(5));

        let envelope = client
            .call(
                Service::Trading,
                "/api/v1/orders",
                CallOptions {
                    method: Method::POST,
                    ..CallOptions::default()
                },
            )
            .await;

        assert_eq!(envelope["success"], false);
        assert_eq!(envelope["error"], "Not authenticated");
        assert_eq!(received.lock().await[0].authorization, None);
    }

    #[tokio::test]
    async fn unconfigured_service_fails_fast() {
        let client = client_for("http://127.0.0.1:1", "tok", Duration::from_secs(5));

        let envelope = client
            .call(Service::Inference, "/api/v1/predict", CallOptions::default())
            .await;

        assert_eq!(envelope["success"], false);
        assert!(envelope["error"]
            .as_str()
            .unwrap()
            .contains("inference"));
    }
}
