//! Outbound request path
//!
//! Everything that leaves the gateway goes through this module: the
//! credential manager keeps a bearer token fresh for the protected
//! backends, and the upstream client performs the actual calls with a
//! timeout, a bounded retry, and response-shape normalization.

mod client;
mod credentials;

pub use client::{CallOptions, UpstreamClient};
pub use credentials::CredentialManager;

use async_trait::async_trait;
use serde_json::{json, Value};

/// Source of the outbound bearer credential
///
/// Seam between the client and the credential lifecycle so the call path
/// can be exercised without a live auth endpoint.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Current bearer token; empty when none is available
    async fn bearer_token(&self) -> String;
}

/// Wrap a raw backend payload in the gateway's success envelope
pub fn success_envelope(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

/// Build the gateway's failure envelope
pub fn failure_envelope(error: impl Into<String>) -> Value {
    json!({ "success": false, "error": error.into() })
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Canned-response HTTP server for upstream tests
    //!
    //! The corpus carries no HTTP-mock crate, so tests bind a real
    //! listener and speak just enough HTTP/1.1 to serve scripted
    //! responses while recording what the client sent.

    use super::CredentialSource;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    /// Fixed bearer token for client tests
    pub struct StaticCredentials(pub String);

    #[async_trait]
    impl CredentialSource for StaticCredentials {
        async fn bearer_token(&self) -> String {
            self.0.clone()
        }
    }

    /// What one inbound request looked like
    #[derive(Debug, Clone)]
    pub struct ReceivedRequest {
        pub method: String,
        pub path: String,
        pub authorization: Option<String>,
        pub body: String,
    }

    /// One scripted response
    #[derive(Debug, Clone)]
    pub struct CannedResponse {
        pub status: u16,
        pub body: String,
        pub delay: Option<Duration>,
    }

    impl CannedResponse {
        pub fn json(status: u16, body: &str) -> Self {
            Self {
                status,
                body: body.to_string(),
                delay: None,
            }
        }

        pub fn delayed(status: u16, body: &str, delay: Duration) -> Self {
            Self {
                status,
                body: body.to_string(),
                delay: Some(delay),
            }
        }
    }

    /// Spawn a listener that serves `responses` in order (repeating the
    /// last one) and records every request it saw.
    pub async fn spawn_server(
        responses: Vec<CannedResponse>,
    ) -> (String, Arc<Mutex<Vec<ReceivedRequest>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let received = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&received);

        tokio::spawn(async move {
            let mut served = 0usize;
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };

                let Some(request) = read_request(&mut stream).await else {
                    continue;
                };
                log.lock().await.push(request);

                let response = responses
                    .get(served)
                    .or_else(|| responses.last())
                    .cloned()
                    .unwrap_or(CannedResponse::json(200, "{}"));
                served += 1;

                if let Some(delay) = response.delay {
                    tokio::time::sleep(delay).await;
                }

                let payload = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.status,
                    response.body.len(),
                    response.body
                );
                let _ = stream.write_all(payload.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{}", addr), received)
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) -> Option<ReceivedRequest> {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];

        // Read until the header terminator
        let headers_end = loop {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            raw.extend_from_slice(&chunk[..n]);
            if let Some(pos) = find_headers_end(&raw) {
                break pos;
            }
        };

        let head = String::from_utf8_lossy(&raw[..headers_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?;
        let mut parts = request_line.split_whitespace();
        let method = parts.next()?.to_string();
        let path = parts.next()?.to_string();

        let mut authorization = None;
        let mut content_length = 0usize;
        for line in lines {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            match name.to_ascii_lowercase().as_str() {
                "authorization" => authorization = Some(value.trim().to_string()),
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                _ => {}
            }
        }

        // Drain the body if one was declared
        let body_start = headers_end + 4;
        while raw.len() < body_start + content_length {
            let n = stream.read(&mut chunk).await.ok()?;
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&raw[body_start..raw.len().min(body_start + content_length)])
            .to_string();

        Some(ReceivedRequest {
            method,
            path,
            authorization,
            body,
        })
    }

    fn find_headers_end(raw: &[u8]) -> Option<usize> {
        raw.windows(4).position(|w| w == b"\r\n\r\n")
    }
}
