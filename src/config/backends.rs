//! Backend endpoint and secret configuration
//!
//! Everything here comes from environment variables (not CLI flags):
//!
//! ```bash
//! export TRADING_API_URL="https://trading.internal:8000"
//! export INFERENCE_API_URL="https://inference.internal:8001"
//! export SERVICE_AUTH_USERNAME="gateway"
//! export SERVICE_AUTH_PASSWORD="..."
//! export GATEWAY_SHARED_SECRET="..."   # inbound caller secret; unset = open mode
//! export CONFIRM_SIGNING_SECRET="..."  # unset = random per process start
//! ```

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Protected backends the gateway proxies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Trading,
    Inference,
}

impl Service {
    pub fn name(&self) -> &'static str {
        match self {
            Service::Trading => "trading",
            Service::Inference => "inference",
        }
    }
}

/// Environment variable names
mod env_vars {
    pub const TRADING_API_URL: &str = "TRADING_API_URL";
    pub const INFERENCE_API_URL: &str = "INFERENCE_API_URL";
    pub const SERVICE_AUTH_USERNAME: &str = "SERVICE_AUTH_USERNAME";
    pub const SERVICE_AUTH_PASSWORD: &str = "SERVICE_AUTH_PASSWORD";
    pub const GATEWAY_SHARED_SECRET: &str = "GATEWAY_SHARED_SECRET";
    pub const CONFIRM_SIGNING_SECRET: &str = "CONFIRM_SIGNING_SECRET";
}

/// Local fallback endpoints (development only)
mod local_urls {
    pub const TRADING: &str = "http://127.0.0.1:8000";
    pub const INFERENCE: &str = "http://127.0.0.1:8001";
}

/// Backend base URLs and the secrets the gateway operates with
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URLs indexed by service
    urls: HashMap<Service, String>,
    /// Username for the service login exchange
    pub service_username: String,
    /// Password for the service login exchange (never logged)
    pub service_password: SecretString,
    /// Shared secret inbound callers must present; `None` disables the gate
    pub shared_secret: Option<String>,
    /// Secret for signing confirmation tokens; `None` means generate at start
    pub signing_secret: Option<String>,
}

impl BackendConfig {
    /// Build from environment variables, falling back to local endpoints
    pub fn from_env() -> Self {
        let mut urls = HashMap::new();

        match std::env::var(env_vars::TRADING_API_URL) {
            Ok(url) => {
                urls.insert(Service::Trading, normalize_url(&url));
            }
            Err(_) => {
                tracing::warn!(
                    fallback = local_urls::TRADING,
                    "TRADING_API_URL not set, using local fallback"
                );
                urls.insert(Service::Trading, local_urls::TRADING.to_string());
            }
        }

        match std::env::var(env_vars::INFERENCE_API_URL) {
            Ok(url) => {
                urls.insert(Service::Inference, normalize_url(&url));
            }
            Err(_) => {
                tracing::warn!(
                    fallback = local_urls::INFERENCE,
                    "INFERENCE_API_URL not set, using local fallback"
                );
                urls.insert(Service::Inference, local_urls::INFERENCE.to_string());
            }
        }

        let service_username =
            std::env::var(env_vars::SERVICE_AUTH_USERNAME).unwrap_or_else(|_| "gateway".to_string());
        let service_password = SecretString::from(
            std::env::var(env_vars::SERVICE_AUTH_PASSWORD).unwrap_or_default(),
        );

        let shared_secret = std::env::var(env_vars::GATEWAY_SHARED_SECRET)
            .ok()
            .filter(|s| !s.is_empty());
        let signing_secret = std::env::var(env_vars::CONFIRM_SIGNING_SECRET)
            .ok()
            .filter(|s| !s.is_empty());

        Self {
            urls,
            service_username,
            service_password,
            shared_secret,
            signing_secret,
        }
    }

    /// Create with explicit base URLs (tests and embedding)
    pub fn with_urls(urls: HashMap<Service, String>) -> Self {
        Self {
            urls,
            service_username: "gateway".to_string(),
            service_password: SecretString::from(String::new()),
            shared_secret: None,
            signing_secret: None,
        }
    }

    /// Base URL for a service, without a trailing slash
    pub fn base_url(&self, service: Service) -> Option<&str> {
        self.urls.get(&service).map(|s| s.as_str())
    }

    /// Login endpoint on the trading backend
    pub fn auth_url(&self) -> Option<String> {
        self.base_url(Service::Trading)
            .map(|base| format!("{}/api/v1/auth/login", base))
    }
}

/// Validate and strip the trailing slash so path joins stay predictable
fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    if Url::parse(trimmed).is_err() {
        tracing::warn!(url = raw, "Backend URL does not parse; using it verbatim");
    }
    trimmed.to_string()
}
