//! Outbound service credential lifecycle
//!
//! Obtains and caches the bearer token the gateway presents to the
//! protected backends, refreshing a fixed margin before the declared
//! expiry. Failure here is deliberately soft: callers get an empty token
//! and the backend's 401 becomes the actionable error.

use super::CredentialSource;
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Timeout for the login exchange itself
const LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifetime assumed when the backend does not declare one
const DEFAULT_LIFETIME_SECS: u64 = 3600;

struct Credential {
    token: String,
    expires_at: Instant,
}

/// Caches the service credential and refreshes it before expiry
pub struct CredentialManager {
    http: reqwest::Client,
    auth_url: Option<String>,
    username: String,
    password: SecretString,
    refresh_margin: Duration,
    cached: RwLock<Option<Credential>>,
}

impl CredentialManager {
    pub fn new(backends: &BackendConfig, refresh_margin: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url: backends.auth_url(),
            username: backends.service_username.clone(),
            password: backends.service_password.clone(),
            refresh_margin,
            cached: RwLock::new(None),
        }
    }

    async fn login(&self) -> Result<Credential> {
        let Some(url) = self.auth_url.as_deref() else {
            return Err(Error::UpstreamAuth(
                "no trading backend configured for login".to_string(),
            ));
        };

        let response = self
            .http
            .post(url)
            .timeout(LOGIN_TIMEOUT)
            .json(&json!({
                "username": self.username,
                "password": self.password.expose_secret(),
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamAuth(format!(
                "login returned HTTP {}",
                status.as_u16()
            )));
        }

        let payload: Value = response.json().await?;
        let token = payload
            .get("token")
            .or_else(|| payload.get("access_token"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::UpstreamAuth("login response carried no token".to_string())
            })?
            .to_string();

        let lifetime = payload
            .get("expires_in")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_LIFETIME_SECS);

        // Bake the refresh margin into the cached expiry so the token is
        // never attached to a request past its declared lifetime
        let usable = Duration::from_secs(lifetime).saturating_sub(self.refresh_margin);
        debug!(
            expires_in = lifetime,
            usable_secs = usable.as_secs(),
            "Service login succeeded"
        );

        Ok(Credential {
            token,
            expires_at: Instant::now() + usable,
        })
    }
}

#[async_trait]
impl CredentialSource for CredentialManager {
    /// Current bearer token, refreshing if the cached one is near expiry
    ///
    /// Never errors: on login failure the token is empty and the eventual
    /// backend 401 surfaces to the caller.
    async fn bearer_token(&self) -> String {
        {
            let cached = self.cached.read().await;
            if let Some(credential) = cached.as_ref() {
                if credential.expires_at > Instant::now() {
                    return credential.token.clone();
                }
            }
        }

        match self.login().await {
            Ok(credential) => {
                let token = credential.token.clone();
                *self.cached.write().await = Some(credential);
                token
            }
            Err(e) => {
                warn!(error = %e, "Service login failed; proceeding without credential");
                String::new()
            }
        }
    }
}
