//! Tool-call gateway
//!
//! Owns the admission pipeline and the outbound path. Every invocation
//! runs caller auth, rate limiting, and the confirmation protocol in that
//! order; only a pass through all three reaches a backend. All state is
//! in-memory and per-process: each gateway replica enforces its own
//! quotas and token set.

use crate::config::{BackendConfig, Config};
use crate::error::{Error, Result};
use crate::interceptors::{Admission, AuthGuard, ConfirmationAuthority, Decision, RateLimiter};
use crate::tools::ToolRegistry;
use crate::upstream::{CallOptions, CredentialManager, UpstreamClient};
use reqwest::Method;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of pushing one invocation through the pipeline
#[derive(Debug)]
pub enum InvokeOutcome {
    /// The backend was called; the envelope is its normalized response
    Completed(Value),
    /// Not a failure: the human must resubmit with `token` as
    /// `confirm_token` to approve this exact call
    ConfirmationPending { message: String, token: String },
}

/// Admission-control gateway in front of the trading and inference backends
pub struct ToolGateway {
    registry: ToolRegistry,
    auth: AuthGuard,
    limiter: Arc<RateLimiter>,
    confirmations: Arc<ConfirmationAuthority>,
    client: UpstreamClient,
    sweep_interval: Duration,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ToolGateway {
    /// Wire up the pipeline from configuration
    pub fn new(config: Config, backends: BackendConfig) -> Self {
        let auth = AuthGuard::new(backends.shared_secret.clone());
        let limiter = Arc::new(RateLimiter::new(config.limits.clone()));
        let confirmations = Arc::new(ConfirmationAuthority::new(
            backends.signing_secret.clone(),
            config.confirmation_ttl(),
        ));
        let credentials = Arc::new(CredentialManager::new(&backends, config.refresh_margin()));
        let client = UpstreamClient::new(backends, credentials, config.request_timeout());

        Self {
            registry: ToolRegistry::new(),
            auth,
            limiter,
            confirmations,
            client,
            sweep_interval: config.sweep_interval(),
            sweeper: Mutex::new(None),
        }
    }

    /// Tool classification table (for listings and embedding)
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Run one tool invocation through the full pipeline
    ///
    /// `params` is the tool's argument object; a `confirm_token` member is
    /// extracted and consumed here, never forwarded to the backend.
    pub async fn invoke(
        &self,
        auth_header: Option<&str>,
        tool_name: &str,
        mut params: Value,
    ) -> Result<InvokeOutcome> {
        let invocation = Uuid::new_v4();

        if !self.auth.validate(auth_header) {
            warn!(invocation = %invocation, tool = tool_name, "Caller authentication failed");
            return Err(Error::AuthFailure(
                "invalid or missing caller credential".to_string(),
            ));
        }

        let confirm_token = params
            .as_object_mut()
            .and_then(|map| map.remove("confirm_token"))
            .and_then(|v| v.as_str().map(String::from));

        let spec = self
            .registry
            .get(tool_name)
            .ok_or_else(|| Error::UnknownTool(tool_name.to_string()))?;

        match self.limiter.admit(spec.category) {
            Admission::Allowed => {}
            Admission::Denied { retry_after_secs } => {
                warn!(
                    invocation = %invocation,
                    tool = tool_name,
                    category = spec.category,
                    retry_after_secs = retry_after_secs,
                    "Invocation rate limited"
                );
                return Err(Error::RateLimited {
                    category: spec.category.to_string(),
                    retry_after_secs,
                });
            }
        }

        match self
            .confirmations
            .check(tool_name, spec.tier, &params, confirm_token.as_deref())
        {
            Decision::Proceed => {}
            Decision::RequireConfirmation { message, token } => {
                info!(
                    invocation = %invocation,
                    tool = tool_name,
                    tier = spec.tier.label(),
                    "Confirmation required"
                );
                return Ok(InvokeOutcome::ConfirmationPending { message, token });
            }
            Decision::Reject { reason } => {
                warn!(invocation = %invocation, tool = tool_name, reason = %reason, "Confirmation rejected");
                return Err(Error::InvalidConfirmation(reason));
            }
        }

        let opts = if spec.method == Method::GET {
            CallOptions {
                method: Method::GET,
                query: Some(query_pairs(&params)),
                ..CallOptions::default()
            }
        } else {
            CallOptions {
                method: spec.method.clone(),
                body: Some(params),
                ..CallOptions::default()
            }
        };

        let envelope = self.client.call(spec.service, spec.path, opts).await;
        info!(
            invocation = %invocation,
            tool = tool_name,
            success = envelope.get("success").and_then(|v| v.as_bool()).unwrap_or(false),
            "Tool call completed"
        );
        Ok(InvokeOutcome::Completed(envelope))
    }

    /// Start the background sweep of consumed tokens and idle rate buckets
    ///
    /// Idempotent; the task lives until `shutdown`.
    pub fn start(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }

        let limiter = Arc::clone(&self.limiter);
        let confirmations = Arc::clone(&self.confirmations);
        let interval = self.sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
                confirmations.sweep_used();
            }
        });

        *sweeper = Some(handle);
        info!(interval_secs = interval.as_secs(), "Started maintenance sweep");
    }

    /// Stop the background sweep
    pub fn shutdown(&self) {
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = sweeper.take() {
            handle.abort();
            info!("Stopped maintenance sweep");
        }
    }
}

/// Flatten scalar parameters into query pairs for GET tools
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Some(map) = params.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                // Nested values have no query-string form
                _ => return None,
            };
            Some((key.clone(), rendered))
        })
        .collect()
}
