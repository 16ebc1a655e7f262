//! Tiered human confirmation
//!
//! Sensitive and critical tools may only execute after a human resubmits
//! the call with a signed, single-use, time-boxed confirmation token. The
//! token binds the exact tool name and parameter bytes it was issued for,
//! so a confirmed order cannot be replayed against a different call.

use super::constant_time_eq;
use crate::tools::Tier;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Hex chars of the HMAC output kept in the wire token
const DIGEST_LEN: usize = 32;

/// Length of the per-process fallback signing secret
const GENERATED_SECRET_LEN: usize = 48;

/// Outcome of the confirmation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Execute now
    Proceed,
    /// Surface the message to the human; the call must be resubmitted with
    /// `token` as `confirm_token`
    RequireConfirmation { message: String, token: String },
    /// Terminal rejection
    Reject { reason: String },
}

/// Issues and validates confirmation tokens
pub struct ConfirmationAuthority {
    /// HMAC signing secret
    secret: String,
    /// How long an issued token stays valid
    ttl: Duration,
    /// Tokens already consumed; membership rejects regardless of age
    used: Mutex<HashSet<String>>,
}

impl ConfirmationAuthority {
    /// Create the authority
    ///
    /// Without a configured secret a random one is generated for this
    /// process, which invalidates every outstanding prompt on restart.
    pub fn new(secret: Option<String>, ttl: Duration) -> Self {
        let secret = match secret {
            Some(s) => s,
            None => {
                warn!(
                    "CONFIRM_SIGNING_SECRET not set - generated a per-process secret; \
                     outstanding confirmation prompts will NOT survive a restart"
                );
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(GENERATED_SECRET_LEN)
                    .map(char::from)
                    .collect()
            }
        };

        Self {
            secret,
            ttl,
            used: Mutex::new(HashSet::new()),
        }
    }

    /// Run the tiered confirmation protocol for one invocation
    ///
    /// Tiers below `Sensitive` never require confirmation. At `Sensitive`
    /// and above, a supplied token is validated (single use, unexpired,
    /// digest match against these exact parameters); with no token a fresh
    /// one is issued for the human to resubmit.
    pub fn check(
        &self,
        tool: &str,
        tier: Tier,
        params: &Value,
        supplied: Option<&str>,
    ) -> Decision {
        if !tier.requires_confirmation() {
            return Decision::Proceed;
        }

        let fingerprint = Self::fingerprint(params);

        if let Some(token) = supplied {
            return if self.validate(token, tool, &fingerprint) {
                debug!(tool = tool, "Confirmation token accepted");
                Decision::Proceed
            } else {
                Decision::Reject {
                    reason: "invalid or expired confirmation token".to_string(),
                }
            };
        }

        let (token, message) = self.issue(tool, tier, params, &fingerprint);
        Decision::RequireConfirmation { message, token }
    }

    /// Validate a token against the call it claims to confirm
    ///
    /// The used-set check and the insert happen under one lock so two
    /// concurrent validations of the same token cannot both succeed.
    pub fn validate(&self, token: &str, tool: &str, fingerprint: &str) -> bool {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);

        if used.contains(token) {
            debug!(tool = tool, "Confirmation token replay rejected");
            return false;
        }

        let Some((digest, issued_str)) = token.split_once(':') else {
            return false;
        };
        let Ok(issued_at_ms) = issued_str.parse::<i64>() else {
            return false;
        };

        let age_ms = Utc::now().timestamp_millis() - issued_at_ms;
        if age_ms > self.ttl.as_millis() as i64 {
            debug!(tool = tool, age_ms = age_ms, "Confirmation token expired");
            return false;
        }

        let expected = self.digest(tool, fingerprint, issued_at_ms);
        if !constant_time_eq(digest, &expected) {
            debug!(tool = tool, "Confirmation token digest mismatch");
            return false;
        }

        used.insert(token.to_string());
        true
    }

    /// Drop every consumed token
    ///
    /// Coarse by design; run it on an interval longer than the token TTL
    /// so cleared entries are already expired.
    pub fn sweep_used(&self) {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        let cleared = used.len();
        used.clear();
        if cleared > 0 {
            debug!(cleared = cleared, "Cleared consumed confirmation tokens");
        }
    }

    /// Canonical fingerprint of a parameter object
    ///
    /// Parameters are hashed as opaque bytes of their canonical JSON
    /// encoding; no structural comparison happens anywhere.
    pub fn fingerprint(params: &Value) -> String {
        blake3::hash(params.to_string().as_bytes())
            .to_hex()
            .to_string()
    }

    fn issue(&self, tool: &str, tier: Tier, params: &Value, fingerprint: &str) -> (String, String) {
        let issued_at_ms = Utc::now().timestamp_millis();
        let token = format!("{}:{}", self.digest(tool, fingerprint, issued_at_ms), issued_at_ms);

        let params_text = serde_json::to_string_pretty(params)
            .unwrap_or_else(|_| params.to_string());
        let message = format!(
            "CONFIRMATION REQUIRED ({severity})\n\
             Tool: {tool}\n\
             Parameters: {params_text}\n\
             To approve, resubmit the call with confirm_token set to:\n\
             {token}\n\
             The token is valid for {ttl}s and can be used exactly once.",
            severity = tier.label(),
            ttl = self.ttl.as_secs(),
        );

        (token, message)
    }

    fn digest(&self, tool: &str, fingerprint: &str, issued_at_ms: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(tool.as_bytes());
        mac.update(b":");
        mac.update(fingerprint.as_bytes());
        mac.update(b":");
        mac.update(issued_at_ms.to_string().as_bytes());

        let mut full = hex::encode(mac.finalize().into_bytes());
        full.truncate(DIGEST_LEN);
        full
    }
}
