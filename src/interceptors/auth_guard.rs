//! Inbound caller authentication
//!
//! A single shared secret gates all callers; there is no per-caller
//! identity and no scoping. Without a configured secret the guard runs in
//! open mode and admits everything.

use super::constant_time_eq;
use tracing::warn;

/// Gate that validates the caller's bearer credential
pub struct AuthGuard {
    /// Shared secret; `None` means open mode
    secret: Option<String>,
}

impl AuthGuard {
    /// Create the guard
    ///
    /// Logs a loud warning when no secret is configured, since that
    /// disables inbound authentication entirely.
    pub fn new(secret: Option<String>) -> Self {
        if secret.is_none() {
            warn!(
                "GATEWAY_SHARED_SECRET not set - inbound authentication DISABLED, \
                 every caller will be accepted"
            );
        }
        Self { secret }
    }

    /// Validate the caller's credential header
    ///
    /// Accepts the raw secret or a `Bearer `-prefixed form.
    pub fn validate(&self, header: Option<&str>) -> bool {
        let Some(secret) = self.secret.as_deref() else {
            return true; // open mode
        };

        let Some(header) = header else {
            return false;
        };

        let presented = header.strip_prefix("Bearer ").unwrap_or(header);
        constant_time_eq(presented, secret)
    }
}
