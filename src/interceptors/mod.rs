//! Admission-control interceptors
//!
//! Every tool invocation passes through this pipeline before anything is
//! sent to a backend: caller authentication, per-category rate limiting,
//! then tiered human confirmation. Any stage can short-circuit the call.

mod auth_guard;
mod confirmation;
mod rate_limit;

pub use auth_guard::AuthGuard;
pub use confirmation::{ConfirmationAuthority, Decision};
pub use rate_limit::{Admission, RateLimiter};

/// Length-then-XOR comparison that does not leak match position timing
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.len() != b_bytes.len() {
        return false;
    }
    let mut result = 0;
    for (x, y) in a_bytes.iter().zip(b_bytes.iter()) {
        result |= x ^ y;
    }
    result == 0
}
