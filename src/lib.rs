//! Agent Tool-Call Gateway
//!
//! Admission control between an LLM-driven agent and sensitive backends
//! (a trading engine and an AI-inference service). The gateway decides,
//! per tool invocation, whether it executes now, needs a human
//! confirmation first, or is rejected — and manages the outbound service
//! credential while shielding the backends from overload.
//!
//! # Security Model
//!
//! - A single shared secret gates all inbound callers (open mode only
//!   when explicitly unconfigured, and loudly logged)
//! - Sensitive and critical tools execute only after a signed, single-use,
//!   time-boxed confirmation token is resubmitted for the exact same call
//! - Per-category sliding-window quotas keep the agent from saturating
//!   backend capacity
//! - The service password never appears in logs or error output
//!
//! State is in-memory and per-process: replicas do not share quotas or
//! token sets, and a timed-out call cannot retract a side effect the
//! backend already committed.

pub mod config;
pub mod gateway;
pub mod interceptors;
pub mod tools;
pub mod upstream;

mod error;

// Re-export commonly used types
pub use config::{BackendConfig, Config, Service};
pub use error::{Error, Result};
pub use gateway::{InvokeOutcome, ToolGateway};
pub use tools::{Tier, ToolRegistry};
