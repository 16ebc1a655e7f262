//! Shared tool registry
//!
//! Centralizes tool classification (sensitivity tier, rate-limit category,
//! backend routing) so the admission pipeline and the CLI agree on what each
//! tool is allowed to do.
//!
//! This module is the single source of truth for tool metadata.

use crate::config::Service;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordinal sensitivity classification of a tool
///
/// Ordering matters: everything below `Sensitive` executes without human
/// confirmation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Public,
    Authenticated,
    Sensitive,
    Critical,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Public => "PUBLIC",
            Tier::Authenticated => "AUTHENTICATED",
            Tier::Sensitive => "SENSITIVE",
            Tier::Critical => "CRITICAL",
        }
    }

    /// Whether calls at this tier must be confirmed by a human first
    pub fn requires_confirmation(&self) -> bool {
        *self >= Tier::Sensitive
    }
}

/// Tool metadata
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Tool name as callers address it
    pub name: &'static str,
    /// Sensitivity tier
    pub tier: Tier,
    /// Rate-limit category this tool draws from
    pub category: &'static str,
    /// Backend that serves the tool
    pub service: Service,
    /// Request path on the backend
    pub path: &'static str,
    /// HTTP method; only GET is retried on 5xx
    pub method: Method,
}

/// Tool registry providing classification lookups
pub struct ToolRegistry {
    tools: HashMap<&'static str, ToolSpec>,
}

impl ToolRegistry {
    /// Create a new registry with all gateway tools
    pub fn new() -> Self {
        let mut tools = HashMap::new();

        let mut add = |spec: ToolSpec| {
            tools.insert(spec.name, spec);
        };

        // Market data (read-only, no auth tier needed)
        add(ToolSpec {
            name: "get_ticker",
            tier: Tier::Public,
            category: "market-data",
            service: Service::Trading,
            path: "/api/v1/market/ticker",
            method: Method::GET,
        });
        add(ToolSpec {
            name: "get_orderbook",
            tier: Tier::Public,
            category: "market-data",
            service: Service::Trading,
            path: "/api/v1/market/orderbook",
            method: Method::GET,
        });
        add(ToolSpec {
            name: "get_klines",
            tier: Tier::Public,
            category: "market-data",
            service: Service::Trading,
            path: "/api/v1/market/klines",
            method: Method::GET,
        });

        // Account state (requires caller auth, no confirmation)
        add(ToolSpec {
            name: "get_balance",
            tier: Tier::Authenticated,
            category: "account",
            service: Service::Trading,
            path: "/api/v1/account/balance",
            method: Method::GET,
        });
        add(ToolSpec {
            name: "get_positions",
            tier: Tier::Authenticated,
            category: "account",
            service: Service::Trading,
            path: "/api/v1/account/positions",
            method: Method::GET,
        });
        add(ToolSpec {
            name: "get_order_history",
            tier: Tier::Authenticated,
            category: "account",
            service: Service::Trading,
            path: "/api/v1/orders/history",
            method: Method::GET,
        });

        // Order management (side effects; human confirmation required)
        add(ToolSpec {
            name: "place_order",
            tier: Tier::Critical,
            category: "real-trading",
            service: Service::Trading,
            path: "/api/v1/orders",
            method: Method::POST,
        });
        add(ToolSpec {
            name: "cancel_order",
            tier: Tier::Sensitive,
            category: "real-trading",
            service: Service::Trading,
            path: "/api/v1/orders/cancel",
            method: Method::DELETE,
        });
        add(ToolSpec {
            name: "cancel_all_orders",
            tier: Tier::Critical,
            category: "real-trading",
            service: Service::Trading,
            path: "/api/v1/orders/cancel-all",
            method: Method::DELETE,
        });
        add(ToolSpec {
            name: "set_leverage",
            tier: Tier::Sensitive,
            category: "real-trading",
            service: Service::Trading,
            path: "/api/v1/account/leverage",
            method: Method::POST,
        });

        // AI inference service
        add(ToolSpec {
            name: "ai_predict",
            tier: Tier::Authenticated,
            category: "ai-inference",
            service: Service::Inference,
            path: "/api/v1/predict",
            method: Method::POST,
        });
        add(ToolSpec {
            name: "ai_analyze_market",
            tier: Tier::Authenticated,
            category: "ai-inference",
            service: Service::Inference,
            path: "/api/v1/analyze",
            method: Method::POST,
        });

        Self { tools }
    }

    /// Get tool metadata by name
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// All registered tools, unordered
    pub fn specs(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Global tool registry (lazy initialized)
static REGISTRY: std::sync::OnceLock<ToolRegistry> = std::sync::OnceLock::new();

/// Get the global tool registry
pub fn registry() -> &'static ToolRegistry {
    REGISTRY.get_or_init(ToolRegistry::new)
}
