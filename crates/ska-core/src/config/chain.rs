//! Request hook chain configuration.
//!
//! The failure policy has no default: every deployment states, per chain,
//! whether a failing hook lets the request through or rejects it.

use serde::{Deserialize, Serialize};

/// What a chain does when one of its hooks fails or exceeds its budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and continue with the next hook.
    FailOpen,
    /// Log the failure and reject the request with a generic response.
    FailClosed,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FailOpen => write!(f, "fail_open"),
            Self::FailClosed => write!(f, "fail_closed"),
        }
    }
}

/// Settings for one hook chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Failure policy (required).
    pub failure_policy: FailurePolicy,
    /// Per-hook time budget in milliseconds.
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_ms: u64,
}

impl ChainConfig {
    /// Creates a chain configuration with the default hook budget.
    pub fn new(failure_policy: FailurePolicy) -> Self {
        Self {
            failure_policy,
            hook_timeout_ms: default_hook_timeout(),
        }
    }

    /// Overrides the per-hook budget.
    pub fn with_hook_timeout_ms(mut self, hook_timeout_ms: u64) -> Self {
        self.hook_timeout_ms = hook_timeout_ms;
        self
    }

    /// Per-hook budget as a `Duration`.
    pub fn hook_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.hook_timeout_ms)
    }
}

/// Configuration for both request hook chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainsConfig {
    /// The filter chain wrapping the whole request.
    pub filter: ChainConfig,
    /// The interceptor chain wrapping the business handler.
    pub interceptor: ChainConfig,
}

fn default_hook_timeout() -> u64 {
    5_000
}
