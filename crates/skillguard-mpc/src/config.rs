//! MPC backend configuration loaded from environment variables.
//!
//! The presence of `ARCIUM_PROGRAM_ID` is the engine selection switch: without
//! it the local engine is used and nothing in this crate talks to the network.

use serde::{Deserialize, Serialize};

use skillguard_core::error::ConfigError;

/// Gateway endpoint used when `SOLANA_RPC_URL` is unset.
pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";

/// Hard upper bound on one MPC scoring call, submission to decrypted result.
pub const DEFAULT_FINALIZE_TIMEOUT_MS: u64 = 60_000;

/// Per-HTTP-request timeout of the JSON-RPC gateway.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcConfig {
    /// Deployed scoring program. `None` selects the local engine.
    pub program_id: Option<String>,
    /// JSON-RPC endpoint of the MPC relay.
    pub rpc_url: String,
    pub finalize_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            program_id: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            finalize_timeout_ms: DEFAULT_FINALIZE_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl MpcConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup (the environment, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let program_id = lookup("ARCIUM_PROGRAM_ID")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let rpc_url = lookup("SOLANA_RPC_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.rpc_url);
        let finalize_timeout_ms = match lookup("ARCIUM_FINALIZE_TIMEOUT_MS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "ARCIUM_FINALIZE_TIMEOUT_MS must be a positive integer, got {raw:?}"
                ))
            })?,
            None => defaults.finalize_timeout_ms,
        };
        if finalize_timeout_ms == 0 {
            return Err(ConfigError::Invalid("ARCIUM_FINALIZE_TIMEOUT_MS must be positive".into()));
        }

        Ok(Self {
            program_id,
            rpc_url,
            finalize_timeout_ms,
            request_timeout_ms: defaults.request_timeout_ms,
        })
    }

    /// Whether the MPC engine should be selected.
    pub fn is_enabled(&self) -> bool {
        self.program_id.is_some()
    }
}
