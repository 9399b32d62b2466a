//! Orchestrator configuration.
//!
//! [`ServiceConfig::load`] layers a TOML file over the built-in defaults via
//! the `config` crate. Credentials never live in the file: the sink and MPC
//! sections are filled from the environment by
//! [`ServiceConfig::with_env`] when absent.

use std::path::Path;

use serde::{Deserialize, Serialize};

use skillguard_core::config::RiskConfig;
use skillguard_core::error::ConfigError;
use skillguard_mpc::MpcConfig;

/// Encounter ledger flush cadence.
pub const FLUSH_INTERVAL_MS: u64 = 30_000;

/// Minimum spacing of the periodic risk summary.
pub const LOG_INTERVAL_MS: u64 = 10_000;

/// Pairs and players listed on the dashboard.
pub const DASHBOARD_TOP_N: usize = 50;

/// Cashout decisions retained for the dashboard.
pub const RECENT_CASHOUT_CAPACITY: usize = 50;

/// Cashout decisions shown on the dashboard.
pub const RECENT_CASHOUT_SHOWN: usize = 20;

/// Supabase REST credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Project URL, without the `/rest/v1` suffix.
    pub url: String,
    pub service_role_key: String,
}

impl std::fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkConfig")
            .field("url", &self.url)
            .field("service_role_key", &"<redacted>")
            .finish()
    }
}

impl SinkConfig {
    /// `None` unless both `SUPABASE_URL` and `SUPABASE_SERVICE_ROLE_KEY` are set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let url = lookup("SUPABASE_URL").filter(|s| !s.trim().is_empty())?;
        let service_role_key = lookup("SUPABASE_SERVICE_ROLE_KEY").filter(|s| !s.trim().is_empty())?;
        Some(Self {
            url: url.trim().trim_end_matches('/').to_string(),
            service_role_key,
        })
    }

    /// PostgREST base URL.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.url)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub risk: RiskConfig,
    pub flush_interval_ms: u64,
    pub log_interval_ms: u64,
    pub log_enabled: bool,
    pub dashboard_top_n: usize,
    pub recent_cashout_capacity: usize,
    pub recent_cashout_shown: usize,
    pub sink: Option<SinkConfig>,
    pub mpc: Option<MpcConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            risk: RiskConfig::default(),
            flush_interval_ms: FLUSH_INTERVAL_MS,
            log_interval_ms: LOG_INTERVAL_MS,
            log_enabled: true,
            dashboard_top_n: DASHBOARD_TOP_N,
            recent_cashout_capacity: RECENT_CASHOUT_CAPACITY,
            recent_cashout_shown: RECENT_CASHOUT_SHOWN,
            sink: None,
            mpc: None,
        }
    }
}

impl ServiceConfig {
    /// Load a TOML file over the defaults and validate the result.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let cfg: Self = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Source(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fill missing sink and MPC sections from the environment.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if self.sink.is_none() {
            self.sink = SinkConfig::from_lookup(&lookup);
        }
        if self.mpc.is_none() {
            self.mpc = Some(MpcConfig::from_lookup(&lookup)?);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk.validate()?;
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid("flush_interval_ms must be positive".into()));
        }
        if self.dashboard_top_n == 0 {
            return Err(ConfigError::Invalid("dashboard_top_n must be positive".into()));
        }
        if self.recent_cashout_capacity == 0 {
            return Err(ConfigError::Invalid("recent_cashout_capacity must be positive".into()));
        }
        if self.recent_cashout_shown > self.recent_cashout_capacity {
            return Err(ConfigError::Invalid(format!(
                "recent_cashout_shown ({}) exceeds recent_cashout_capacity ({})",
                self.recent_cashout_shown, self.recent_cashout_capacity
            )));
        }
        Ok(())
    }

    /// MPC settings, or the disabled default.
    pub fn mpc_or_default(&self) -> MpcConfig {
        self.mpc.clone().unwrap_or_default()
    }
}
