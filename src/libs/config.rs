//! Engine configuration.
//!
//! The configuration system is modular: each subsystem gets its own
//! structure with defaults matching the documented behavior, and the whole
//! engine configuration round-trips through JSON for file-based setups.
//!
//! ## Structure
//!
//! - **PoolConfig**: connection pool sizing and timeouts
//! - **TenantConfig**: tenant column names and injection switch
//! - **RemoteConfig**: remote schema authority endpoint and retry policy
//! - **BranchConfig**: branch namespace prefix and cleanup policy
//!
//! ## Usage
//!
//! ```rust,no_run
//! use launchpad_db::libs::config::EngineConfig;
//!
//! let config = EngineConfig::new("postgres://localhost/launchpad");
//! assert_eq!(config.pool.max_connections, 10);
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Connection pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on open connections.
    pub max_connections: u32,
    /// Seconds an acquire may wait before surfacing a pool-exhausted error.
    pub connect_timeout_secs: u64,
    /// Seconds an idle connection is kept before being retired.
    pub idle_timeout_secs: u64,
    /// Seconds between periodic health probes.
    pub health_check_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
            health_check_interval_secs: 30,
        }
    }
}

/// Tenant column names and the injection switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Whether compiled queries receive tenant predicates automatically.
    pub inject_tenant: bool,
    /// Column holding the application id.
    pub app_id_column: String,
    /// Column holding the organization id.
    pub organization_id_column: String,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            inject_tenant: true,
            app_id_column: "app_id".to_string(),
            organization_id_column: "organization_id".to_string(),
        }
    }
}

/// Remote schema authority settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the schema service, e.g. `https://api.launchpad.dev`.
    pub base_url: String,
    /// Project the schema belongs to.
    pub project_id: String,
    /// Retry budget for retryable (5xx) transport failures.
    pub retries: u32,
    /// Seconds a fetched schema stays fresh in the per-env cache.
    pub cache_ttl_secs: u64,
}

impl RemoteConfig {
    pub fn new(base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            project_id: project_id.into(),
            retries: 3,
            cache_ttl_secs: 60,
        }
    }
}

/// Branch engine policy knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchConfig {
    /// Prefix prepended to the slug to form the namespace name.
    pub prefix: String,
    /// The main namespace branches are cloned from by default.
    pub main_schema: String,
    /// Days of inactivity after which cleanup may delete a branch.
    pub auto_delete_days: u32,
    /// Whether branch creation copies data by default.
    pub copy_data: bool,
    /// Whether copied data is PII-masked by default.
    pub pii_masking: bool,
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            prefix: "branch_".to_string(),
            main_schema: "public".to_string(),
            auto_delete_days: 14,
            copy_data: false,
            pii_masking: true,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backend connection string; the scheme selects the dialect.
    pub database_url: String,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub tenant: TenantConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteConfig>,
    #[serde(default)]
    pub branch: BranchConfig,
}

impl EngineConfig {
    /// Configuration with defaults for everything but the connection string.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            pool: PoolConfig::default(),
            tenant: TenantConfig::default(),
            remote: None,
            branch: BranchConfig::default(),
        }
    }

    /// Loads configuration from a JSON file.
    pub fn read(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persists configuration as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
