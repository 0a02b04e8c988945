//! Remote schema authority port.
//!
//! The sync service talks to the platform's schema service through the
//! [`SchemaRemote`] trait; [`remote::RemoteSchemaClient`] is the production
//! implementation over HTTP. Credentials are read-only JSON from the user's
//! home directory; their write path belongs to the platform CLI.
//!
//! ## Wire contract
//!
//! - `GET  /v1/projects/{projectId}/schema` with `X-Environment`
//! - `POST /v1/projects/{projectId}/schema/migrations`
//! - `GET  /v1/projects/{projectId}/schema/sync-status`
//! - `GET  /v1/health`
//!
//! Auth is `Authorization: Bearer <token>`; 401 raises an authentication
//! error, 5xx responses are retried, other 4xx raise a typed remote error.

pub mod remote;

use crate::error::{Error, Result};
use crate::schema::diff::DiffMigration;
use crate::schema::SchemaDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub use remote::RemoteSchemaClient;

/// Default credentials location relative to the home directory.
const CREDENTIALS_FILE: &str = ".launchpad/credentials.json";

/// Stored platform credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl Credentials {
    /// Loads credentials from the default path
    /// (`~/.launchpad/credentials.json`).
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Authentication("cannot resolve home directory".into()))?;
        Self::load_from(home.join(CREDENTIALS_FILE))
    }

    /// Loads credentials from an explicit path.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        let raw = fs::read_to_string(&path).map_err(|_| {
            Error::Authentication(format!(
                "credentials file not found at {}; log in first",
                path.display()
            ))
        })?;
        let credentials: Credentials = serde_json::from_str(&raw)?;
        if credentials.token.trim().is_empty() {
            return Err(Error::Authentication("credentials file has no token".into()));
        }
        Ok(credentials)
    }
}

/// A schema snapshot fetched from the authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSchema {
    pub schema: SchemaDefinition,
    pub version: i64,
    pub checksum: String,
    pub updated_at: DateTime<Utc>,
    pub env: String,
}

/// Remote-side sync summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSyncStatus {
    pub version: i64,
    pub checksum: String,
    pub updated_at: DateTime<Utc>,
    pub env: String,
}

/// Options accompanying a pushed migration.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMigrationOptions {
    pub env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub force: bool,
}

/// Authority's answer to a pushed migration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub success: bool,
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration: Option<DiffMigration>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Port to the remote schema authority.
#[allow(async_fn_in_trait)]
pub trait SchemaRemote {
    async fn fetch_schema(&self, env: &str) -> Result<RemoteSchema>;

    async fn push_migration(
        &self,
        migration: &DiffMigration,
        options: &PushMigrationOptions,
    ) -> Result<PushOutcome>;

    async fn get_sync_status(&self, env: &str) -> Result<RemoteSyncStatus>;

    async fn health_check(&self) -> Result<bool>;
}
