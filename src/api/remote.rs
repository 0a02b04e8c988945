//! HTTP client for the remote schema authority.
//!
//! Wraps `reqwest` with bearer authentication, a per-environment TTL cache
//! that suppresses duplicate schema fetches, and bounded retries with
//! exponential backoff for retryable (5xx) transport failures. The cache is
//! cleared on every push so subsequent pulls observe the new authority
//! state.

use super::{
    Credentials, PushMigrationOptions, PushOutcome, RemoteSchema, RemoteSyncStatus, SchemaRemote,
};
use crate::error::{Error, Result};
use crate::libs::config::RemoteConfig;
use crate::schema::diff::DiffMigration;
use reqwest::{Client, Response, StatusCode};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Production [`SchemaRemote`] implementation.
pub struct RemoteSchemaClient {
    client: Client,
    config: RemoteConfig,
    credentials: Credentials,
    cache: Mutex<HashMap<String, (Instant, RemoteSchema)>>,
}

impl RemoteSchemaClient {
    pub fn new(config: RemoteConfig, credentials: Credentials) -> Self {
        Self {
            client: Client::new(),
            config,
            credentials,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Loads credentials from the default location.
    pub fn from_config(config: RemoteConfig) -> Result<Self> {
        let credentials = Credentials::load()?;
        Ok(Self::new(config, credentials))
    }

    fn url(&self, suffix: &str) -> String {
        format!(
            "{}/v1/projects/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            suffix
        )
    }

    /// Sends a request, retrying 5xx responses with exponential backoff.
    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<Response> {
        let mut attempt = 0u32;
        loop {
            let response = build()
                .bearer_auth(&self.credentials.token)
                .send()
                .await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                return Err(Error::Authentication(
                    "remote schema service rejected the token".into(),
                ));
            }
            if status.is_server_error() && attempt < self.config.retries {
                attempt += 1;
                let delay = Duration::from_millis(250) * 2u32.saturating_pow(attempt - 1);
                warn!(status = status.as_u16(), attempt, "remote 5xx, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(Error::SchemaRemote {
                    status: status.as_u16(),
                    message,
                });
            }
            return Ok(response);
        }
    }

    fn cached_schema(&self, env: &str) -> Option<RemoteSchema> {
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let cache = self.cache.lock().expect("cache lock poisoned");
        cache.get(env).and_then(|(fetched_at, schema)| {
            (fetched_at.elapsed() < ttl).then(|| schema.clone())
        })
    }

    fn store_schema(&self, env: &str, schema: &RemoteSchema) {
        let mut cache = self.cache.lock().expect("cache lock poisoned");
        cache.insert(env.to_string(), (Instant::now(), schema.clone()));
    }

    /// Drops every cached entry.
    pub fn clear_cache(&self) {
        self.cache.lock().expect("cache lock poisoned").clear();
    }
}

impl SchemaRemote for RemoteSchemaClient {
    async fn fetch_schema(&self, env: &str) -> Result<RemoteSchema> {
        if let Some(schema) = self.cached_schema(env) {
            debug!(env, "remote schema served from cache");
            return Ok(schema);
        }
        let url = self.url("schema");
        let response = self
            .send_with_retry(|| self.client.get(&url).header("X-Environment", env))
            .await?;
        let schema: RemoteSchema = response.json().await?;
        self.store_schema(env, &schema);
        Ok(schema)
    }

    async fn push_migration(
        &self,
        migration: &DiffMigration,
        options: &PushMigrationOptions,
    ) -> Result<PushOutcome> {
        let url = self.url("schema/migrations");
        let body = serde_json::json!({
            "migration": migration,
            "options": options,
        });
        let response = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .header("X-Environment", &options.env)
                    .json(&body)
            })
            .await?;
        // The authority is the new source of truth; cached pulls are stale.
        self.clear_cache();
        Ok(response.json().await?)
    }

    async fn get_sync_status(&self, env: &str) -> Result<RemoteSyncStatus> {
        let url = self.url("schema/sync-status");
        let response = self
            .send_with_retry(|| self.client.get(&url).header("X-Environment", env))
            .await?;
        Ok(response.json().await?)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!(
            "{}/v1/health",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}
