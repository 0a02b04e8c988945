//! Schema synchronization against the remote authority.
//!
//! Composes the introspector, the diff engine, the sync-state store, and
//! the remote port:
//!
//! - **pull**: remote schema becomes the target; breaking changes require
//!   `force`; the synthesized migration applies locally in a transaction.
//! - **push**: the introspected local schema becomes the target; the
//!   migration is sent to the authority.
//! - **diff**: read-only comparison formatted as text, JSON or SQL.
//!
//! Every successful pull or push records per-table sync state with the
//! direction and the new common base.

pub mod state;

use crate::api::{PushMigrationOptions, PushOutcome, SchemaRemote};
use crate::db::driver::Driver;
use crate::error::{Error, Result};
use crate::libs::checksum::canonical_json_checksum;
use crate::schema::diff::{DiffEngine, DiffOptions, SchemaDiff};
use crate::schema::introspect::{normalize, Introspector};
use crate::schema::SchemaDefinition;
use state::{SyncDirection, SyncState, SyncStateStore, SyncStatus};
use std::sync::Arc;
use tracing::info;

pub use state::{derive_status, SYNC_METADATA_TABLE};

/// Options shared by pull and push.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Proceed despite breaking changes.
    pub force: bool,
    /// Compute and report without applying or pushing.
    pub dry_run: bool,
    /// Principal recorded on the sync-state rows.
    pub synced_by: Option<String>,
}

/// Output format for [`SyncService::diff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffFormat {
    Text,
    Json,
    Sql,
}

/// Result of a pull.
#[derive(Debug)]
pub struct PullResult {
    pub applied: bool,
    pub diff: SchemaDiff,
}

/// Result of a push.
#[derive(Debug)]
pub struct PushResult {
    pub pushed: bool,
    pub outcome: Option<PushOutcome>,
    pub diff: SchemaDiff,
}

/// Sync orchestrator over one local namespace and one remote project.
pub struct SyncService<R: SchemaRemote> {
    driver: Arc<Driver>,
    remote: R,
    app_id: String,
    /// Local namespace introspected for comparison.
    schema_name: String,
    diff_options: DiffOptions,
    state: SyncStateStore,
}

impl<R: SchemaRemote> SyncService<R> {
    pub fn new(driver: Arc<Driver>, remote: R, app_id: impl Into<String>, schema_name: impl Into<String>) -> Self {
        let state = SyncStateStore::new(Arc::clone(&driver));
        Self {
            driver,
            remote,
            app_id: app_id.into(),
            schema_name: schema_name.into(),
            diff_options: DiffOptions::default(),
            state,
        }
    }

    pub fn with_diff_options(mut self, options: DiffOptions) -> Self {
        self.diff_options = options;
        self
    }

    async fn local_schema(&self) -> Result<SchemaDefinition> {
        let introspector = Introspector::new(Arc::clone(&self.driver));
        let introspected = introspector.introspect(&self.schema_name).await?;
        let (mut definition, _caveats) = normalize(&introspected);
        // Engine-owned tables are not part of the application schema.
        definition.tables.retain(|name, _| !name.starts_with("lp_"));
        Ok(definition)
    }

    /// Pulls the remote schema onto the local database.
    pub async fn pull(&self, env: &str, options: &SyncOptions) -> Result<PullResult> {
        let remote = self.remote.fetch_schema(env).await?;
        let local = self.local_schema().await?;

        let engine = DiffEngine::new(self.driver.dialect(), self.diff_options);
        let diff = engine.diff(Some(&local), &remote.schema)?;

        if !diff.breaking_changes.is_empty() && !options.force {
            return Err(Error::BreakingChange {
                changes: diff.breaking_changes,
            });
        }
        if options.dry_run || !diff.has_differences {
            return Ok(PullResult {
                applied: false,
                diff,
            });
        }

        let migration = diff.migration.clone().unwrap_or_default();
        if self.driver.dialect().supports_transactional_ddl() {
            let mut tx = self.driver.begin().await?;
            for statement in &migration.forward {
                tx.execute(statement, &[]).await?;
            }
            tx.commit().await?;
        } else {
            for statement in &migration.forward {
                self.driver.execute(statement, &[]).await?;
            }
        }

        self.record_states(&remote.schema, remote.version, SyncDirection::Pull, options)
            .await?;
        info!(env, changes = diff.changes.len(), "pull applied");
        Ok(PullResult {
            applied: true,
            diff,
        })
    }

    /// Pushes the local schema to the remote authority.
    pub async fn push(&self, env: &str, options: &SyncOptions) -> Result<PushResult> {
        let local = self.local_schema().await?;
        let remote = self.remote.fetch_schema(env).await?;

        let engine = DiffEngine::new(self.driver.dialect(), self.diff_options);
        let diff = engine.diff(Some(&remote.schema), &local)?;

        if !diff.breaking_changes.is_empty() && !options.force {
            return Err(Error::BreakingChange {
                changes: diff.breaking_changes,
            });
        }
        if options.dry_run || !diff.has_differences {
            return Ok(PushResult {
                pushed: false,
                outcome: None,
                diff,
            });
        }

        let migration = diff.migration.clone().unwrap_or_default();
        let outcome = self
            .remote
            .push_migration(
                &migration,
                &PushMigrationOptions {
                    env: env.to_string(),
                    message: None,
                    force: options.force,
                },
            )
            .await?;

        if outcome.success {
            self.record_states(&local, remote.version + 1, SyncDirection::Push, options)
                .await?;
        }
        info!(env, success = outcome.success, "push completed");
        Ok(PushResult {
            pushed: outcome.success,
            outcome: Some(outcome),
            diff,
        })
    }

    /// Read-only diff of local vs remote.
    pub async fn diff(&self, env: &str, format: DiffFormat) -> Result<String> {
        let local = self.local_schema().await?;
        let remote = self.remote.fetch_schema(env).await?;
        let engine = DiffEngine::new(self.driver.dialect(), self.diff_options);
        let diff = engine.diff(Some(&local), &remote.schema)?;
        Ok(format_diff(&diff, format))
    }

    /// Per-table sync state with derived statuses.
    pub async fn status(&self) -> Result<Vec<(SyncState, SyncStatus)>> {
        Ok(self
            .state
            .list(&self.app_id)
            .await?
            .into_iter()
            .map(|state| {
                let status = state.status();
                (state, status)
            })
            .collect())
    }

    /// Rows where local and remote both changed since the common base.
    pub async fn detect_conflicts(&self) -> Result<Vec<SyncState>> {
        self.state.detect_conflicts(&self.app_id).await
    }

    /// After a successful sync both sides share the same checksum, which
    /// becomes the new base.
    async fn record_states(
        &self,
        schema: &SchemaDefinition,
        version: i64,
        direction: SyncDirection,
        options: &SyncOptions,
    ) -> Result<()> {
        for (table_name, table) in &schema.tables {
            let checksum = canonical_json_checksum(table)?;
            self.state
                .record_sync(&SyncState {
                    app_id: self.app_id.clone(),
                    table_name: table_name.clone(),
                    local_checksum: Some(checksum.clone()),
                    local_version: Some(version),
                    remote_checksum: Some(checksum.clone()),
                    remote_version: Some(version),
                    base_checksum: Some(checksum),
                    last_sync_direction: Some(direction),
                    last_sync_at: None,
                    last_sync_by: options.synced_by.clone(),
                    conflict_details: None,
                })
                .await?;
        }
        Ok(())
    }
}

fn format_diff(diff: &SchemaDiff, format: DiffFormat) -> String {
    match format {
        DiffFormat::Json => serde_json::json!({
            "hasDifferences": diff.has_differences,
            "summary": diff.summary,
            "changes": diff.changes,
            "breakingChanges": diff.breaking_changes,
            "caveats": diff.caveats,
        })
        .to_string(),
        DiffFormat::Sql => diff
            .migration
            .as_ref()
            .map(|m| m.forward.join(";\n"))
            .unwrap_or_default(),
        DiffFormat::Text => {
            let mut out = String::new();
            out.push_str(&diff.summary);
            for change in &diff.changes {
                out.push('\n');
                if change.is_breaking {
                    out.push_str("! ");
                } else {
                    out.push_str("  ");
                }
                out.push_str(&change.description);
            }
            for caveat in &diff.caveats {
                out.push_str("\n~ ");
                out.push_str(caveat);
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::diff::{ChangeType, SchemaChange};

    #[test]
    fn text_format_marks_breaking_changes() {
        let diff = SchemaDiff {
            has_differences: true,
            summary: "2 change(s), 1 breaking".into(),
            changes: vec![
                SchemaChange {
                    change_type: ChangeType::ColumnAdd,
                    table: "users".into(),
                    column: Some("age".into()),
                    description: "add column users.age".into(),
                    is_breaking: false,
                    forward: vec![],
                    reverse: vec![],
                },
                SchemaChange {
                    change_type: ChangeType::ColumnDrop,
                    table: "users".into(),
                    column: Some("email".into()),
                    description: "drop column users.email".into(),
                    is_breaking: true,
                    forward: vec![],
                    reverse: vec![],
                },
            ],
            breaking_changes: vec![],
            migration: None,
            caveats: vec![],
        };
        let text = format_diff(&diff, DiffFormat::Text);
        assert!(text.contains("  add column users.age"));
        assert!(text.contains("! drop column users.email"));
    }

    #[test]
    fn sql_format_joins_forward_statements() {
        let diff = SchemaDiff {
            has_differences: true,
            summary: String::new(),
            changes: vec![],
            breaking_changes: vec![],
            migration: Some(crate::schema::diff::DiffMigration {
                forward: vec!["CREATE TABLE a(id INT)".into(), "DROP TABLE b".into()],
                reverse: vec![],
            }),
            caveats: vec![],
        };
        assert_eq!(
            format_diff(&diff, DiffFormat::Sql),
            "CREATE TABLE a(id INT);\nDROP TABLE b"
        );
    }
}
