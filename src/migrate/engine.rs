//! Migration apply/rollback engine with checksum-anchored history.
//!
//! Tracks applied migrations in the `lp_migrations` table, identified by
//! `(scope, template_key, version)`. Up and down SQL are stored with each
//! history row so rollback survives file deletion. Where the dialect
//! supports transactional DDL, each migration's statements and its history
//! row commit atomically; elsewhere statements run sequentially and the row
//! is written at the end.
//!
//! Only one `up`/`down` invocation per scope and template key may run at a
//! time; the engine takes no advisory lock, callers serialize.

use super::file::{load_dir, MigrationFile, MigrationScope};
use crate::db::driver::Driver;
use crate::db::value::{Row, Value};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// History table name.
pub const MIGRATIONS_TABLE: &str = "lp_migrations";

/// Options for [`MigrationEngine::up`] and [`MigrationEngine::down`].
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Apply or roll back at most this many migrations.
    pub steps: Option<usize>,
    /// Up: stop after this version. Down: stop before rolling it back.
    pub to_version: Option<i64>,
    /// Report what would run without executing anything.
    pub dry_run: bool,
    /// Principal recorded on the history rows.
    pub executed_by: Option<String>,
}

/// Per-migration outcome.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub version: i64,
    pub name: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

/// One row of the history table.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub scope: MigrationScope,
    pub template_key: Option<String>,
    pub module_name: Option<String>,
    pub checksum: String,
    pub up_sql: Vec<String>,
    pub down_sql: Vec<String>,
    pub applied_at: Option<DateTime<Utc>>,
    pub executed_by: Option<String>,
}

/// Status report over files and history.
#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    /// Highest applied version, 0 when none.
    pub current: i64,
    pub applied: usize,
    pub pending: usize,
    pub pending_versions: Vec<i64>,
}

/// Checksum verification report.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    pub valid: bool,
    pub issues: Vec<String>,
}

/// File-based migration engine for one `(scope, template_key)` stream.
pub struct MigrationEngine {
    driver: Arc<Driver>,
    dir: PathBuf,
    scope: MigrationScope,
    template_key: Option<String>,
}

impl MigrationEngine {
    pub fn new(
        driver: Arc<Driver>,
        dir: impl Into<PathBuf>,
        scope: MigrationScope,
        template_key: Option<String>,
    ) -> Result<Self> {
        if let Some(key) = &template_key {
            super::file::validate_template_key(key)?;
        }
        Ok(Self {
            driver,
            dir: dir.into(),
            scope,
            template_key,
        })
    }

    /// Applies pending migrations in file order.
    pub async fn up(&self, options: &MigrateOptions) -> Result<Vec<MigrationResult>> {
        let files = self.load_files()?;
        self.ensure_table().await?;
        let applied: HashSet<i64> = self
            .load_applied()
            .await?
            .iter()
            .map(|m| m.version)
            .collect();

        let mut pending: Vec<&MigrationFile> = files
            .iter()
            .filter(|f| !applied.contains(&f.version))
            .collect();
        if let Some(to_version) = options.to_version {
            pending.retain(|f| f.version <= to_version);
        }
        if let Some(steps) = options.steps {
            pending.truncate(steps);
        }

        let mut results = Vec::with_capacity(pending.len());
        for migration in pending {
            if options.dry_run {
                results.push(MigrationResult {
                    version: migration.version,
                    name: migration.name.clone(),
                    success: true,
                    error: None,
                    duration: Duration::ZERO,
                });
                continue;
            }

            let started = Instant::now();
            let outcome = self.apply_one(migration, options).await;
            let duration = started.elapsed();
            match outcome {
                Ok(()) => {
                    info!(version = migration.version, name = %migration.name, "migration applied");
                    results.push(MigrationResult {
                        version: migration.version,
                        name: migration.name.clone(),
                        success: true,
                        error: None,
                        duration,
                    });
                }
                Err(error) => {
                    warn!(version = migration.version, %error, "migration failed, aborting sequence");
                    results.push(MigrationResult {
                        version: migration.version,
                        name: migration.name.clone(),
                        success: false,
                        error: Some(error.to_string()),
                        duration,
                    });
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Rolls back applied migrations, newest first.
    ///
    /// Defaults to one step when neither `steps` nor `to_version` is given.
    pub async fn down(&self, options: &MigrateOptions) -> Result<Vec<MigrationResult>> {
        self.ensure_table().await?;
        let mut applied = self.load_applied().await?;
        applied.reverse();

        if let Some(to_version) = options.to_version {
            applied.retain(|m| m.version > to_version);
        }
        let steps = match (options.steps, options.to_version) {
            (Some(steps), _) => steps,
            (None, Some(_)) => applied.len(),
            (None, None) => 1,
        };
        applied.truncate(steps);

        let mut results = Vec::with_capacity(applied.len());
        for migration in &applied {
            if migration.down_sql.is_empty() {
                results.push(MigrationResult {
                    version: migration.version,
                    name: migration.name.clone(),
                    success: false,
                    error: Some(Error::NoDownAvailable(migration.version).to_string()),
                    duration: Duration::ZERO,
                });
                break;
            }
            if options.dry_run {
                results.push(MigrationResult {
                    version: migration.version,
                    name: migration.name.clone(),
                    success: true,
                    error: None,
                    duration: Duration::ZERO,
                });
                continue;
            }

            let started = Instant::now();
            let outcome = self.rollback_one(migration).await;
            let duration = started.elapsed();
            match outcome {
                Ok(()) => {
                    info!(version = migration.version, "migration rolled back");
                    results.push(MigrationResult {
                        version: migration.version,
                        name: migration.name.clone(),
                        success: true,
                        error: None,
                        duration,
                    });
                }
                Err(error) => {
                    warn!(version = migration.version, %error, "rollback failed, aborting sequence");
                    results.push(MigrationResult {
                        version: migration.version,
                        name: migration.name.clone(),
                        success: false,
                        error: Some(error.to_string()),
                        duration,
                    });
                    break;
                }
            }
        }
        Ok(results)
    }

    /// Files vs history summary.
    pub async fn status(&self) -> Result<MigrationStatus> {
        let files = self.load_files()?;
        self.ensure_table().await?;
        let applied = self.load_applied().await?;
        let applied_versions: HashSet<i64> = applied.iter().map(|m| m.version).collect();
        let pending_versions: Vec<i64> = files
            .iter()
            .filter(|f| !applied_versions.contains(&f.version))
            .map(|f| f.version)
            .collect();
        Ok(MigrationStatus {
            current: applied.iter().map(|m| m.version).max().unwrap_or(0),
            applied: applied.len(),
            pending: pending_versions.len(),
            pending_versions,
        })
    }

    /// Recomputes on-disk checksums for every applied migration.
    pub async fn verify(&self) -> Result<VerifyReport> {
        let files = self.load_files()?;
        self.ensure_table().await?;
        let applied = self.load_applied().await?;

        let mut issues = Vec::new();
        for record in &applied {
            match files.iter().find(|f| f.version == record.version) {
                None => issues.push(format!(
                    "migration file missing for applied version {}",
                    record.version
                )),
                Some(file) => {
                    let actual = file.checksum();
                    if actual != record.checksum {
                        issues.push(format!(
                            "checksum mismatch for version {}: expected {}, found {}",
                            record.version, record.checksum, actual
                        ));
                    }
                }
            }
        }
        Ok(VerifyReport {
            valid: issues.is_empty(),
            issues,
        })
    }

    /// Applied rows in ascending version order.
    pub async fn history(&self) -> Result<Vec<AppliedMigration>> {
        self.ensure_table().await?;
        self.load_applied().await
    }

    // -- internals -----------------------------------------------------

    fn load_files(&self) -> Result<Vec<MigrationFile>> {
        load_dir(&self.dir, self.scope, self.template_key.as_deref())
    }

    /// The stored form of the template key; `''` stands for "none" so the
    /// identity index stays unique across NULL-less backends.
    fn stored_template_key(&self) -> String {
        self.template_key.clone().unwrap_or_default()
    }

    async fn ensure_table(&self) -> Result<()> {
        let dialect = self.driver.dialect();
        let timestamp = dialect.current_timestamp_expr();
        let list_type = dialect.statement_list_type();

        let ddl = match self.driver.kind() {
            crate::libs::conn_str::DatabaseKind::MySql => format!(
                "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (\
                 version BIGINT NOT NULL, \
                 name TEXT NOT NULL, \
                 scope VARCHAR(16) NOT NULL, \
                 template_key VARCHAR(191) NOT NULL DEFAULT '', \
                 module_name TEXT NULL, \
                 checksum CHAR(64) NOT NULL, \
                 up_sql {list_type} NOT NULL, \
                 down_sql {list_type} NULL, \
                 applied_at TIMESTAMP NOT NULL DEFAULT {timestamp}, \
                 executed_by TEXT NULL, \
                 UNIQUE KEY uq_lp_migrations_identity (scope, template_key, version))"
            ),
            _ => format!(
                "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (\
                 version BIGINT NOT NULL, \
                 name TEXT NOT NULL, \
                 scope TEXT NOT NULL, \
                 template_key TEXT NOT NULL DEFAULT '', \
                 module_name TEXT, \
                 checksum TEXT NOT NULL, \
                 up_sql {list_type} NOT NULL, \
                 down_sql {list_type}, \
                 applied_at TIMESTAMP NOT NULL DEFAULT {timestamp}, \
                 executed_by TEXT)"
            ),
        };
        self.driver.execute(&ddl, &[]).await?;

        if self.driver.kind() != crate::libs::conn_str::DatabaseKind::MySql {
            let index = format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_lp_migrations_identity \
                 ON {MIGRATIONS_TABLE} (scope, template_key, version)"
            );
            self.driver.execute(&index, &[]).await?;
        }
        Ok(())
    }

    async fn load_applied(&self) -> Result<Vec<AppliedMigration>> {
        let dialect = self.driver.dialect();
        let sql = format!(
            "SELECT version, name, scope, template_key, module_name, checksum, \
                    up_sql, down_sql, applied_at, executed_by \
             FROM {MIGRATIONS_TABLE} WHERE scope = {} AND template_key = {} \
             ORDER BY version ASC",
            dialect.placeholder(1),
            dialect.placeholder(2)
        );
        let result = self
            .driver
            .query(
                &sql,
                &[
                    Value::Text(self.scope.as_str().to_string()),
                    Value::Text(self.stored_template_key()),
                ],
            )
            .await?;
        result.rows.iter().map(parse_applied_row).collect()
    }

    async fn apply_one(&self, migration: &MigrationFile, options: &MigrateOptions) -> Result<()> {
        let (sql, params) = self.insert_history_sql(migration, options);
        if self.driver.dialect().supports_transactional_ddl() {
            let mut tx = self.driver.begin().await?;
            for statement in &migration.up {
                tx.execute(statement, &[]).await?;
            }
            tx.execute(&sql, &params).await?;
            tx.commit().await
        } else {
            for statement in &migration.up {
                self.driver.execute(statement, &[]).await?;
            }
            self.driver.execute(&sql, &params).await?;
            Ok(())
        }
    }

    async fn rollback_one(&self, migration: &AppliedMigration) -> Result<()> {
        let dialect = self.driver.dialect();
        let delete_sql = format!(
            "DELETE FROM {MIGRATIONS_TABLE} WHERE scope = {} AND template_key = {} AND version = {}",
            dialect.placeholder(1),
            dialect.placeholder(2),
            dialect.placeholder(3)
        );
        let delete_params = vec![
            Value::Text(self.scope.as_str().to_string()),
            Value::Text(self.stored_template_key()),
            Value::Int(migration.version),
        ];

        if dialect.supports_transactional_ddl() {
            let mut tx = self.driver.begin().await?;
            for statement in &migration.down_sql {
                tx.execute(statement, &[]).await?;
            }
            tx.execute(&delete_sql, &delete_params).await?;
            tx.commit().await
        } else {
            for statement in &migration.down_sql {
                self.driver.execute(statement, &[]).await?;
            }
            self.driver.execute(&delete_sql, &delete_params).await?;
            Ok(())
        }
    }

    fn insert_history_sql(
        &self,
        migration: &MigrationFile,
        options: &MigrateOptions,
    ) -> (String, Vec<Value>) {
        let dialect = self.driver.dialect();
        let placeholders: Vec<String> = (1..=9).map(|i| dialect.placeholder(i)).collect();
        let sql = format!(
            "INSERT INTO {MIGRATIONS_TABLE} \
             (version, name, scope, template_key, module_name, checksum, up_sql, down_sql, executed_by) \
             VALUES ({})",
            placeholders.join(", ")
        );
        let params = vec![
            Value::Int(migration.version),
            Value::Text(migration.name.clone()),
            Value::Text(migration.scope.as_str().to_string()),
            Value::Text(self.stored_template_key()),
            migration
                .module_name
                .clone()
                .map(Value::Text)
                .unwrap_or(Value::Null),
            Value::Text(migration.checksum()),
            Value::Json(serde_json::json!(migration.up)),
            Value::Json(serde_json::json!(migration.down)),
            options
                .executed_by
                .clone()
                .map(Value::Text)
                .unwrap_or(Value::Null),
        ];
        (sql, params)
    }
}

fn parse_applied_row(row: &Row) -> Result<AppliedMigration> {
    let scope = match row.get_str("scope") {
        Some("template") => MigrationScope::Template,
        _ => MigrationScope::Core,
    };
    let template_key = row
        .get_str("template_key")
        .filter(|k| !k.is_empty())
        .map(|k| k.to_string());
    let applied_at = match row.get("applied_at") {
        Some(Value::Timestamp(ts)) => Some(*ts),
        _ => None,
    };
    Ok(AppliedMigration {
        version: row
            .get_i64("version")
            .ok_or_else(|| Error::InvalidMigrationFile("history row without version".into()))?,
        name: row.get_str("name").unwrap_or_default().to_string(),
        scope,
        template_key,
        module_name: row.get_str("module_name").map(|m| m.to_string()),
        checksum: row.get_str("checksum").unwrap_or_default().to_string(),
        up_sql: parse_statement_list(row.get("up_sql"))?,
        down_sql: parse_statement_list(row.get("down_sql"))?,
        applied_at,
        executed_by: row.get_str("executed_by").map(|e| e.to_string()),
    })
}

/// Statement lists come back as native JSON or as JSON text depending on
/// the backend.
fn parse_statement_list(value: Option<&Value>) -> Result<Vec<String>> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Json(json)) => Ok(serde_json::from_value(json.clone())?),
        Some(Value::Text(text)) => Ok(serde_json::from_str(text)?),
        Some(other) => Err(Error::InvalidMigrationFile(format!(
            "unexpected statement list value {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_list_round_trip() {
        let json = Value::Json(serde_json::json!(["A", "B"]));
        assert_eq!(parse_statement_list(Some(&json)).unwrap(), vec!["A", "B"]);

        let text = Value::Text("[\"C\"]".into());
        assert_eq!(parse_statement_list(Some(&text)).unwrap(), vec!["C"]);

        assert!(parse_statement_list(None).unwrap().is_empty());
        assert!(parse_statement_list(Some(&Value::Null)).unwrap().is_empty());
    }
}
