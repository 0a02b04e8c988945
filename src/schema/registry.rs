//! Stored schema registry.
//!
//! Persists one schema record per `(app_id, schema_name)` in
//! `lp_schema_registry`. Registration validates the incoming definition,
//! diffs it against the stored one, applies the synthesized migration
//! (transactionally where the dialect allows), upserts the registry row
//! with a bumped version, and returns per-change results. Re-registering
//! an identical schema is a no-op with an empty result list.

use super::diff::{DiffEngine, DiffOptions, SchemaChange};
use super::SchemaDefinition;
use crate::db::driver::Driver;
use crate::db::value::{Row, Value};
use crate::error::{Error, Result};
use crate::libs::conn_str::DatabaseKind;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

/// Registry table name.
pub const SCHEMA_REGISTRY_TABLE: &str = "lp_schema_registry";

/// One stored schema record.
#[derive(Debug, Clone)]
pub struct SchemaRecord {
    pub app_id: String,
    pub schema_name: String,
    pub version: i64,
    pub schema: SchemaDefinition,
    pub checksum: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Outcome of applying one change during registration.
#[derive(Debug, Clone)]
pub struct ChangeResult {
    pub description: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Registry over the driver's `lp_schema_registry` table.
pub struct SchemaRegistry {
    driver: Arc<Driver>,
    diff_options: DiffOptions,
}

impl SchemaRegistry {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self {
            driver,
            diff_options: DiffOptions::default(),
        }
    }

    pub fn with_diff_options(mut self, options: DiffOptions) -> Self {
        self.diff_options = options;
        self
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let dialect = self.driver.dialect();
        let json_type = dialect.json_type();
        let timestamp = dialect.current_timestamp_expr();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {SCHEMA_REGISTRY_TABLE} (\
             app_id VARCHAR(191) NOT NULL, \
             schema_name VARCHAR(191) NOT NULL, \
             version BIGINT NOT NULL, \
             schema_json {json_type} NOT NULL, \
             checksum CHAR(64) NOT NULL, \
             created_at TIMESTAMP NOT NULL DEFAULT {timestamp}, \
             updated_at TIMESTAMP NOT NULL DEFAULT {timestamp}, \
             PRIMARY KEY (app_id, schema_name))"
        );
        self.driver.execute(&ddl, &[]).await?;
        Ok(())
    }

    /// Loads the stored record for `(app_id, schema_name)`.
    pub async fn get(&self, app_id: &str, schema_name: &str) -> Result<Option<SchemaRecord>> {
        self.ensure_table().await?;
        let dialect = self.driver.dialect();
        let sql = format!(
            "SELECT app_id, schema_name, version, schema_json, checksum, created_at, updated_at \
             FROM {SCHEMA_REGISTRY_TABLE} WHERE app_id = {} AND schema_name = {}",
            dialect.placeholder(1),
            dialect.placeholder(2)
        );
        let result = self
            .driver
            .query(
                &sql,
                &[
                    Value::Text(app_id.to_string()),
                    Value::Text(schema_name.to_string()),
                ],
            )
            .await?;
        result.rows.first().map(parse_record_row).transpose()
    }

    /// Registers a schema: validate, diff, converge the database, upsert.
    pub async fn register(
        &self,
        app_id: &str,
        schema_name: &str,
        schema: &SchemaDefinition,
    ) -> Result<Vec<ChangeResult>> {
        schema.validate()?;
        self.ensure_table().await?;

        let current = self.get(app_id, schema_name).await?;
        let engine = DiffEngine::new(self.driver.dialect(), self.diff_options);
        let diff = engine.diff(current.as_ref().map(|r| &r.schema), schema)?;

        if !diff.has_differences {
            return Ok(Vec::new());
        }

        let results = self.apply_changes(&diff.changes).await?;
        if results.iter().any(|r| !r.success) {
            return Ok(results);
        }

        let version = current.map(|r| r.version + 1).unwrap_or(1);
        self.upsert_record(app_id, schema_name, version, schema)
            .await?;
        info!(app_id, schema_name, version, "schema registered");
        Ok(results)
    }

    pub async fn list(&self, app_id: &str) -> Result<Vec<SchemaRecord>> {
        self.ensure_table().await?;
        let dialect = self.driver.dialect();
        let sql = format!(
            "SELECT app_id, schema_name, version, schema_json, checksum, created_at, updated_at \
             FROM {SCHEMA_REGISTRY_TABLE} WHERE app_id = {} ORDER BY schema_name",
            dialect.placeholder(1)
        );
        let result = self
            .driver
            .query(&sql, &[Value::Text(app_id.to_string())])
            .await?;
        result.rows.iter().map(parse_record_row).collect()
    }

    pub async fn delete(&self, app_id: &str, schema_name: &str) -> Result<bool> {
        self.ensure_table().await?;
        let dialect = self.driver.dialect();
        let sql = format!(
            "DELETE FROM {SCHEMA_REGISTRY_TABLE} WHERE app_id = {} AND schema_name = {}",
            dialect.placeholder(1),
            dialect.placeholder(2)
        );
        let result = self
            .driver
            .execute(
                &sql,
                &[
                    Value::Text(app_id.to_string()),
                    Value::Text(schema_name.to_string()),
                ],
            )
            .await?;
        Ok(result.row_count > 0)
    }

    async fn apply_changes(&self, changes: &[SchemaChange]) -> Result<Vec<ChangeResult>> {
        let mut results = Vec::with_capacity(changes.len());
        if self.driver.dialect().supports_transactional_ddl() {
            let mut tx = self.driver.begin().await?;
            for change in changes {
                let mut failed = None;
                for statement in &change.forward {
                    if let Err(error) = tx.execute(statement, &[]).await {
                        failed = Some(error);
                        break;
                    }
                }
                match failed {
                    None => results.push(ChangeResult {
                        description: change.description.clone(),
                        success: true,
                        error: None,
                    }),
                    Some(error) => {
                        results.push(ChangeResult {
                            description: change.description.clone(),
                            success: false,
                            error: Some(error.to_string()),
                        });
                        tx.rollback().await?;
                        return Ok(results);
                    }
                }
            }
            tx.commit().await?;
        } else {
            for change in changes {
                let mut failed = None;
                for statement in &change.forward {
                    if let Err(error) = self.driver.execute(statement, &[]).await {
                        failed = Some(error);
                        break;
                    }
                }
                let success = failed.is_none();
                results.push(ChangeResult {
                    description: change.description.clone(),
                    success,
                    error: failed.map(|e| e.to_string()),
                });
                if !success {
                    break;
                }
            }
        }
        Ok(results)
    }

    async fn upsert_record(
        &self,
        app_id: &str,
        schema_name: &str,
        version: i64,
        schema: &SchemaDefinition,
    ) -> Result<()> {
        let dialect = self.driver.dialect();
        let checksum = schema.checksum()?;
        let schema_json = serde_json::to_value(schema)?;
        let timestamp = dialect.current_timestamp_expr();

        let placeholders: Vec<String> = (1..=5).map(|i| dialect.placeholder(i)).collect();
        let sql = match self.driver.kind() {
            DatabaseKind::MySql => format!(
                "INSERT INTO {SCHEMA_REGISTRY_TABLE} \
                 (app_id, schema_name, version, schema_json, checksum) \
                 VALUES ({}) \
                 ON DUPLICATE KEY UPDATE version = VALUES(version), \
                 schema_json = VALUES(schema_json), checksum = VALUES(checksum), \
                 updated_at = {timestamp}",
                placeholders.join(", ")
            ),
            _ => format!(
                "INSERT INTO {SCHEMA_REGISTRY_TABLE} \
                 (app_id, schema_name, version, schema_json, checksum) \
                 VALUES ({}) \
                 ON CONFLICT (app_id, schema_name) DO UPDATE SET \
                 version = EXCLUDED.version, schema_json = EXCLUDED.schema_json, \
                 checksum = EXCLUDED.checksum, updated_at = {timestamp}",
                placeholders.join(", ")
            ),
        };
        self.driver
            .execute(
                &sql,
                &[
                    Value::Text(app_id.to_string()),
                    Value::Text(schema_name.to_string()),
                    Value::Int(version),
                    Value::Json(schema_json),
                    Value::Text(checksum),
                ],
            )
            .await?;
        Ok(())
    }
}

fn parse_record_row(row: &Row) -> Result<SchemaRecord> {
    let schema = match row.get("schema_json") {
        Some(Value::Json(json)) => serde_json::from_value(json.clone())?,
        Some(Value::Text(text)) => serde_json::from_str(text)?,
        _ => {
            return Err(Error::SchemaInvalid(
                "registry row without schema document".into(),
            ))
        }
    };
    let timestamp = |column: &str| match row.get(column) {
        Some(Value::Timestamp(ts)) => Some(*ts),
        _ => None,
    };
    Ok(SchemaRecord {
        app_id: row.get_str("app_id").unwrap_or_default().to_string(),
        schema_name: row.get_str("schema_name").unwrap_or_default().to_string(),
        version: row.get_i64("version").unwrap_or(0),
        schema,
        checksum: row.get_str("checksum").unwrap_or_default().to_string(),
        created_at: timestamp("created_at"),
        updated_at: timestamp("updated_at"),
    })
}
