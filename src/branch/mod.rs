//! Database branches: schema-level namespaces with copy-on-write clones.
//!
//! A branch is an isolated PostgreSQL schema namespace cloned from a parent
//! branch (or the main namespace): identical empty tables via
//! `LIKE ... INCLUDING ALL`, sequences with their positions, views with
//! rewritten qualifiers, and optionally a data copy with PII masking. The
//! metadata row in `lp_branch_metadata` commits atomically with the clone.
//!
//! Branching requires real schema namespaces, so only the PostgreSQL
//! dialect is served; other backends get a typed unsupported-operation
//! error.

pub mod cleanup;
pub mod diff;
pub mod mask;

use crate::db::driver::{Driver, Tx};
use crate::db::value::{Row, Value};
use crate::error::{Error, Result};
use crate::libs::config::BranchConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Branch metadata table name.
pub const BRANCH_METADATA_TABLE: &str = "lp_branch_metadata";

/// Branch lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchStatus {
    Active,
    Protected,
    Stale,
    Deleting,
}

impl BranchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BranchStatus::Active => "active",
            BranchStatus::Protected => "protected",
            BranchStatus::Stale => "stale",
            BranchStatus::Deleting => "deleting",
        }
    }
}

/// One branch record.
#[derive(Debug, Clone)]
pub struct Branch {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub schema_name: String,
    pub parent_branch: Option<String>,
    pub git_branch: Option<String>,
    pub pull_request: Option<String>,
    pub status: BranchStatus,
    pub protected: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub migration_count: i64,
    pub table_count: i64,
    pub storage_bytes: i64,
    pub auto_delete_days: i64,
    pub copy_data: bool,
    pub pii_masking: bool,
}

/// Options for [`BranchEngine::create`].
#[derive(Debug, Clone, Default)]
pub struct CreateBranchOptions {
    pub name: String,
    /// Parent branch slug; absent means the main namespace.
    pub parent: Option<String>,
    pub copy_data: Option<bool>,
    pub pii_masking: Option<bool>,
    pub protected: bool,
    pub git_branch: Option<String>,
    pub pull_request: Option<String>,
}

/// What a connection needs to target a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchResult {
    pub connection_string: String,
    pub search_path: String,
    pub schema_name: String,
}

/// Branch engine over one PostgreSQL database.
pub struct BranchEngine {
    driver: Arc<Driver>,
    config: BranchConfig,
    database_url: String,
}

impl BranchEngine {
    pub fn new(driver: Arc<Driver>, config: BranchConfig, database_url: impl Into<String>) -> Self {
        Self {
            driver,
            config,
            database_url: database_url.into(),
        }
    }

    pub(crate) fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    fn require_schema_support(&self) -> Result<()> {
        if !self.driver.dialect().supports_schemas() {
            return Err(Error::UnsupportedOperation(format!(
                "database branches require schema namespaces; {} has none",
                self.driver.kind()
            )));
        }
        Ok(())
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let timestamp = self.driver.dialect().current_timestamp_expr();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {BRANCH_METADATA_TABLE} (\
             id UUID NOT NULL, \
             name TEXT NOT NULL, \
             slug VARCHAR(100) NOT NULL, \
             schema_name TEXT NOT NULL, \
             parent_branch TEXT, \
             git_branch TEXT, \
             pull_request TEXT, \
             status VARCHAR(16) NOT NULL DEFAULT 'active', \
             protected BOOLEAN NOT NULL DEFAULT FALSE, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT {timestamp}, \
             last_accessed_at TIMESTAMPTZ NOT NULL DEFAULT {timestamp}, \
             deleted_at TIMESTAMPTZ, \
             migration_count BIGINT NOT NULL DEFAULT 0, \
             table_count BIGINT NOT NULL DEFAULT 0, \
             storage_bytes BIGINT NOT NULL DEFAULT 0, \
             auto_delete_days BIGINT NOT NULL DEFAULT 14, \
             copy_data BOOLEAN NOT NULL DEFAULT FALSE, \
             pii_masking BOOLEAN NOT NULL DEFAULT TRUE, \
             PRIMARY KEY (id))"
        );
        self.driver.execute(&ddl, &[]).await?;
        Ok(())
    }

    /// Creates a branch: namespace, structure clone, optional masked data
    /// copy, and the metadata row, all in one transaction.
    pub async fn create(&self, options: &CreateBranchOptions) -> Result<Branch> {
        self.require_schema_support()?;
        self.ensure_table().await?;

        let slug = slugify(&options.name);
        if slug.is_empty() {
            return Err(Error::InvalidIdentifier(format!(
                "branch name {:?} produces an empty slug",
                options.name
            )));
        }
        if self.get(&slug).await?.is_some() {
            return Err(Error::InvalidIdentifier(format!(
                "branch slug {slug:?} already exists"
            )));
        }

        let schema_name = format!("{}{}", self.config.prefix, slug);
        let source_schema = match &options.parent {
            Some(parent_slug) => self
                .get(parent_slug)
                .await?
                .ok_or_else(|| Error::BranchNotFound(parent_slug.clone()))?
                .schema_name,
            None => self.config.main_schema.clone(),
        };

        let copy_data = options.copy_data.unwrap_or(self.config.copy_data);
        let pii_masking = options.pii_masking.unwrap_or(self.config.pii_masking);

        let mut tx = self.driver.begin().await?;
        tx.execute(&format!("CREATE SCHEMA {}", quote(&schema_name)), &[])
            .await?;

        let tables = self.clone_structure(&mut tx, &source_schema, &schema_name).await?;
        self.clone_sequences(&mut tx, &source_schema, &schema_name).await?;
        self.clone_views(&mut tx, &source_schema, &schema_name).await?;

        if copy_data {
            for table in &tables {
                self.copy_table_data(&mut tx, &source_schema, &schema_name, table, pii_masking)
                    .await?;
            }
        }

        let branch = Branch {
            id: Uuid::new_v4(),
            name: options.name.clone(),
            slug: slug.clone(),
            schema_name: schema_name.clone(),
            parent_branch: options.parent.clone(),
            git_branch: options.git_branch.clone(),
            pull_request: options.pull_request.clone(),
            status: if options.protected {
                BranchStatus::Protected
            } else {
                BranchStatus::Active
            },
            protected: options.protected,
            created_at: None,
            last_accessed_at: None,
            deleted_at: None,
            migration_count: 0,
            table_count: tables.len() as i64,
            storage_bytes: 0,
            auto_delete_days: self.config.auto_delete_days as i64,
            copy_data,
            pii_masking,
        };
        self.insert_metadata(&mut tx, &branch).await?;
        tx.commit().await?;

        info!(slug = %branch.slug, schema = %branch.schema_name, tables = tables.len(), "branch created");
        Ok(branch)
    }

    /// Marks the branch accessed and returns its connection target.
    pub async fn switch(&self, slug: &str) -> Result<SwitchResult> {
        let branch = self
            .get(slug)
            .await?
            .ok_or_else(|| Error::BranchNotFound(slug.to_string()))?;
        let sql = format!(
            "UPDATE {BRANCH_METADATA_TABLE} SET last_accessed_at = {} WHERE slug = $1",
            self.driver.dialect().current_timestamp_expr()
        );
        self.driver
            .execute(&sql, &[Value::Text(slug.to_string())])
            .await?;
        Ok(SwitchResult {
            connection_string: self.database_url.clone(),
            search_path: format!("{}, {}", branch.schema_name, self.config.main_schema),
            schema_name: branch.schema_name,
        })
    }

    /// Deletes a branch: status flip, namespace drop, metadata removal, in
    /// one transaction.
    pub async fn delete(&self, slug: &str, force: bool) -> Result<()> {
        self.require_schema_support()?;
        let branch = self
            .get(slug)
            .await?
            .ok_or_else(|| Error::BranchNotFound(slug.to_string()))?;
        if branch.protected && !force {
            return Err(Error::BranchProtected(slug.to_string()));
        }

        let timestamp = self.driver.dialect().current_timestamp_expr();
        let mut tx = self.driver.begin().await?;
        tx.execute(
            &format!(
                "UPDATE {BRANCH_METADATA_TABLE} \
                 SET status = 'deleting', deleted_at = {timestamp} WHERE slug = $1"
            ),
            &[Value::Text(slug.to_string())],
        )
        .await?;
        tx.execute(
            &format!("DROP SCHEMA IF EXISTS {} CASCADE", quote(&branch.schema_name)),
            &[],
        )
        .await?;
        tx.execute(
            &format!("DELETE FROM {BRANCH_METADATA_TABLE} WHERE slug = $1"),
            &[Value::Text(slug.to_string())],
        )
        .await?;
        tx.commit().await?;
        info!(slug, "branch deleted");
        Ok(())
    }

    /// Loads one live branch by slug.
    pub async fn get(&self, slug: &str) -> Result<Option<Branch>> {
        self.ensure_table().await?;
        let sql = format!(
            "SELECT * FROM {BRANCH_METADATA_TABLE} WHERE slug = $1 AND status != 'deleting'"
        );
        let result = self
            .driver
            .query(&sql, &[Value::Text(slug.to_string())])
            .await?;
        Ok(result.rows.first().map(parse_branch_row))
    }

    pub async fn list(&self) -> Result<Vec<Branch>> {
        self.ensure_table().await?;
        let sql = format!("SELECT * FROM {BRANCH_METADATA_TABLE} ORDER BY created_at");
        let result = self.driver.query(&sql, &[]).await?;
        Ok(result.rows.iter().map(parse_branch_row).collect())
    }

    /// Recomputes table count and storage for a branch.
    pub async fn refresh_stats(&self, slug: &str) -> Result<Branch> {
        let branch = self
            .get(slug)
            .await?
            .ok_or_else(|| Error::BranchNotFound(slug.to_string()))?;
        let stats = self
            .driver
            .query(
                "SELECT count(*)::bigint AS table_count, \
                        COALESCE(sum(pg_total_relation_size(c.oid)), 0)::bigint AS storage_bytes \
                 FROM pg_class c JOIN pg_namespace n ON n.oid = c.relnamespace \
                 WHERE n.nspname = $1 AND c.relkind = 'r'",
                &[Value::Text(branch.schema_name.clone())],
            )
            .await?;
        let (table_count, storage_bytes) = stats
            .rows
            .first()
            .map(|row| {
                (
                    row.get_i64("table_count").unwrap_or(0),
                    row.get_i64("storage_bytes").unwrap_or(0),
                )
            })
            .unwrap_or((0, 0));
        self.driver
            .execute(
                &format!(
                    "UPDATE {BRANCH_METADATA_TABLE} \
                     SET table_count = $1, storage_bytes = $2 WHERE slug = $3"
                ),
                &[
                    Value::Int(table_count),
                    Value::Int(storage_bytes),
                    Value::Text(slug.to_string()),
                ],
            )
            .await?;
        self.get(slug)
            .await?
            .ok_or_else(|| Error::BranchNotFound(slug.to_string()))
    }

    // -- clone steps ---------------------------------------------------

    async fn clone_structure(
        &self,
        tx: &mut Tx,
        source: &str,
        target: &str,
    ) -> Result<Vec<String>> {
        let tables = tx
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
                &[Value::Text(source.to_string())],
            )
            .await?;
        let mut names = Vec::with_capacity(tables.rows.len());
        for row in &tables.rows {
            let Some(table) = row.get_str("table_name") else { continue };
            tx.execute(
                &format!(
                    "CREATE TABLE {}.{} (LIKE {}.{} INCLUDING ALL)",
                    quote(target),
                    quote(table),
                    quote(source),
                    quote(table)
                ),
                &[],
            )
            .await?;
            names.push(table.to_string());
        }
        Ok(names)
    }

    async fn clone_sequences(&self, tx: &mut Tx, source: &str, target: &str) -> Result<()> {
        let sequences = tx
            .query(
                "SELECT sequencename, COALESCE(last_value, start_value) AS last_value, \
                        increment_by, min_value, max_value \
                 FROM pg_sequences WHERE schemaname = $1",
                &[Value::Text(source.to_string())],
            )
            .await?;
        for row in &sequences.rows {
            let Some(name) = row.get_str("sequencename") else { continue };
            let increment = row.get_i64("increment_by").unwrap_or(1);
            let min_value = row.get_i64("min_value").unwrap_or(1);
            let max_value = row.get_i64("max_value").unwrap_or(i64::MAX);
            let last_value = row.get_i64("last_value").unwrap_or(min_value);
            tx.execute(
                &format!(
                    "CREATE SEQUENCE {}.{} INCREMENT BY {} MINVALUE {} MAXVALUE {}",
                    quote(target),
                    quote(name),
                    increment,
                    min_value,
                    max_value
                ),
                &[],
            )
            .await?;
            tx.execute(
                &format!(
                    "SELECT setval('{}.{}', {}, true)",
                    escape_literal_ident(target),
                    escape_literal_ident(name),
                    last_value
                ),
                &[],
            )
            .await?;
        }
        Ok(())
    }

    async fn clone_views(&self, tx: &mut Tx, source: &str, target: &str) -> Result<()> {
        let views = tx
            .query(
                "SELECT viewname, definition FROM pg_views WHERE schemaname = $1",
                &[Value::Text(source.to_string())],
            )
            .await?;
        for row in &views.rows {
            let (Some(name), Some(definition)) =
                (row.get_str("viewname"), row.get_str("definition"))
            else {
                continue;
            };
            let rewritten = rewrite_namespace(definition, source, target);
            tx.execute(
                &format!(
                    "CREATE VIEW {}.{} AS {}",
                    quote(target),
                    quote(name),
                    rewritten.trim_end_matches(';')
                ),
                &[],
            )
            .await?;
        }
        Ok(())
    }

    async fn copy_table_data(
        &self,
        tx: &mut Tx,
        source: &str,
        target: &str,
        table: &str,
        pii_masking: bool,
    ) -> Result<()> {
        let columns = tx
            .query(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
                &[Value::Text(source.to_string()), Value::Text(table.to_string())],
            )
            .await?;
        if columns.rows.is_empty() {
            warn!(table, "no columns found for data copy, skipping");
            return Ok(());
        }

        let mut column_list = Vec::with_capacity(columns.rows.len());
        let mut projections = Vec::with_capacity(columns.rows.len());
        for row in &columns.rows {
            let (Some(column), Some(data_type)) =
                (row.get_str("column_name"), row.get_str("data_type"))
            else {
                continue;
            };
            let quoted = quote(column);
            column_list.push(quoted.clone());
            if pii_masking {
                projections.push(mask::projection(column, data_type, &quoted));
            } else {
                projections.push(quoted);
            }
        }

        tx.execute(
            &format!(
                "INSERT INTO {}.{} ({}) SELECT {} FROM {}.{}",
                quote(target),
                quote(table),
                column_list.join(", "),
                projections.join(", "),
                quote(source),
                quote(table)
            ),
            &[],
        )
        .await?;
        Ok(())
    }

    async fn insert_metadata(&self, tx: &mut Tx, branch: &Branch) -> Result<()> {
        let sql = format!(
            "INSERT INTO {BRANCH_METADATA_TABLE} \
             (id, name, slug, schema_name, parent_branch, git_branch, pull_request, \
              status, protected, migration_count, table_count, storage_bytes, \
              auto_delete_days, copy_data, pii_masking) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        );
        let optional = |value: &Option<String>| {
            value.clone().map(Value::Text).unwrap_or(Value::Null)
        };
        tx.execute(
            &sql,
            &[
                Value::Text(branch.id.to_string()),
                Value::Text(branch.name.clone()),
                Value::Text(branch.slug.clone()),
                Value::Text(branch.schema_name.clone()),
                optional(&branch.parent_branch),
                optional(&branch.git_branch),
                optional(&branch.pull_request),
                Value::Text(branch.status.as_str().to_string()),
                Value::Bool(branch.protected),
                Value::Int(branch.migration_count),
                Value::Int(branch.table_count),
                Value::Int(branch.storage_bytes),
                Value::Int(branch.auto_delete_days),
                Value::Bool(branch.copy_data),
                Value::Bool(branch.pii_masking),
            ],
        )
        .await?;
        Ok(())
    }
}

/// Lowercases, folds non-alphanumeric runs to `_`, trims, caps at 100.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_separator = true;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_separator = false;
        } else if !last_was_separator {
            slug.push('_');
            last_was_separator = true;
        }
    }
    let trimmed = slug.trim_matches('_');
    trimmed.chars().take(100).collect()
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Identifier embedded inside a string literal (setval's regclass arg).
fn escape_literal_ident(identifier: &str) -> String {
    identifier.replace('\'', "''")
}

/// Rewrites `source.`-qualified references (quoted or bare) to `target.`.
pub(crate) fn rewrite_namespace(sql: &str, source: &str, target: &str) -> String {
    sql.replace(&format!("\"{source}\"."), &format!("\"{target}\"."))
        .replace(&format!("{source}."), &format!("{target}."))
}

fn parse_branch_row(row: &Row) -> Branch {
    let status = match row.get_str("status") {
        Some("protected") => BranchStatus::Protected,
        Some("stale") => BranchStatus::Stale,
        Some("deleting") => BranchStatus::Deleting,
        _ => BranchStatus::Active,
    };
    let timestamp = |column: &str| match row.get(column) {
        Some(Value::Timestamp(ts)) => Some(*ts),
        _ => None,
    };
    Branch {
        id: row
            .get_str("id")
            .and_then(|id| Uuid::parse_str(id).ok())
            .unwrap_or_else(Uuid::nil),
        name: row.get_str("name").unwrap_or_default().to_string(),
        slug: row.get_str("slug").unwrap_or_default().to_string(),
        schema_name: row.get_str("schema_name").unwrap_or_default().to_string(),
        parent_branch: row.get_str("parent_branch").map(|p| p.to_string()),
        git_branch: row.get_str("git_branch").map(|g| g.to_string()),
        pull_request: row.get_str("pull_request").map(|p| p.to_string()),
        status,
        protected: row.get_bool("protected").unwrap_or(false),
        created_at: timestamp("created_at"),
        last_accessed_at: timestamp("last_accessed_at"),
        deleted_at: timestamp("deleted_at"),
        migration_count: row.get_i64("migration_count").unwrap_or(0),
        table_count: row.get_i64("table_count").unwrap_or(0),
        storage_bytes: row.get_i64("storage_bytes").unwrap_or(0),
        auto_delete_days: row.get_i64("auto_delete_days").unwrap_or(14),
        copy_data: row.get_bool("copy_data").unwrap_or(false),
        pii_masking: row.get_bool("pii_masking").unwrap_or(true),
    }
}
