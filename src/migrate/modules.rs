//! Module registry and multi-source migration collection.
//!
//! Platform modules declare a migration prefix and ship their own migration
//! directories. The registry stores module metadata in `lp_modules`; the
//! collector walks a directory whose children are module directories, loads
//! each through the shared file grammar, stamps every parsed migration with
//! its module name, and returns one deterministic global order.

use super::file::{load_dir, MigrationFile, MigrationScope};
use crate::db::driver::Driver;
use crate::db::value::{Row, Value};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Module registry table name.
pub const MODULES_TABLE: &str = "lp_modules";

/// Declared metadata for one platform module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDefinition {
    pub name: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Ordering prefix for the module's migrations.
    pub migration_prefix: String,
}

/// One discovered migration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSource {
    pub module_name: String,
    pub migrations_path: PathBuf,
}

/// CRUD over the `lp_modules` table.
pub struct ModuleRegistry {
    driver: Arc<Driver>,
}

impl ModuleRegistry {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let json_type = self.driver.dialect().json_type();
        let timestamp = self.driver.dialect().current_timestamp_expr();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {MODULES_TABLE} (\
             name VARCHAR(191) NOT NULL, \
             display_name TEXT NOT NULL, \
             description TEXT, \
             version TEXT NOT NULL, \
             dependencies {json_type}, \
             migration_prefix VARCHAR(191) NOT NULL, \
             registered_at TIMESTAMP NOT NULL DEFAULT {timestamp}, \
             PRIMARY KEY (name))"
        );
        self.driver.execute(&ddl, &[]).await?;
        Ok(())
    }

    pub async fn register(&self, module: &ModuleDefinition) -> Result<()> {
        self.ensure_table().await?;
        self.delete(&module.name).await?;
        let dialect = self.driver.dialect();
        let placeholders: Vec<String> = (1..=6).map(|i| dialect.placeholder(i)).collect();
        let sql = format!(
            "INSERT INTO {MODULES_TABLE} \
             (name, display_name, description, version, dependencies, migration_prefix) \
             VALUES ({})",
            placeholders.join(", ")
        );
        self.driver
            .execute(
                &sql,
                &[
                    Value::Text(module.name.clone()),
                    Value::Text(module.display_name.clone()),
                    module
                        .description
                        .clone()
                        .map(Value::Text)
                        .unwrap_or(Value::Null),
                    Value::Text(module.version.clone()),
                    Value::Json(serde_json::json!(module.dependencies)),
                    Value::Text(module.migration_prefix.clone()),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Result<Option<ModuleDefinition>> {
        self.ensure_table().await?;
        let dialect = self.driver.dialect();
        let sql = format!(
            "SELECT name, display_name, description, version, dependencies, migration_prefix \
             FROM {MODULES_TABLE} WHERE name = {}",
            dialect.placeholder(1)
        );
        let result = self
            .driver
            .query(&sql, &[Value::Text(name.to_string())])
            .await?;
        Ok(result.rows.first().map(parse_module_row))
    }

    pub async fn list(&self) -> Result<Vec<ModuleDefinition>> {
        self.ensure_table().await?;
        let sql = format!(
            "SELECT name, display_name, description, version, dependencies, migration_prefix \
             FROM {MODULES_TABLE} ORDER BY name"
        );
        let result = self.driver.query(&sql, &[]).await?;
        Ok(result.rows.iter().map(|r| parse_module_row(r)).collect())
    }

    pub async fn delete(&self, name: &str) -> Result<bool> {
        self.ensure_table().await?;
        let dialect = self.driver.dialect();
        let sql = format!(
            "DELETE FROM {MODULES_TABLE} WHERE name = {}",
            dialect.placeholder(1)
        );
        let result = self
            .driver
            .execute(&sql, &[Value::Text(name.to_string())])
            .await?;
        Ok(result.row_count > 0)
    }
}

fn parse_module_row(row: &Row) -> ModuleDefinition {
    let dependencies = match row.get("dependencies") {
        Some(Value::Json(json)) => serde_json::from_value(json.clone()).unwrap_or_default(),
        Some(Value::Text(text)) => serde_json::from_str(text).unwrap_or_default(),
        _ => Vec::new(),
    };
    ModuleDefinition {
        name: row.get_str("name").unwrap_or_default().to_string(),
        display_name: row.get_str("display_name").unwrap_or_default().to_string(),
        description: row.get_str("description").map(|d| d.to_string()),
        version: row.get_str("version").unwrap_or_default().to_string(),
        dependencies,
        migration_prefix: row
            .get_str("migration_prefix")
            .unwrap_or_default()
            .to_string(),
    }
}

/// Discovers module migration directories under `root`.
///
/// Every child directory containing a `migrations` subdirectory (or SQL
/// files directly) becomes a source named after the directory.
pub fn discover_sources(root: &Path) -> Result<Vec<MigrationSource>> {
    let mut sources = Vec::new();
    if !root.exists() {
        return Ok(sources);
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(module_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let nested = path.join("migrations");
        let migrations_path = if nested.is_dir() { nested } else { path.clone() };
        sources.push(MigrationSource {
            module_name: module_name.to_string(),
            migrations_path,
        });
    }
    sources.sort_by(|a, b| a.module_name.cmp(&b.module_name));
    Ok(sources)
}

/// Loads every source and returns one globally ordered migration sequence.
///
/// Ordering is `(migration_prefix, version, module_name)`; modules without
/// a registered prefix sort under their own name.
pub fn collect(
    sources: &[MigrationSource],
    modules: &[ModuleDefinition],
) -> Result<Vec<MigrationFile>> {
    let mut collected: Vec<(String, MigrationFile)> = Vec::new();
    for source in sources {
        let prefix = modules
            .iter()
            .find(|m| m.name == source.module_name)
            .map(|m| m.migration_prefix.clone())
            .unwrap_or_else(|| source.module_name.clone());
        let mut files = load_dir(&source.migrations_path, MigrationScope::Core, None)?;
        debug!(module = %source.module_name, count = files.len(), "collected module migrations");
        for file in &mut files {
            file.module_name = Some(source.module_name.clone());
        }
        collected.extend(files.into_iter().map(|f| (prefix.clone(), f)));
    }

    collected.sort_by(|(prefix_a, a), (prefix_b, b)| {
        (prefix_a, a.version, &a.module_name).cmp(&(prefix_b, b.version, &b.module_name))
    });
    Ok(collected.into_iter().map(|(_, file)| file).collect())
}
