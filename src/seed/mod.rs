//! Seed runner: ordered, dependency-resolved data population.
//!
//! Seeds are declared values, each naming a table, its rows, and the seeds
//! it depends on. The runner orders them topologically (a cycle is a typed
//! error), skips seeds already recorded in `lp_seeds` under the same
//! checksum, inserts rows through the tenant-injecting compiler, and
//! records each application. A seed whose rows changed since it was
//! applied is handled per the `on_change` policy.

use crate::db::driver::Driver;
use crate::db::value::Value;
use crate::error::{Error, Result};
use crate::libs::checksum::sha256_hex;
use crate::libs::config::TenantConfig;
use crate::query::builder::QueryEngine;
use crate::query::RowData;
use crate::tenant::TenantContext;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Seed tracking table name.
pub const SEEDS_TABLE: &str = "lp_seeds";

/// What to do when an applied seed's rows have changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnChange {
    /// Refuse to run and surface the drift.
    #[default]
    Fail,
    /// Delete the tracking row and re-insert.
    Reapply,
    /// Leave the applied version in place.
    Skip,
}

/// One declared seed.
#[derive(Debug, Clone)]
pub struct SeedDefinition {
    pub name: String,
    pub table: String,
    pub rows: Vec<RowData>,
    pub depends_on: Vec<String>,
}

impl SeedDefinition {
    /// Checksum over the canonical JSON rendering of the rows.
    pub fn checksum(&self) -> Result<String> {
        Ok(sha256_hex(&serde_json::to_vec(&self.rows)?))
    }
}

/// Per-seed outcome.
#[derive(Debug, Clone)]
pub struct SeedResult {
    pub name: String,
    pub applied: bool,
    pub rows_inserted: u64,
    pub skipped_reason: Option<String>,
}

/// Options for a seed run.
#[derive(Debug, Clone, Default)]
pub struct SeedOptions {
    pub on_change: OnChange,
    pub dry_run: bool,
}

/// Dependency-ordered seed runner.
pub struct SeedRunner {
    driver: Arc<Driver>,
    engine: QueryEngine,
    ctx: TenantContext,
}

impl SeedRunner {
    pub fn new(driver: Arc<Driver>, tenant: TenantConfig, ctx: TenantContext) -> Result<Self> {
        ctx.validate()?;
        let engine = QueryEngine::new(driver.kind(), tenant)?;
        Ok(Self {
            driver,
            engine,
            ctx,
        })
    }

    async fn ensure_table(&self) -> Result<()> {
        let timestamp = self.driver.dialect().current_timestamp_expr();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {SEEDS_TABLE} (\
             name VARCHAR(191) NOT NULL, \
             checksum CHAR(64) NOT NULL, \
             row_count BIGINT NOT NULL, \
             applied_at TIMESTAMP NOT NULL DEFAULT {timestamp}, \
             PRIMARY KEY (name))"
        );
        self.driver.execute(&ddl, &[]).await?;
        Ok(())
    }

    /// Runs the seeds in dependency order.
    pub async fn run(
        &self,
        seeds: &[SeedDefinition],
        options: &SeedOptions,
    ) -> Result<Vec<SeedResult>> {
        let ordered = topo_sort(seeds)?;
        self.ensure_table().await?;
        let applied = self.load_applied().await?;

        let mut results = Vec::with_capacity(ordered.len());
        for seed in ordered {
            let checksum = seed.checksum()?;
            match applied.get(&seed.name) {
                Some(existing) if existing == &checksum => {
                    debug!(seed = %seed.name, "seed already applied");
                    results.push(SeedResult {
                        name: seed.name.clone(),
                        applied: false,
                        rows_inserted: 0,
                        skipped_reason: Some("already applied".into()),
                    });
                    continue;
                }
                Some(_) => match options.on_change {
                    OnChange::Fail => {
                        return Err(Error::SchemaInvalid(format!(
                            "seed {:?} changed since it was applied; rerun with an explicit on_change policy",
                            seed.name
                        )))
                    }
                    OnChange::Skip => {
                        results.push(SeedResult {
                            name: seed.name.clone(),
                            applied: false,
                            rows_inserted: 0,
                            skipped_reason: Some("changed but skipped by policy".into()),
                        });
                        continue;
                    }
                    OnChange::Reapply => {
                        if !options.dry_run {
                            self.forget(&seed.name).await?;
                        }
                    }
                },
                None => {}
            }

            if options.dry_run {
                results.push(SeedResult {
                    name: seed.name.clone(),
                    applied: true,
                    rows_inserted: 0,
                    skipped_reason: Some("dry run".into()),
                });
                continue;
            }

            let inserted = self.insert_rows(seed).await?;
            self.record(&seed.name, &checksum, inserted).await?;
            info!(seed = %seed.name, rows = inserted, "seed applied");
            results.push(SeedResult {
                name: seed.name.clone(),
                applied: true,
                rows_inserted: inserted,
                skipped_reason: None,
            });
        }
        Ok(results)
    }

    async fn insert_rows(&self, seed: &SeedDefinition) -> Result<u64> {
        if seed.rows.is_empty() {
            return Ok(0);
        }
        let table = self.engine.table(seed.table.as_str(), self.ctx.clone());
        let builder = table.insert_many(seed.rows.clone());
        let result = builder.execute(&self.driver).await?;
        Ok(result.row_count)
    }

    async fn load_applied(&self) -> Result<HashMap<String, String>> {
        let sql = format!("SELECT name, checksum FROM {SEEDS_TABLE}");
        let result = self.driver.query(&sql, &[]).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| {
                Some((
                    row.get_str("name")?.to_string(),
                    row.get_str("checksum")?.to_string(),
                ))
            })
            .collect())
    }

    async fn record(&self, name: &str, checksum: &str, row_count: u64) -> Result<()> {
        let dialect = self.driver.dialect();
        let sql = format!(
            "INSERT INTO {SEEDS_TABLE} (name, checksum, row_count) VALUES ({}, {}, {})",
            dialect.placeholder(1),
            dialect.placeholder(2),
            dialect.placeholder(3)
        );
        self.driver
            .execute(
                &sql,
                &[
                    Value::Text(name.to_string()),
                    Value::Text(checksum.to_string()),
                    Value::Int(row_count as i64),
                ],
            )
            .await?;
        Ok(())
    }

    async fn forget(&self, name: &str) -> Result<()> {
        let dialect = self.driver.dialect();
        let sql = format!(
            "DELETE FROM {SEEDS_TABLE} WHERE name = {}",
            dialect.placeholder(1)
        );
        self.driver
            .execute(&sql, &[Value::Text(name.to_string())])
            .await?;
        Ok(())
    }
}

/// Orders seeds so dependencies come first; a cycle is a typed error.
pub fn topo_sort(seeds: &[SeedDefinition]) -> Result<Vec<&SeedDefinition>> {
    let by_name: HashMap<&str, &SeedDefinition> =
        seeds.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut ordered = Vec::with_capacity(seeds.len());
    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_progress: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        seed: &'a SeedDefinition,
        by_name: &HashMap<&str, &'a SeedDefinition>,
        visited: &mut HashSet<&'a str>,
        in_progress: &mut HashSet<&'a str>,
        ordered: &mut Vec<&'a SeedDefinition>,
    ) -> Result<()> {
        if visited.contains(seed.name.as_str()) {
            return Ok(());
        }
        if !in_progress.insert(seed.name.as_str()) {
            return Err(Error::SeedCycle(seed.name.clone()));
        }
        for dependency in &seed.depends_on {
            if let Some(dep) = by_name.get(dependency.as_str()) {
                visit(dep, by_name, visited, in_progress, ordered)?;
            }
        }
        in_progress.remove(seed.name.as_str());
        visited.insert(seed.name.as_str());
        ordered.push(seed);
        Ok(())
    }

    for seed in seeds {
        visit(seed, &by_name, &mut visited, &mut in_progress, &mut ordered)?;
    }
    Ok(ordered)
}
