//! SQL driver: pooled connections for the three relational backends.
//!
//! One [`Driver`] wraps one sqlx pool and exposes the engine's query
//! surface: `query`/`execute` over dynamic [`Value`] parameters, pinned
//! transactions via [`Driver::begin`], pool statistics, health checks and
//! the graceful drain protocol. Every logical query registers in the shared
//! [`QueryTracker`] for its lifetime; a draining driver rejects new work
//! with a retryable error.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use launchpad_db::db::Driver;
//! use launchpad_db::libs::config::EngineConfig;
//!
//! # async fn example() -> launchpad_db::error::Result<()> {
//! let driver = Driver::connect(&EngineConfig::new("sqlite::memory:")).await?;
//! let result = driver.query("SELECT 1 AS one", &[]).await?;
//! assert_eq!(result.row_count, 1);
//! # Ok(())
//! # }
//! ```

use super::health::{HealthMonitor, HealthStatus};
use super::tracker::{QueryTracker, TrackerStats};
use super::value::{
    bind_mysql, bind_pg, bind_sqlite, decode_mysql_row, decode_pg_row, decode_sqlite_row,
    QueryResult, Value,
};
use crate::dialect::{dialect_for, Dialect};
use crate::error::{Error, Result};
use crate::libs::config::{EngineConfig, PoolConfig};
use crate::libs::conn_str::{infer_kind, DatabaseKind};
use crate::tenant::TenantContext;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{MySqlPool, PgPool, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Pool utilization snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
    pub waiting: u32,
    pub max: u32,
}

pub(crate) enum SqlPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

/// Pooled driver for one relational backend.
pub struct Driver {
    pool: SqlPool,
    kind: DatabaseKind,
    dialect: &'static dyn Dialect,
    tracker: Arc<QueryTracker>,
    health: HealthMonitor,
    pool_config: PoolConfig,
}

impl Driver {
    /// Connects a pool for the backend inferred from the connection string.
    ///
    /// A `mongodb://` URL is rejected here; the document backend has its
    /// own driver type.
    pub async fn connect(config: &EngineConfig) -> Result<Self> {
        let kind = infer_kind(&config.database_url)?;
        let pool_config = config.pool.clone();
        let connect_timeout = Duration::from_secs(pool_config.connect_timeout_secs);
        let idle_timeout = Duration::from_secs(pool_config.idle_timeout_secs);

        let pool = match kind {
            DatabaseKind::Postgres => SqlPool::Postgres(
                PgPoolOptions::new()
                    .max_connections(pool_config.max_connections)
                    .acquire_timeout(connect_timeout)
                    .idle_timeout(idle_timeout)
                    .connect(&config.database_url)
                    .await
                    .map_err(map_sqlx)?,
            ),
            DatabaseKind::MySql => SqlPool::MySql(
                MySqlPoolOptions::new()
                    .max_connections(pool_config.max_connections)
                    .acquire_timeout(connect_timeout)
                    .idle_timeout(idle_timeout)
                    .connect(&config.database_url)
                    .await
                    .map_err(map_sqlx)?,
            ),
            DatabaseKind::Sqlite => SqlPool::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(pool_config.max_connections)
                    .acquire_timeout(connect_timeout)
                    .idle_timeout(idle_timeout)
                    .connect(&config.database_url)
                    .await
                    .map_err(map_sqlx)?,
            ),
            DatabaseKind::MongoDb => {
                return Err(Error::UnsupportedOperation(
                    "mongodb connection strings are served by MongoDriver".into(),
                ))
            }
        };

        let dialect =
            dialect_for(kind).expect("sql backends always have a dialect");

        debug!(backend = %kind, "database pool connected");

        Ok(Self {
            pool,
            kind,
            dialect,
            tracker: QueryTracker::new(),
            health: HealthMonitor::new(),
            pool_config,
        })
    }

    pub fn kind(&self) -> DatabaseKind {
        self.kind
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub(crate) fn tracker(&self) -> &Arc<QueryTracker> {
        &self.tracker
    }

    /// Runs a statement and decodes all result rows.
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let _guard = self.tracker.register(sql)?;
        debug!(%sql, params = params.len(), "query");
        match &self.pool {
            SqlPool::Postgres(pool) => {
                let rows = bind_pg(sqlx::query(sql), params)
                    .fetch_all(pool)
                    .await
                    .map_err(map_sqlx)?;
                let decoded: Vec<_> = rows.iter().map(decode_pg_row).collect();
                Ok(QueryResult {
                    row_count: decoded.len() as u64,
                    rows: decoded,
                })
            }
            SqlPool::MySql(pool) => {
                let rows = bind_mysql(sqlx::query(sql), params)
                    .fetch_all(pool)
                    .await
                    .map_err(map_sqlx)?;
                let decoded: Vec<_> = rows.iter().map(decode_mysql_row).collect();
                Ok(QueryResult {
                    row_count: decoded.len() as u64,
                    rows: decoded,
                })
            }
            SqlPool::Sqlite(pool) => {
                let rows = bind_sqlite(sqlx::query(sql), params)
                    .fetch_all(pool)
                    .await
                    .map_err(map_sqlx)?;
                let decoded: Vec<_> = rows.iter().map(decode_sqlite_row).collect();
                Ok(QueryResult {
                    row_count: decoded.len() as u64,
                    rows: decoded,
                })
            }
        }
    }

    /// Runs a statement and returns only the affected-row count.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let _guard = self.tracker.register(sql)?;
        debug!(%sql, params = params.len(), "execute");
        let row_count = match &self.pool {
            SqlPool::Postgres(pool) => bind_pg(sqlx::query(sql), params)
                .execute(pool)
                .await
                .map_err(map_sqlx)?
                .rows_affected(),
            SqlPool::MySql(pool) => bind_mysql(sqlx::query(sql), params)
                .execute(pool)
                .await
                .map_err(map_sqlx)?
                .rows_affected(),
            SqlPool::Sqlite(pool) => bind_sqlite(sqlx::query(sql), params)
                .execute(pool)
                .await
                .map_err(map_sqlx)?
                .rows_affected(),
        };
        Ok(QueryResult {
            rows: Vec::new(),
            row_count,
        })
    }

    /// Runs a statement with a per-call timeout.
    ///
    /// An elapsed timeout surfaces as a retryable transient error; the
    /// underlying statement may still complete on the server.
    pub async fn query_with_timeout(
        &self,
        sql: &str,
        params: &[Value],
        timeout: Duration,
    ) -> Result<QueryResult> {
        match tokio::time::timeout(timeout, self.query(sql, params)).await {
            Ok(result) => result,
            Err(_) => Err(Error::DriverTransient(format!(
                "query exceeded {}ms timeout",
                timeout.as_millis()
            ))),
        }
    }

    /// Starts a transaction pinned to one connection.
    ///
    /// The transaction counts as one active query in the tracker until it
    /// commits, rolls back, or is dropped, so drain waits for it.
    pub async fn begin(&self) -> Result<Tx> {
        let guard = self.tracker.register("BEGIN")?;
        let inner = match &self.pool {
            SqlPool::Postgres(pool) => TxInner::Postgres(pool.begin().await.map_err(map_sqlx)?),
            SqlPool::MySql(pool) => TxInner::MySql(pool.begin().await.map_err(map_sqlx)?),
            SqlPool::Sqlite(pool) => TxInner::Sqlite(pool.begin().await.map_err(map_sqlx)?),
        };
        Ok(Tx {
            inner,
            _guard: guard,
        })
    }

    /// Starts a transaction with tenant session variables set.
    ///
    /// On PostgreSQL the variables `app.current_app_id` and
    /// `app.current_org_id` are set transaction-locally via `set_config`,
    /// so database-layer row policies can enforce isolation independently.
    /// The database clears them on commit or rollback. Other backends have
    /// no session-variable equivalent and skip this step.
    pub async fn begin_with_tenant(&self, ctx: &TenantContext) -> Result<Tx> {
        ctx.validate()?;
        let mut tx = self.begin().await?;
        if self.kind == DatabaseKind::Postgres {
            tx.execute(
                "SELECT set_config('app.current_app_id', $1, true), \
                        set_config('app.current_org_id', $2, true)",
                &[
                    Value::Text(ctx.app_id.clone()),
                    Value::Text(ctx.organization_id.clone()),
                ],
            )
            .await?;
        }
        Ok(tx)
    }

    /// One-shot lightweight probe.
    pub async fn health_check(&self) -> HealthStatus {
        let started = std::time::Instant::now();
        let outcome = self.probe().await;
        let status = HealthStatus {
            healthy: outcome.is_ok(),
            latency_ms: started.elapsed().as_millis() as u64,
            last_checked_at: chrono::Utc::now(),
            error: outcome.err().map(|e| e.to_string()),
        };
        self.health.record(&status);
        status
    }

    async fn probe(&self) -> Result<()> {
        match &self.pool {
            SqlPool::Postgres(pool) => { sqlx::query("SELECT 1").execute(pool).await.map_err(map_sqlx)?; }
            SqlPool::MySql(pool) => { sqlx::query("SELECT 1").execute(pool).await.map_err(map_sqlx)?; }
            SqlPool::Sqlite(pool) => { sqlx::query("SELECT 1").execute(pool).await.map_err(map_sqlx)?; }
        };
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.health.is_healthy()
    }

    /// Registers the callback fired once per healthy↔unhealthy edge.
    pub fn on_health_change(&self, callback: impl Fn(bool) + Send + Sync + 'static) {
        self.health.on_change(callback);
    }

    /// Starts the periodic probe task. Idempotent.
    pub fn start_health_checks(self: &Arc<Self>) {
        let interval = Duration::from_secs(self.pool_config.health_check_interval_secs);
        self.health.start(Arc::clone(self), interval);
    }

    /// Stops the periodic probe task. Idempotent.
    pub fn stop_health_checks(&self) {
        self.health.stop();
    }

    pub fn get_pool_stats(&self) -> PoolStats {
        let (size, idle) = match &self.pool {
            SqlPool::Postgres(pool) => (pool.size(), pool.num_idle() as u32),
            SqlPool::MySql(pool) => (pool.size(), pool.num_idle() as u32),
            SqlPool::Sqlite(pool) => (pool.size(), pool.num_idle() as u32),
        };
        let active_queries = self.tracker.active_count() as u32;
        PoolStats {
            total: size,
            active: size.saturating_sub(idle),
            idle,
            waiting: active_queries.saturating_sub(size),
            max: self.pool_config.max_connections,
        }
    }

    pub fn get_active_query_count(&self) -> usize {
        self.tracker.active_count()
    }

    pub fn tracker_stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    pub fn is_draining(&self) -> bool {
        self.tracker.is_draining()
    }

    /// Closes the pool without draining. Prefer
    /// [`Driver::drain_and_close`] on shutdown paths.
    pub async fn close(&self) {
        self.health.stop();
        match &self.pool {
            SqlPool::Postgres(pool) => pool.close().await,
            SqlPool::MySql(pool) => pool.close().await,
            SqlPool::Sqlite(pool) => pool.close().await,
        }
    }

    pub(crate) async fn close_pool_only(&self) {
        match &self.pool {
            SqlPool::Postgres(pool) => pool.close().await,
            SqlPool::MySql(pool) => pool.close().await,
            SqlPool::Sqlite(pool) => pool.close().await,
        }
    }
}

enum TxInner {
    Postgres(sqlx::Transaction<'static, sqlx::Postgres>),
    MySql(sqlx::Transaction<'static, sqlx::MySql>),
    Sqlite(sqlx::Transaction<'static, sqlx::Sqlite>),
}

/// A transaction pinned to a single connection.
///
/// Dropping an uncommitted transaction rolls it back.
pub struct Tx {
    inner: TxInner,
    _guard: super::tracker::QueryGuard,
}

impl Tx {
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        match &mut self.inner {
            TxInner::Postgres(tx) => {
                let rows = bind_pg(sqlx::query(sql), params)
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(map_sqlx)?;
                let decoded: Vec<_> = rows.iter().map(decode_pg_row).collect();
                Ok(QueryResult {
                    row_count: decoded.len() as u64,
                    rows: decoded,
                })
            }
            TxInner::MySql(tx) => {
                let rows = bind_mysql(sqlx::query(sql), params)
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(map_sqlx)?;
                let decoded: Vec<_> = rows.iter().map(decode_mysql_row).collect();
                Ok(QueryResult {
                    row_count: decoded.len() as u64,
                    rows: decoded,
                })
            }
            TxInner::Sqlite(tx) => {
                let rows = bind_sqlite(sqlx::query(sql), params)
                    .fetch_all(&mut **tx)
                    .await
                    .map_err(map_sqlx)?;
                let decoded: Vec<_> = rows.iter().map(decode_sqlite_row).collect();
                Ok(QueryResult {
                    row_count: decoded.len() as u64,
                    rows: decoded,
                })
            }
        }
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let row_count = match &mut self.inner {
            TxInner::Postgres(tx) => bind_pg(sqlx::query(sql), params)
                .execute(&mut **tx)
                .await
                .map_err(map_sqlx)?
                .rows_affected(),
            TxInner::MySql(tx) => bind_mysql(sqlx::query(sql), params)
                .execute(&mut **tx)
                .await
                .map_err(map_sqlx)?
                .rows_affected(),
            TxInner::Sqlite(tx) => bind_sqlite(sqlx::query(sql), params)
                .execute(&mut **tx)
                .await
                .map_err(map_sqlx)?
                .rows_affected(),
        };
        Ok(QueryResult {
            rows: Vec::new(),
            row_count,
        })
    }

    pub async fn commit(self) -> Result<()> {
        match self.inner {
            TxInner::Postgres(tx) => tx.commit().await.map_err(map_sqlx),
            TxInner::MySql(tx) => tx.commit().await.map_err(map_sqlx),
            TxInner::Sqlite(tx) => tx.commit().await.map_err(map_sqlx),
        }
    }

    pub async fn rollback(self) -> Result<()> {
        match self.inner {
            TxInner::Postgres(tx) => tx.rollback().await.map_err(map_sqlx),
            TxInner::MySql(tx) => tx.rollback().await.map_err(map_sqlx),
            TxInner::Sqlite(tx) => tx.rollback().await.map_err(map_sqlx),
        }
    }
}

/// Narrows sqlx failures into the engine taxonomy.
pub(crate) fn map_sqlx(error: sqlx::Error) -> Error {
    match error {
        sqlx::Error::PoolTimedOut => Error::PoolExhausted,
        sqlx::Error::PoolClosed => Error::Draining,
        sqlx::Error::Io(io) => Error::DriverTransient(io.to_string()),
        other => Error::Sqlx(other),
    }
}
