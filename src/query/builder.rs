//! Fluent query builders.
//!
//! Value-type builders that accumulate IR fragments and compile through the
//! engine's compiler. A builder obtained through [`QueryEngine::table`]
//! carries a tenant context which is validated exactly once, on the first
//! mutation; [`QueryEngine::table_without_tenant`] is the only entry point
//! that skips tenant scoping.
//!
//! `to_sql()` compiles without executing; `execute`/`fetch` compile and run
//! through a driver or transaction client.
//!
//! ## Usage
//!
//! ```rust
//! use launchpad_db::libs::config::TenantConfig;
//! use launchpad_db::libs::conn_str::DatabaseKind;
//! use launchpad_db::query::builder::QueryEngine;
//! use launchpad_db::tenant::TenantContext;
//!
//! # fn example() -> launchpad_db::error::Result<()> {
//! let engine = QueryEngine::new(DatabaseKind::Postgres, TenantConfig::default())?;
//! let ctx = TenantContext::new("app_1", "org_1");
//! let compiled = engine
//!     .table("users", ctx)
//!     .select(&["id"])
//!     .where_eq("status", "active")
//!     .to_sql()?;
//! assert!(compiled.sql.starts_with("SELECT \"id\" FROM \"users\""));
//! # Ok(())
//! # }
//! ```

use super::compiler::{Compiled, Compiler};
use super::{
    ConflictAction, Connector, JoinClause, JoinType, Operator, OrderBy, Query, RowData,
    UpsertClause, WhereClause, WhereValue,
};
use crate::db::driver::{Driver, Tx};
use crate::db::value::{QueryResult, Value};
use crate::error::{Error, Result};
use crate::libs::config::TenantConfig;
use crate::libs::conn_str::DatabaseKind;
use crate::tenant::TenantContext;
use std::sync::Arc;

/// Entry point tying a dialect and tenant policy to builder construction.
pub struct QueryEngine {
    compiler: Arc<Compiler>,
    untenanted: Arc<Compiler>,
}

impl QueryEngine {
    pub fn new(kind: DatabaseKind, tenant: TenantConfig) -> Result<Self> {
        let untenanted_config = TenantConfig {
            inject_tenant: false,
            ..tenant.clone()
        };
        Ok(Self {
            compiler: Arc::new(Compiler::new(kind, tenant)?),
            untenanted: Arc::new(Compiler::new(kind, untenanted_config)?),
        })
    }

    /// A tenant-scoped table handle. The context is validated on the first
    /// builder mutation.
    pub fn table(&self, name: impl Into<String>, ctx: TenantContext) -> Table {
        Table {
            name: name.into(),
            compiler: Arc::clone(&self.compiler),
            ctx: Some(ctx),
            validate_tenant: true,
        }
    }

    /// A table handle with no tenant scoping. The only unvalidated entry
    /// point; reserved for engine-owned tables.
    pub fn table_without_tenant(&self, name: impl Into<String>) -> Table {
        Table {
            name: name.into(),
            compiler: Arc::clone(&self.untenanted),
            ctx: None,
            validate_tenant: false,
        }
    }
}

/// Handle from which the four statement builders are minted.
pub struct Table {
    name: String,
    compiler: Arc<Compiler>,
    ctx: Option<TenantContext>,
    validate_tenant: bool,
}

impl Table {
    pub fn select(&self, columns: &[&str]) -> SelectBuilder {
        let mut query = Query::select(&self.name);
        if !columns.is_empty() {
            query.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        }
        let mut builder = SelectBuilder {
            query,
            state: self.state(),
        };
        builder.state.touch();
        builder
    }

    pub fn select_all(&self) -> SelectBuilder {
        self.select(&[])
    }

    pub fn insert(&self, row: impl Into<RowData>) -> InsertBuilder {
        let mut query = Query::insert(&self.name);
        query.rows.push(row.into());
        let mut builder = InsertBuilder {
            query,
            state: self.state(),
        };
        builder.state.touch();
        builder
    }

    pub fn insert_many(&self, rows: Vec<RowData>) -> InsertBuilder {
        let mut query = Query::insert(&self.name);
        query.rows = rows;
        let mut builder = InsertBuilder {
            query,
            state: self.state(),
        };
        builder.state.touch();
        builder
    }

    pub fn update(&self) -> UpdateBuilder {
        let mut builder = UpdateBuilder {
            query: Query::update(&self.name),
            state: self.state(),
        };
        builder.state.touch();
        builder
    }

    pub fn delete(&self) -> DeleteBuilder {
        let mut builder = DeleteBuilder {
            query: Query::delete(&self.name),
            state: self.state(),
        };
        builder.state.touch();
        builder
    }

    fn state(&self) -> BuilderState {
        BuilderState {
            compiler: Arc::clone(&self.compiler),
            ctx: self.ctx.clone(),
            validate_tenant: self.validate_tenant,
            validated: false,
            tenant_error: None,
        }
    }
}

/// Shared builder plumbing: compiler handle, context, one-shot validation.
struct BuilderState {
    compiler: Arc<Compiler>,
    ctx: Option<TenantContext>,
    validate_tenant: bool,
    validated: bool,
    tenant_error: Option<String>,
}

impl BuilderState {
    /// Runs the one-time tenant validation on the first mutation.
    fn touch(&mut self) {
        if self.validated || !self.validate_tenant {
            return;
        }
        self.validated = true;
        match &self.ctx {
            Some(ctx) => {
                if let Err(error) = ctx.validate() {
                    self.tenant_error = Some(error.to_string());
                }
            }
            None => self.tenant_error = Some("tenant context required".to_string()),
        }
    }

    fn compile(&self, query: &Query) -> Result<Compiled> {
        if let Some(message) = &self.tenant_error {
            return Err(Error::TenantContextInvalid(message.clone()));
        }
        self.compiler.compile(query, self.ctx.as_ref())
    }
}

macro_rules! where_methods {
    () => {
        pub fn filter(mut self, column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
            self.state.touch();
            self.query.where_clauses.push(WhereClause {
                column: column.into(),
                operator,
                value: WhereValue::Single(value.into()),
                connector: Connector::And,
            });
            self
        }

        pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
            self.filter(column, Operator::Eq, value)
        }

        pub fn or_where(mut self, column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
            self.state.touch();
            self.query.where_clauses.push(WhereClause {
                column: column.into(),
                operator,
                value: WhereValue::Single(value.into()),
                connector: Connector::Or,
            });
            self
        }

        pub fn where_in(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
            self.state.touch();
            self.query.where_clauses.push(WhereClause {
                column: column.into(),
                operator: Operator::In,
                value: WhereValue::List(values),
                connector: Connector::And,
            });
            self
        }

        pub fn where_not_in(mut self, column: impl Into<String>, values: Vec<Value>) -> Self {
            self.state.touch();
            self.query.where_clauses.push(WhereClause {
                column: column.into(),
                operator: Operator::NotIn,
                value: WhereValue::List(values),
                connector: Connector::And,
            });
            self
        }

        pub fn where_null(mut self, column: impl Into<String>) -> Self {
            self.state.touch();
            self.query.where_clauses.push(WhereClause {
                column: column.into(),
                operator: Operator::IsNull,
                value: WhereValue::None,
                connector: Connector::And,
            });
            self
        }

        pub fn where_not_null(mut self, column: impl Into<String>) -> Self {
            self.state.touch();
            self.query.where_clauses.push(WhereClause {
                column: column.into(),
                operator: Operator::IsNotNull,
                value: WhereValue::None,
                connector: Connector::And,
            });
            self
        }
    };
}

macro_rules! exec_methods {
    () => {
        /// Compiles without executing. The main test-suite hook.
        pub fn to_sql(&self) -> Result<Compiled> {
            self.state.compile(&self.query)
        }

        /// Compiles and runs through the driver.
        pub async fn execute(&self, driver: &Driver) -> Result<QueryResult> {
            let compiled = self.to_sql()?;
            driver.execute(&compiled.sql, &compiled.params).await
        }

        /// Compiles and runs inside a transaction client.
        pub async fn execute_in(&self, tx: &mut Tx) -> Result<QueryResult> {
            let compiled = self.to_sql()?;
            tx.execute(&compiled.sql, &compiled.params).await
        }
    };
}

/// SELECT builder.
pub struct SelectBuilder {
    query: Query,
    state: BuilderState,
}

impl SelectBuilder {
    where_methods!();
    exec_methods!();

    pub fn order_by(mut self, column: impl Into<String>, direction: impl Into<String>) -> Self {
        self.state.touch();
        self.query.order_by.push(OrderBy {
            column: column.into(),
            direction: direction.into(),
        });
        self
    }

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.state.touch();
        self.query
            .group_by
            .extend(columns.iter().map(|c| c.to_string()));
        self
    }

    pub fn having(mut self, column: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        self.state.touch();
        self.query.having.push(WhereClause {
            column: column.into(),
            operator,
            value: WhereValue::Single(value.into()),
            connector: Connector::And,
        });
        self
    }

    pub fn join(
        mut self,
        join_type: JoinType,
        table: impl Into<String>,
        alias: Option<&str>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        self.state.touch();
        self.query.joins.push(JoinClause {
            join_type,
            table: table.into(),
            alias: alias.map(|a| a.to_string()),
            left_column: left_column.into(),
            right_column: right_column.into(),
        });
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.state.touch();
        self.query.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.state.touch();
        self.query.offset = Some(offset);
        self
    }

    /// Compiles and fetches all rows.
    pub async fn fetch(&self, driver: &Driver) -> Result<QueryResult> {
        let compiled = self.to_sql()?;
        driver.query(&compiled.sql, &compiled.params).await
    }

    pub async fn fetch_in(&self, tx: &mut Tx) -> Result<QueryResult> {
        let compiled = self.to_sql()?;
        tx.query(&compiled.sql, &compiled.params).await
    }
}

/// INSERT builder, including the upsert directive.
pub struct InsertBuilder {
    query: Query,
    state: BuilderState,
}

impl InsertBuilder {
    exec_methods!();

    pub fn row(mut self, row: impl Into<RowData>) -> Self {
        self.state.touch();
        self.query.rows.push(row.into());
        self
    }

    pub fn on_conflict(
        mut self,
        conflict_columns: &[&str],
        action: ConflictAction,
        update_columns: &[&str],
    ) -> Self {
        self.state.touch();
        self.query.upsert = Some(UpsertClause {
            conflict_columns: conflict_columns.iter().map(|c| c.to_string()).collect(),
            action,
            update_columns: update_columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn returning(mut self, columns: &[&str]) -> Self {
        self.state.touch();
        self.query.returning = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Compiles and fetches returned rows (requires `returning`).
    pub async fn fetch(&self, driver: &Driver) -> Result<QueryResult> {
        let compiled = self.to_sql()?;
        driver.query(&compiled.sql, &compiled.params).await
    }
}

/// UPDATE builder.
pub struct UpdateBuilder {
    query: Query,
    state: BuilderState,
}

impl UpdateBuilder {
    where_methods!();
    exec_methods!();

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state.touch();
        self.query.data.push((column.into(), value.into()));
        self
    }

    pub fn set_many(mut self, data: impl Into<RowData>) -> Self {
        self.state.touch();
        self.query.data.extend(data.into());
        self
    }

    pub fn returning(mut self, columns: &[&str]) -> Self {
        self.state.touch();
        self.query.returning = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }
}

/// DELETE builder.
pub struct DeleteBuilder {
    query: Query,
    state: BuilderState,
}

impl DeleteBuilder {
    where_methods!();
    exec_methods!();

    pub fn returning(mut self, columns: &[&str]) -> Self {
        self.state.touch();
        self.query.returning = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }
}
