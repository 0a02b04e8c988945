//! SQL compilation of the query IR.
//!
//! `compile` dispatches on the query kind and emits one parameterized
//! statement for the configured dialect. Two rules close the injection
//! surface by construction: every identifier passes through the dialect's
//! quoter, and every value flows exclusively through the parameter list —
//! the compiler never interpolates a value into SQL text. Ordering
//! directions are validated against the closed set `{asc, desc}`.
//!
//! With tenant injection enabled, every compiled statement is scoped to the
//! context's `(app_id, organization_id)` pair: predicates on reads,
//! updates, and deletes; injected columns on writes. Absence of a context
//! is a fatal compile error with no silent fallback.

use super::{
    ConflictAction, Connector, JoinClause, Operator, Query, QueryKind, RowData, WhereClause,
    WhereValue,
};
use crate::db::value::Value;
use crate::dialect::{dialect_for, Dialect};
use crate::error::{Error, Result};
use crate::libs::config::TenantConfig;
use crate::libs::conn_str::DatabaseKind;
use crate::tenant::TenantContext;

/// A compiled statement: SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Compiler for one dialect and one tenant policy.
pub struct Compiler {
    dialect: &'static dyn Dialect,
    tenant: TenantConfig,
}

impl Compiler {
    pub fn new(kind: DatabaseKind, tenant: TenantConfig) -> Result<Self> {
        let dialect = dialect_for(kind).ok_or_else(|| {
            Error::UnsupportedOperation("the document backend has no SQL compiler".into())
        })?;
        Ok(Self { dialect, tenant })
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub fn injects_tenant(&self) -> bool {
        self.tenant.inject_tenant
    }

    /// Compiles the query tree into `(sql, params)`.
    pub fn compile(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<Compiled> {
        let ctx = self.require_ctx(ctx)?;
        match query.kind {
            QueryKind::Select => self.compile_select(query, ctx),
            QueryKind::Insert => self.compile_insert(query, ctx),
            QueryKind::Update => self.compile_update(query, ctx),
            QueryKind::Delete => self.compile_delete(query, ctx),
        }
    }

    fn require_ctx<'c>(
        &self,
        ctx: Option<&'c TenantContext>,
    ) -> Result<Option<&'c TenantContext>> {
        if self.tenant.inject_tenant {
            match ctx {
                Some(ctx) => {
                    ctx.validate()?;
                    Ok(Some(ctx))
                }
                None => Err(Error::TenantContextMissing),
            }
        } else {
            Ok(None)
        }
    }

    // -- SELECT --------------------------------------------------------

    fn compile_select(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<Compiled> {
        let mut params: Vec<Value> = Vec::new();
        let mut sql = String::from("SELECT ");

        match &query.columns {
            Some(columns) if !columns.is_empty() => {
                let quoted: Vec<String> =
                    columns.iter().map(|c| self.quote_qualified(c)).collect();
                sql.push_str(&quoted.join(", "));
            }
            _ => sql.push('*'),
        }

        sql.push_str(" FROM ");
        sql.push_str(&self.dialect.quote(&query.table));

        for join in &query.joins {
            sql.push(' ');
            sql.push_str(&self.join_sql(join));
        }

        let where_sql = self.where_sql(&query.where_clauses, ctx, &mut params)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        if !query.group_by.is_empty() {
            let quoted: Vec<String> = query
                .group_by
                .iter()
                .map(|c| self.quote_qualified(c))
                .collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&quoted.join(", "));
        }

        if !query.having.is_empty() {
            let having_sql = self.predicates_sql(&query.having, &mut params)?;
            sql.push_str(" HAVING ");
            sql.push_str(&having_sql);
        }

        if !query.order_by.is_empty() {
            let mut terms = Vec::with_capacity(query.order_by.len());
            for order in &query.order_by {
                let direction = match order.direction.to_lowercase().as_str() {
                    "asc" => "ASC",
                    "desc" => "DESC",
                    other => {
                        return Err(Error::InvalidIdentifier(format!(
                            "invalid sort direction {other:?}; expected asc or desc"
                        )))
                    }
                };
                terms.push(format!("{} {}", self.quote_qualified(&order.column), direction));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = query.limit {
            let placeholder = self.push_param(&mut params, Value::Int(limit));
            sql.push_str(" LIMIT ");
            sql.push_str(&placeholder);
        }
        if let Some(offset) = query.offset {
            let placeholder = self.push_param(&mut params, Value::Int(offset));
            sql.push_str(" OFFSET ");
            sql.push_str(&placeholder);
        }

        Ok(Compiled { sql, params })
    }

    // -- INSERT --------------------------------------------------------

    fn compile_insert(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<Compiled> {
        if query.rows.is_empty() {
            return Err(Error::InvalidIdentifier(
                "insert requires at least one row".into(),
            ));
        }

        let rows: Vec<RowData> = query
            .rows
            .iter()
            .map(|row| self.with_tenant_fields(row.clone(), ctx))
            .collect();

        // Union of keys across rows, in first-seen order.
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for (column, _) in row {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }

        let mut params: Vec<Value> = Vec::new();
        let mut tuples = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut placeholders = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = row
                    .iter()
                    .find(|(name, _)| name == column)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null);
                placeholders.push(self.push_param(&mut params, value));
            }
            tuples.push(format!("({})", placeholders.join(", ")));
        }

        let quoted_columns: Vec<String> =
            columns.iter().map(|c| self.dialect.quote(c)).collect();
        let ignore = matches!(
            (&query.upsert, self.dialect.kind()),
            (Some(upsert), DatabaseKind::MySql) if upsert.action == ConflictAction::Nothing
        );
        let mut sql = format!(
            "INSERT{} INTO {} ({}) VALUES {}",
            if ignore { " IGNORE" } else { "" },
            self.dialect.quote(&query.table),
            quoted_columns.join(", "),
            tuples.join(", ")
        );

        if let Some(upsert) = &query.upsert {
            sql.push_str(&self.upsert_sql(upsert, &columns)?);
        }

        self.append_returning(&mut sql, query)?;
        Ok(Compiled { sql, params })
    }

    fn upsert_sql(&self, upsert: &super::UpsertClause, columns: &[String]) -> Result<String> {
        let conflict_quoted: Vec<String> = upsert
            .conflict_columns
            .iter()
            .map(|c| self.dialect.quote(c))
            .collect();
        let update_columns: Vec<&String> = if upsert.update_columns.is_empty() {
            columns
                .iter()
                .filter(|c| !upsert.conflict_columns.contains(c))
                .collect()
        } else {
            upsert.update_columns.iter().collect()
        };

        match self.dialect.kind() {
            DatabaseKind::Postgres | DatabaseKind::Sqlite => match upsert.action {
                ConflictAction::Nothing => {
                    Ok(format!(" ON CONFLICT ({}) DO NOTHING", conflict_quoted.join(", ")))
                }
                ConflictAction::Update => {
                    let assignments: Vec<String> = update_columns
                        .iter()
                        .map(|c| {
                            format!(
                                "{} = EXCLUDED.{}",
                                self.dialect.quote(c),
                                self.dialect.quote(c)
                            )
                        })
                        .collect();
                    Ok(format!(
                        " ON CONFLICT ({}) DO UPDATE SET {}",
                        conflict_quoted.join(", "),
                        assignments.join(", ")
                    ))
                }
            },
            DatabaseKind::MySql => match upsert.action {
                // Rendered as INSERT IGNORE by the caller.
                ConflictAction::Nothing => Ok(String::new()),
                ConflictAction::Update => {
                    let assignments: Vec<String> = update_columns
                        .iter()
                        .map(|c| {
                            format!(
                                "{} = VALUES({})",
                                self.dialect.quote(c),
                                self.dialect.quote(c)
                            )
                        })
                        .collect();
                    Ok(format!(" ON DUPLICATE KEY UPDATE {}", assignments.join(", ")))
                }
            },
            DatabaseKind::MongoDb => unreachable!("no SQL compiler for the document backend"),
        }
    }

    // -- UPDATE --------------------------------------------------------

    fn compile_update(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<Compiled> {
        if query.data.is_empty() {
            return Err(Error::InvalidIdentifier(
                "update requires at least one SET column".into(),
            ));
        }

        let mut params: Vec<Value> = Vec::new();
        let mut assignments = Vec::with_capacity(query.data.len());
        for (column, value) in &query.data {
            let placeholder = self.push_param(&mut params, value.clone());
            assignments.push(format!("{} = {}", self.dialect.quote(column), placeholder));
        }

        let mut sql = format!(
            "UPDATE {} SET {}",
            self.dialect.quote(&query.table),
            assignments.join(", ")
        );

        let where_sql = self.where_sql(&query.where_clauses, ctx, &mut params)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        self.append_returning(&mut sql, query)?;
        Ok(Compiled { sql, params })
    }

    // -- DELETE --------------------------------------------------------

    fn compile_delete(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<Compiled> {
        // Without tenant predicates an unbounded DELETE would wipe the
        // table; require an explicit WHERE in that configuration.
        if query.where_clauses.is_empty() && !self.tenant.inject_tenant {
            return Err(Error::UnsupportedOperation(
                "DELETE without a WHERE clause requires tenant injection".into(),
            ));
        }

        let mut params: Vec<Value> = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.dialect.quote(&query.table));

        let where_sql = self.where_sql(&query.where_clauses, ctx, &mut params)?;
        if !where_sql.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        self.append_returning(&mut sql, query)?;
        Ok(Compiled { sql, params })
    }

    // -- shared pieces -------------------------------------------------

    /// User predicates followed by tenant predicates, joined by their
    /// connectors. Tenant predicates always chain with AND.
    fn where_sql(
        &self,
        clauses: &[WhereClause],
        ctx: Option<&TenantContext>,
        params: &mut Vec<Value>,
    ) -> Result<String> {
        let mut all = clauses.to_vec();
        if let Some(ctx) = ctx {
            all.push(WhereClause {
                column: self.tenant.app_id_column.clone(),
                operator: Operator::Eq,
                value: WhereValue::Single(Value::Text(ctx.app_id.clone())),
                connector: Connector::And,
            });
            all.push(WhereClause {
                column: self.tenant.organization_id_column.clone(),
                operator: Operator::Eq,
                value: WhereValue::Single(Value::Text(ctx.organization_id.clone())),
                connector: Connector::And,
            });
        }
        if all.is_empty() {
            return Ok(String::new());
        }
        self.predicates_sql(&all, params)
    }

    fn predicates_sql(&self, clauses: &[WhereClause], params: &mut Vec<Value>) -> Result<String> {
        let mut sql = String::new();
        for (index, clause) in clauses.iter().enumerate() {
            if index > 0 {
                sql.push(' ');
                sql.push_str(clause.connector.as_sql());
                sql.push(' ');
            }
            sql.push_str(&self.predicate_sql(clause, params)?);
        }
        Ok(sql)
    }

    fn predicate_sql(&self, clause: &WhereClause, params: &mut Vec<Value>) -> Result<String> {
        let column = self.quote_qualified(&clause.column);
        match (clause.operator, &clause.value) {
            (Operator::IsNull, _) => Ok(format!("{column} IS NULL")),
            (Operator::IsNotNull, _) => Ok(format!("{column} IS NOT NULL")),
            (Operator::In | Operator::NotIn, WhereValue::List(values)) => {
                if values.is_empty() {
                    return Err(Error::InvalidIdentifier(format!(
                        "empty IN list for column {:?}",
                        clause.column
                    )));
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|v| self.push_param(params, v.clone()))
                    .collect();
                Ok(format!(
                    "{column} {} ({})",
                    clause.operator.as_sql(),
                    placeholders.join(", ")
                ))
            }
            (Operator::In | Operator::NotIn, _) => Err(Error::InvalidIdentifier(format!(
                "IN predicate on column {:?} requires a value list",
                clause.column
            ))),
            (operator, WhereValue::Single(value)) => {
                let placeholder = self.push_param(params, value.clone());
                Ok(format!("{column} {} {placeholder}", operator.as_sql()))
            }
            (operator, _) => Err(Error::InvalidIdentifier(format!(
                "operator {} on column {:?} requires a value",
                operator.as_sql(),
                clause.column
            ))),
        }
    }

    fn join_sql(&self, join: &JoinClause) -> String {
        let mut sql = format!("{} {}", join.join_type.as_sql(), self.dialect.quote(&join.table));
        if let Some(alias) = &join.alias {
            sql.push_str(" AS ");
            sql.push_str(&self.dialect.quote(alias));
        }
        sql.push_str(&format!(
            " ON {} = {}",
            self.quote_qualified(&join.left_column),
            self.quote_qualified(&join.right_column)
        ));
        sql
    }

    fn append_returning(&self, sql: &mut String, query: &Query) -> Result<()> {
        let Some(returning) = &query.returning else {
            return Ok(());
        };
        if !self.dialect.supports_returning() {
            return Err(Error::UnsupportedOperation(format!(
                "RETURNING is not supported on {}",
                self.dialect.kind()
            )));
        }
        let quoted: Vec<String> = returning
            .iter()
            .map(|c| {
                if c == "*" {
                    "*".to_string()
                } else {
                    self.quote_qualified(c)
                }
            })
            .collect();
        sql.push_str(" RETURNING ");
        sql.push_str(&quoted.join(", "));
        Ok(())
    }

    /// Adds the tenant columns to an insert row when absent.
    fn with_tenant_fields(&self, mut row: RowData, ctx: Option<&TenantContext>) -> RowData {
        if let Some(ctx) = ctx {
            if !row.iter().any(|(c, _)| c == &self.tenant.app_id_column) {
                row.push((
                    self.tenant.app_id_column.clone(),
                    Value::Text(ctx.app_id.clone()),
                ));
            }
            if !row
                .iter()
                .any(|(c, _)| c == &self.tenant.organization_id_column)
            {
                row.push((
                    self.tenant.organization_id_column.clone(),
                    Value::Text(ctx.organization_id.clone()),
                ));
            }
        }
        row
    }

    fn push_param(&self, params: &mut Vec<Value>, value: Value) -> String {
        params.push(value);
        self.dialect.placeholder(params.len())
    }

    /// Quotes a possibly table-qualified column (`t.col`), leaving `*`
    /// untouched.
    fn quote_qualified(&self, column: &str) -> String {
        if column == "*" {
            return "*".to_string();
        }
        column
            .split('.')
            .map(|part| {
                if part == "*" {
                    "*".to_string()
                } else {
                    self.dialect.quote(part)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}
