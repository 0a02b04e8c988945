//! Per-backend dialect capabilities.
//!
//! A dialect bundles everything the rest of the engine needs to speak one
//! backend's SQL: the closed type mapping, identifier quoting, placeholder
//! syntax, DDL emission, introspection queries, and the
//! transactional-DDL flag. All identifiers pass through [`Dialect::quote`],
//! which doubles any embedded quote character; combined with
//! parameter-only value passing in the compiler this closes SQL-injection
//! vectors by construction.

pub mod mysql;
pub mod postgres;
pub mod sqlite;

use crate::error::Result;
use crate::libs::conn_str::DatabaseKind;
use crate::schema::{ColumnDefinition, ColumnType, ForeignReference, IndexDefinition, TableDefinition};

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Capability set for one SQL backend.
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    /// Native type string for a portable column type tag.
    fn map_type(&self, column_type: ColumnType) -> &'static str;

    /// Quote an identifier, doubling any embedded quote character.
    fn quote(&self, identifier: &str) -> String;

    /// Positional placeholder for a 1-based parameter index.
    fn placeholder(&self, index: usize) -> String;

    /// Whether DDL can run inside a transaction and roll back cleanly.
    fn supports_transactional_ddl(&self) -> bool;

    /// Whether `RETURNING` clauses are accepted.
    fn supports_returning(&self) -> bool;

    /// Whether real schema namespaces exist (branch engine requirement).
    fn supports_schemas(&self) -> bool;

    // -- DDL emission --------------------------------------------------

    fn create_table(&self, name: &str, table: &TableDefinition) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();
        for column in &table.columns {
            parts.push(self.column_sql(column)?);
        }
        if let Some(composite) = &table.primary_key {
            let quoted: Vec<String> = composite.iter().map(|c| self.quote(c)).collect();
            parts.push(format!("PRIMARY KEY ({})", quoted.join(", ")));
        }
        Ok(format!(
            "CREATE TABLE {} ({})",
            self.quote(name),
            parts.join(", ")
        ))
    }

    fn drop_table(&self, name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote(name))
    }

    fn add_column(&self, table: &str, column: &ColumnDefinition) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote(table),
            self.column_sql(column)?
        ))
    }

    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote(table),
            self.quote(column)
        )
    }

    /// Statements converging an existing column onto `column`'s definition.
    ///
    /// Dialect-specific by necessity: PostgreSQL alters type, nullability
    /// and default independently; MySQL re-states the whole column via
    /// `MODIFY COLUMN`; SQLite cannot alter columns in place.
    fn alter_column(&self, table: &str, column: &ColumnDefinition) -> Result<Vec<String>>;

    fn create_index(&self, table: &str, index: &IndexDefinition) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        let columns: Vec<String> = index.columns.iter().map(|c| self.quote(c)).collect();
        let mut sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            unique,
            self.quote(&index.effective_name(table)),
            self.quote(table),
            columns.join(", ")
        );
        if let Some(predicate) = &index.predicate {
            if self.supports_partial_indexes() {
                sql.push_str(" WHERE ");
                sql.push_str(predicate);
            }
        }
        sql
    }

    fn drop_index(&self, table: &str, name: &str) -> String;

    fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        reference: &ForeignReference,
    ) -> Result<String>;

    fn drop_foreign_key(&self, table: &str, constraint: &str) -> Result<String>;

    /// Whether `CREATE INDEX ... WHERE` is accepted.
    fn supports_partial_indexes(&self) -> bool {
        true
    }

    // -- Introspection -------------------------------------------------

    /// Lists base table names within a namespace.
    fn tables_query(&self, schema: &str) -> String;

    /// Lists columns of one table, in ordinal order.
    fn columns_query(&self, schema: &str, table: &str) -> String;

    /// Primary-key column set of one table.
    fn primary_key_query(&self, schema: &str, table: &str) -> String;

    /// Foreign keys declared on one table.
    fn foreign_keys_query(&self, schema: &str, table: &str) -> String;

    /// Indexes declared on one table.
    fn indexes_query(&self, schema: &str, table: &str) -> String;

    /// Non-key constraints (checks) of one table.
    fn constraints_query(&self, schema: &str, table: &str) -> String;

    /// Catalog-level enum types, where the backend has them.
    fn enums_query(&self, schema: &str) -> Option<String>;

    /// Installed extensions, where the backend has them.
    fn extensions_query(&self) -> Option<String> {
        None
    }

    fn version_query(&self) -> &'static str;

    // -- Fragments for engine-owned tables -----------------------------

    fn current_timestamp_expr(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    /// Native type used for JSON payload columns in engine tables.
    fn json_type(&self) -> &'static str;

    /// Native type used for SQL statement lists in the history table.
    fn statement_list_type(&self) -> &'static str;

    // -- Shared rendering ----------------------------------------------

    /// Column fragment used by CREATE TABLE and ADD COLUMN.
    fn column_sql(&self, column: &ColumnDefinition) -> Result<String> {
        let mut sql = format!(
            "{} {}",
            self.quote(&column.name),
            self.map_type(column.column_type)
        );
        if column.primary_key {
            sql.push_str(" PRIMARY KEY");
        } else if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if column.unique && !column.primary_key {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if let Some(reference) = &column.references {
            sql.push_str(&format!(
                " REFERENCES {} ({})",
                self.quote(&reference.table),
                self.quote(&reference.column)
            ));
            if let Some(on_delete) = reference.on_delete {
                sql.push_str(" ON DELETE ");
                sql.push_str(on_delete.as_sql());
            }
            if let Some(on_update) = reference.on_update {
                sql.push_str(" ON UPDATE ");
                sql.push_str(on_update.as_sql());
            }
        }
        Ok(sql)
    }
}

/// Escape a string literal for embedding into introspection SQL.
///
/// Introspection targets (schema and table names) cannot always be bound as
/// parameters (`PRAGMA` takes none), so they are embedded as literals with
/// doubled quotes.
pub(crate) fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Resolve the dialect for a SQL backend.
///
/// Returns `None` for the document backend, which has no SQL dialect.
pub fn dialect_for(kind: DatabaseKind) -> Option<&'static dyn Dialect> {
    match kind {
        DatabaseKind::Postgres => Some(&PostgresDialect),
        DatabaseKind::MySql => Some(&MySqlDialect),
        DatabaseKind::Sqlite => Some(&SqliteDialect),
        DatabaseKind::MongoDb => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;

    #[test]
    fn quoting_doubles_embedded_quotes() {
        assert_eq!(PostgresDialect.quote("users"), "\"users\"");
        assert_eq!(PostgresDialect.quote("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(MySqlDialect.quote("we`ird"), "`we``ird`");
    }

    #[test]
    fn placeholders_per_dialect() {
        assert_eq!(PostgresDialect.placeholder(1), "$1");
        assert_eq!(PostgresDialect.placeholder(3), "$3");
        assert_eq!(MySqlDialect.placeholder(7), "?");
        assert_eq!(SqliteDialect.placeholder(2), "?");
    }

    #[test]
    fn transactional_ddl_flags() {
        assert!(PostgresDialect.supports_transactional_ddl());
        assert!(!MySqlDialect.supports_transactional_ddl());
        assert!(SqliteDialect.supports_transactional_ddl());
    }

    #[test]
    fn returning_support() {
        assert!(PostgresDialect.supports_returning());
        assert!(SqliteDialect.supports_returning());
        assert!(!MySqlDialect.supports_returning());
    }

    #[test]
    fn create_table_renders_columns_in_order() {
        let table = TableDefinition {
            columns: vec![
                ColumnDefinition::new("id", ColumnType::Uuid).primary(),
                ColumnDefinition::new("email", ColumnType::String)
                    .not_null()
                    .unique(),
            ],
            indexes: vec![],
            primary_key: None,
        };
        let sql = PostgresDialect.create_table("users", &table).unwrap();
        assert_eq!(
            sql,
            "CREATE TABLE \"users\" (\"id\" UUID PRIMARY KEY, \"email\" VARCHAR(255) NOT NULL UNIQUE)"
        );
    }

    #[test]
    fn composite_primary_key() {
        let table = TableDefinition {
            columns: vec![
                ColumnDefinition::new("a", ColumnType::Integer).not_null(),
                ColumnDefinition::new("b", ColumnType::Integer).not_null(),
            ],
            indexes: vec![],
            primary_key: Some(vec!["a".into(), "b".into()]),
        };
        let sql = SqliteDialect.create_table("pairs", &table).unwrap();
        assert!(sql.ends_with("PRIMARY KEY (\"a\", \"b\"))"));
    }

    #[test]
    fn partial_index_only_where_supported() {
        let index = IndexDefinition {
            name: Some("idx_active".into()),
            columns: vec!["status".into()],
            unique: false,
            predicate: Some("status = 'active'".into()),
        };
        assert!(PostgresDialect.create_index("jobs", &index).contains("WHERE status = 'active'"));
        assert!(!MySqlDialect.create_index("jobs", &index).contains("WHERE"));
    }
}
