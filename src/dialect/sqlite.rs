//! SQLite dialect.
//!
//! Double-quote identifier quoting, `?` placeholders, transactional DDL,
//! `RETURNING` (3.35+), partial indexes. No schema namespaces, no in-place
//! column alteration and no post-hoc foreign keys; those surface as typed
//! unsupported-operation errors so the diff engine can report rather than
//! emit invalid SQL. Introspection goes through `sqlite_master` and the
//! `PRAGMA` table functions.

use super::Dialect;
use crate::error::{Error, Result};
use crate::libs::conn_str::DatabaseKind;
use crate::schema::{ColumnDefinition, ColumnType, ForeignReference};

pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sqlite
    }

    fn map_type(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Uuid => "TEXT",
            ColumnType::String => "TEXT",
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "INTEGER",
            ColumnType::Float => "REAL",
            ColumnType::Decimal => "NUMERIC",
            ColumnType::Boolean => "INTEGER",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::Json => "TEXT",
            ColumnType::Binary => "BLOB",
        }
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn supports_returning(&self) -> bool {
        // The crate targets SQLite >= 3.35 via sqlx's bundled libsqlite3.
        true
    }

    fn supports_schemas(&self) -> bool {
        false
    }

    fn alter_column(&self, table: &str, column: &ColumnDefinition) -> Result<Vec<String>> {
        Err(Error::UnsupportedOperation(format!(
            "sqlite cannot alter column {:?} on table {table:?} in place; recreate the table instead",
            column.name
        )))
    }

    fn drop_index(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX IF EXISTS {}", self.quote(name))
    }

    fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        _reference: &ForeignReference,
    ) -> Result<String> {
        Err(Error::UnsupportedOperation(format!(
            "sqlite cannot add a foreign key to existing table {table:?} (column {column:?})"
        )))
    }

    fn drop_foreign_key(&self, table: &str, _constraint: &str) -> Result<String> {
        Err(Error::UnsupportedOperation(format!(
            "sqlite cannot drop a foreign key from existing table {table:?}"
        )))
    }

    fn tables_query(&self, _schema: &str) -> String {
        "SELECT name AS table_name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY name"
            .to_string()
    }

    fn columns_query(&self, _schema: &str, table: &str) -> String {
        format!("PRAGMA table_info({})", self.quote(table))
    }

    fn primary_key_query(&self, _schema: &str, table: &str) -> String {
        // Primary key membership comes back in the `pk` column.
        format!("PRAGMA table_info({})", self.quote(table))
    }

    fn foreign_keys_query(&self, _schema: &str, table: &str) -> String {
        format!("PRAGMA foreign_key_list({})", self.quote(table))
    }

    fn indexes_query(&self, _schema: &str, table: &str) -> String {
        format!("PRAGMA index_list({})", self.quote(table))
    }

    fn constraints_query(&self, _schema: &str, table: &str) -> String {
        format!(
            "SELECT name AS constraint_name, 'c' AS constraint_type, sql AS definition \
             FROM sqlite_master WHERE type = 'table' AND name = {}",
            super::quote_literal(table)
        )
    }

    fn enums_query(&self, _schema: &str) -> Option<String> {
        None
    }

    fn version_query(&self) -> &'static str {
        "SELECT sqlite_version()"
    }

    fn json_type(&self) -> &'static str {
        "TEXT"
    }

    fn statement_list_type(&self) -> &'static str {
        "TEXT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alter_column_is_unsupported() {
        let column = ColumnDefinition::new("age", ColumnType::BigInt);
        assert!(matches!(
            SqliteDialect.alter_column("users", &column),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn pragma_queries_quote_table() {
        assert_eq!(SqliteDialect.columns_query("", "users"), "PRAGMA table_info(\"users\")");
    }
}
