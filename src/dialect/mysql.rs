//! MySQL dialect.
//!
//! Backtick quoting, `?` placeholders, no transactional DDL (every DDL
//! statement implicitly commits), no `RETURNING`, no partial indexes.
//! Column alteration uses `MODIFY COLUMN`, which re-states the whole
//! definition. Schema namespaces map onto databases, which the branch
//! engine does not manage, so `supports_schemas` is false.

use super::{quote_literal, Dialect};
use crate::error::Result;
use crate::libs::conn_str::DatabaseKind;
use crate::schema::{ColumnDefinition, ColumnType, ForeignReference};

pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    fn map_type(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Uuid => "CHAR(36)",
            ColumnType::String => "VARCHAR(255)",
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Decimal => "DECIMAL(20,6)",
            ColumnType::Boolean => "TINYINT(1)",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::Json => "JSON",
            ColumnType::Binary => "BLOB",
        }
    }

    fn quote(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn supports_returning(&self) -> bool {
        false
    }

    fn supports_schemas(&self) -> bool {
        false
    }

    fn supports_partial_indexes(&self) -> bool {
        false
    }

    fn alter_column(&self, table: &str, column: &ColumnDefinition) -> Result<Vec<String>> {
        // MODIFY COLUMN re-states the full definition in one statement.
        Ok(vec![format!(
            "ALTER TABLE {} MODIFY COLUMN {}",
            self.quote(table),
            self.column_sql(column)?
        )])
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote(name),
            self.quote(table)
        )
    }

    fn add_foreign_key(
        &self,
        table: &str,
        column: &str,
        reference: &ForeignReference,
    ) -> Result<String> {
        let constraint = format!("fk_{table}_{column}");
        let mut sql = format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote(table),
            self.quote(&constraint),
            self.quote(column),
            self.quote(&reference.table),
            self.quote(&reference.column)
        );
        if let Some(on_delete) = reference.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(on_delete.as_sql());
        }
        if let Some(on_update) = reference.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(on_update.as_sql());
        }
        Ok(sql)
    }

    fn drop_foreign_key(&self, table: &str, constraint: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            self.quote(table),
            self.quote(constraint)
        ))
    }

    fn tables_query(&self, schema: &str) -> String {
        format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = {} AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            schema_literal(schema)
        )
    }

    fn columns_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT column_name, data_type, column_type AS udt_name, is_nullable, column_default, \
                    extra AS is_identity, character_maximum_length, numeric_precision, numeric_scale \
             FROM information_schema.columns \
             WHERE table_schema = {} AND table_name = {} \
             ORDER BY ordinal_position",
            schema_literal(schema),
            quote_literal(table)
        )
    }

    fn primary_key_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT column_name FROM information_schema.key_column_usage \
             WHERE table_schema = {} AND table_name = {} AND constraint_name = 'PRIMARY' \
             ORDER BY ordinal_position",
            schema_literal(schema),
            quote_literal(table)
        )
    }

    fn foreign_keys_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT kcu.constraint_name, kcu.column_name, \
                    kcu.referenced_table_name AS referenced_table, \
                    kcu.referenced_column_name AS referenced_column, \
                    rc.update_rule, rc.delete_rule \
             FROM information_schema.key_column_usage kcu \
             JOIN information_schema.referential_constraints rc \
               ON kcu.constraint_name = rc.constraint_name \
              AND kcu.table_schema = rc.constraint_schema \
             WHERE kcu.table_schema = {} AND kcu.table_name = {} \
               AND kcu.referenced_table_name IS NOT NULL \
             ORDER BY kcu.constraint_name",
            schema_literal(schema),
            quote_literal(table)
        )
    }

    fn indexes_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT index_name, \
                    GROUP_CONCAT(column_name ORDER BY seq_in_index) AS columns, \
                    MAX(non_unique = 0) AS is_unique, \
                    MAX(index_name = 'PRIMARY') AS is_primary, \
                    NULL AS predicate \
             FROM information_schema.statistics \
             WHERE table_schema = {} AND table_name = {} \
             GROUP BY index_name ORDER BY index_name",
            schema_literal(schema),
            quote_literal(table)
        )
    }

    fn constraints_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT cc.constraint_name, 'c' AS constraint_type, cc.check_clause AS definition \
             FROM information_schema.check_constraints cc \
             JOIN information_schema.table_constraints tc \
               ON cc.constraint_name = tc.constraint_name \
              AND cc.constraint_schema = tc.table_schema \
             WHERE tc.table_schema = {} AND tc.table_name = {} \
             ORDER BY cc.constraint_name",
            schema_literal(schema),
            quote_literal(table)
        )
    }

    fn enums_query(&self, _schema: &str) -> Option<String> {
        None
    }

    fn version_query(&self) -> &'static str {
        "SELECT VERSION()"
    }

    fn json_type(&self) -> &'static str {
        "JSON"
    }

    fn statement_list_type(&self) -> &'static str {
        "JSON"
    }
}

/// An empty schema argument targets the current database.
fn schema_literal(schema: &str) -> String {
    if schema.is_empty() {
        "DATABASE()".to_string()
    } else {
        quote_literal(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modify_column_restates_definition() {
        let column = ColumnDefinition::new("age", ColumnType::BigInt).not_null();
        let statements = MySqlDialect.alter_column("users", &column).unwrap();
        assert_eq!(statements, vec!["ALTER TABLE `users` MODIFY COLUMN `age` BIGINT NOT NULL".to_string()]);
    }

    #[test]
    fn empty_schema_targets_current_database() {
        assert!(MySqlDialect.tables_query("").contains("DATABASE()"));
        assert!(MySqlDialect.tables_query("app").contains("'app'"));
    }
}
