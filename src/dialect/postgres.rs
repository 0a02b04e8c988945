//! PostgreSQL dialect.
//!
//! The richest backend: transactional DDL, `RETURNING`, real schema
//! namespaces, partial indexes, `$N` placeholders, and catalog-level enums
//! and extensions. Introspection reads `information_schema` plus
//! `pg_catalog` where the standard views fall short (index definitions,
//! sequence state).

use super::{quote_literal, Dialect};
use crate::error::Result;
use crate::libs::conn_str::DatabaseKind;
use crate::schema::{ColumnDefinition, ColumnType, ForeignReference};

pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    fn map_type(&self, column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Uuid => "UUID",
            ColumnType::String => "VARCHAR(255)",
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Decimal => "NUMERIC",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::DateTime => "TIMESTAMPTZ",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::Json => "JSONB",
            ColumnType::Binary => "BYTEA",
        }
    }

    fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn supports_returning(&self) -> bool {
        true
    }

    fn supports_schemas(&self) -> bool {
        true
    }

    fn alter_column(&self, table: &str, column: &ColumnDefinition) -> Result<Vec<String>> {
        let table_quoted = self.quote(table);
        let column_quoted = self.quote(&column.name);
        let mut statements = vec![format!(
            "ALTER TABLE {table_quoted} ALTER COLUMN {column_quoted} TYPE {} USING {column_quoted}::{}",
            self.map_type(column.column_type),
            self.map_type(column.column_type)
        )];
        if column.nullable {
            statements.push(format!(
                "ALTER TABLE {table_quoted} ALTER COLUMN {column_quoted} DROP NOT NULL"
            ));
        } else {
            statements.push(format!(
                "ALTER TABLE {table_quoted} ALTER COLUMN {column_quoted} SET NOT NULL"
            ));
        }
        match &column.default {
            Some(default) => statements.push(format!(
                "ALTER TABLE {table_quoted} ALTER COLUMN {column_quoted} SET DEFAULT {default}"
            )),
            None => statements.push(format!(
                "ALTER TABLE {table_quoted} ALTER COLUMN {column_quoted} DROP DEFAULT"
            )),
        }
        Ok(statements)
    }

    fn drop_index(&self, _table: &str, name: &str) -> String {
        format!("DROP INDEX IF EXISTS {}", self.quote(name))
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
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote(table),
            self.quote(constraint)
        ))
    }

    fn tables_query(&self, schema: &str) -> String {
        format!(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = {} AND table_type = 'BASE TABLE' \
             ORDER BY table_name",
            quote_literal(schema)
        )
    }

    fn columns_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT column_name, data_type, udt_name, is_nullable, column_default, \
                    is_identity, character_maximum_length, numeric_precision, numeric_scale \
             FROM information_schema.columns \
             WHERE table_schema = {} AND table_name = {} \
             ORDER BY ordinal_position",
            quote_literal(schema),
            quote_literal(table)
        )
    }

    fn primary_key_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT kcu.column_name \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             WHERE tc.constraint_type = 'PRIMARY KEY' \
               AND tc.table_schema = {} AND tc.table_name = {} \
             ORDER BY kcu.ordinal_position",
            quote_literal(schema),
            quote_literal(table)
        )
    }

    fn foreign_keys_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT tc.constraint_name, kcu.column_name, \
                    ccu.table_name AS referenced_table, ccu.column_name AS referenced_column, \
                    rc.update_rule, rc.delete_rule \
             FROM information_schema.table_constraints tc \
             JOIN information_schema.key_column_usage kcu \
               ON tc.constraint_name = kcu.constraint_name \
              AND tc.table_schema = kcu.table_schema \
             JOIN information_schema.constraint_column_usage ccu \
               ON tc.constraint_name = ccu.constraint_name \
              AND tc.table_schema = ccu.constraint_schema \
             JOIN information_schema.referential_constraints rc \
               ON tc.constraint_name = rc.constraint_name \
              AND tc.table_schema = rc.constraint_schema \
             WHERE tc.constraint_type = 'FOREIGN KEY' \
               AND tc.table_schema = {} AND tc.table_name = {} \
             ORDER BY tc.constraint_name",
            quote_literal(schema),
            quote_literal(table)
        )
    }

    fn indexes_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT i.relname AS index_name, \
                    array_to_string(array_agg(a.attname ORDER BY array_position(ix.indkey, a.attnum)), ',') AS columns, \
                    ix.indisunique AS is_unique, ix.indisprimary AS is_primary, \
                    pg_get_expr(ix.indpred, ix.indrelid) AS predicate \
             FROM pg_class t \
             JOIN pg_index ix ON t.oid = ix.indrelid \
             JOIN pg_class i ON i.oid = ix.indexrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey) \
             WHERE n.nspname = {} AND t.relname = {} AND t.relkind = 'r' \
             GROUP BY i.relname, ix.indisunique, ix.indisprimary, ix.indpred, ix.indrelid \
             ORDER BY i.relname",
            quote_literal(schema),
            quote_literal(table)
        )
    }

    fn constraints_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT con.conname AS constraint_name, con.contype AS constraint_type, \
                    pg_get_constraintdef(con.oid) AS definition \
             FROM pg_constraint con \
             JOIN pg_class t ON t.oid = con.conrelid \
             JOIN pg_namespace n ON n.oid = t.relnamespace \
             WHERE n.nspname = {} AND t.relname = {} AND con.contype = 'c' \
             ORDER BY con.conname",
            quote_literal(schema),
            quote_literal(table)
        )
    }

    fn enums_query(&self, schema: &str) -> Option<String> {
        Some(format!(
            "SELECT t.typname AS enum_name, \
                    array_to_string(array_agg(e.enumlabel ORDER BY e.enumsortorder), ',') AS labels \
             FROM pg_type t \
             JOIN pg_enum e ON t.oid = e.enumtypid \
             JOIN pg_namespace n ON n.oid = t.typnamespace \
             WHERE n.nspname = {} \
             GROUP BY t.typname ORDER BY t.typname",
            quote_literal(schema)
        ))
    }

    fn extensions_query(&self) -> Option<String> {
        Some("SELECT extname, extversion FROM pg_extension ORDER BY extname".to_string())
    }

    fn version_query(&self) -> &'static str {
        "SELECT version()"
    }

    fn json_type(&self) -> &'static str {
        "JSONB"
    }

    fn statement_list_type(&self) -> &'static str {
        "JSONB"
    }
}
