//! Schema definition model.
//!
//! A schema is a mapping from table name to table definition: ordered
//! columns with a closed set of type tags, indexes, and an optional
//! composite primary key. These types serialize with camelCase field names
//! and map-ordered tables so checksums over the canonical JSON rendering
//! are stable.
//!
//! ## Invariants
//!
//! - Every tenant-scoped table has both tenant columns present and flagged.
//! - A primary key is declared either by `primary_key: true` on exactly one
//!   column or by the table-level composite list, never both.

pub mod diff;
pub mod introspect;
pub mod registry;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of portable column type tags.
///
/// Dialects map these to native types; unknown native types normalize back
/// to `Text` with a caveat (lossy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Uuid,
    String,
    Text,
    Integer,
    BigInt,
    Float,
    Decimal,
    Boolean,
    DateTime,
    Date,
    Time,
    Json,
    Binary,
}

impl ColumnType {
    /// Type family used by the breakingness rules: conversions within a
    /// family (or widening ones) are safe, cross-family to a narrower
    /// representation is breaking.
    pub fn family(self) -> TypeFamily {
        match self {
            ColumnType::String | ColumnType::Text | ColumnType::Uuid => TypeFamily::Textual,
            ColumnType::Integer | ColumnType::BigInt | ColumnType::Float | ColumnType::Decimal => {
                TypeFamily::Numeric
            }
            ColumnType::Boolean => TypeFamily::Boolean,
            ColumnType::DateTime | ColumnType::Date | ColumnType::Time => TypeFamily::Temporal,
            ColumnType::Json => TypeFamily::Json,
            ColumnType::Binary => TypeFamily::Binary,
        }
    }
}

/// Coarse type families for compatibility classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Textual,
    Numeric,
    Boolean,
    Temporal,
    Json,
    Binary,
}

/// Referential cascade policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CascadePolicy {
    Cascade,
    Restrict,
    SetNull,
    NoAction,
}

impl CascadePolicy {
    pub fn as_sql(self) -> &'static str {
        match self {
            CascadePolicy::Cascade => "CASCADE",
            CascadePolicy::Restrict => "RESTRICT",
            CascadePolicy::SetNull => "SET NULL",
            CascadePolicy::NoAction => "NO ACTION",
        }
    }
}

/// A foreign reference from one column to another table's column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignReference {
    pub table: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<CascadePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<CascadePolicy>,
}

/// A single column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// Default expression rendered verbatim into DDL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignReference>,
    /// Marks the column as one of the two tenant attribution columns.
    #[serde(default)]
    pub tenant: bool,
}

fn default_true() -> bool {
    true
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            unique: false,
            primary_key: false,
            default: None,
            references: None,
            tenant: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn tenant(mut self) -> Self {
        self.tenant = true;
        self
    }

    pub fn references(mut self, reference: ForeignReference) -> Self {
        self.references = Some(reference);
        self
    }
}

/// An index over one or more columns, optionally named, unique or partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Partial-index predicate rendered verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

impl IndexDefinition {
    /// The effective index name: explicit, or `idx_<table>_<cols>`.
    pub fn effective_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("idx_{}_{}", table, self.columns.join("_")),
        }
    }
}

/// A table: ordered columns, indexes, optional composite primary key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub columns: Vec<ColumnDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDefinition>,
    /// Composite primary key column list; mutually exclusive with a
    /// `primary_key`-flagged column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// True when any column carries the tenant flag.
    pub fn is_tenant_scoped(&self) -> bool {
        self.columns.iter().any(|c| c.tenant)
    }
}

/// A complete schema: table name → definition, map-ordered for stable
/// serialization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub tables: BTreeMap<String, TableDefinition>,
}

impl SchemaDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, name: impl Into<String>, table: TableDefinition) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// Canonical checksum over the JSON rendering.
    pub fn checksum(&self) -> Result<String> {
        crate::libs::checksum::canonical_json_checksum(self)
    }

    /// Validates the structural invariants.
    ///
    /// - every table has a primary key, declared exactly one way;
    /// - tenant-scoped tables carry both `app_id` and `organization_id`
    ///   columns flagged as tenant columns;
    /// - index and composite-key column references resolve.
    pub fn validate(&self) -> Result<()> {
        for (table_name, table) in &self.tables {
            let flagged: Vec<&ColumnDefinition> =
                table.columns.iter().filter(|c| c.primary_key).collect();

            match (&table.primary_key, flagged.len()) {
                (Some(_), n) if n > 0 => {
                    return Err(Error::SchemaInvalid(format!(
                        "table {table_name:?} declares both a composite primary key and a primaryKey column"
                    )));
                }
                (Some(composite), _) => {
                    if composite.is_empty() {
                        return Err(Error::SchemaInvalid(format!(
                            "table {table_name:?} has an empty composite primary key"
                        )));
                    }
                    for key_column in composite {
                        if table.column(key_column).is_none() {
                            return Err(Error::SchemaInvalid(format!(
                                "table {table_name:?} primary key references unknown column {key_column:?}"
                            )));
                        }
                    }
                }
                (None, 1) => {}
                (None, 0) => {
                    return Err(Error::SchemaInvalid(format!(
                        "table {table_name:?} has no primary key"
                    )));
                }
                (None, n) => {
                    return Err(Error::SchemaInvalid(format!(
                        "table {table_name:?} flags {n} columns as primaryKey; only one is allowed"
                    )));
                }
            }

            if table.is_tenant_scoped() {
                for required in ["app_id", "organization_id"] {
                    match table.column(required) {
                        Some(column) if column.tenant => {}
                        Some(_) => {
                            return Err(Error::SchemaInvalid(format!(
                                "table {table_name:?} column {required:?} must be flagged as a tenant column"
                            )));
                        }
                        None => {
                            return Err(Error::SchemaInvalid(format!(
                                "tenant table {table_name:?} is missing the {required:?} column"
                            )));
                        }
                    }
                }
            }

            for index in &table.indexes {
                for indexed_column in &index.columns {
                    if table.column(indexed_column).is_none() {
                        return Err(Error::SchemaInvalid(format!(
                            "table {table_name:?} index references unknown column {indexed_column:?}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users_table() -> TableDefinition {
        TableDefinition {
            columns: vec![
                ColumnDefinition::new("id", ColumnType::Uuid).primary(),
                ColumnDefinition::new("email", ColumnType::String).not_null().unique(),
                ColumnDefinition::new("app_id", ColumnType::String).not_null().tenant(),
                ColumnDefinition::new("organization_id", ColumnType::String).not_null().tenant(),
            ],
            indexes: vec![IndexDefinition {
                name: None,
                columns: vec!["email".into()],
                unique: false,
                predicate: None,
            }],
            primary_key: None,
        }
    }

    #[test]
    fn valid_schema_passes() {
        let schema = SchemaDefinition::new().table("users", users_table());
        schema.validate().unwrap();
    }

    #[test]
    fn tenant_table_requires_both_columns() {
        let mut table = users_table();
        table.columns.retain(|c| c.name != "organization_id");
        let schema = SchemaDefinition::new().table("users", table);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn double_primary_key_declaration_rejected() {
        let mut table = users_table();
        table.primary_key = Some(vec!["id".into(), "email".into()]);
        let schema = SchemaDefinition::new().table("users", table);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn missing_primary_key_rejected() {
        let table = TableDefinition {
            columns: vec![ColumnDefinition::new("value", ColumnType::Text)],
            indexes: vec![],
            primary_key: None,
        };
        let schema = SchemaDefinition::new().table("t", table);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn checksum_is_stable_across_clones() {
        let schema = SchemaDefinition::new().table("users", users_table());
        assert_eq!(schema.checksum().unwrap(), schema.clone().checksum().unwrap());
    }

    #[test]
    fn effective_index_name() {
        let index = IndexDefinition {
            name: None,
            columns: vec!["a".into(), "b".into()],
            unique: false,
            predicate: None,
        };
        assert_eq!(index.effective_name("t"), "idx_t_a_b");
    }
}
