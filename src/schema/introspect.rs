//! Live-database introspection.
//!
//! Reconstructs a schema from the backend's catalogs using the dialect's
//! introspection queries, then normalizes native types back onto the closed
//! [`ColumnType`] set with a conservative table. Unknown native types fall
//! back to `text`; every fallback is reported as a caveat so diffs can
//! flag the lossy spot.

use super::{
    CascadePolicy, ColumnDefinition, ColumnType, ForeignReference, IndexDefinition,
    SchemaDefinition, TableDefinition,
};
use crate::db::driver::Driver;
use crate::db::value::Row;
use crate::error::Result;
use crate::libs::conn_str::DatabaseKind;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Raw column facts as the catalog reports them.
#[derive(Debug, Clone)]
pub struct IntrospectedColumn {
    pub name: String,
    pub native_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub is_identity: bool,
    pub max_length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IntrospectedForeignKey {
    pub constraint_name: String,
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_update: Option<String>,
    pub on_delete: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntrospectedIndex {
    pub name: String,
    pub columns: Vec<String>,
    pub unique: bool,
    pub primary: bool,
    pub predicate: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntrospectedConstraint {
    pub name: String,
    pub constraint_type: String,
    pub definition: String,
}

#[derive(Debug, Clone)]
pub struct IntrospectedTable {
    pub name: String,
    pub columns: Vec<IntrospectedColumn>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<IntrospectedForeignKey>,
    pub indexes: Vec<IntrospectedIndex>,
    pub constraints: Vec<IntrospectedConstraint>,
}

/// Everything the catalogs know about one namespace.
#[derive(Debug, Clone)]
pub struct IntrospectedSchema {
    pub schema_name: String,
    pub tables: Vec<IntrospectedTable>,
    pub enums: Vec<(String, Vec<String>)>,
    pub extensions: Vec<(String, String)>,
    pub server_version: String,
}

/// Catalog reader for one driver.
pub struct Introspector {
    driver: Arc<Driver>,
}

impl Introspector {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }

    /// Reads the full structure of one namespace.
    pub async fn introspect(&self, schema: &str) -> Result<IntrospectedSchema> {
        let dialect = self.driver.dialect();

        let table_rows = self.driver.query(&dialect.tables_query(schema), &[]).await?;
        let mut tables = Vec::with_capacity(table_rows.rows.len());
        for row in &table_rows.rows {
            let Some(table_name) = row.get_str("table_name").or_else(|| row.get_str("name"))
            else {
                continue;
            };
            tables.push(self.introspect_table(schema, table_name).await?);
        }

        let enums = match dialect.enums_query(schema) {
            Some(sql) => self
                .driver
                .query(&sql, &[])
                .await?
                .rows
                .iter()
                .filter_map(|row| {
                    Some((
                        row.get_str("enum_name")?.to_string(),
                        row.get_str("labels")?
                            .split(',')
                            .map(|s| s.to_string())
                            .collect(),
                    ))
                })
                .collect(),
            None => Vec::new(),
        };

        let extensions = match dialect.extensions_query() {
            Some(sql) => self
                .driver
                .query(&sql, &[])
                .await?
                .rows
                .iter()
                .filter_map(|row| {
                    Some((
                        row.get_str("extname")?.to_string(),
                        row.get_str("extversion").unwrap_or_default().to_string(),
                    ))
                })
                .collect(),
            None => Vec::new(),
        };

        let version_result = self.driver.query(dialect.version_query(), &[]).await?;
        let server_version = version_result
            .rows
            .first()
            .and_then(|row| row.0.first())
            .and_then(|(_, value)| value.as_str())
            .unwrap_or_default()
            .to_string();

        debug!(schema, tables = tables.len(), "introspection complete");
        Ok(IntrospectedSchema {
            schema_name: schema.to_string(),
            tables,
            enums,
            extensions,
            server_version,
        })
    }

    async fn introspect_table(&self, schema: &str, table: &str) -> Result<IntrospectedTable> {
        let dialect = self.driver.dialect();
        let kind = self.driver.kind();

        let column_rows = self
            .driver
            .query(&dialect.columns_query(schema, table), &[])
            .await?;
        let columns: Vec<IntrospectedColumn> = column_rows
            .rows
            .iter()
            .map(|row| parse_column_row(kind, row))
            .collect();

        let primary_key = if kind == DatabaseKind::Sqlite {
            // PRAGMA table_info carries pk ordinals directly.
            let mut keyed: Vec<(i64, String)> = column_rows
                .rows
                .iter()
                .filter_map(|row| {
                    let rank = row.get_i64("pk").unwrap_or(0);
                    (rank > 0)
                        .then(|| (rank, row.get_str("name").unwrap_or_default().to_string()))
                })
                .collect();
            keyed.sort();
            keyed.into_iter().map(|(_, name)| name).collect()
        } else {
            self.driver
                .query(&dialect.primary_key_query(schema, table), &[])
                .await?
                .rows
                .iter()
                .filter_map(|row| row.get_str("column_name").map(|c| c.to_string()))
                .collect()
        };

        let foreign_keys = self.introspect_foreign_keys(schema, table).await?;
        let indexes = self.introspect_indexes(schema, table).await?;

        let constraint_rows = self
            .driver
            .query(&dialect.constraints_query(schema, table), &[])
            .await?;
        let constraints = constraint_rows
            .rows
            .iter()
            .filter_map(|row| {
                Some(IntrospectedConstraint {
                    name: row.get_str("constraint_name")?.to_string(),
                    constraint_type: row
                        .get_str("constraint_type")
                        .unwrap_or("c")
                        .to_string(),
                    definition: row.get_str("definition").unwrap_or_default().to_string(),
                })
            })
            .collect();

        Ok(IntrospectedTable {
            name: table.to_string(),
            columns,
            primary_key,
            foreign_keys,
            indexes,
            constraints,
        })
    }

    async fn introspect_foreign_keys(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IntrospectedForeignKey>> {
        let dialect = self.driver.dialect();
        let rows = self
            .driver
            .query(&dialect.foreign_keys_query(schema, table), &[])
            .await?;
        if self.driver.kind() == DatabaseKind::Sqlite {
            // PRAGMA foreign_key_list: id, seq, table, from, to, on_update, on_delete.
            return Ok(rows
                .rows
                .iter()
                .filter_map(|row| {
                    Some(IntrospectedForeignKey {
                        constraint_name: format!(
                            "fk_{table}_{}",
                            row.get_str("from").unwrap_or_default()
                        ),
                        column: row.get_str("from")?.to_string(),
                        referenced_table: row.get_str("table")?.to_string(),
                        referenced_column: row.get_str("to").unwrap_or("id").to_string(),
                        on_update: row.get_str("on_update").map(|r| r.to_string()),
                        on_delete: row.get_str("on_delete").map(|r| r.to_string()),
                    })
                })
                .collect());
        }
        Ok(rows
            .rows
            .iter()
            .filter_map(|row| {
                Some(IntrospectedForeignKey {
                    constraint_name: row.get_str("constraint_name")?.to_string(),
                    column: row.get_str("column_name")?.to_string(),
                    referenced_table: row.get_str("referenced_table")?.to_string(),
                    referenced_column: row.get_str("referenced_column")?.to_string(),
                    on_update: row.get_str("update_rule").map(|r| r.to_string()),
                    on_delete: row.get_str("delete_rule").map(|r| r.to_string()),
                })
            })
            .collect())
    }

    async fn introspect_indexes(
        &self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<IntrospectedIndex>> {
        let dialect = self.driver.dialect();
        let rows = self
            .driver
            .query(&dialect.indexes_query(schema, table), &[])
            .await?;

        if self.driver.kind() == DatabaseKind::Sqlite {
            // PRAGMA index_list then index_info per index.
            let mut indexes = Vec::new();
            for row in &rows.rows {
                let Some(name) = row.get_str("name") else { continue };
                let info = self
                    .driver
                    .query(
                        &format!("PRAGMA index_info({})", dialect.quote(name)),
                        &[],
                    )
                    .await?;
                let columns: Vec<String> = info
                    .rows
                    .iter()
                    .filter_map(|r| r.get_str("name").map(|c| c.to_string()))
                    .collect();
                indexes.push(IntrospectedIndex {
                    name: name.to_string(),
                    columns,
                    unique: row.get_bool("unique").unwrap_or(false),
                    primary: row.get_str("origin") == Some("pk"),
                    predicate: None,
                });
            }
            return Ok(indexes);
        }

        Ok(rows
            .rows
            .iter()
            .filter_map(|row| {
                Some(IntrospectedIndex {
                    name: row.get_str("index_name")?.to_string(),
                    columns: row
                        .get_str("columns")
                        .unwrap_or_default()
                        .split(',')
                        .filter(|c| !c.is_empty())
                        .map(|c| c.to_string())
                        .collect(),
                    unique: row.get_bool("is_unique").unwrap_or(false),
                    primary: row.get_bool("is_primary").unwrap_or(false),
                    predicate: row.get_str("predicate").map(|p| p.to_string()),
                })
            })
            .collect())
    }
}

fn parse_column_row(kind: DatabaseKind, row: &Row) -> IntrospectedColumn {
    if kind == DatabaseKind::Sqlite {
        // PRAGMA table_info: cid, name, type, notnull, dflt_value, pk.
        return IntrospectedColumn {
            name: row.get_str("name").unwrap_or_default().to_string(),
            native_type: row.get_str("type").unwrap_or_default().to_string(),
            nullable: row.get_i64("notnull").unwrap_or(0) == 0,
            default: row.get_str("dflt_value").map(|d| d.to_string()),
            is_identity: false,
            max_length: None,
            precision: None,
            scale: None,
        };
    }
    IntrospectedColumn {
        name: row.get_str("column_name").unwrap_or_default().to_string(),
        native_type: row
            .get_str("udt_name")
            .or_else(|| row.get_str("data_type"))
            .unwrap_or_default()
            .to_string(),
        nullable: row.get_str("is_nullable") == Some("YES"),
        default: row.get_str("column_default").map(|d| d.to_string()),
        is_identity: matches!(row.get_str("is_identity"), Some("YES") | Some("auto_increment")),
        max_length: row.get_i64("character_maximum_length"),
        precision: row.get_i64("numeric_precision"),
        scale: row.get_i64("numeric_scale"),
    }
}

/// Maps a native type name back onto the closed portable set.
///
/// Conservative and lossy: anything unrecognized becomes `Text` and the
/// caller receives a caveat.
pub fn normalize_native_type(native: &str) -> Option<ColumnType> {
    let lower = native.to_lowercase();
    let base = lower.split('(').next().unwrap_or(&lower).trim();
    match base {
        "uuid" => Some(ColumnType::Uuid),
        "varchar" | "character varying" | "char" | "character" | "nvarchar" => {
            Some(ColumnType::String)
        }
        "text" | "mediumtext" | "longtext" | "clob" => Some(ColumnType::Text),
        "int" | "int2" | "int4" | "integer" | "smallint" | "mediumint" => {
            Some(ColumnType::Integer)
        }
        "tinyint" => {
            if lower.starts_with("tinyint(1)") {
                Some(ColumnType::Boolean)
            } else {
                Some(ColumnType::Integer)
            }
        }
        "int8" | "bigint" => Some(ColumnType::BigInt),
        "float" | "float4" | "float8" | "real" | "double" | "double precision" => {
            Some(ColumnType::Float)
        }
        "numeric" | "decimal" => Some(ColumnType::Decimal),
        "bool" | "boolean" => Some(ColumnType::Boolean),
        "timestamp" | "timestamptz" | "datetime" | "timestamp with time zone"
        | "timestamp without time zone" => Some(ColumnType::DateTime),
        "date" => Some(ColumnType::Date),
        "time" | "timetz" => Some(ColumnType::Time),
        "json" | "jsonb" => Some(ColumnType::Json),
        "bytea" | "blob" | "binary" | "varbinary" | "longblob" => Some(ColumnType::Binary),
        _ => None,
    }
}

/// Normalizes an introspected namespace into a [`SchemaDefinition`].
///
/// Returns the definition plus the caveat list for lossy conversions.
pub fn normalize(schema: &IntrospectedSchema) -> (SchemaDefinition, Vec<String>) {
    let mut caveats = Vec::new();
    let mut tables = BTreeMap::new();

    for table in &schema.tables {
        let mut columns = Vec::with_capacity(table.columns.len());
        for column in &table.columns {
            let column_type = match normalize_native_type(&column.native_type) {
                Some(mapped) => mapped,
                None => {
                    caveats.push(format!(
                        "unknown native type {:?} on {}.{}; normalized to text",
                        column.native_type, table.name, column.name
                    ));
                    ColumnType::Text
                }
            };
            let mut definition = ColumnDefinition::new(&column.name, column_type);
            definition.nullable = column.nullable;
            definition.default = column.default.clone();
            definition.tenant =
                column.name == "app_id" || column.name == "organization_id";
            columns.push(definition);
        }

        // Primary key: one column gets the flag, several become composite.
        let mut composite_key = None;
        match table.primary_key.as_slice() {
            [] => {}
            [single] => {
                if let Some(column) = columns.iter_mut().find(|c| &c.name == single) {
                    column.primary_key = true;
                    column.nullable = false;
                }
            }
            many => composite_key = Some(many.to_vec()),
        }

        // Unique single-column indexes mark the column unique; the rest
        // stay as index definitions.
        let mut indexes = Vec::new();
        for index in &table.indexes {
            if index.primary {
                continue;
            }
            if index.unique && index.columns.len() == 1 {
                if let Some(column) =
                    columns.iter_mut().find(|c| c.name == index.columns[0])
                {
                    column.unique = true;
                    continue;
                }
            }
            indexes.push(IndexDefinition {
                name: Some(index.name.clone()),
                columns: index.columns.clone(),
                unique: index.unique,
                predicate: index.predicate.clone(),
            });
        }

        for foreign_key in &table.foreign_keys {
            if let Some(column) = columns
                .iter_mut()
                .find(|c| c.name == foreign_key.column)
            {
                column.references = Some(ForeignReference {
                    table: foreign_key.referenced_table.clone(),
                    column: foreign_key.referenced_column.clone(),
                    on_delete: foreign_key
                        .on_delete
                        .as_deref()
                        .and_then(parse_cascade_rule),
                    on_update: foreign_key
                        .on_update
                        .as_deref()
                        .and_then(parse_cascade_rule),
                });
            }
        }

        if !table.constraints.is_empty() {
            caveats.push(format!(
                "table {} has {} check constraint(s) not representable in the portable schema",
                table.name,
                table.constraints.len()
            ));
        }

        tables.insert(
            table.name.clone(),
            TableDefinition {
                columns,
                indexes,
                primary_key: composite_key,
            },
        );
    }

    (SchemaDefinition { tables }, caveats)
}

fn parse_cascade_rule(rule: &str) -> Option<CascadePolicy> {
    match rule.to_uppercase().as_str() {
        "CASCADE" => Some(CascadePolicy::Cascade),
        "RESTRICT" => Some(CascadePolicy::Restrict),
        "SET NULL" => Some(CascadePolicy::SetNull),
        "NO ACTION" => Some(CascadePolicy::NoAction),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_type_normalization() {
        assert_eq!(normalize_native_type("uuid"), Some(ColumnType::Uuid));
        assert_eq!(normalize_native_type("VARCHAR(255)"), Some(ColumnType::String));
        assert_eq!(normalize_native_type("int4"), Some(ColumnType::Integer));
        assert_eq!(normalize_native_type("bigint"), Some(ColumnType::BigInt));
        assert_eq!(normalize_native_type("timestamptz"), Some(ColumnType::DateTime));
        assert_eq!(normalize_native_type("jsonb"), Some(ColumnType::Json));
        assert_eq!(normalize_native_type("tinyint(1)"), Some(ColumnType::Boolean));
        assert_eq!(normalize_native_type("tinyint(4)"), Some(ColumnType::Integer));
        assert_eq!(normalize_native_type("geometry"), None);
    }

    #[test]
    fn normalize_reports_unknown_types_as_caveats() {
        let schema = IntrospectedSchema {
            schema_name: "public".into(),
            tables: vec![IntrospectedTable {
                name: "places".into(),
                columns: vec![
                    IntrospectedColumn {
                        name: "id".into(),
                        native_type: "uuid".into(),
                        nullable: false,
                        default: None,
                        is_identity: false,
                        max_length: None,
                        precision: None,
                        scale: None,
                    },
                    IntrospectedColumn {
                        name: "geom".into(),
                        native_type: "geometry".into(),
                        nullable: true,
                        default: None,
                        is_identity: false,
                        max_length: None,
                        precision: None,
                        scale: None,
                    },
                ],
                primary_key: vec!["id".into()],
                foreign_keys: vec![],
                indexes: vec![],
                constraints: vec![],
            }],
            enums: vec![],
            extensions: vec![],
            server_version: "test".into(),
        };

        let (definition, caveats) = normalize(&schema);
        let table = &definition.tables["places"];
        assert_eq!(table.column("geom").unwrap().column_type, ColumnType::Text);
        assert!(table.column("id").unwrap().primary_key);
        assert_eq!(caveats.len(), 1);
        assert!(caveats[0].contains("geometry"));
    }

    #[test]
    fn tenant_columns_are_flagged() {
        let schema = IntrospectedSchema {
            schema_name: "public".into(),
            tables: vec![IntrospectedTable {
                name: "docs".into(),
                columns: vec![IntrospectedColumn {
                    name: "app_id".into(),
                    native_type: "varchar".into(),
                    nullable: false,
                    default: None,
                    is_identity: false,
                    max_length: Some(255),
                    precision: None,
                    scale: None,
                }],
                primary_key: vec![],
                foreign_keys: vec![],
                indexes: vec![],
                constraints: vec![],
            }],
            enums: vec![],
            extensions: vec![],
            server_version: "test".into(),
        };
        let (definition, _) = normalize(&schema);
        assert!(definition.tables["docs"].column("app_id").unwrap().tenant);
    }
}
