//! Structural schema diff, breakingness classification, and migration
//! synthesis.
//!
//! Compares a current schema (possibly absent) against a target and emits
//! typed changes, each carrying a human description, a breaking flag, and
//! forward plus reverse DDL. Changes are ordered so drops run before
//! creates within the destructive partition and creates precede
//! foreign-key additions within the additive partition, giving a safe
//! apply order.
//!
//! ## Breakingness rules
//!
//! - table and column drops are breaking by default (configurable);
//! - type changes are safe only when widening (anything narrows to text,
//!   `integer → bigint` widens, the reverse directions break);
//! - `nullable true → false` with no default breaks, as does removing the
//!   default of a non-null column;
//! - `unique false → true` breaks, the reverse does not;
//! - foreign-key addition breaks, removal does not; index changes never do.

use super::{ColumnDefinition, ColumnType, SchemaDefinition, TableDefinition, TypeFamily};
use crate::dialect::Dialect;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Typed change kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    TableAdd,
    TableDrop,
    ColumnAdd,
    ColumnDrop,
    ColumnModify,
    IndexAdd,
    IndexDrop,
    ConstraintAdd,
    ConstraintDrop,
    ForeignKeyAdd,
    ForeignKeyDrop,
}

/// One structural change with its DDL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaChange {
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub description: String,
    pub is_breaking: bool,
    pub forward: Vec<String>,
    pub reverse: Vec<String>,
}

/// Synthesized migration over the ordered change list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiffMigration {
    pub forward: Vec<String>,
    pub reverse: Vec<String>,
}

/// Diff output.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    pub has_differences: bool,
    pub summary: String,
    pub changes: Vec<SchemaChange>,
    pub breaking_changes: Vec<SchemaChange>,
    pub migration: Option<DiffMigration>,
    /// Lossy spots (normalization fallbacks, unsupported DDL).
    pub caveats: Vec<String>,
}

/// Breakingness policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    pub treat_table_drop_as_breaking: bool,
    pub treat_column_drop_as_breaking: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            treat_table_drop_as_breaking: true,
            treat_column_drop_as_breaking: true,
        }
    }
}

/// Structural diff engine for one dialect.
pub struct DiffEngine {
    dialect: &'static dyn Dialect,
    options: DiffOptions,
}

impl DiffEngine {
    pub fn new(dialect: &'static dyn Dialect, options: DiffOptions) -> Self {
        Self { dialect, options }
    }

    /// Diffs `current` (absent means empty database) against `target`.
    pub fn diff(
        &self,
        current: Option<&SchemaDefinition>,
        target: &SchemaDefinition,
    ) -> Result<SchemaDiff> {
        let empty = SchemaDefinition::default();
        let current = current.unwrap_or(&empty);

        let mut changes = Vec::new();
        let mut caveats = Vec::new();

        for (table_name, table) in &current.tables {
            if !target.tables.contains_key(table_name) {
                changes.push(self.table_drop(table_name, table)?);
            }
        }
        for (table_name, table) in &target.tables {
            match current.tables.get(table_name) {
                None => changes.extend(self.table_add(table_name, table)?),
                Some(current_table) => changes.extend(self.table_changes(
                    table_name,
                    current_table,
                    table,
                    &mut caveats,
                )?),
            }
        }

        order_changes(&mut changes);

        let breaking_changes: Vec<SchemaChange> =
            changes.iter().filter(|c| c.is_breaking).cloned().collect();
        let has_differences = !changes.is_empty();
        let summary = format!(
            "{} change(s), {} breaking",
            changes.len(),
            breaking_changes.len()
        );
        debug!(%summary, "schema diff computed");

        let migration = has_differences.then(|| {
            let forward: Vec<String> =
                changes.iter().flat_map(|c| c.forward.clone()).collect();
            let reverse: Vec<String> = changes
                .iter()
                .rev()
                .flat_map(|c| c.reverse.clone())
                .collect();
            DiffMigration { forward, reverse }
        });

        Ok(SchemaDiff {
            has_differences,
            summary,
            changes,
            breaking_changes,
            migration,
            caveats,
        })
    }

    fn table_add(&self, name: &str, table: &TableDefinition) -> Result<Vec<SchemaChange>> {
        let mut forward = vec![self.dialect.create_table(name, table)?];
        for index in &table.indexes {
            forward.push(self.dialect.create_index(name, index));
        }
        Ok(vec![SchemaChange {
            change_type: ChangeType::TableAdd,
            table: name.to_string(),
            column: None,
            description: format!("create table {name}"),
            is_breaking: false,
            forward,
            reverse: vec![self.dialect.drop_table(name)],
        }])
    }

    fn table_drop(&self, name: &str, table: &TableDefinition) -> Result<SchemaChange> {
        Ok(SchemaChange {
            change_type: ChangeType::TableDrop,
            table: name.to_string(),
            column: None,
            description: format!("drop table {name}"),
            is_breaking: self.options.treat_table_drop_as_breaking,
            forward: vec![self.dialect.drop_table(name)],
            reverse: vec![self.dialect.create_table(name, table)?],
        })
    }

    fn table_changes(
        &self,
        table_name: &str,
        current: &TableDefinition,
        target: &TableDefinition,
        caveats: &mut Vec<String>,
    ) -> Result<Vec<SchemaChange>> {
        let mut changes = Vec::new();

        // Columns.
        for column in &current.columns {
            if target.column(&column.name).is_none() {
                changes.push(SchemaChange {
                    change_type: ChangeType::ColumnDrop,
                    table: table_name.to_string(),
                    column: Some(column.name.clone()),
                    description: format!("drop column {table_name}.{}", column.name),
                    is_breaking: self.options.treat_column_drop_as_breaking,
                    forward: vec![self.dialect.drop_column(table_name, &column.name)],
                    reverse: vec![self.dialect.add_column(table_name, column)?],
                });
            }
        }
        for column in &target.columns {
            match current.column(&column.name) {
                None => changes.push(SchemaChange {
                    change_type: ChangeType::ColumnAdd,
                    table: table_name.to_string(),
                    column: Some(column.name.clone()),
                    description: format!("add column {table_name}.{}", column.name),
                    is_breaking: false,
                    forward: vec![self.dialect.add_column(table_name, column)?],
                    reverse: vec![self.dialect.drop_column(table_name, &column.name)],
                }),
                Some(existing) => {
                    if let Some(change) =
                        self.column_modify(table_name, existing, column, caveats)
                    {
                        changes.push(change);
                    }
                    changes.extend(self.foreign_key_changes(table_name, existing, column)?);
                }
            }
        }

        // Indexes, matched by effective name.
        for index in &current.indexes {
            let name = index.effective_name(table_name);
            if !target
                .indexes
                .iter()
                .any(|i| i.effective_name(table_name) == name)
            {
                changes.push(SchemaChange {
                    change_type: ChangeType::IndexDrop,
                    table: table_name.to_string(),
                    column: None,
                    description: format!("drop index {name}"),
                    is_breaking: false,
                    forward: vec![self.dialect.drop_index(table_name, &name)],
                    reverse: vec![self.dialect.create_index(table_name, index)],
                });
            }
        }
        for index in &target.indexes {
            let name = index.effective_name(table_name);
            if !current
                .indexes
                .iter()
                .any(|i| i.effective_name(table_name) == name)
            {
                changes.push(SchemaChange {
                    change_type: ChangeType::IndexAdd,
                    table: table_name.to_string(),
                    column: None,
                    description: format!("create index {name}"),
                    is_breaking: false,
                    forward: vec![self.dialect.create_index(table_name, index)],
                    reverse: vec![self.dialect.drop_index(table_name, &name)],
                });
            }
        }

        Ok(changes)
    }

    fn column_modify(
        &self,
        table_name: &str,
        current: &ColumnDefinition,
        target: &ColumnDefinition,
        caveats: &mut Vec<String>,
    ) -> Option<SchemaChange> {
        let type_changed = current.column_type != target.column_type;
        let nullable_changed = current.nullable != target.nullable;
        let unique_changed = current.unique != target.unique;
        let default_changed = current.default != target.default;
        if !(type_changed || nullable_changed || unique_changed || default_changed) {
            return None;
        }

        let mut breaking = false;
        let mut reasons = Vec::new();
        if type_changed && type_change_breaking(current.column_type, target.column_type) {
            breaking = true;
            reasons.push("incompatible type change");
        }
        if nullable_changed && current.nullable && !target.nullable && target.default.is_none() {
            breaking = true;
            reasons.push("NOT NULL without default");
        }
        if default_changed && target.default.is_none() && !target.nullable {
            breaking = true;
            reasons.push("default removed from non-null column");
        }
        if unique_changed && target.unique {
            breaking = true;
            reasons.push("uniqueness added");
        }

        let (forward, reverse) = match (
            self.dialect.alter_column(table_name, target),
            self.dialect.alter_column(table_name, current),
        ) {
            (Ok(forward), Ok(reverse)) => (forward, reverse),
            _ => {
                caveats.push(format!(
                    "{} cannot alter column {table_name}.{} in place; manual rebuild required",
                    self.dialect.kind(),
                    target.name
                ));
                (Vec::new(), Vec::new())
            }
        };

        let description = if reasons.is_empty() {
            format!("modify column {table_name}.{}", target.name)
        } else {
            format!(
                "modify column {table_name}.{} ({})",
                target.name,
                reasons.join(", ")
            )
        };

        Some(SchemaChange {
            change_type: ChangeType::ColumnModify,
            table: table_name.to_string(),
            column: Some(target.name.clone()),
            description,
            is_breaking: breaking,
            forward,
            reverse,
        })
    }

    fn foreign_key_changes(
        &self,
        table_name: &str,
        current: &ColumnDefinition,
        target: &ColumnDefinition,
    ) -> Result<Vec<SchemaChange>> {
        let mut changes = Vec::new();
        let constraint = format!("fk_{table_name}_{}", target.name);
        match (&current.references, &target.references) {
            (None, Some(reference)) => {
                let forward = match self
                    .dialect
                    .add_foreign_key(table_name, &target.name, reference)
                {
                    Ok(sql) => vec![sql],
                    Err(_) => Vec::new(),
                };
                let reverse = self
                    .dialect
                    .drop_foreign_key(table_name, &constraint)
                    .map(|sql| vec![sql])
                    .unwrap_or_default();
                changes.push(SchemaChange {
                    change_type: ChangeType::ForeignKeyAdd,
                    table: table_name.to_string(),
                    column: Some(target.name.clone()),
                    description: format!(
                        "add foreign key {table_name}.{} -> {}.{}",
                        target.name, reference.table, reference.column
                    ),
                    is_breaking: true,
                    forward,
                    reverse,
                });
            }
            (Some(reference), None) => {
                let forward = self
                    .dialect
                    .drop_foreign_key(table_name, &constraint)
                    .map(|sql| vec![sql])
                    .unwrap_or_default();
                let reverse = self
                    .dialect
                    .add_foreign_key(table_name, &current.name, reference)
                    .map(|sql| vec![sql])
                    .unwrap_or_default();
                changes.push(SchemaChange {
                    change_type: ChangeType::ForeignKeyDrop,
                    table: table_name.to_string(),
                    column: Some(current.name.clone()),
                    description: format!("drop foreign key on {table_name}.{}", current.name),
                    is_breaking: false,
                    forward,
                    reverse,
                });
            }
            _ => {}
        }
        Ok(changes)
    }
}

/// Apply-order rank: destructive partition first (drops before creates),
/// then additive with foreign keys last.
fn order_changes(changes: &mut [SchemaChange]) {
    fn rank(change: &SchemaChange) -> u8 {
        match change.change_type {
            ChangeType::ForeignKeyDrop => 0,
            ChangeType::ConstraintDrop => 1,
            ChangeType::IndexDrop => 2,
            ChangeType::ColumnDrop => 3,
            ChangeType::TableDrop => 4,
            ChangeType::TableAdd => 5,
            ChangeType::ColumnAdd => 6,
            ChangeType::ColumnModify => 7,
            ChangeType::IndexAdd => 8,
            ChangeType::ConstraintAdd => 9,
            ChangeType::ForeignKeyAdd => 10,
        }
    }
    changes.sort_by_key(rank);
}

/// True when converting `old → new` risks rejecting existing data.
fn type_change_breaking(old: ColumnType, new: ColumnType) -> bool {
    if old == new {
        return false;
    }
    // Everything narrows safely into unbounded text.
    if new == ColumnType::Text {
        return false;
    }
    match (old.family(), new.family()) {
        (TypeFamily::Numeric, TypeFamily::Numeric) => numeric_rank(new) < numeric_rank(old),
        (TypeFamily::Textual, TypeFamily::Textual) => textual_rank(new) < textual_rank(old),
        _ => true,
    }
}

fn numeric_rank(column_type: ColumnType) -> u8 {
    match column_type {
        ColumnType::Integer => 1,
        ColumnType::BigInt => 2,
        ColumnType::Float => 3,
        ColumnType::Decimal => 4,
        _ => 0,
    }
}

fn textual_rank(column_type: ColumnType) -> u8 {
    match column_type {
        ColumnType::Uuid => 1,
        ColumnType::String => 2,
        ColumnType::Text => 3,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::PostgresDialect;
    use crate::schema::{ColumnDefinition, IndexDefinition};

    fn engine() -> DiffEngine {
        DiffEngine::new(&PostgresDialect, DiffOptions::default())
    }

    fn users(email: bool) -> SchemaDefinition {
        let mut columns = vec![ColumnDefinition::new("id", ColumnType::Uuid).primary()];
        if email {
            columns.push(ColumnDefinition::new("email", ColumnType::Text).not_null());
        }
        SchemaDefinition::new().table(
            "users",
            TableDefinition {
                columns,
                indexes: vec![],
                primary_key: None,
            },
        )
    }

    #[test]
    fn identical_schemas_have_no_differences() {
        let schema = users(true);
        let diff = engine().diff(Some(&schema), &schema).unwrap();
        assert!(!diff.has_differences);
        assert!(diff.migration.is_none());
    }

    #[test]
    fn column_drop_is_breaking_by_default() {
        let diff = engine().diff(Some(&users(true)), &users(false)).unwrap();
        assert!(diff.has_differences);
        assert_eq!(diff.changes.len(), 1);
        let change = &diff.changes[0];
        assert_eq!(change.change_type, ChangeType::ColumnDrop);
        assert!(change.is_breaking);
        assert_eq!(diff.breaking_changes.len(), 1);
    }

    #[test]
    fn null_schema_means_create_everything() {
        let diff = engine().diff(None, &users(true)).unwrap();
        assert_eq!(diff.changes[0].change_type, ChangeType::TableAdd);
        let migration = diff.migration.unwrap();
        assert!(migration.forward[0].starts_with("CREATE TABLE \"users\""));
        assert_eq!(migration.reverse, vec!["DROP TABLE IF EXISTS \"users\""]);
    }

    #[test]
    fn type_widening_rules() {
        assert!(!type_change_breaking(ColumnType::Integer, ColumnType::BigInt));
        assert!(type_change_breaking(ColumnType::BigInt, ColumnType::Integer));
        assert!(!type_change_breaking(ColumnType::Integer, ColumnType::Text));
        assert!(type_change_breaking(ColumnType::Text, ColumnType::Integer));
        assert!(!type_change_breaking(ColumnType::Uuid, ColumnType::String));
        assert!(type_change_breaking(ColumnType::String, ColumnType::Uuid));
        assert!(!type_change_breaking(ColumnType::Json, ColumnType::Text));
        assert!(type_change_breaking(ColumnType::Json, ColumnType::Binary));
    }

    #[test]
    fn not_null_without_default_breaks() {
        let mut current = users(true);
        let mut target = users(true);
        current
            .tables
            .get_mut("users")
            .unwrap()
            .columns[1]
            .nullable = true;
        target.tables.get_mut("users").unwrap().columns[1].nullable = false;
        let diff = engine().diff(Some(&current), &target).unwrap();
        assert!(diff.changes[0].is_breaking);
        assert!(diff.changes[0].description.contains("NOT NULL without default"));
    }

    #[test]
    fn unique_addition_breaks_but_removal_does_not() {
        let mut unique = users(true);
        unique.tables.get_mut("users").unwrap().columns[1].unique = true;
        let plain = users(true);

        let add = engine().diff(Some(&plain), &unique).unwrap();
        assert!(add.changes[0].is_breaking);

        let remove = engine().diff(Some(&unique), &plain).unwrap();
        assert!(!remove.changes[0].is_breaking);
    }

    #[test]
    fn index_changes_are_never_breaking() {
        let plain = users(true);
        let mut indexed = users(true);
        indexed
            .tables
            .get_mut("users")
            .unwrap()
            .indexes
            .push(IndexDefinition {
                name: None,
                columns: vec!["email".into()],
                unique: false,
                predicate: None,
            });
        let diff = engine().diff(Some(&plain), &indexed).unwrap();
        assert_eq!(diff.changes[0].change_type, ChangeType::IndexAdd);
        assert!(!diff.changes[0].is_breaking);
    }

    #[test]
    fn drops_precede_creates() {
        let mut current = users(true);
        current.tables.insert(
            "legacy".to_string(),
            TableDefinition {
                columns: vec![ColumnDefinition::new("id", ColumnType::Integer).primary()],
                indexes: vec![],
                primary_key: None,
            },
        );
        let mut target = users(true);
        target.tables.insert(
            "incoming".to_string(),
            TableDefinition {
                columns: vec![ColumnDefinition::new("id", ColumnType::Integer).primary()],
                indexes: vec![],
                primary_key: None,
            },
        );
        let diff = engine().diff(Some(&current), &target).unwrap();
        assert_eq!(diff.changes[0].change_type, ChangeType::TableDrop);
        assert_eq!(diff.changes[1].change_type, ChangeType::TableAdd);
    }
}
