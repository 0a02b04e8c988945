//! Cross-branch diff and merge.
//!
//! Introspects two branch namespaces, classifies the structural changes
//! into table/column/index/constraint buckets, derives merge conflicts,
//! and merges by executing the forward SQL (with source-namespace
//! qualifiers rewritten to the target) in one transaction, recording a
//! merge migration in the history table.

use super::{rewrite_namespace, BranchEngine};
use crate::db::value::Value;
use crate::error::{Error, Result};
use crate::migrate::MIGRATIONS_TABLE;
use crate::schema::diff::{ChangeType, DiffEngine, DiffOptions, SchemaChange};
use crate::schema::introspect::{normalize, Introspector};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Conflict classes a merge can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    ColumnTypeMismatch,
    ConstraintConflict,
    TableRemoved,
    MigrationOrder,
}

/// One merge conflict requiring caller resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConflict {
    pub kind: ConflictKind,
    pub table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub description: String,
}

impl MergeConflict {
    /// Key used by the caller's resolution map.
    pub fn key(&self) -> String {
        match &self.column {
            Some(column) => format!("{}.{}", self.table, column),
            None => self.table.clone(),
        }
    }
}

/// How the caller resolves one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Take the source branch's shape.
    UseSource,
    /// Keep the target branch's shape.
    KeepTarget,
}

/// Structural diff between two branches.
#[derive(Debug, Clone)]
pub struct BranchDiff {
    pub table_changes: Vec<SchemaChange>,
    pub column_changes: Vec<SchemaChange>,
    pub index_changes: Vec<SchemaChange>,
    pub constraint_changes: Vec<SchemaChange>,
    pub conflicts: Vec<MergeConflict>,
    pub can_auto_merge: bool,
    pub forward: Vec<String>,
    pub reverse: Vec<String>,
}

impl BranchDiff {
    pub fn is_empty(&self) -> bool {
        self.table_changes.is_empty()
            && self.column_changes.is_empty()
            && self.index_changes.is_empty()
            && self.constraint_changes.is_empty()
    }
}

/// Options for [`BranchEngine::merge`].
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub dry_run: bool,
    /// Conflict key → resolution. Unresolved conflicts fail the merge.
    pub conflict_resolution: HashMap<String, ConflictResolution>,
    /// Drop the source branch after a successful merge.
    pub delete_source: bool,
}

/// Merge outcome.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub success: bool,
    pub migrations_applied: usize,
    pub conflicts: Vec<MergeConflict>,
}

impl BranchEngine {
    /// Diffs `source` against `target` (target is the merge destination).
    pub async fn diff(&self, source_slug: &str, target_slug: &str) -> Result<BranchDiff> {
        let source = self
            .get(source_slug)
            .await?
            .ok_or_else(|| Error::BranchNotFound(source_slug.to_string()))?;
        let target = self
            .get(target_slug)
            .await?
            .ok_or_else(|| Error::BranchNotFound(target_slug.to_string()))?;

        let introspector = Introspector::new(Arc::clone(self.driver()));
        let source_schema = introspector.introspect(&source.schema_name).await?;
        let target_schema = introspector.introspect(&target.schema_name).await?;
        let (source_definition, _) = normalize(&source_schema);
        let (target_definition, _) = normalize(&target_schema);

        let engine = DiffEngine::new(self.driver().dialect(), DiffOptions::default());
        // Target converges onto the source branch's shape.
        let diff = engine.diff(Some(&target_definition), &source_definition)?;

        let mut branch_diff = BranchDiff {
            table_changes: Vec::new(),
            column_changes: Vec::new(),
            index_changes: Vec::new(),
            constraint_changes: Vec::new(),
            conflicts: Vec::new(),
            can_auto_merge: true,
            forward: diff
                .migration
                .as_ref()
                .map(|m| m.forward.clone())
                .unwrap_or_default(),
            reverse: diff
                .migration
                .as_ref()
                .map(|m| m.reverse.clone())
                .unwrap_or_default(),
        };

        for change in diff.changes {
            if let Some(conflict) = classify_conflict(&change) {
                branch_diff.conflicts.push(conflict);
            }
            match change.change_type {
                ChangeType::TableAdd | ChangeType::TableDrop => {
                    branch_diff.table_changes.push(change)
                }
                ChangeType::ColumnAdd | ChangeType::ColumnDrop | ChangeType::ColumnModify => {
                    branch_diff.column_changes.push(change)
                }
                ChangeType::IndexAdd | ChangeType::IndexDrop => {
                    branch_diff.index_changes.push(change)
                }
                ChangeType::ConstraintAdd
                | ChangeType::ConstraintDrop
                | ChangeType::ForeignKeyAdd
                | ChangeType::ForeignKeyDrop => branch_diff.constraint_changes.push(change),
            }
        }

        branch_diff.can_auto_merge = branch_diff.conflicts.is_empty();
        Ok(branch_diff)
    }

    /// Merges `source` into `target`.
    pub async fn merge(
        &self,
        source_slug: &str,
        target_slug: &str,
        options: &MergeOptions,
    ) -> Result<MergeResult> {
        let diff = self.diff(source_slug, target_slug).await?;

        let unresolved: Vec<MergeConflict> = diff
            .conflicts
            .iter()
            .filter(|conflict| !options.conflict_resolution.contains_key(&conflict.key()))
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            return Err(Error::Conflict {
                conflicts: unresolved,
            });
        }

        let changes_count = diff.table_changes.len()
            + diff.column_changes.len()
            + diff.index_changes.len()
            + diff.constraint_changes.len();

        if options.dry_run || diff.is_empty() {
            return Ok(MergeResult {
                success: true,
                migrations_applied: changes_count,
                conflicts: diff.conflicts,
            });
        }

        let source = self
            .get(source_slug)
            .await?
            .ok_or_else(|| Error::BranchNotFound(source_slug.to_string()))?;
        let target = self
            .get(target_slug)
            .await?
            .ok_or_else(|| Error::BranchNotFound(target_slug.to_string()))?;

        let mut tx = self.driver().begin().await?;
        for statement in &diff.forward {
            let rewritten = rewrite_namespace(statement, &source.schema_name, &target.schema_name);
            tx.execute(&rewritten, &[]).await?;
        }

        // Record the merge in the history table.
        let version: i64 = Utc::now()
            .format("%Y%m%d%H%M%S")
            .to_string()
            .parse()
            .unwrap_or(0);
        tx.execute(
            &format!(
                "INSERT INTO {MIGRATIONS_TABLE} \
                 (version, name, scope, template_key, checksum, up_sql, down_sql) \
                 VALUES ($1, $2, 'core', '', $3, $4, $5)"
            ),
            &[
                Value::Int(version),
                Value::Text(format!("merge_{source_slug}_into_{target_slug}")),
                Value::Text(crate::libs::checksum::migration_checksum(&diff.forward)),
                Value::Json(serde_json::json!(diff.forward)),
                Value::Json(serde_json::json!(diff.reverse)),
            ],
        )
        .await?;
        tx.commit().await?;

        if options.delete_source {
            self.delete(source_slug, false).await?;
        }

        info!(source = source_slug, target = target_slug, changes = changes_count, "branches merged");
        Ok(MergeResult {
            success: true,
            migrations_applied: changes_count,
            conflicts: diff.conflicts,
        })
    }
}

/// Derives the conflict class of a change, if any.
fn classify_conflict(change: &SchemaChange) -> Option<MergeConflict> {
    match change.change_type {
        ChangeType::ColumnModify if change.is_breaking => Some(MergeConflict {
            kind: ConflictKind::ColumnTypeMismatch,
            table: change.table.clone(),
            column: change.column.clone(),
            description: change.description.clone(),
        }),
        ChangeType::TableDrop => Some(MergeConflict {
            kind: ConflictKind::TableRemoved,
            table: change.table.clone(),
            column: None,
            description: change.description.clone(),
        }),
        ChangeType::ForeignKeyAdd | ChangeType::ConstraintAdd if change.is_breaking => {
            Some(MergeConflict {
                kind: ConflictKind::ConstraintConflict,
                table: change.table.clone(),
                column: change.column.clone(),
                description: change.description.clone(),
            })
        }
        _ => None,
    }
}
