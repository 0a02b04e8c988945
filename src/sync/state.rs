//! Sync-state persistence.
//!
//! One `lp_sync_metadata` row per `(app_id, table_name)` holds the local
//! and remote checksum/version pairs, the last sync direction and
//! timestamp, and the common base checksum used for conflict detection.
//! The `sync_status` is derived, never stored authoritative: both sides
//! diverging from the base is a conflict, remote-only divergence means
//! behind, local-only means pending.

use crate::db::driver::Driver;
use crate::db::value::{Row, Value};
use crate::error::Result;
use crate::libs::conn_str::DatabaseKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Sync metadata table name.
pub const SYNC_METADATA_TABLE: &str = "lp_sync_metadata";

/// Direction of the last successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    Push,
    Pull,
}

impl SyncDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncDirection::Push => "push",
            SyncDirection::Pull => "pull",
        }
    }
}

/// Derived per-table sync status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Pending,
    Behind,
    Conflict,
    Unknown,
}

/// One sync-state row.
#[derive(Debug, Clone)]
pub struct SyncState {
    pub app_id: String,
    pub table_name: String,
    pub local_checksum: Option<String>,
    pub local_version: Option<i64>,
    pub remote_checksum: Option<String>,
    pub remote_version: Option<i64>,
    pub base_checksum: Option<String>,
    pub last_sync_direction: Option<SyncDirection>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_by: Option<String>,
    pub conflict_details: Option<serde_json::Value>,
}

impl SyncState {
    /// Derives the status from the checksum triple.
    pub fn status(&self) -> SyncStatus {
        derive_status(
            self.local_checksum.as_deref(),
            self.remote_checksum.as_deref(),
            self.base_checksum.as_deref(),
        )
    }
}

/// Status derivation truth table over `(local, remote, base)` checksums.
pub fn derive_status(
    local: Option<&str>,
    remote: Option<&str>,
    base: Option<&str>,
) -> SyncStatus {
    match (local, remote) {
        (None, _) | (_, None) => SyncStatus::Unknown,
        (Some(local), Some(remote)) if local == remote => SyncStatus::Synced,
        (Some(local), Some(remote)) => match base {
            Some(base) if local != base && remote != base => SyncStatus::Conflict,
            Some(base) if remote != base => SyncStatus::Behind,
            Some(_) => SyncStatus::Pending,
            // No recorded base: assume local edits are newer.
            None => SyncStatus::Pending,
        },
    }
}

/// Store over `lp_sync_metadata`.
pub struct SyncStateStore {
    driver: Arc<Driver>,
}

impl SyncStateStore {
    pub fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }

    pub async fn ensure_table(&self) -> Result<()> {
        let dialect = self.driver.dialect();
        let json_type = dialect.json_type();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {SYNC_METADATA_TABLE} (\
             app_id VARCHAR(191) NOT NULL, \
             table_name VARCHAR(191) NOT NULL, \
             local_checksum CHAR(64), \
             local_version BIGINT, \
             remote_checksum CHAR(64), \
             remote_version BIGINT, \
             base_checksum CHAR(64), \
             last_sync_direction VARCHAR(8), \
             last_sync_at TIMESTAMP NULL, \
             last_sync_by TEXT, \
             conflict_details {json_type}, \
             PRIMARY KEY (app_id, table_name))"
        );
        self.driver.execute(&ddl, &[]).await?;
        Ok(())
    }

    /// Upserts the state row after a successful sync.
    pub async fn record_sync(&self, state: &SyncState) -> Result<()> {
        self.ensure_table().await?;
        let dialect = self.driver.dialect();
        let timestamp = dialect.current_timestamp_expr();
        let placeholders: Vec<String> = (1..=10).map(|i| dialect.placeholder(i)).collect();

        let sql = match self.driver.kind() {
            DatabaseKind::MySql => format!(
                "INSERT INTO {SYNC_METADATA_TABLE} \
                 (app_id, table_name, local_checksum, local_version, remote_checksum, \
                  remote_version, base_checksum, last_sync_direction, last_sync_by, \
                  conflict_details, last_sync_at) \
                 VALUES ({}, {timestamp}) \
                 ON DUPLICATE KEY UPDATE \
                 local_checksum = VALUES(local_checksum), local_version = VALUES(local_version), \
                 remote_checksum = VALUES(remote_checksum), remote_version = VALUES(remote_version), \
                 base_checksum = VALUES(base_checksum), \
                 last_sync_direction = VALUES(last_sync_direction), \
                 last_sync_by = VALUES(last_sync_by), \
                 conflict_details = VALUES(conflict_details), last_sync_at = {timestamp}",
                placeholders.join(", ")
            ),
            _ => format!(
                "INSERT INTO {SYNC_METADATA_TABLE} \
                 (app_id, table_name, local_checksum, local_version, remote_checksum, \
                  remote_version, base_checksum, last_sync_direction, last_sync_by, \
                  conflict_details, last_sync_at) \
                 VALUES ({}, {timestamp}) \
                 ON CONFLICT (app_id, table_name) DO UPDATE SET \
                 local_checksum = EXCLUDED.local_checksum, local_version = EXCLUDED.local_version, \
                 remote_checksum = EXCLUDED.remote_checksum, remote_version = EXCLUDED.remote_version, \
                 base_checksum = EXCLUDED.base_checksum, \
                 last_sync_direction = EXCLUDED.last_sync_direction, \
                 last_sync_by = EXCLUDED.last_sync_by, \
                 conflict_details = EXCLUDED.conflict_details, last_sync_at = {timestamp}",
                placeholders.join(", ")
            ),
        };

        let optional_text = |value: &Option<String>| {
            value.clone().map(Value::Text).unwrap_or(Value::Null)
        };
        self.driver
            .execute(
                &sql,
                &[
                    Value::Text(state.app_id.clone()),
                    Value::Text(state.table_name.clone()),
                    optional_text(&state.local_checksum),
                    state.local_version.map(Value::Int).unwrap_or(Value::Null),
                    optional_text(&state.remote_checksum),
                    state.remote_version.map(Value::Int).unwrap_or(Value::Null),
                    optional_text(&state.base_checksum),
                    state
                        .last_sync_direction
                        .map(|d| Value::Text(d.as_str().to_string()))
                        .unwrap_or(Value::Null),
                    optional_text(&state.last_sync_by),
                    state
                        .conflict_details
                        .clone()
                        .map(Value::Json)
                        .unwrap_or(Value::Null),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn list(&self, app_id: &str) -> Result<Vec<SyncState>> {
        self.ensure_table().await?;
        let dialect = self.driver.dialect();
        let sql = format!(
            "SELECT app_id, table_name, local_checksum, local_version, remote_checksum, \
                    remote_version, base_checksum, last_sync_direction, last_sync_at, \
                    last_sync_by, conflict_details \
             FROM {SYNC_METADATA_TABLE} WHERE app_id = {} ORDER BY table_name",
            dialect.placeholder(1)
        );
        let result = self
            .driver
            .query(&sql, &[Value::Text(app_id.to_string())])
            .await?;
        Ok(result.rows.iter().map(parse_state_row).collect())
    }

    /// Rows whose local and remote checksums both diverged from the base.
    pub async fn detect_conflicts(&self, app_id: &str) -> Result<Vec<SyncState>> {
        Ok(self
            .list(app_id)
            .await?
            .into_iter()
            .filter(|state| state.status() == SyncStatus::Conflict)
            .collect())
    }
}

fn parse_state_row(row: &Row) -> SyncState {
    let direction = match row.get_str("last_sync_direction") {
        Some("push") => Some(SyncDirection::Push),
        Some("pull") => Some(SyncDirection::Pull),
        _ => None,
    };
    let conflict_details = match row.get("conflict_details") {
        Some(Value::Json(json)) => Some(json.clone()),
        Some(Value::Text(text)) => serde_json::from_str(text).ok(),
        _ => None,
    };
    SyncState {
        app_id: row.get_str("app_id").unwrap_or_default().to_string(),
        table_name: row.get_str("table_name").unwrap_or_default().to_string(),
        local_checksum: row.get_str("local_checksum").map(|c| c.to_string()),
        local_version: row.get_i64("local_version"),
        remote_checksum: row.get_str("remote_checksum").map(|c| c.to_string()),
        remote_version: row.get_i64("remote_version"),
        base_checksum: row.get_str("base_checksum").map(|c| c.to_string()),
        last_sync_direction: direction,
        last_sync_at: match row.get("last_sync_at") {
            Some(Value::Timestamp(ts)) => Some(*ts),
            _ => None,
        },
        last_sync_by: row.get_str("last_sync_by").map(|b| b.to_string()),
        conflict_details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_truth_table() {
        // Equal checksums are synced regardless of base.
        assert_eq!(derive_status(Some("a"), Some("a"), None), SyncStatus::Synced);
        assert_eq!(derive_status(Some("a"), Some("a"), Some("x")), SyncStatus::Synced);

        // Both diverged from base: conflict.
        assert_eq!(
            derive_status(Some("l"), Some("r"), Some("b")),
            SyncStatus::Conflict
        );

        // Only remote moved: behind.
        assert_eq!(
            derive_status(Some("b"), Some("r"), Some("b")),
            SyncStatus::Behind
        );

        // Only local moved: pending.
        assert_eq!(
            derive_status(Some("l"), Some("b"), Some("b")),
            SyncStatus::Pending
        );

        // Missing sides: unknown.
        assert_eq!(derive_status(None, Some("r"), None), SyncStatus::Unknown);
        assert_eq!(derive_status(Some("l"), None, Some("b")), SyncStatus::Unknown);
    }
}
