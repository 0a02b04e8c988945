#[cfg(test)]
mod tests {
    use chrono::Utc;
    use launchpad_db::api::{
        PushMigrationOptions, PushOutcome, RemoteSchema, RemoteSyncStatus, SchemaRemote,
    };
    use launchpad_db::db::Driver;
    use launchpad_db::error::{Error, Result};
    use launchpad_db::libs::config::EngineConfig;
    use launchpad_db::schema::diff::DiffMigration;
    use launchpad_db::schema::{
        ColumnDefinition, ColumnType, SchemaDefinition, TableDefinition,
    };
    use launchpad_db::sync::state::{SyncDirection, SyncState, SyncStateStore, SyncStatus};
    use launchpad_db::sync::{DiffFormat, SyncOptions, SyncService};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// In-process remote with a fixed schema answer.
    struct FakeRemote {
        schema: SchemaDefinition,
        fetches: AtomicUsize,
        pushes: AtomicUsize,
    }

    impl FakeRemote {
        fn new(schema: SchemaDefinition) -> Self {
            Self {
                schema,
                fetches: AtomicUsize::new(0),
                pushes: AtomicUsize::new(0),
            }
        }
    }

    impl SchemaRemote for &FakeRemote {
        async fn fetch_schema(&self, env: &str) -> Result<RemoteSchema> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(RemoteSchema {
                schema: self.schema.clone(),
                version: 3,
                checksum: self.schema.checksum()?,
                updated_at: Utc::now(),
                env: env.to_string(),
            })
        }

        async fn push_migration(
            &self,
            _migration: &DiffMigration,
            _options: &PushMigrationOptions,
        ) -> Result<PushOutcome> {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            Ok(PushOutcome {
                success: true,
                applied: true,
                migration: None,
                errors: vec![],
                warnings: vec![],
            })
        }

        async fn get_sync_status(&self, env: &str) -> Result<RemoteSyncStatus> {
            Ok(RemoteSyncStatus {
                version: 3,
                checksum: self.schema.checksum()?,
                updated_at: Utc::now(),
                env: env.to_string(),
            })
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }
    }

    async fn sqlite_driver(temp_dir: &TempDir) -> Arc<Driver> {
        let db_path = temp_dir.path().join("sync.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        Arc::new(Driver::connect(&EngineConfig::new(url)).await.unwrap())
    }

    fn users_schema(with_age: bool) -> SchemaDefinition {
        let mut columns = vec![
            ColumnDefinition::new("id", ColumnType::Integer).primary(),
            ColumnDefinition::new("email", ColumnType::Text).not_null(),
        ];
        if with_age {
            columns.push(ColumnDefinition::new("age", ColumnType::Integer));
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

    #[tokio::test]
    async fn pull_applies_remote_additions() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        driver
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)",
                &[],
            )
            .await
            .unwrap();

        let remote = FakeRemote::new(users_schema(true));
        let service = SyncService::new(Arc::clone(&driver), &remote, "app_1", "main");

        let result = service
            .pull("development", &SyncOptions::default())
            .await
            .unwrap();
        assert!(result.applied);
        assert!(result.diff.has_differences);

        // The new column is live.
        driver
            .execute("INSERT INTO users (id, email, age) VALUES (1, 'a@b.c', 30)", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pull_blocks_breaking_changes_without_force() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        // Local has an extra column the remote lacks: pulling would drop it.
        driver
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, age INTEGER)",
                &[],
            )
            .await
            .unwrap();

        let remote = FakeRemote::new(users_schema(false));
        let service = SyncService::new(Arc::clone(&driver), &remote, "app_1", "main");

        let error = service
            .pull("development", &SyncOptions::default())
            .await
            .unwrap_err();
        match error {
            Error::BreakingChange { changes } => {
                assert_eq!(changes.len(), 1);
                assert!(changes[0].description.contains("age"));
            }
            other => panic!("expected BreakingChange, got {other}"),
        }
    }

    #[tokio::test]
    async fn pull_dry_run_changes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        driver
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)",
                &[],
            )
            .await
            .unwrap();

        let remote = FakeRemote::new(users_schema(true));
        let service = SyncService::new(Arc::clone(&driver), &remote, "app_1", "main");
        let result = service
            .pull(
                "development",
                &SyncOptions {
                    dry_run: true,
                    ..SyncOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(!result.applied);
        // Column was not added.
        assert!(driver
            .execute("INSERT INTO users (id, email, age) VALUES (1, 'x', 1)", &[])
            .await
            .is_err());
    }

    #[tokio::test]
    async fn push_sends_local_schema() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        driver
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL, age INTEGER)",
                &[],
            )
            .await
            .unwrap();

        let remote = FakeRemote::new(users_schema(false));
        let service = SyncService::new(Arc::clone(&driver), &remote, "app_1", "main");
        let result = service
            .push(
                "development",
                &SyncOptions {
                    force: false,
                    ..SyncOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(result.pushed);
        assert_eq!(remote.pushes.load(Ordering::SeqCst), 1);

        // Sync state recorded with direction push.
        let states = service.status().await.unwrap();
        assert!(!states.is_empty());
        for (state, status) in states {
            assert_eq!(state.last_sync_direction, Some(SyncDirection::Push));
            assert_eq!(status, SyncStatus::Synced);
        }
    }

    #[tokio::test]
    async fn diff_formats() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        driver
            .execute(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL)",
                &[],
            )
            .await
            .unwrap();

        let remote = FakeRemote::new(users_schema(true));
        let service = SyncService::new(Arc::clone(&driver), &remote, "app_1", "main");

        let text = service.diff("development", DiffFormat::Text).await.unwrap();
        assert!(text.contains("add column users.age"));

        let sql = service.diff("development", DiffFormat::Sql).await.unwrap();
        assert!(sql.contains("ALTER TABLE \"users\" ADD COLUMN \"age\""));

        let json = service.diff("development", DiffFormat::Json).await.unwrap();
        assert!(json.contains("\"hasDifferences\":true"));
    }

    #[tokio::test]
    async fn conflict_detection_reads_the_state_table() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        let store = SyncStateStore::new(Arc::clone(&driver));

        // Both sides moved away from the base: conflict.
        store
            .record_sync(&SyncState {
                app_id: "app_1".into(),
                table_name: "users".into(),
                local_checksum: Some("local".into()),
                local_version: Some(4),
                remote_checksum: Some("remote".into()),
                remote_version: Some(5),
                base_checksum: Some("base".into()),
                last_sync_direction: Some(SyncDirection::Pull),
                last_sync_at: None,
                last_sync_by: None,
                conflict_details: None,
            })
            .await
            .unwrap();
        // Clean row.
        store
            .record_sync(&SyncState {
                app_id: "app_1".into(),
                table_name: "orders".into(),
                local_checksum: Some("same".into()),
                local_version: Some(4),
                remote_checksum: Some("same".into()),
                remote_version: Some(4),
                base_checksum: Some("same".into()),
                last_sync_direction: Some(SyncDirection::Push),
                last_sync_at: None,
                last_sync_by: None,
                conflict_details: None,
            })
            .await
            .unwrap();

        let conflicts = store.detect_conflicts("app_1").await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].table_name, "users");
        assert_eq!(conflicts[0].status(), SyncStatus::Conflict);
    }
}
