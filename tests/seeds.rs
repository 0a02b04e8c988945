#[cfg(test)]
mod tests {
    use launchpad_db::db::{Driver, Value};
    use launchpad_db::libs::config::{EngineConfig, TenantConfig};
    use launchpad_db::seed::{OnChange, SeedDefinition, SeedOptions, SeedRunner};
    use launchpad_db::tenant::TenantContext;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn sqlite_driver(temp_dir: &TempDir) -> Arc<Driver> {
        let db_path = temp_dir.path().join("seeds.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        Arc::new(Driver::connect(&EngineConfig::new(url)).await.unwrap())
    }

    fn roles_seed() -> SeedDefinition {
        SeedDefinition {
            name: "roles".into(),
            table: "roles".into(),
            rows: vec![
                vec![
                    ("id".to_string(), Value::Int(1)),
                    ("name".to_string(), Value::Text("admin".into())),
                ],
                vec![
                    ("id".to_string(), Value::Int(2)),
                    ("name".to_string(), Value::Text("member".into())),
                ],
            ],
            depends_on: vec![],
        }
    }

    fn members_seed() -> SeedDefinition {
        SeedDefinition {
            name: "members".into(),
            table: "members".into(),
            rows: vec![vec![
                ("id".to_string(), Value::Int(1)),
                ("role_id".to_string(), Value::Int(1)),
            ]],
            depends_on: vec!["roles".into()],
        }
    }

    async fn create_tables(driver: &Driver) {
        driver
            .execute(
                "CREATE TABLE roles (id INTEGER PRIMARY KEY, name TEXT, \
                 app_id TEXT, organization_id TEXT)",
                &[],
            )
            .await
            .unwrap();
        driver
            .execute(
                "CREATE TABLE members (id INTEGER PRIMARY KEY, role_id INTEGER, \
                 app_id TEXT, organization_id TEXT)",
                &[],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn seeds_apply_in_dependency_order_with_tenant_columns() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        create_tables(&driver).await;

        let runner = SeedRunner::new(
            Arc::clone(&driver),
            TenantConfig::default(),
            TenantContext::new("app_1", "org_1"),
        )
        .unwrap();

        // Declared out of order; the runner sorts by dependencies.
        let results = runner
            .run(&[members_seed(), roles_seed()], &SeedOptions::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "roles");
        assert!(results[0].applied);
        assert_eq!(results[0].rows_inserted, 2);
        assert_eq!(results[1].name, "members");

        // Tenant columns were injected on every row.
        let rows = driver
            .query("SELECT app_id, organization_id FROM roles", &[])
            .await
            .unwrap();
        assert_eq!(rows.row_count, 2);
        for row in &rows.rows {
            assert_eq!(row.get_str("app_id"), Some("app_1"));
            assert_eq!(row.get_str("organization_id"), Some("org_1"));
        }
    }

    #[tokio::test]
    async fn applied_seeds_are_skipped_on_rerun() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        create_tables(&driver).await;

        let runner = SeedRunner::new(
            Arc::clone(&driver),
            TenantConfig::default(),
            TenantContext::new("app_1", "org_1"),
        )
        .unwrap();

        runner
            .run(&[roles_seed()], &SeedOptions::default())
            .await
            .unwrap();
        let rerun = runner
            .run(&[roles_seed()], &SeedOptions::default())
            .await
            .unwrap();
        assert!(!rerun[0].applied);
        assert_eq!(rerun[0].skipped_reason.as_deref(), Some("already applied"));

        // No duplicate rows.
        let rows = driver.query("SELECT id FROM roles", &[]).await.unwrap();
        assert_eq!(rows.row_count, 2);
    }

    #[tokio::test]
    async fn changed_seed_fails_by_default_and_reapplies_by_policy() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        create_tables(&driver).await;

        let runner = SeedRunner::new(
            Arc::clone(&driver),
            TenantConfig::default(),
            TenantContext::new("app_1", "org_1"),
        )
        .unwrap();
        runner
            .run(&[roles_seed()], &SeedOptions::default())
            .await
            .unwrap();

        let mut changed = roles_seed();
        changed.rows[0][1].1 = Value::Text("superadmin".into());

        // Default policy refuses.
        assert!(runner
            .run(std::slice::from_ref(&changed), &SeedOptions::default())
            .await
            .is_err());

        // Reapply policy forgets the old application and re-inserts.
        driver.execute("DELETE FROM roles", &[]).await.unwrap();
        let results = runner
            .run(
                std::slice::from_ref(&changed),
                &SeedOptions {
                    on_change: OnChange::Reapply,
                    ..SeedOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(results[0].applied);
    }

    #[tokio::test]
    async fn dry_run_inserts_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        create_tables(&driver).await;

        let runner = SeedRunner::new(
            Arc::clone(&driver),
            TenantConfig::default(),
            TenantContext::new("app_1", "org_1"),
        )
        .unwrap();
        let results = runner
            .run(
                &[roles_seed()],
                &SeedOptions {
                    dry_run: true,
                    ..SeedOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(results[0].applied);
        assert_eq!(results[0].rows_inserted, 0);

        let rows = driver.query("SELECT id FROM roles", &[]).await.unwrap();
        assert_eq!(rows.row_count, 0);
    }
}
