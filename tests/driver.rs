#[cfg(test)]
mod tests {
    use launchpad_db::db::{DrainOptions, DrainPhase, Driver, Value};
    use launchpad_db::error::Error;
    use launchpad_db::libs::config::EngineConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;

    async fn sqlite_driver(temp_dir: &TempDir) -> Arc<Driver> {
        let db_path = temp_dir.path().join("driver.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        Arc::new(Driver::connect(&EngineConfig::new(url)).await.unwrap())
    }

    #[tokio::test]
    async fn query_decodes_rows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        driver
            .execute("CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT)", &[])
            .await
            .unwrap();
        driver
            .execute(
                "INSERT INTO t (id, label) VALUES (?, ?)",
                &[Value::Int(1), Value::Text("one".into())],
            )
            .await
            .unwrap();

        let result = driver.query("SELECT id, label FROM t", &[]).await.unwrap();
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0].get_i64("id"), Some(1));
        assert_eq!(result.rows[0].get_str("label"), Some("one"));
    }

    #[tokio::test]
    async fn execute_reports_affected_rows() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        driver
            .execute("CREATE TABLE t (id INTEGER)", &[])
            .await
            .unwrap();
        driver
            .execute("INSERT INTO t (id) VALUES (1), (2), (3)", &[])
            .await
            .unwrap();
        let result = driver
            .execute("DELETE FROM t WHERE id > ?", &[Value::Int(1)])
            .await
            .unwrap();
        assert_eq!(result.row_count, 2);
    }

    #[tokio::test]
    async fn transactions_commit_and_roll_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        driver
            .execute("CREATE TABLE t (id INTEGER)", &[])
            .await
            .unwrap();

        let mut tx = driver.begin().await.unwrap();
        tx.execute("INSERT INTO t (id) VALUES (1)", &[]).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = driver.begin().await.unwrap();
        tx.execute("INSERT INTO t (id) VALUES (2)", &[]).await.unwrap();
        tx.rollback().await.unwrap();

        let result = driver.query("SELECT id FROM t", &[]).await.unwrap();
        assert_eq!(result.row_count, 1);
    }

    #[tokio::test]
    async fn dropping_a_transaction_rolls_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        driver
            .execute("CREATE TABLE t (id INTEGER)", &[])
            .await
            .unwrap();
        {
            let mut tx = driver.begin().await.unwrap();
            tx.execute("INSERT INTO t (id) VALUES (1)", &[]).await.unwrap();
            // No commit.
        }
        let result = driver.query("SELECT id FROM t", &[]).await.unwrap();
        assert_eq!(result.row_count, 0);
    }

    #[tokio::test]
    async fn health_check_probes_and_fires_edges_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;

        let edges = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&edges);
        driver.on_health_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let status = driver.health_check().await;
        assert!(status.healthy);
        assert!(status.error.is_none());
        assert!(driver.is_healthy());

        // A second healthy probe is not an edge.
        driver.health_check().await;
        assert_eq!(edges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drain_with_no_active_queries_completes_immediately() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;

        let phases = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&phases);
        let result = driver
            .drain_and_close(DrainOptions {
                timeout: Duration::from_secs(5),
                force_cancel_on_timeout: true,
                on_progress: Some(Box::new(move |phase| {
                    sink.lock().unwrap().push(phase);
                })),
            })
            .await
            .unwrap();

        assert_eq!(result.cancelled, 0);
        assert!(!result.forced);
        assert!(result.elapsed < Duration::from_secs(1));
        let observed = phases.lock().unwrap().clone();
        assert_eq!(
            observed,
            vec![DrainPhase::Draining, DrainPhase::Closing, DrainPhase::Complete]
        );
    }

    #[tokio::test]
    async fn draining_driver_rejects_new_work() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        driver
            .drain_and_close(DrainOptions::default())
            .await
            .unwrap();

        assert!(driver.is_draining());
        assert!(matches!(
            driver.query("SELECT 1", &[]).await,
            Err(Error::Draining)
        ));
    }

    #[tokio::test]
    async fn pool_stats_reflect_configuration() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        let stats = driver.get_pool_stats();
        assert_eq!(stats.max, 10);
        assert_eq!(driver.get_active_query_count(), 0);
    }

    #[tokio::test]
    async fn per_call_timeout_surfaces_as_transient() {
        let temp_dir = tempfile::tempdir().unwrap();
        let driver = sqlite_driver(&temp_dir).await;
        // A zero timeout always elapses first.
        let result = driver
            .query_with_timeout("SELECT 1", &[], Duration::from_nanos(1))
            .await;
        match result {
            Err(error) => assert!(error.is_retryable()),
            Ok(_) => {} // won the race; acceptable on a fast machine
        }
    }

    #[tokio::test]
    async fn mongodb_urls_are_rejected_by_the_sql_driver() {
        let config = EngineConfig::new("mongodb://localhost/app");
        assert!(matches!(
            Driver::connect(&config).await,
            Err(Error::UnsupportedOperation(_))
        ));
    }
}
