#[cfg(test)]
mod tests {
    use launchpad_db::db::Value;
    use launchpad_db::error::Error;
    use launchpad_db::libs::config::TenantConfig;
    use launchpad_db::libs::conn_str::DatabaseKind;
    use launchpad_db::query::builder::QueryEngine;
    use launchpad_db::query::{ConflictAction, JoinType, Operator};
    use launchpad_db::tenant::TenantContext;

    fn engine() -> QueryEngine {
        QueryEngine::new(DatabaseKind::Postgres, TenantConfig::default()).unwrap()
    }

    fn ctx() -> TenantContext {
        TenantContext::new("app_1", "org_1")
    }

    #[test]
    fn select_chain_compiles_without_executing() {
        let compiled = engine()
            .table("users", ctx())
            .select(&["id", "email"])
            .where_eq("status", "active")
            .order_by("created_at", "desc")
            .limit(25)
            .offset(50)
            .to_sql()
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"id\", \"email\" FROM \"users\" \
             WHERE \"status\" = $1 AND \"app_id\" = $2 AND \"organization_id\" = $3 \
             ORDER BY \"created_at\" DESC LIMIT $4 OFFSET $5"
        );
        assert_eq!(compiled.params.len(), 5);
    }

    #[test]
    fn table_without_tenant_skips_scoping() {
        let compiled = engine()
            .table_without_tenant("lp_migrations")
            .select(&["version"])
            .where_eq("scope", "core")
            .to_sql()
            .unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"version\" FROM \"lp_migrations\" WHERE \"scope\" = $1"
        );
        assert_eq!(compiled.params, vec![Value::Text("core".into())]);
    }

    #[test]
    fn invalid_context_surfaces_at_compile_time() {
        let blank = TenantContext::new("", "org_1");
        let builder = engine().table("users", blank).select(&["id"]);
        assert!(matches!(
            builder.to_sql(),
            Err(Error::TenantContextInvalid(_))
        ));
    }

    #[test]
    fn insert_builder_with_upsert_and_returning() {
        let compiled = engine()
            .table("users", ctx())
            .insert(vec![
                ("id".to_string(), Value::Text("u1".into())),
                ("email".to_string(), Value::Text("a@b.c".into())),
            ])
            .on_conflict(&["id"], ConflictAction::Update, &["email"])
            .returning(&["id"])
            .to_sql()
            .unwrap();
        assert!(compiled.sql.starts_with("INSERT INTO \"users\""));
        assert!(compiled.sql.contains("ON CONFLICT (\"id\") DO UPDATE SET \"email\" = EXCLUDED.\"email\""));
        assert!(compiled.sql.ends_with("RETURNING \"id\""));
        // Tenant fields injected into the row.
        assert_eq!(compiled.params.len(), 4);
    }

    #[test]
    fn update_builder_sets_in_call_order() {
        let compiled = engine()
            .table("tasks", ctx())
            .update()
            .set("status", "done")
            .set("completed", true)
            .where_eq("id", 7i64)
            .to_sql()
            .unwrap();
        assert!(compiled
            .sql
            .starts_with("UPDATE \"tasks\" SET \"status\" = $1, \"completed\" = $2"));
        assert_eq!(compiled.params[0], Value::Text("done".into()));
        assert_eq!(compiled.params[1], Value::Bool(true));
    }

    #[test]
    fn delete_builder_keeps_tenant_scope() {
        let compiled = engine().table("tasks", ctx()).delete().to_sql().unwrap();
        assert_eq!(
            compiled.sql,
            "DELETE FROM \"tasks\" WHERE \"app_id\" = $1 AND \"organization_id\" = $2"
        );
    }

    #[test]
    fn where_in_and_null_helpers() {
        let compiled = engine()
            .table("users", ctx())
            .select(&[])
            .where_in(
                "id",
                vec![Value::Text("a".into()), Value::Text("b".into())],
            )
            .where_not_null("email")
            .to_sql()
            .unwrap();
        assert!(compiled.sql.contains("\"id\" IN ($1, $2)"));
        assert!(compiled.sql.contains("AND \"email\" IS NOT NULL"));
    }

    #[test]
    fn join_builder() {
        let compiled = engine()
            .table("orders", ctx())
            .select(&["orders.id"])
            .join(JoinType::Left, "users", Some("u"), "orders.user_id", "u.id")
            .filter("u.active", Operator::Eq, true)
            .to_sql()
            .unwrap();
        assert!(compiled
            .sql
            .contains("LEFT JOIN \"users\" AS \"u\" ON \"orders\".\"user_id\" = \"u\".\"id\""));
    }

    #[test]
    fn or_where_uses_or_connector() {
        let compiled = engine()
            .table("t", ctx())
            .select(&[])
            .where_eq("a", 1i64)
            .or_where("b", Operator::Eq, 2i64)
            .to_sql()
            .unwrap();
        assert!(compiled.sql.contains("\"a\" = $1 OR \"b\" = $2"));
    }
}
