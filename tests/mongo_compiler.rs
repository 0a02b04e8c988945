#[cfg(test)]
mod tests {
    use launchpad_db::db::Value;
    use launchpad_db::error::Error;
    use launchpad_db::libs::config::TenantConfig;
    use launchpad_db::query::mongo::{MongoCompiler, MongoOpType};
    use launchpad_db::query::{Connector, Operator, OrderBy, Query, WhereClause, WhereValue};
    use launchpad_db::tenant::TenantContext;
    use mongodb::bson::{doc, Bson};

    fn compiler(inject: bool) -> MongoCompiler {
        MongoCompiler::new(TenantConfig {
            inject_tenant: inject,
            ..TenantConfig::default()
        })
    }

    fn ctx() -> TenantContext {
        TenantContext::new("A", "O")
    }

    fn clause(column: &str, operator: Operator, value: Value) -> WhereClause {
        WhereClause {
            column: column.into(),
            operator,
            value: WhereValue::Single(value),
            connector: Connector::And,
        }
    }

    #[test]
    fn find_filter_with_tenant_injection() {
        let mut query = Query::select("users");
        query
            .where_clauses
            .push(clause("status", Operator::Eq, Value::Text("active".into())));

        let operation = compiler(true).compile(&query, Some(&ctx())).unwrap();
        assert_eq!(operation.op, MongoOpType::Find);
        assert_eq!(operation.filter.get_str("status").unwrap(), "active");
        assert_eq!(operation.filter.get_str("app_id").unwrap(), "A");
        assert_eq!(operation.filter.get_str("organization_id").unwrap(), "O");
    }

    #[test]
    fn missing_context_fails() {
        let query = Query::select("users");
        assert!(matches!(
            compiler(true).compile(&query, None),
            Err(Error::TenantContextMissing)
        ));
    }

    #[test]
    fn comparison_operators_map_to_dollar_forms() {
        let mut query = Query::select("t");
        query
            .where_clauses
            .push(clause("age", Operator::Gt, Value::Int(21)));
        let operation = compiler(false).compile(&query, None).unwrap();
        assert_eq!(
            operation.filter.get_document("age").unwrap(),
            &doc! { "$gt": 21i64 }
        );
    }

    #[test]
    fn in_and_nin() {
        let mut query = Query::select("t");
        query.where_clauses.push(WhereClause {
            column: "id".into(),
            operator: Operator::In,
            value: WhereValue::List(vec![Value::Text("x".into()), Value::Text("y".into())]),
            connector: Connector::And,
        });
        let operation = compiler(false).compile(&query, None).unwrap();
        assert_eq!(
            operation.filter.get_document("id").unwrap(),
            &doc! { "$in": ["x", "y"] }
        );
    }

    #[test]
    fn like_becomes_anchored_regex() {
        let mut query = Query::select("t");
        query
            .where_clauses
            .push(clause("name", Operator::Like, Value::Text("jo%".into())));
        let operation = compiler(false).compile(&query, None).unwrap();
        assert_eq!(
            operation.filter.get_document("name").unwrap(),
            &doc! { "$regex": "^jo.*$" }
        );

        let mut ilike = Query::select("t");
        ilike
            .where_clauses
            .push(clause("name", Operator::ILike, Value::Text("jo%".into())));
        let operation = compiler(false).compile(&ilike, None).unwrap();
        assert_eq!(
            operation.filter.get_document("name").unwrap(),
            &doc! { "$regex": "^jo.*$", "$options": "i" }
        );
    }

    #[test]
    fn or_groups_split_into_alternatives() {
        let mut query = Query::select("t");
        query
            .where_clauses
            .push(clause("a", Operator::Eq, Value::Int(1)));
        query.where_clauses.push(WhereClause {
            column: "b".into(),
            operator: Operator::Eq,
            value: WhereValue::Single(Value::Int(2)),
            connector: Connector::Or,
        });
        let operation = compiler(false).compile(&query, None).unwrap();
        let alternatives = operation.filter.get_array("$or").unwrap();
        assert_eq!(alternatives.len(), 2);
    }

    #[test]
    fn insert_documents_get_tenant_fields() {
        let mut query = Query::insert("users");
        query
            .rows
            .push(vec![("email".to_string(), Value::Text("a@b.c".into()))]);
        let operation = compiler(true).compile(&query, Some(&ctx())).unwrap();
        assert_eq!(operation.op, MongoOpType::InsertOne);
        let document = &operation.documents[0];
        assert_eq!(document.get_str("email").unwrap(), "a@b.c");
        assert_eq!(document.get_str("app_id").unwrap(), "A");
        assert_eq!(document.get_str("organization_id").unwrap(), "O");
    }

    #[test]
    fn multi_row_insert_is_insert_many() {
        let mut query = Query::insert("users");
        query.rows.push(vec![("n".to_string(), Value::Int(1))]);
        query.rows.push(vec![("n".to_string(), Value::Int(2))]);
        let operation = compiler(false).compile(&query, None).unwrap();
        assert_eq!(operation.op, MongoOpType::InsertMany);
        assert_eq!(operation.documents.len(), 2);
    }

    #[test]
    fn update_produces_set_document() {
        let mut query = Query::update("users");
        query
            .data
            .push(("status".to_string(), Value::Text("done".into())));
        query
            .where_clauses
            .push(clause("id", Operator::Eq, Value::Text("u1".into())));
        let operation = compiler(true).compile(&query, Some(&ctx())).unwrap();
        assert_eq!(operation.op, MongoOpType::UpdateMany);
        assert_eq!(
            operation.update.unwrap(),
            doc! { "$set": { "status": "done" } }
        );
        // Tenant fields scope the filter too.
        assert_eq!(operation.filter.get_str("app_id").unwrap(), "A");
    }

    #[test]
    fn grouped_select_builds_a_pipeline() {
        let mut query = Query::select("events");
        query.group_by.push("kind".into());
        query.order_by.push(OrderBy {
            column: "kind".into(),
            direction: "asc".into(),
        });
        query.limit = Some(5);
        query.offset = Some(10);

        let operation = compiler(false).compile(&query, None).unwrap();
        assert_eq!(operation.op, MongoOpType::Aggregate);
        let stages: Vec<&str> = operation
            .pipeline
            .iter()
            .map(|stage| stage.keys().next().unwrap().as_str())
            .collect();
        assert_eq!(stages, vec!["$group", "$sort", "$skip", "$limit"]);
        assert_eq!(
            operation.pipeline[0].get_document("$group").unwrap()
                .get_document("_id").unwrap()
                .get_str("kind").unwrap(),
            "$kind"
        );
    }

    #[test]
    fn projection_from_selected_columns() {
        let mut query = Query::select("users");
        query.columns = Some(vec!["email".into(), "status".into()]);
        let operation = compiler(false).compile(&query, None).unwrap();
        let projection = operation.projection.unwrap();
        assert_eq!(projection.get_i32("email").unwrap(), 1);
        assert_eq!(projection.get_i32("status").unwrap(), 1);
    }

    #[test]
    fn delete_without_filter_requires_tenant() {
        let query = Query::delete("t");
        assert!(compiler(false).compile(&query, None).is_err());

        let operation = compiler(true).compile(&query, Some(&ctx())).unwrap();
        assert_eq!(operation.op, MongoOpType::DeleteMany);
        assert_eq!(operation.filter.get_str("app_id").unwrap(), "A");
    }

    #[test]
    fn null_checks_map_to_bson_null() {
        let mut query = Query::select("t");
        query.where_clauses.push(WhereClause {
            column: "deleted_at".into(),
            operator: Operator::IsNull,
            value: WhereValue::None,
            connector: Connector::And,
        });
        let operation = compiler(false).compile(&query, None).unwrap();
        assert_eq!(operation.filter.get("deleted_at").unwrap(), &Bson::Null);
    }
}
