#[cfg(test)]
mod tests {
    use launchpad_db::dialect::{MySqlDialect, PostgresDialect};
    use launchpad_db::schema::diff::{ChangeType, DiffEngine, DiffOptions};
    use launchpad_db::schema::{
        ColumnDefinition, ColumnType, ForeignReference, SchemaDefinition, TableDefinition,
    };

    fn engine() -> DiffEngine {
        DiffEngine::new(&PostgresDialect, DiffOptions::default())
    }

    fn users_with_email() -> SchemaDefinition {
        SchemaDefinition::new().table(
            "users",
            TableDefinition {
                columns: vec![
                    ColumnDefinition::new("id", ColumnType::Uuid).primary(),
                    ColumnDefinition::new("email", ColumnType::Text).not_null(),
                ],
                indexes: vec![],
                primary_key: None,
            },
        )
    }

    fn users_bare() -> SchemaDefinition {
        SchemaDefinition::new().table(
            "users",
            TableDefinition {
                columns: vec![ColumnDefinition::new("id", ColumnType::Uuid).primary()],
                indexes: vec![],
                primary_key: None,
            },
        )
    }

    #[test]
    fn dropping_a_not_null_column_is_breaking() {
        // Current {id uuid, email text NOT NULL}, target {id uuid}.
        let diff = engine()
            .diff(Some(&users_with_email()), &users_bare())
            .unwrap();
        assert!(diff.has_differences);
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].change_type, ChangeType::ColumnDrop);
        assert!(diff.changes[0].is_breaking);
        assert_eq!(diff.breaking_changes.len(), 1);
    }

    #[test]
    fn self_diff_is_empty() {
        let schema = users_with_email();
        let diff = engine().diff(Some(&schema), &schema).unwrap();
        assert!(!diff.has_differences);
        assert!(diff.changes.is_empty());
        assert!(diff.migration.is_none());
    }

    #[test]
    fn forward_and_reverse_mirror_each_other() {
        let diff = engine()
            .diff(Some(&users_bare()), &users_with_email())
            .unwrap();
        let migration = diff.migration.unwrap();
        assert_eq!(
            migration.forward,
            vec!["ALTER TABLE \"users\" ADD COLUMN \"email\" TEXT NOT NULL".to_string()]
        );
        assert_eq!(
            migration.reverse,
            vec!["ALTER TABLE \"users\" DROP COLUMN \"email\"".to_string()]
        );
    }

    #[test]
    fn column_drop_policy_is_configurable() {
        let lenient = DiffEngine::new(
            &PostgresDialect,
            DiffOptions {
                treat_table_drop_as_breaking: true,
                treat_column_drop_as_breaking: false,
            },
        );
        let diff = lenient
            .diff(Some(&users_with_email()), &users_bare())
            .unwrap();
        assert!(!diff.changes[0].is_breaking);
        assert!(diff.breaking_changes.is_empty());
    }

    #[test]
    fn foreign_key_addition_is_breaking_removal_is_not() {
        let mut with_fk = users_with_email();
        with_fk.tables.insert(
            "posts".to_string(),
            TableDefinition {
                columns: vec![
                    ColumnDefinition::new("id", ColumnType::Uuid).primary(),
                    ColumnDefinition::new("author_id", ColumnType::Uuid)
                        .not_null()
                        .references(ForeignReference {
                            table: "users".into(),
                            column: "id".into(),
                            on_delete: None,
                            on_update: None,
                        }),
                ],
                indexes: vec![],
                primary_key: None,
            },
        );
        let mut without_fk = users_with_email();
        without_fk.tables.insert(
            "posts".to_string(),
            TableDefinition {
                columns: vec![
                    ColumnDefinition::new("id", ColumnType::Uuid).primary(),
                    ColumnDefinition::new("author_id", ColumnType::Uuid).not_null(),
                ],
                indexes: vec![],
                primary_key: None,
            },
        );

        let adding = engine().diff(Some(&without_fk), &with_fk).unwrap();
        assert_eq!(adding.changes[0].change_type, ChangeType::ForeignKeyAdd);
        assert!(adding.changes[0].is_breaking);

        let removing = engine().diff(Some(&with_fk), &without_fk).unwrap();
        assert_eq!(removing.changes[0].change_type, ChangeType::ForeignKeyDrop);
        assert!(!removing.changes[0].is_breaking);
    }

    #[test]
    fn foreign_keys_apply_after_table_creation() {
        let mut target = users_with_email();
        target.tables.insert(
            "posts".to_string(),
            TableDefinition {
                columns: vec![ColumnDefinition::new("id", ColumnType::Uuid).primary()],
                indexes: vec![],
                primary_key: None,
            },
        );
        let mut current = users_with_email();
        // Existing posts table gains a referencing column in two changes:
        // the add and the FK, with the FK ordered last.
        current.tables.insert(
            "posts".to_string(),
            TableDefinition {
                columns: vec![ColumnDefinition::new("id", ColumnType::Uuid).primary()],
                indexes: vec![],
                primary_key: None,
            },
        );
        target
            .tables
            .get_mut("posts")
            .unwrap()
            .columns
            .push(
                ColumnDefinition::new("author_id", ColumnType::Uuid).references(
                    ForeignReference {
                        table: "users".into(),
                        column: "id".into(),
                        on_delete: None,
                        on_update: None,
                    },
                ),
            );

        let diff = engine().diff(Some(&current), &target).unwrap();
        let kinds: Vec<ChangeType> = diff.changes.iter().map(|c| c.change_type).collect();
        assert_eq!(kinds, vec![ChangeType::ColumnAdd]);
        // The reference rides along with the column add DDL.
        assert!(diff.changes[0].forward[0].contains("REFERENCES \"users\" (\"id\")"));
    }

    #[test]
    fn mysql_modify_column_form() {
        let mut current = users_with_email();
        let mut target = users_with_email();
        current.tables.get_mut("users").unwrap().columns[1].column_type = ColumnType::String;
        target.tables.get_mut("users").unwrap().columns[1].column_type = ColumnType::Text;

        let mysql = DiffEngine::new(&MySqlDialect, DiffOptions::default());
        let diff = mysql.diff(Some(&current), &target).unwrap();
        assert_eq!(diff.changes[0].change_type, ChangeType::ColumnModify);
        assert!(!diff.changes[0].is_breaking); // widening
        assert_eq!(
            diff.changes[0].forward,
            vec!["ALTER TABLE `users` MODIFY COLUMN `email` TEXT NOT NULL".to_string()]
        );
    }

    #[test]
    fn table_add_creates_indexes_too() {
        let mut target = users_bare();
        target
            .tables
            .get_mut("users")
            .unwrap()
            .indexes
            .push(launchpad_db::schema::IndexDefinition {
                name: None,
                columns: vec!["id".into()],
                unique: false,
                predicate: None,
            });
        let diff = engine().diff(None, &target).unwrap();
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].forward.len(), 2);
        assert!(diff.changes[0].forward[1].starts_with("CREATE INDEX \"idx_users_id\""));
    }

    #[test]
    fn schema_checksum_is_order_independent() {
        // BTreeMap ordering makes insertion order irrelevant.
        let a = SchemaDefinition::new()
            .table("a", users_bare().tables["users"].clone())
            .table("b", users_bare().tables["users"].clone());
        let b = SchemaDefinition::new()
            .table("b", users_bare().tables["users"].clone())
            .table("a", users_bare().tables["users"].clone());
        assert_eq!(a.checksum().unwrap(), b.checksum().unwrap());
    }
}
