#[cfg(test)]
mod tests {
    use launchpad_db::branch::diff::{ConflictKind, ConflictResolution, MergeConflict};
    use launchpad_db::branch::mask;
    use launchpad_db::branch::slugify;
    use std::collections::HashMap;

    #[test]
    fn slug_derivation() {
        assert_eq!(slugify("Feature: add user auth"), "feature_add_user_auth");
        assert_eq!(slugify("fix/PR-123"), "fix_pr_123");
        assert_eq!(slugify("___"), "");
        assert_eq!(slugify("Ünïcode name"), "n_code_name");
    }

    #[test]
    fn slug_caps_at_100() {
        assert_eq!(slugify(&"a".repeat(500)).len(), 100);
    }

    #[test]
    fn mask_expressions_match_the_contract() {
        assert_eq!(
            mask::projection("email", "character varying", "\"email\""),
            "'masked_' || substr(md5(\"email\"),1,8) || '@example.com'"
        );
        assert_eq!(
            mask::projection("ssn", "text", "\"ssn\""),
            "'masked_' || substr(md5(\"ssn\"),1,8)"
        );
        assert_eq!(
            mask::projection("credit_card", "text", "\"credit_card\""),
            "'masked_' || substr(md5(\"credit_card\"),1,8)"
        );
    }

    #[test]
    fn mask_only_touches_textual_pii() {
        // PII name but numeric type: passes through.
        assert_eq!(
            mask::projection("latitude", "double precision", "\"latitude\""),
            "\"latitude\""
        );
        // Textual but not PII: passes through.
        assert_eq!(mask::projection("title", "text", "\"title\""), "\"title\"");
    }

    #[test]
    fn pii_pattern_set_is_complete() {
        for pattern in [
            "email", "phone", "address", "ssn", "social_security", "credit_card", "password",
            "secret", "token", "first_name", "last_name", "full_name", "name", "dob",
            "date_of_birth", "ip_address", "ip", "location", "latitude", "longitude",
        ] {
            assert!(mask::is_pii_column(pattern), "{pattern} should be PII");
        }
    }

    #[test]
    fn conflict_keys_feed_the_resolution_map() {
        let conflict = MergeConflict {
            kind: ConflictKind::ColumnTypeMismatch,
            table: "users".into(),
            column: Some("age".into()),
            description: "type mismatch".into(),
        };
        let mut resolutions: HashMap<String, ConflictResolution> = HashMap::new();
        resolutions.insert(conflict.key(), ConflictResolution::UseSource);
        assert!(resolutions.contains_key("users.age"));

        let table_level = MergeConflict {
            kind: ConflictKind::TableRemoved,
            table: "legacy".into(),
            column: None,
            description: "table removed".into(),
        };
        assert_eq!(table_level.key(), "legacy");
    }
}
