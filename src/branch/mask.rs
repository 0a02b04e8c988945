//! PII masking for branch data copies.
//!
//! When a branch copies data with masking enabled, every column whose name
//! matches the PII pattern set and whose native type is textual is
//! projected through a masking expression instead of being copied as-is.
//! Email-shaped columns keep a plausible address form so application code
//! exercising the branch still sees valid-looking values.

/// Column-name patterns treated as PII.
pub const PII_PATTERNS: &[&str] = &[
    "email",
    "phone",
    "address",
    "ssn",
    "social_security",
    "credit_card",
    "password",
    "secret",
    "token",
    "first_name",
    "last_name",
    "full_name",
    "name",
    "dob",
    "date_of_birth",
    "ip_address",
    "ip",
    "location",
    "latitude",
    "longitude",
];

/// Whether a column name matches the PII pattern set.
///
/// A pattern matches the whole name or an underscore-delimited segment
/// run, so `billing_email` is PII but `allocation_id` is not despite
/// containing `location`.
pub fn is_pii_column(column: &str) -> bool {
    let lower = column.to_lowercase();
    PII_PATTERNS.iter().any(|pattern| {
        lower == *pattern
            || lower.starts_with(&format!("{pattern}_"))
            || lower.ends_with(&format!("_{pattern}"))
            || lower.contains(&format!("_{pattern}_"))
    })
}

/// Whether the column should get the email-shaped mask.
pub fn is_email_column(column: &str) -> bool {
    let lower = column.to_lowercase();
    lower == "email" || lower.starts_with("email_") || lower.ends_with("_email")
}

/// Whether a native type can hold the masked text.
pub fn is_textual_type(native_type: &str) -> bool {
    let lower = native_type.to_lowercase();
    ["text", "varchar", "character", "char", "citext", "uuid"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Projection expression for one column of a masked data copy.
///
/// `quoted` is the already-quoted column reference. Non-PII and
/// non-textual columns pass through unchanged.
pub fn projection(column: &str, native_type: &str, quoted: &str) -> String {
    if !is_pii_column(column) || !is_textual_type(native_type) {
        return quoted.to_string();
    }
    if is_email_column(column) {
        format!("'masked_' || substr(md5({quoted}),1,8) || '@example.com'")
    } else {
        format!("'masked_' || substr(md5({quoted}),1,8)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching_is_segment_aware() {
        assert!(is_pii_column("email"));
        assert!(is_pii_column("billing_email"));
        assert!(is_pii_column("first_name"));
        assert!(is_pii_column("user_ip_address"));
        assert!(!is_pii_column("allocation_id"));
        assert!(!is_pii_column("description"));
        assert!(!is_pii_column("tokenizer_kind"));
    }

    #[test]
    fn email_columns_get_address_shape() {
        assert_eq!(
            projection("email", "varchar(255)", "\"email\""),
            "'masked_' || substr(md5(\"email\"),1,8) || '@example.com'"
        );
        assert_eq!(
            projection("phone", "text", "\"phone\""),
            "'masked_' || substr(md5(\"phone\"),1,8)"
        );
    }

    #[test]
    fn non_textual_pii_passes_through() {
        assert_eq!(projection("latitude", "double precision", "\"latitude\""), "\"latitude\"");
        assert_eq!(projection("dob", "date", "\"dob\""), "\"dob\"");
    }

    #[test]
    fn non_pii_passes_through() {
        assert_eq!(projection("status", "text", "\"status\""), "\"status\"");
    }
}
