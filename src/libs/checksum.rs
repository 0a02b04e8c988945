//! Checksum helpers shared by migrations, the schema registry and sync.
//!
//! Migration checksums are SHA-256 over the newline-joined up statements and
//! are deliberately not whitespace-normalized: any textual change
//! invalidates the checksum. Schema checksums hash a canonical JSON
//! rendering so key order cannot affect the digest.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Checksum of a migration's up statements, joined by newline.
pub fn migration_checksum(up_statements: &[String]) -> String {
    sha256_hex(up_statements.join("\n").as_bytes())
}

/// Checksum of any serializable value via its canonical JSON rendering.
///
/// Canonical here means `serde_json` with maps rendered as `BTreeMap`s at
/// the type level; callers keep their schema types map-ordered so the same
/// structure always serializes to the same bytes.
pub fn canonical_json_checksum<T: Serialize>(value: &T) -> crate::error::Result<String> {
    let rendered = serde_json::to_vec(value)?;
    Ok(sha256_hex(&rendered))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_checksum_joins_with_newline() {
        let a = migration_checksum(&["CREATE TABLE t1(id INT)".to_string()]);
        assert_eq!(a, sha256_hex(b"CREATE TABLE t1(id INT)"));

        let b = migration_checksum(&["A".to_string(), "B".to_string()]);
        assert_eq!(b, sha256_hex(b"A\nB"));
    }

    #[test]
    fn whitespace_changes_the_digest() {
        let a = migration_checksum(&["CREATE TABLE t(id INT)".to_string()]);
        let b = migration_checksum(&["CREATE  TABLE t(id INT)".to_string()]);
        assert_ne!(a, b);
    }
}
