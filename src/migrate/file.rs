//! Migration file grammar.
//!
//! Filenames match `^(\d+)__([a-z0-9_]+)\.sql$`: the version is the longest
//! leading digit run, the remainder up to `.sql` is the name. Content
//! carries an `-- up` section and an optional `-- down` section, both
//! markers case-insensitive; files with no up section are rejected. The
//! identity of a migration is the `(version, scope, template_key)` tuple.

use super::splitter::split_statements;
use crate::error::{Error, Result};
use crate::libs::checksum::migration_checksum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Core (platform) vs template (keyed) migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationScope {
    Core,
    Template,
}

impl MigrationScope {
    pub fn as_str(self) -> &'static str {
        match self {
            MigrationScope::Core => "core",
            MigrationScope::Template => "template",
        }
    }
}

/// A parsed migration file.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationFile {
    pub version: i64,
    pub name: String,
    pub up: Vec<String>,
    pub down: Vec<String>,
    pub scope: MigrationScope,
    pub template_key: Option<String>,
    pub module_name: Option<String>,
}

impl MigrationFile {
    /// SHA-256 over the newline-joined up statements.
    pub fn checksum(&self) -> String {
        migration_checksum(&self.up)
    }
}

/// Validates a caller-supplied template key before it is used in a
/// filesystem path. The only path-traversal seam in the engine.
pub fn validate_template_key(key: &str) -> Result<()> {
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidTemplateKey(key.to_string()));
    }
    Ok(())
}

fn invalid(filename: &str, reason: &str) -> Error {
    Error::InvalidMigrationFile(format!("{filename}: {reason}"))
}

/// Parses `<version>__<name>.sql` into its components.
pub fn parse_filename(filename: &str) -> Result<(i64, String)> {
    let stem = filename
        .strip_suffix(".sql")
        .ok_or_else(|| invalid(filename, "missing .sql extension"))?;

    let digits: String = stem.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(invalid(filename, "missing numeric version prefix"));
    }
    let rest = &stem[digits.len()..];
    let name = rest
        .strip_prefix("__")
        .ok_or_else(|| invalid(filename, "expected __ between version and name"))?;
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(invalid(filename, "name must match [a-z0-9_]+"));
    }
    let version: i64 = digits
        .parse()
        .map_err(|_| invalid(filename, "version does not fit in 64 bits"))?;
    Ok((version, name.to_string()))
}

/// Parses the `-- up` / `-- down` sections of a file body into statement
/// lists.
pub fn parse_sections(content: &str) -> Result<(Vec<String>, Vec<String>)> {
    let mut up_body = String::new();
    let mut down_body = String::new();
    let mut section = Section::Preamble;

    for line in content.lines() {
        let marker = line.trim().to_lowercase();
        if marker == "-- up" {
            if section != Section::Preamble {
                return Err(Error::InvalidMigrationFile(
                    "duplicate or misplaced -- up marker".into(),
                ));
            }
            section = Section::Up;
            continue;
        }
        if marker == "-- down" {
            if section != Section::Up {
                return Err(Error::InvalidMigrationFile(
                    "-- down marker requires a preceding -- up section".into(),
                ));
            }
            section = Section::Down;
            continue;
        }
        match section {
            Section::Preamble => {
                // Leading comments and blank lines are tolerated; anything
                // else before -- up is malformed.
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with("--") {
                    return Err(Error::InvalidMigrationFile(
                        "SQL before the -- up marker".into(),
                    ));
                }
            }
            Section::Up => {
                up_body.push_str(line);
                up_body.push('\n');
            }
            Section::Down => {
                down_body.push_str(line);
                down_body.push('\n');
            }
        }
    }

    if section == Section::Preamble {
        return Err(Error::InvalidMigrationFile("missing -- up section".into()));
    }

    let up = split_statements(&up_body);
    if up.is_empty() {
        return Err(Error::InvalidMigrationFile(
            "the -- up section contains no statements".into(),
        ));
    }
    Ok((up, split_statements(&down_body)))
}

#[derive(PartialEq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// Parses one file into a [`MigrationFile`].
pub fn parse_file(
    path: &Path,
    scope: MigrationScope,
    template_key: Option<&str>,
) -> Result<MigrationFile> {
    let filename = path
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| Error::InvalidMigrationFile(format!("unreadable path {path:?}")))?;
    let (version, name) = parse_filename(filename)?;
    let content = fs::read_to_string(path)?;
    let (up, down) = parse_sections(&content)?;
    Ok(MigrationFile {
        version,
        name,
        up,
        down,
        scope,
        template_key: template_key.map(|k| k.to_string()),
        module_name: None,
    })
}

/// Loads every migration in a directory, sorted by `(version, name)`.
///
/// Duplicate versions within one scope are a load-time error. Non-SQL
/// files are skipped.
pub fn load_dir(
    dir: &Path,
    scope: MigrationScope,
    template_key: Option<&str>,
) -> Result<Vec<MigrationFile>> {
    if let Some(key) = template_key {
        validate_template_key(key)?;
    }
    let mut migrations = Vec::new();
    if !dir.exists() {
        debug!(?dir, "migration directory does not exist, treating as empty");
        return Ok(migrations);
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        if !path.is_file() || !filename.ends_with(".sql") {
            continue;
        }
        migrations.push(parse_file(&path, scope, template_key)?);
    }
    migrations.sort_by(|a, b| (a.version, &a.name).cmp(&(b.version, &b.name)));

    for window in migrations.windows(2) {
        if window[0].version == window[1].version {
            return Err(Error::InvalidMigrationFile(format!(
                "duplicate migration version {} ({} and {})",
                window[0].version, window[0].name, window[1].name
            )));
        }
    }
    Ok(migrations)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_grammar() {
        assert_eq!(parse_filename("1__init.sql").unwrap(), (1, "init".into()));
        assert_eq!(
            parse_filename("20240101120000__add_users.sql").unwrap(),
            (20240101120000, "add_users".into())
        );
        assert!(parse_filename("init.sql").is_err());
        assert!(parse_filename("1__Init.sql").is_err());
        assert!(parse_filename("1__add-users.sql").is_err());
        assert!(parse_filename("1_init.sql").is_err());
        assert!(parse_filename("1__init.txt").is_err());
    }

    #[test]
    fn sections_parse_up_and_down() {
        let (up, down) = parse_sections(
            "-- up\nCREATE TABLE t(id INT);\nCREATE INDEX i ON t(id);\n-- down\nDROP TABLE t;\n",
        )
        .unwrap();
        assert_eq!(up.len(), 2);
        assert_eq!(down, vec!["DROP TABLE t".to_string()]);
    }

    #[test]
    fn markers_are_case_insensitive() {
        let (up, down) = parse_sections("-- UP\nSELECT 1;\n-- Down\nSELECT 2;\n").unwrap();
        assert_eq!(up, vec!["SELECT 1".to_string()]);
        assert_eq!(down, vec!["SELECT 2".to_string()]);
    }

    #[test]
    fn missing_up_section_rejected() {
        assert!(parse_sections("CREATE TABLE t(id INT);").is_err());
        assert!(parse_sections("-- down\nDROP TABLE t;").is_err());
    }

    #[test]
    fn empty_up_section_rejected() {
        assert!(parse_sections("-- up\n\n-- down\nDROP TABLE t;").is_err());
    }

    #[test]
    fn template_key_path_safety() {
        assert!(validate_template_key("a-b_c").is_ok());
        assert!(validate_template_key("../x").is_err());
        assert!(validate_template_key("").is_err());
        assert!(validate_template_key("a/b").is_err());
    }

    #[test]
    fn checksum_matches_helper() {
        let migration = MigrationFile {
            version: 1,
            name: "a".into(),
            up: vec!["CREATE TABLE t1(id INT)".into()],
            down: vec![],
            scope: MigrationScope::Core,
            template_key: None,
            module_name: None,
        };
        assert_eq!(
            migration.checksum(),
            crate::libs::checksum::sha256_hex(b"CREATE TABLE t1(id INT)")
        );
    }
}
