//! Connection-string inspection.
//!
//! The backend is inferred from the URL scheme: `postgres(ql)://`,
//! `mysql://`, `sqlite:` / `file:` / a bare path ending in `.db` or
//! `.sqlite`, and `mongodb(+srv)://`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// The backends the engine can speak to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgres,
    MySql,
    Sqlite,
    MongoDb,
}

impl DatabaseKind {
    /// Whether this backend is served by the SQL driver.
    pub fn is_sql(self) -> bool {
        !matches!(self, DatabaseKind::MongoDb)
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::MySql => "mysql",
            DatabaseKind::Sqlite => "sqlite",
            DatabaseKind::MongoDb => "mongodb",
        };
        f.write_str(name)
    }
}

/// Infer the backend from a connection string.
pub fn infer_kind(url: &str) -> Result<DatabaseKind> {
    let trimmed = url.trim();
    let lower = trimmed.to_lowercase();

    if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
        return Ok(DatabaseKind::Postgres);
    }
    if lower.starts_with("mysql://") {
        return Ok(DatabaseKind::MySql);
    }
    if lower.starts_with("mongodb://") || lower.starts_with("mongodb+srv://") {
        return Ok(DatabaseKind::MongoDb);
    }
    if lower.starts_with("sqlite:") || lower.starts_with("file:") {
        return Ok(DatabaseKind::Sqlite);
    }
    if lower.ends_with(".db") || lower.ends_with(".sqlite") {
        return Ok(DatabaseKind::Sqlite);
    }

    Err(Error::InvalidIdentifier(format!(
        "cannot infer database backend from connection string {trimmed:?}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_inference() {
        assert_eq!(infer_kind("postgres://u:p@localhost/db").unwrap(), DatabaseKind::Postgres);
        assert_eq!(infer_kind("postgresql://localhost/db").unwrap(), DatabaseKind::Postgres);
        assert_eq!(infer_kind("mysql://localhost/db").unwrap(), DatabaseKind::MySql);
        assert_eq!(infer_kind("sqlite::memory:").unwrap(), DatabaseKind::Sqlite);
        assert_eq!(infer_kind("file:data/app.db").unwrap(), DatabaseKind::Sqlite);
        assert_eq!(infer_kind("./local.sqlite").unwrap(), DatabaseKind::Sqlite);
        assert_eq!(infer_kind("mongodb+srv://cluster0.example.net/app").unwrap(), DatabaseKind::MongoDb);
    }

    #[test]
    fn unknown_scheme_rejected() {
        assert!(infer_kind("redis://localhost").is_err());
    }
}
