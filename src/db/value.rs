//! Dynamic parameter and result values.
//!
//! The engine serves dynamic schemas, so parameters and result cells are a
//! closed scalar enum rather than typed rows. [`Value`] binds to all three
//! sqlx backends and converts to BSON for the document driver; result rows
//! decode back into [`Row`] with a conservative type ladder.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A single parameter or result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Json(serde_json::Value),
    #[serde(skip)]
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// BSON rendering for the document compiler.
    pub fn to_bson(&self) -> mongodb::bson::Bson {
        use mongodb::bson::Bson;
        match self {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int(i) => Bson::Int64(*i),
            Value::Float(f) => Bson::Double(*f),
            Value::Text(s) => Bson::String(s.clone()),
            Value::Json(j) => mongodb::bson::to_bson(j).unwrap_or(Bson::Null),
            Value::Bytes(b) => Bson::Binary(mongodb::bson::Binary {
                subtype: mongodb::bson::spec::BinarySubtype::Generic,
                bytes: b.clone(),
            }),
            Value::Timestamp(ts) => Bson::DateTime(mongodb::bson::DateTime::from_chrono(*ts)),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// One decoded result row: column name → value, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Vec<(String, Value)>);

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Value::as_bool)
    }
}

/// Shared result shape across the SQL and document drivers.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub rows: Vec<Row>,
    pub row_count: u64,
}

// -- sqlx binding -------------------------------------------------------

macro_rules! bind_value {
    ($query:expr, $value:expr) => {
        match $value {
            Value::Null => $query.bind(Option::<String>::None),
            Value::Bool(b) => $query.bind(*b),
            Value::Int(i) => $query.bind(*i),
            Value::Float(f) => $query.bind(*f),
            Value::Text(s) => $query.bind(s.clone()),
            Value::Json(j) => $query.bind(j.clone()),
            Value::Bytes(b) => $query.bind(b.clone()),
            Value::Timestamp(ts) => $query.bind(*ts),
        }
    };
}

pub(crate) fn bind_pg<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    params: &[Value],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for value in params {
        query = bind_value!(query, value);
    }
    query
}

pub(crate) fn bind_mysql<'q>(
    mut query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    params: &[Value],
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    for value in params {
        query = bind_value!(query, value);
    }
    query
}

pub(crate) fn bind_sqlite<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    params: &[Value],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for value in params {
        query = bind_value!(query, value);
    }
    query
}

// -- row decoding -------------------------------------------------------

/// Attempts decodes from most to least specific and settles on `Null` when
/// nothing matches. Integer attempts precede `bool` so integer-affinity
/// backends do not misreport counters as booleans.
macro_rules! decode_cell {
    ($row:expr, $index:expr) => {{
        use sqlx::Row as _;
        if let Ok(v) = $row.try_get::<Option<i64>, _>($index) {
            v.map(Value::Int).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<i32>, _>($index) {
            v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<i16>, _>($index) {
            v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<f64>, _>($index) {
            v.map(Value::Float).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<f32>, _>($index) {
            v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<bool>, _>($index) {
            v.map(Value::Bool).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<String>, _>($index) {
            v.map(Value::Text).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<DateTime<Utc>>, _>($index) {
            v.map(Value::Timestamp).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<NaiveDateTime>, _>($index) {
            v.map(|ts| Value::Timestamp(ts.and_utc())).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<NaiveDate>, _>($index) {
            v.map(|d| Value::Text(d.to_string())).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<NaiveTime>, _>($index) {
            v.map(|t| Value::Text(t.to_string())).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<serde_json::Value>, _>($index) {
            v.map(Value::Json).unwrap_or(Value::Null)
        } else if let Ok(v) = $row.try_get::<Option<Vec<u8>>, _>($index) {
            v.map(Value::Bytes).unwrap_or(Value::Null)
        } else {
            Value::Null
        }
    }};
}

pub(crate) fn decode_pg_row(row: &sqlx::postgres::PgRow) -> Row {
    use sqlx::{Column, Row as _};
    let mut cells = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(index) {
            v.map(|u| Value::Text(u.to_string())).unwrap_or(Value::Null)
        } else {
            decode_cell!(row, index)
        };
        cells.push((column.name().to_string(), value));
    }
    Row(cells)
}

pub(crate) fn decode_mysql_row(row: &sqlx::mysql::MySqlRow) -> Row {
    use sqlx::{Column, Row as _};
    let mut cells = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        cells.push((column.name().to_string(), decode_cell!(row, index)));
    }
    Row(cells)
}

pub(crate) fn decode_sqlite_row(row: &sqlx::sqlite::SqliteRow) -> Row {
    use sqlx::{Column, Row as _};
    let mut cells = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        cells.push((column.name().to_string(), decode_cell!(row, index)));
    }
    Row(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_impls() {
        assert_eq!(Value::from("x"), Value::Text("x".into()));
        assert_eq!(Value::from(42i64), Value::Int(42));
        assert_eq!(Value::from(Option::<i64>::None), Value::Null);
        assert_eq!(Value::from(Some("y")), Value::Text("y".into()));
    }

    #[test]
    fn row_accessors() {
        let row = Row(vec![
            ("name".into(), Value::Text("a".into())),
            ("count".into(), Value::Int(3)),
        ]);
        assert_eq!(row.get_str("name"), Some("a"));
        assert_eq!(row.get_i64("count"), Some(3));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn bson_conversion() {
        assert_eq!(Value::Int(5).to_bson(), mongodb::bson::Bson::Int64(5));
        assert_eq!(Value::Null.to_bson(), mongodb::bson::Bson::Null);
        assert_eq!(
            Value::Text("a".into()).to_bson(),
            mongodb::bson::Bson::String("a".into())
        );
    }
}
