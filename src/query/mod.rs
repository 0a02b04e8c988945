//! Query intermediate representation.
//!
//! A typed query tree built by the fluent builders and consumed by the SQL
//! and document compilers. Construction is pure; nothing here touches the
//! database. Column and table names stay strings because the engine serves
//! dynamic schemas; values never appear in SQL text, only in the parameter
//! list.

pub mod builder;
pub mod compiler;
pub mod mongo;

use crate::db::value::Value;

/// Statement families the IR can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// Closed operator set for predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    ILike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

impl Operator {
    pub fn as_sql(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
        }
    }
}

/// How a predicate chains onto the previous one. The first predicate's
/// connector is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    pub fn as_sql(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// Value side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereValue {
    /// `IS NULL` / `IS NOT NULL` take no value.
    None,
    Single(Value),
    /// `IN` / `NOT IN` lists; must be non-empty at compile time.
    List(Vec<Value>),
}

/// One predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub column: String,
    pub operator: Operator,
    pub value: WhereValue,
    pub connector: Connector,
}

/// Ordering term. The direction stays a string until compilation, where it
/// is validated against the closed set `{asc, desc}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL JOIN",
        }
    }
}

/// One join, emitted in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    /// Possibly-qualified column on the left side of the ON condition.
    pub left_column: String,
    pub right_column: String,
}

/// What to do when an insert hits a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictAction {
    Update,
    Nothing,
}

/// Upsert directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertClause {
    pub conflict_columns: Vec<String>,
    pub action: ConflictAction,
    /// Columns to overwrite on conflict; empty means every inserted column
    /// outside the conflict set.
    pub update_columns: Vec<String>,
}

/// One row of column → value pairs, in declaration order.
pub type RowData = Vec<(String, Value)>;

/// The query tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub kind: QueryKind,
    pub table: String,
    /// Selected columns; `None` means `*`.
    pub columns: Option<Vec<String>>,
    /// Insert rows (one entry for a single-row insert).
    pub rows: Vec<RowData>,
    /// Update SET pairs.
    pub data: RowData,
    pub where_clauses: Vec<WhereClause>,
    pub order_by: Vec<OrderBy>,
    pub group_by: Vec<String>,
    pub having: Vec<WhereClause>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub returning: Option<Vec<String>>,
    pub joins: Vec<JoinClause>,
    pub upsert: Option<UpsertClause>,
}

impl Query {
    fn empty(kind: QueryKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            columns: None,
            rows: Vec::new(),
            data: Vec::new(),
            where_clauses: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            limit: None,
            offset: None,
            returning: None,
            joins: Vec::new(),
            upsert: None,
        }
    }

    pub fn select(table: impl Into<String>) -> Self {
        Self::empty(QueryKind::Select, table)
    }

    pub fn insert(table: impl Into<String>) -> Self {
        Self::empty(QueryKind::Insert, table)
    }

    pub fn update(table: impl Into<String>) -> Self {
        Self::empty(QueryKind::Update, table)
    }

    pub fn delete(table: impl Into<String>) -> Self {
        Self::empty(QueryKind::Delete, table)
    }
}
