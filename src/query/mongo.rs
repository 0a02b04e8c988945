//! Document compilation of the query IR.
//!
//! Produces a [`MongoOperation`] plan instead of SQL: predicates become
//! filter documents, inserts become `insertOne`/`insertMany` with tenant
//! fields injected, updates produce `$set` documents, and grouped selects
//! compile to an aggregation pipeline `$match → $group → $sort → $skip →
//! $limit`. Tenant predicates are injected on both the filter path and the
//! insert-document path.

use super::{Connector, Operator, Query, QueryKind, RowData, WhereClause, WhereValue};
use crate::error::{Error, Result};
use crate::libs::config::TenantConfig;
use crate::tenant::TenantContext;
use mongodb::bson::{doc, Bson, Document};

/// Operation types the document driver dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MongoOpType {
    Find,
    Aggregate,
    InsertOne,
    InsertMany,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    FindOneAndUpdate,
    FindOneAndDelete,
    CountDocuments,
}

/// A compiled document-backend operation plan.
#[derive(Debug, Clone, PartialEq)]
pub struct MongoOperation {
    pub op: MongoOpType,
    pub collection: String,
    pub filter: Document,
    pub update: Option<Document>,
    pub documents: Vec<Document>,
    pub pipeline: Vec<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<i64>,
    pub projection: Option<Document>,
}

impl MongoOperation {
    fn new(op: MongoOpType, collection: &str) -> Self {
        Self {
            op,
            collection: collection.to_string(),
            filter: Document::new(),
            update: None,
            documents: Vec::new(),
            pipeline: Vec::new(),
            sort: None,
            skip: None,
            limit: None,
            projection: None,
        }
    }
}

/// Compiler from the shared IR to document operations.
pub struct MongoCompiler {
    tenant: TenantConfig,
}

impl MongoCompiler {
    pub fn new(tenant: TenantConfig) -> Self {
        Self { tenant }
    }

    pub fn compile(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<MongoOperation> {
        let ctx = if self.tenant.inject_tenant {
            match ctx {
                Some(ctx) => {
                    ctx.validate()?;
                    Some(ctx)
                }
                None => return Err(Error::TenantContextMissing),
            }
        } else {
            None
        };

        match query.kind {
            QueryKind::Select => self.compile_select(query, ctx),
            QueryKind::Insert => self.compile_insert(query, ctx),
            QueryKind::Update => self.compile_update(query, ctx),
            QueryKind::Delete => self.compile_delete(query, ctx),
        }
    }

    fn compile_select(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<MongoOperation> {
        let filter = self.filter_doc(&query.where_clauses, ctx)?;

        if !query.group_by.is_empty() {
            let mut operation = MongoOperation::new(MongoOpType::Aggregate, &query.table);
            let mut pipeline = Vec::new();
            if !filter.is_empty() {
                pipeline.push(doc! { "$match": filter.clone() });
            }
            let mut id = Document::new();
            for column in &query.group_by {
                id.insert(column.clone(), format!("${column}"));
            }
            pipeline.push(doc! { "$group": { "_id": id, "count": { "$sum": 1 } } });
            if let Some(sort) = self.sort_doc(query)? {
                pipeline.push(doc! { "$sort": sort });
            }
            if let Some(offset) = query.offset {
                pipeline.push(doc! { "$skip": offset });
            }
            if let Some(limit) = query.limit {
                pipeline.push(doc! { "$limit": limit });
            }
            operation.filter = filter;
            operation.pipeline = pipeline;
            return Ok(operation);
        }

        let mut operation = MongoOperation::new(MongoOpType::Find, &query.table);
        operation.filter = filter;
        operation.sort = self.sort_doc(query)?;
        operation.skip = query.offset.map(|o| o as u64);
        operation.limit = query.limit;
        if let Some(columns) = &query.columns {
            if !columns.is_empty() {
                let mut projection = Document::new();
                for column in columns {
                    projection.insert(column.clone(), 1);
                }
                operation.projection = Some(projection);
            }
        }
        Ok(operation)
    }

    fn compile_insert(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<MongoOperation> {
        if query.rows.is_empty() {
            return Err(Error::InvalidIdentifier(
                "insert requires at least one document".into(),
            ));
        }
        let documents: Vec<Document> = query
            .rows
            .iter()
            .map(|row| self.row_doc(row, ctx))
            .collect();
        let op = if documents.len() == 1 {
            MongoOpType::InsertOne
        } else {
            MongoOpType::InsertMany
        };
        let mut operation = MongoOperation::new(op, &query.table);
        operation.documents = documents;
        Ok(operation)
    }

    fn compile_update(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<MongoOperation> {
        if query.data.is_empty() {
            return Err(Error::InvalidIdentifier(
                "update requires at least one field".into(),
            ));
        }
        let mut operation = MongoOperation::new(MongoOpType::UpdateMany, &query.table);
        operation.filter = self.filter_doc(&query.where_clauses, ctx)?;
        let mut set = Document::new();
        for (column, value) in &query.data {
            set.insert(column.clone(), value.to_bson());
        }
        operation.update = Some(doc! { "$set": set });
        Ok(operation)
    }

    fn compile_delete(&self, query: &Query, ctx: Option<&TenantContext>) -> Result<MongoOperation> {
        if query.where_clauses.is_empty() && !self.tenant.inject_tenant {
            return Err(Error::UnsupportedOperation(
                "delete without a filter requires tenant injection".into(),
            ));
        }
        let mut operation = MongoOperation::new(MongoOpType::DeleteMany, &query.table);
        operation.filter = self.filter_doc(&query.where_clauses, ctx)?;
        Ok(operation)
    }

    // -- filter construction -------------------------------------------

    /// Builds the filter document. Clauses split into AND-groups on OR
    /// connectors, mirroring SQL operator precedence; tenant predicates
    /// apply to the whole filter.
    fn filter_doc(
        &self,
        clauses: &[WhereClause],
        ctx: Option<&TenantContext>,
    ) -> Result<Document> {
        let mut groups: Vec<Vec<&WhereClause>> = Vec::new();
        for (index, clause) in clauses.iter().enumerate() {
            if index == 0 || clause.connector == Connector::Or {
                groups.push(vec![clause]);
            } else {
                groups.last_mut().expect("group exists").push(clause);
            }
        }

        let mut filter = match groups.len() {
            0 => Document::new(),
            1 => self.group_doc(&groups[0])?,
            _ => {
                let alternatives: Result<Vec<Bson>> = groups
                    .iter()
                    .map(|group| self.group_doc(group).map(Bson::Document))
                    .collect();
                doc! { "$or": alternatives? }
            }
        };

        if let Some(ctx) = ctx {
            filter.insert(self.tenant.app_id_column.clone(), ctx.app_id.clone());
            filter.insert(
                self.tenant.organization_id_column.clone(),
                ctx.organization_id.clone(),
            );
        }
        Ok(filter)
    }

    fn group_doc(&self, clauses: &[&WhereClause]) -> Result<Document> {
        let mut group = Document::new();
        let mut extras: Vec<Document> = Vec::new();
        for clause in clauses {
            let (column, condition) = self.condition(clause)?;
            if group.contains_key(&column) {
                // A second predicate on the same field cannot share the
                // top-level key; fold it into an $and.
                let mut extra = Document::new();
                extra.insert(column, condition);
                extras.push(extra);
            } else {
                group.insert(column, condition);
            }
        }
        if extras.is_empty() {
            return Ok(group);
        }
        let mut conjuncts = vec![Bson::Document(group)];
        conjuncts.extend(extras.into_iter().map(Bson::Document));
        Ok(doc! { "$and": conjuncts })
    }

    fn condition(&self, clause: &WhereClause) -> Result<(String, Bson)> {
        let column = clause.column.clone();
        let condition = match (clause.operator, &clause.value) {
            (Operator::Eq, WhereValue::Single(v)) => v.to_bson(),
            (Operator::Ne, WhereValue::Single(v)) => Bson::Document(doc! { "$ne": v.to_bson() }),
            (Operator::Gt, WhereValue::Single(v)) => Bson::Document(doc! { "$gt": v.to_bson() }),
            (Operator::Gte, WhereValue::Single(v)) => Bson::Document(doc! { "$gte": v.to_bson() }),
            (Operator::Lt, WhereValue::Single(v)) => Bson::Document(doc! { "$lt": v.to_bson() }),
            (Operator::Lte, WhereValue::Single(v)) => Bson::Document(doc! { "$lte": v.to_bson() }),
            (Operator::Like, WhereValue::Single(v)) => {
                Bson::Document(doc! { "$regex": like_to_regex(v)? })
            }
            (Operator::ILike, WhereValue::Single(v)) => {
                Bson::Document(doc! { "$regex": like_to_regex(v)?, "$options": "i" })
            }
            (Operator::In, WhereValue::List(values)) => {
                if values.is_empty() {
                    return Err(Error::InvalidIdentifier(format!(
                        "empty IN list for field {column:?}"
                    )));
                }
                let items: Vec<Bson> = values.iter().map(|v| v.to_bson()).collect();
                Bson::Document(doc! { "$in": items })
            }
            (Operator::NotIn, WhereValue::List(values)) => {
                if values.is_empty() {
                    return Err(Error::InvalidIdentifier(format!(
                        "empty NOT IN list for field {column:?}"
                    )));
                }
                let items: Vec<Bson> = values.iter().map(|v| v.to_bson()).collect();
                Bson::Document(doc! { "$nin": items })
            }
            (Operator::IsNull, _) => Bson::Null,
            (Operator::IsNotNull, _) => Bson::Document(doc! { "$ne": Bson::Null }),
            (operator, _) => {
                return Err(Error::InvalidIdentifier(format!(
                    "operator {} on field {column:?} has no usable value",
                    operator.as_sql()
                )))
            }
        };
        Ok((column, condition))
    }

    fn sort_doc(&self, query: &Query) -> Result<Option<Document>> {
        if query.order_by.is_empty() {
            return Ok(None);
        }
        let mut sort = Document::new();
        for order in &query.order_by {
            let direction = match order.direction.to_lowercase().as_str() {
                "asc" => 1,
                "desc" => -1,
                other => {
                    return Err(Error::InvalidIdentifier(format!(
                        "invalid sort direction {other:?}; expected asc or desc"
                    )))
                }
            };
            sort.insert(order.column.clone(), direction);
        }
        Ok(Some(sort))
    }

    fn row_doc(&self, row: &RowData, ctx: Option<&TenantContext>) -> Document {
        let mut document = Document::new();
        for (column, value) in row {
            document.insert(column.clone(), value.to_bson());
        }
        if let Some(ctx) = ctx {
            if !document.contains_key(&self.tenant.app_id_column) {
                document.insert(self.tenant.app_id_column.clone(), ctx.app_id.clone());
            }
            if !document.contains_key(&self.tenant.organization_id_column) {
                document.insert(
                    self.tenant.organization_id_column.clone(),
                    ctx.organization_id.clone(),
                );
            }
        }
        document
    }
}

/// Translates a SQL LIKE pattern into an anchored regex: `%` becomes `.*`,
/// `_` becomes `.`, everything else is escaped literally.
fn like_to_regex(value: &crate::db::value::Value) -> Result<String> {
    let pattern = value.as_str().ok_or_else(|| {
        Error::InvalidIdentifier("LIKE pattern must be a string".into())
    })?;
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c if "\\.+*?()|[]{}^$".contains(c) => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    regex.push('$');
    Ok(regex)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::Value;

    #[test]
    fn like_patterns_anchor_and_escape() {
        assert_eq!(like_to_regex(&Value::Text("abc%".into())).unwrap(), "^abc.*$");
        assert_eq!(like_to_regex(&Value::Text("a_c".into())).unwrap(), "^a.c$");
        assert_eq!(like_to_regex(&Value::Text("a.b".into())).unwrap(), "^a\\.b$");
    }
}
