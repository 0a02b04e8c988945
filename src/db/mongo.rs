//! Document-backend driver.
//!
//! Provides the driver surface for MongoDB deployments. The SQL entry
//! points fail with a typed unsupported-operation error; work arrives as a
//! compiled [`MongoOperation`] plan instead, is dispatched to the client,
//! and results are wrapped into the shared [`QueryResult`] shape so callers
//! stay backend-agnostic.

use super::tracker::QueryTracker;
use super::value::{QueryResult, Row, Value};
use crate::error::{Error, Result};
use crate::query::mongo::{MongoOpType, MongoOperation};
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::{Client, Database};
use std::sync::Arc;
use tracing::debug;

/// Driver over one MongoDB database.
pub struct MongoDriver {
    client: Client,
    database: Database,
    tracker: Arc<QueryTracker>,
}

impl MongoDriver {
    pub async fn connect(url: &str, database: &str) -> Result<Self> {
        let client = Client::with_uri_str(url).await?;
        let database = client.database(database);
        debug!(database = database.name(), "mongodb client connected");
        Ok(Self {
            client,
            database,
            tracker: QueryTracker::new(),
        })
    }

    /// SQL is rejected on the document backend.
    pub async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Err(Error::UnsupportedOperation(
            "SQL queries are not supported on the MongoDB driver".into(),
        ))
    }

    /// SQL is rejected on the document backend.
    pub async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Err(Error::UnsupportedOperation(
            "SQL statements are not supported on the MongoDB driver".into(),
        ))
    }

    /// Dispatches a compiled operation plan.
    pub async fn run(&self, operation: &MongoOperation) -> Result<QueryResult> {
        let _guard = self.tracker.register(&format!(
            "{:?} {}",
            operation.op, operation.collection
        ))?;
        let collection = self.database.collection::<Document>(&operation.collection);

        match operation.op {
            MongoOpType::Find => {
                let mut find = collection.find(operation.filter.clone());
                if let Some(sort) = &operation.sort {
                    find = find.sort(sort.clone());
                }
                if let Some(skip) = operation.skip {
                    find = find.skip(skip);
                }
                if let Some(limit) = operation.limit {
                    find = find.limit(limit);
                }
                if let Some(projection) = &operation.projection {
                    find = find.projection(projection.clone());
                }
                let documents: Vec<Document> = find.await?.try_collect().await?;
                Ok(documents_result(documents))
            }
            MongoOpType::Aggregate => {
                let cursor = collection.aggregate(operation.pipeline.clone()).await?;
                let documents: Vec<Document> = cursor.try_collect().await?;
                Ok(documents_result(documents))
            }
            MongoOpType::InsertOne => {
                let document = operation.documents.first().ok_or_else(|| {
                    Error::InvalidIdentifier("insertOne requires a document".into())
                })?;
                collection.insert_one(document.clone()).await?;
                Ok(count_result(1))
            }
            MongoOpType::InsertMany => {
                let inserted = collection
                    .insert_many(operation.documents.clone())
                    .await?
                    .inserted_ids
                    .len();
                Ok(count_result(inserted as u64))
            }
            MongoOpType::UpdateOne => {
                let update = required_update(operation)?;
                let result = collection
                    .update_one(operation.filter.clone(), update)
                    .await?;
                Ok(count_result(result.modified_count))
            }
            MongoOpType::UpdateMany => {
                let update = required_update(operation)?;
                let result = collection
                    .update_many(operation.filter.clone(), update)
                    .await?;
                Ok(count_result(result.modified_count))
            }
            MongoOpType::DeleteOne => {
                let result = collection.delete_one(operation.filter.clone()).await?;
                Ok(count_result(result.deleted_count))
            }
            MongoOpType::DeleteMany => {
                let result = collection.delete_many(operation.filter.clone()).await?;
                Ok(count_result(result.deleted_count))
            }
            MongoOpType::FindOneAndUpdate => {
                let update = required_update(operation)?;
                let document = collection
                    .find_one_and_update(operation.filter.clone(), update)
                    .await?;
                Ok(documents_result(document.into_iter().collect()))
            }
            MongoOpType::FindOneAndDelete => {
                let document = collection
                    .find_one_and_delete(operation.filter.clone())
                    .await?;
                Ok(documents_result(document.into_iter().collect()))
            }
            MongoOpType::CountDocuments => {
                let count = collection
                    .count_documents(operation.filter.clone())
                    .await?;
                Ok(QueryResult {
                    rows: vec![Row(vec![("count".to_string(), Value::Int(count as i64))])],
                    row_count: count,
                })
            }
        }
    }

    /// Lightweight `ping` probe.
    pub async fn health_check(&self) -> Result<u64> {
        let started = std::time::Instant::now();
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(started.elapsed().as_millis() as u64)
    }

    pub fn get_active_query_count(&self) -> usize {
        self.tracker.active_count()
    }

    pub fn is_draining(&self) -> bool {
        self.tracker.is_draining()
    }

    /// Stops accepting operations and shuts the client down.
    pub async fn close(&self) {
        self.tracker.start_draining();
        self.client.clone().shutdown().await;
    }
}

fn required_update(operation: &MongoOperation) -> Result<Document> {
    operation.update.clone().ok_or_else(|| {
        Error::InvalidIdentifier("update operation requires an update document".into())
    })
}

fn count_result(count: u64) -> QueryResult {
    QueryResult {
        rows: Vec::new(),
        row_count: count,
    }
}

fn documents_result(documents: Vec<Document>) -> QueryResult {
    let rows: Vec<Row> = documents.iter().map(document_to_row).collect();
    QueryResult {
        row_count: rows.len() as u64,
        rows,
    }
}

fn document_to_row(document: &Document) -> Row {
    Row(document
        .iter()
        .map(|(key, value)| (key.clone(), bson_to_value(value)))
        .collect())
}

fn bson_to_value(bson: &Bson) -> Value {
    match bson {
        Bson::Null => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(i) => Value::Int(*i as i64),
        Bson::Int64(i) => Value::Int(*i),
        Bson::Double(f) => Value::Float(*f),
        Bson::String(s) => Value::Text(s.clone()),
        Bson::ObjectId(id) => Value::Text(id.to_hex()),
        Bson::DateTime(dt) => Value::Timestamp(dt.to_chrono()),
        Bson::Binary(binary) => Value::Bytes(binary.bytes.clone()),
        other => Value::Json(other.clone().into_relaxed_extjson()),
    }
}
