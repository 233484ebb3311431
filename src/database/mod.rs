// Document store layer for the dashboard backend
//
// Components never talk to a driver directly: they receive an injected
// `DbHandle` and describe reads with the small typed vocabulary below, which
// each backend turns into its own query language.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use mongodb::bson::{self, doc, oid::ObjectId, Bson, Document};
use tracing::info;

use crate::config::StoreConfig;
use crate::error::StoreError;

pub type DbHandle = Arc<dyn DocumentStore>;

/// URI scheme selecting the in-process backend.
pub const MEMORY_URI: &str = "memory://";

/// Operations the dashboard needs from a document store.
///
/// Every operation fails with [`StoreError::NotConnected`] until
/// [`DocumentStore::connect`] has succeeded.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn connect(&self) -> Result<(), StoreError>;

    /// Releases the connection; later calls fail as if never connected.
    async fn disconnect(&self);

    /// Cheap local check that `connect` has succeeded; performs no I/O.
    async fn ensure_connected(&self) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Inserts a document, assigning an `_id` when absent. Returns the id in hex form.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<String, StoreError>;

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError>;

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError>;

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>, StoreError> {
        let mut docs = self.find(collection, filter, &FindOptions::default().limit(1)).await?;
        Ok(docs.pop())
    }
}

pub struct Database;

impl Database {
    /// Build the backend selected by the configured URI and establish its connection.
    pub async fn init(config: &StoreConfig) -> Result<DbHandle, StoreError> {
        let store: DbHandle = if config.uri.starts_with(MEMORY_URI) {
            info!("Using in-memory document store");
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(MongoStore::new(config.clone()))
        };

        store.connect().await?;
        info!("Document store initialized successfully");
        Ok(store)
    }
}

/// Document predicate understood by every backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    Eq(String, Bson),
    Gte(String, Bson),
    Lt(String, Bson),
    Exists(String),
    Regex {
        field: String,
        pattern: String,
        case_insensitive: bool,
    },
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Bson>) -> Self {
        Self::Eq(field.to_string(), value.into())
    }

    pub fn gte(field: &str, value: impl Into<Bson>) -> Self {
        Self::Gte(field.to_string(), value.into())
    }

    pub fn lt(field: &str, value: impl Into<Bson>) -> Self {
        Self::Lt(field.to_string(), value.into())
    }

    pub fn exists(field: &str) -> Self {
        Self::Exists(field.to_string())
    }

    pub fn regex_ci(field: &str, pattern: &str) -> Self {
        Self::Regex {
            field: field.to_string(),
            pattern: pattern.to_string(),
            case_insensitive: true,
        }
    }

    /// Matches the document whose `_id` is the given hex identifier.
    pub fn id(hex_id: &str) -> Option<Self> {
        ObjectId::parse_str(hex_id)
            .ok()
            .map(|oid| Self::Eq("_id".to_string(), Bson::ObjectId(oid)))
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::All => other,
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn to_document(&self) -> Document {
        match self {
            Self::All => Document::new(),
            Self::Eq(field, value) => doc! { field.as_str(): value.clone() },
            Self::Gte(field, value) => doc! { field.as_str(): { "$gte": value.clone() } },
            Self::Lt(field, value) => doc! { field.as_str(): { "$lt": value.clone() } },
            Self::Exists(field) => doc! { field.as_str(): { "$exists": true, "$ne": Bson::Null } },
            Self::Regex {
                field,
                pattern,
                case_insensitive,
            } => {
                let options = if *case_insensitive { "i" } else { "" };
                doc! { field.as_str(): { "$regex": pattern.as_str(), "$options": options } }
            }
            Self::And(parts) => {
                let parts: Vec<Bson> = parts.iter().map(|p| Bson::Document(p.to_document())).collect();
                doc! { "$and": parts }
            }
        }
    }
}

/// Field modifications applied by `update_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub set_on_insert: Document,
    pub inc: Document,
    pub push: Document,
}

impl Update {
    pub fn set(document: Document) -> Self {
        Self {
            set: document,
            ..Self::default()
        }
    }

    pub fn to_document(&self) -> Document {
        let mut update = Document::new();
        for (op, fields) in [
            ("$set", &self.set),
            ("$setOnInsert", &self.set_on_insert),
            ("$inc", &self.inc),
            ("$push", &self.push),
        ] {
            if !fields.is_empty() {
                update.insert(op, fields.clone());
            }
        }
        update
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub upserted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<i64>,
}

impl FindOptions {
    pub fn sort(mut self, field: &str, order: SortOrder) -> Self {
        self.sort = Some((field.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Sum of a numeric field; missing or non-numeric values count as zero.
    Sum(String),
    Count,
}

/// Aggregation pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    /// Emits one document per element of an embedded array, preserving element order.
    Unwind(String),
    Group {
        key: Option<String>,
        fields: Vec<(String, Accumulator)>,
    },
    Sort(String, SortOrder),
    Limit(i64),
}

impl Stage {
    pub fn to_document(&self) -> Document {
        match self {
            Self::Match(filter) => doc! { "$match": filter.to_document() },
            Self::Unwind(field) => doc! { "$unwind": format!("${field}") },
            Self::Group { key, fields } => {
                let mut group = doc! {
                    "_id": key.as_ref().map_or(Bson::Null, |k| Bson::String(format!("${k}"))),
                };
                for (name, acc) in fields {
                    let expr = match acc {
                        Accumulator::Sum(field) => doc! { "$sum": format!("${field}") },
                        Accumulator::Count => doc! { "$sum": 1 },
                    };
                    group.insert(name.as_str(), expr);
                }
                doc! { "$group": group }
            }
            Self::Sort(field, order) => doc! { "$sort": { field.as_str(): order.as_i32() } },
            Self::Limit(n) => doc! { "$limit": *n },
        }
    }
}

/// Reads a count produced by a `$group` stage. No groups (empty input) means zero.
pub fn first_group_count(groups: &[Document], field: &str) -> u64 {
    groups
        .first()
        .and_then(|g| g.get(field))
        .and_then(bson_to_i64)
        .map_or(0, |n| n.max(0) as u64)
}

pub fn first_group_sum(groups: &[Document], field: &str) -> f64 {
    groups
        .first()
        .and_then(|g| g.get(field))
        .and_then(bson_to_f64)
        .unwrap_or(0.0)
}

pub fn bson_to_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(v) => Some(*v),
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        _ => None,
    }
}

pub fn bson_to_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.is_finite() => Some(v.round() as i64),
        Bson::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn bson_to_datetime(value: &Bson) -> Option<DateTime<Utc>> {
    match value {
        Bson::DateTime(dt) => Utc.timestamp_millis_opt(dt.timestamp_millis()).single(),
        Bson::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

pub fn to_bson_datetime(dt: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(dt.timestamp_millis())
}

/// Ordering between two scalar values of comparable BSON types.
pub(crate) fn compare_bson(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        _ => bson_to_f64(a)?.partial_cmp(&bson_to_f64(b)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_documents() {
        let filter = Filter::eq("transactions.type", "debit")
            .and(Filter::regex_ci("transactions.reason", "number|purchase"));
        assert_eq!(
            filter.to_document(),
            doc! { "$and": [
                { "transactions.type": "debit" },
                { "transactions.reason": { "$regex": "number|purchase", "$options": "i" } }
            ] }
        );
        assert_eq!(Filter::All.and(Filter::exists("last_sync")), Filter::exists("last_sync"));
    }

    #[test]
    fn test_filter_id_requires_object_id() {
        assert!(Filter::id("64b7f0c2a1d3e4f5a6b7c8d9").is_some());
        assert!(Filter::id("not-an-id").is_none());
    }

    #[test]
    fn test_stage_documents() {
        let group = Stage::Group {
            key: None,
            fields: vec![
                ("count".to_string(), Accumulator::Count),
                ("balance".to_string(), Accumulator::Sum("balance".to_string())),
            ],
        };
        assert_eq!(
            group.to_document(),
            doc! { "$group": { "_id": Bson::Null, "count": { "$sum": 1 }, "balance": { "$sum": "$balance" } } }
        );
        assert_eq!(
            Stage::Unwind("transactions".to_string()).to_document(),
            doc! { "$unwind": "$transactions" }
        );
    }

    #[test]
    fn test_update_document_skips_empty_operators() {
        let update = Update {
            inc: doc! { "balance": 5.0 },
            ..Update::default()
        };
        assert_eq!(update.to_document(), doc! { "$inc": { "balance": 5.0 } });
    }

    #[test]
    fn test_group_readers() {
        assert_eq!(first_group_count(&[], "count"), 0);
        assert_eq!(first_group_count(&[doc! { "count": 3 }], "count"), 3);
        assert_eq!(first_group_sum(&[doc! { "total": 2.5 }], "total"), 2.5);
        assert_eq!(first_group_sum(&[doc! { "total": 4_i64 }], "total"), 4.0);
    }
}
