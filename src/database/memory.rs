// In-process document store
//
// Interprets the same `Filter`/`Stage` vocabulary the MongoDB backend sends to
// the server, with MongoDB's semantics for dotted paths into arrays, `$unwind`
// dropping empty arrays and `$group` producing no rows for empty input. Used
// for local runs (`memory://`) and by the test suite, which can also make
// reads fail on demand.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use regex::RegexBuilder;

use super::{
    bson_to_f64, bson_to_i64, compare_bson, Accumulator, DocumentStore, Filter, FindOptions, SortOrder, Stage,
    Update, UpdateOutcome,
};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    connected: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicU64,
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose connection is already established.
    pub fn connected() -> Self {
        let store = Self::new();
        store.connected.store(true, AtomicOrdering::SeqCst);
        store
    }

    /// Makes every subsequent read (`find`, `count_documents`, `aggregate`) fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, AtomicOrdering::SeqCst);
    }

    /// Number of write operations performed through the store interface.
    pub fn write_count(&self) -> u64 {
        self.writes.load(AtomicOrdering::SeqCst)
    }

    /// Loads fixture documents directly, bypassing the connection check and the write counter.
    pub fn seed(&self, collection: &str, documents: Vec<Document>) {
        let mut collections = self.lock();
        let docs = collections.entry(collection.to_string()).or_default();
        for mut document in documents {
            if !document.contains_key("_id") {
                document.insert("_id", ObjectId::new());
            }
            docs.push(document);
        }
    }

    /// Snapshot of a collection's documents in insertion order.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.lock().get(collection).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Document>>> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_connected(&self) -> Result<(), StoreError> {
        if self.connected.load(AtomicOrdering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }

    fn ensure_readable(&self) -> Result<(), StoreError> {
        self.check_connected()?;
        if self.fail_reads.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Query("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn begin_write(&self) -> Result<(), StoreError> {
        self.check_connected()?;
        self.writes.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn connect(&self) -> Result<(), StoreError> {
        self.connected.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, AtomicOrdering::SeqCst);
    }

    async fn ensure_connected(&self) -> Result<(), StoreError> {
        self.check_connected()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_connected()
    }

    async fn insert_one(&self, collection: &str, mut document: Document) -> Result<String, StoreError> {
        self.begin_write()?;
        let id = match document.get("_id") {
            Some(Bson::ObjectId(oid)) => *oid,
            _ => {
                let oid = ObjectId::new();
                document.insert("_id", oid);
                oid
            }
        };

        self.lock().entry(collection.to_string()).or_default().push(document);
        Ok(id.to_hex())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        self.begin_write()?;
        let mut collections = self.lock();
        let docs = collections.entry(collection.to_string()).or_default();

        if let Some(target) = docs.iter_mut().find(|d| matches(filter, d)) {
            apply_update(target, update, false);
            return Ok(UpdateOutcome {
                matched: 1,
                upserted: false,
            });
        }

        if !upsert {
            return Ok(UpdateOutcome {
                matched: 0,
                upserted: false,
            });
        }

        let mut document = Document::new();
        seed_from_equalities(filter, &mut document);
        apply_update(&mut document, update, true);
        if !document.contains_key("_id") {
            document.insert("_id", ObjectId::new());
        }
        docs.push(document);

        Ok(UpdateOutcome {
            matched: 0,
            upserted: true,
        })
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.begin_write()?;
        let mut collections = self.lock();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        match docs.iter().position(|d| matches(filter, d)) {
            Some(index) => {
                docs.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.begin_write()?;
        let mut collections = self.lock();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };

        let before = docs.len();
        docs.retain(|d| !matches(filter, d));
        Ok((before - docs.len()) as u64)
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.ensure_readable()?;
        let mut docs: Vec<Document> = self
            .documents(collection)
            .into_iter()
            .filter(|d| matches(filter, d))
            .collect();

        if let Some((field, order)) = &options.sort {
            sort_documents(&mut docs, field, *order);
        }
        if let Some(limit) = options.limit.filter(|l| *l > 0) {
            docs.truncate(limit as usize);
        }
        Ok(docs)
    }

    async fn count_documents(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        self.ensure_readable()?;
        let collections = self.lock();
        let count = collections
            .get(collection)
            .map_or(0, |docs| docs.iter().filter(|d| matches(filter, d)).count());
        Ok(count as u64)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Document>, StoreError> {
        self.ensure_readable()?;
        let mut docs = self.documents(collection);

        for stage in pipeline {
            docs = match stage {
                Stage::Match(filter) => docs.into_iter().filter(|d| matches(filter, d)).collect(),
                Stage::Unwind(field) => unwind(docs, field),
                Stage::Group { key, fields } => group(&docs, key.as_deref(), fields),
                Stage::Sort(field, order) => {
                    sort_documents(&mut docs, field, *order);
                    docs
                }
                Stage::Limit(n) => docs.into_iter().take((*n).max(0) as usize).collect(),
            };
        }
        Ok(docs)
    }
}

/// Every value reachable through a dotted path, descending into arrays of documents.
fn lookup<'a>(value: &'a Document, path: &str) -> Vec<&'a Bson> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let Some(found) = value.get(head) else {
        return Vec::new();
    };

    match rest {
        None => vec![found],
        Some(rest) => match found {
            Bson::Document(inner) => lookup(inner, rest),
            Bson::Array(items) => items
                .iter()
                .filter_map(|item| match item {
                    Bson::Document(inner) => Some(lookup(inner, rest)),
                    _ => None,
                })
                .flatten()
                .collect(),
            _ => Vec::new(),
        },
    }
}

/// Candidate values for a comparison; array fields compare element-wise.
fn candidates<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    lookup(document, path)
        .into_iter()
        .flat_map(|value| match value {
            Bson::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

pub(crate) fn matches(filter: &Filter, document: &Document) -> bool {
    match filter {
        Filter::All => true,
        Filter::Eq(field, expected) => {
            let found = candidates(document, field);
            if found.is_empty() {
                return *expected == Bson::Null;
            }
            found.iter().any(|v| values_equal(v, expected))
        }
        Filter::Gte(field, bound) => candidates(document, field)
            .iter()
            .any(|v| matches!(compare_bson(v, bound), Some(Ordering::Greater | Ordering::Equal))),
        Filter::Lt(field, bound) => candidates(document, field)
            .iter()
            .any(|v| compare_bson(v, bound) == Some(Ordering::Less)),
        Filter::Exists(field) => lookup(document, field).iter().any(|v| **v != Bson::Null),
        Filter::Regex {
            field,
            pattern,
            case_insensitive,
        } => {
            let Ok(re) = RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
            else {
                return false;
            };
            candidates(document, field)
                .iter()
                .any(|v| matches!(v, Bson::String(s) if re.is_match(s)))
        }
        Filter::And(parts) => parts.iter().all(|p| matches(p, document)),
    }
}

/// Numbers compare by value across BSON numeric types, everything else structurally.
fn values_equal(a: &Bson, b: &Bson) -> bool {
    let numeric = |v: &Bson| matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_));
    if numeric(a) && numeric(b) {
        return compare_bson(a, b) == Some(Ordering::Equal);
    }
    a == b
}

/// Copies top-level equality conditions into a document created by an upsert.
fn seed_from_equalities(filter: &Filter, document: &mut Document) {
    match filter {
        Filter::Eq(field, value) if !field.contains('.') => {
            document.insert(field.as_str(), value.clone());
        }
        Filter::And(parts) => parts.iter().for_each(|p| seed_from_equalities(p, document)),
        _ => {}
    }
}

fn apply_update(document: &mut Document, update: &Update, inserting: bool) {
    if inserting {
        for (key, value) in &update.set_on_insert {
            document.insert(key.as_str(), value.clone());
        }
    }
    for (key, value) in &update.set {
        document.insert(key.as_str(), value.clone());
    }
    for (key, delta) in &update.inc {
        let current = document.get(key).cloned().unwrap_or(Bson::Int32(0));
        document.insert(key.as_str(), add_numbers(&current, delta));
    }
    for (key, value) in &update.push {
        match document.get_mut(key) {
            Some(Bson::Array(items)) => items.push(value.clone()),
            _ => {
                document.insert(key.as_str(), Bson::Array(vec![value.clone()]));
            }
        }
    }
}

fn add_numbers(a: &Bson, b: &Bson) -> Bson {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Bson::Int64(i64::from(*x) + i64::from(*y)),
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            Bson::Int64(bson_to_i64(a).unwrap_or(0) + bson_to_i64(b).unwrap_or(0))
        }
        _ => Bson::Double(bson_to_f64(a).unwrap_or(0.0) + bson_to_f64(b).unwrap_or(0.0)),
    }
}

fn sort_documents(docs: &mut [Document], field: &str, order: SortOrder) {
    docs.sort_by(|a, b| {
        let ord = match (lookup(a, field).first(), lookup(b, field).first()) {
            (Some(x), Some(y)) => compare_bson(x, y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        match order {
            SortOrder::Ascending => ord,
            SortOrder::Descending => ord.reverse(),
        }
    });
}

/// Missing, null and empty-array fields produce nothing; a scalar or embedded document
/// behaves as a one-element array and passes through unchanged.
fn unwind(docs: Vec<Document>, field: &str) -> Vec<Document> {
    let mut out = Vec::new();
    for document in docs {
        match document.get(field) {
            None | Some(Bson::Null) => {}
            Some(Bson::Array(items)) => {
                for item in items.clone() {
                    let mut flattened = document.clone();
                    flattened.insert(field, item);
                    out.push(flattened);
                }
            }
            Some(_) => out.push(document),
        }
    }
    out
}

fn group(docs: &[Document], key: Option<&str>, fields: &[(String, Accumulator)]) -> Vec<Document> {
    let mut groups: Vec<(Bson, Vec<&Document>)> = Vec::new();
    for document in docs {
        let key_value = key
            .and_then(|k| lookup(document, k).first().map(|v| (*v).clone()))
            .unwrap_or(Bson::Null);
        match groups.iter_mut().find(|(k, _)| *k == key_value) {
            Some((_, members)) => members.push(document),
            None => groups.push((key_value, vec![document])),
        }
    }

    groups
        .into_iter()
        .map(|(key_value, members)| {
            let mut out = Document::new();
            out.insert("_id", key_value);
            for (name, acc) in fields {
                let value = match acc {
                    Accumulator::Count => Bson::Int64(members.len() as i64),
                    Accumulator::Sum(field) => sum_field(&members, field),
                };
                out.insert(name.as_str(), value);
            }
            out
        })
        .collect()
}

/// Integer sums stay integral; any double in the input makes the sum a double.
fn sum_field(members: &[&Document], field: &str) -> Bson {
    let values: Vec<&Bson> = members
        .iter()
        .flat_map(|d| lookup(d, field))
        .filter(|v| bson_to_f64(v).is_some())
        .collect();

    if values.iter().all(|v| matches!(v, Bson::Int32(_) | Bson::Int64(_))) {
        let total: i64 = values.iter().filter_map(|v| bson_to_i64(v)).sum();
        Bson::Int64(total)
    } else {
        Bson::Double(values.iter().filter_map(|v| bson_to_f64(v)).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    fn users() -> Vec<Document> {
        vec![
            doc! {
                "user_id": 1_i64,
                "balance": 10.5,
                "transactions": [
                    { "type": "debit", "reason": "Number purchase", "amount": 5.0 },
                    { "type": "credit", "reason": "Recharge", "amount": 20.0 }
                ]
            },
            doc! { "user_id": 2_i64, "balance": 4_i32, "transactions": [] },
        ]
    }

    #[tokio::test]
    async fn test_unwind_match_group() {
        let store = MemoryStore::connected();
        store.seed("users", users());

        let pipeline = vec![
            Stage::Unwind("transactions".to_string()),
            Stage::Match(Filter::eq("transactions.type", "debit")),
            Stage::Group {
                key: None,
                fields: vec![("count".to_string(), Accumulator::Count)],
            },
        ];
        let groups = store.aggregate("users", &pipeline).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].get("count"), Some(&Bson::Int64(1)));
    }

    #[tokio::test]
    async fn test_unwind_treats_single_value_as_one_element() {
        let store = MemoryStore::connected();
        store.seed("users", users());
        store.seed(
            "users",
            vec![
                doc! { "user_id": 3_i64, "transactions": { "type": "debit", "reason": "Number", "amount": 1.0 } },
                doc! { "user_id": 4_i64, "transactions": Bson::Null },
                doc! { "user_id": 5_i64 },
            ],
        );

        let pipeline = vec![
            Stage::Unwind("transactions".to_string()),
            Stage::Group {
                key: None,
                fields: vec![("count".to_string(), Accumulator::Count)],
            },
        ];
        let groups = store.aggregate("users", &pipeline).await.unwrap();
        assert_eq!(groups[0].get("count"), Some(&Bson::Int64(3)));
    }

    #[tokio::test]
    async fn test_group_over_empty_input_has_no_rows() {
        let store = MemoryStore::connected();
        let pipeline = vec![Stage::Group {
            key: None,
            fields: vec![("count".to_string(), Accumulator::Count)],
        }];
        assert!(store.aggregate("users", &pipeline).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mixed_sum_is_double() {
        let store = MemoryStore::connected();
        store.seed("users", users());
        let pipeline = vec![Stage::Group {
            key: None,
            fields: vec![("total".to_string(), Accumulator::Sum("balance".to_string()))],
        }];
        let groups = store.aggregate("users", &pipeline).await.unwrap();
        assert_eq!(groups[0].get("total"), Some(&Bson::Double(14.5)));
    }

    #[tokio::test]
    async fn test_dotted_path_matches_array_elements() {
        let docs = users();
        assert!(matches(&Filter::regex_ci("transactions.reason", "NUMBER"), &docs[0]));
        assert!(!matches(&Filter::regex_ci("transactions.reason", "bought"), &docs[0]));
        assert!(matches(&Filter::eq("missing", Bson::Null), &docs[0]));
    }

    #[tokio::test]
    async fn test_upsert_then_update() {
        let store = MemoryStore::connected();
        let filter = Filter::eq("type", "dashboard");
        let update = Update {
            set: doc! { "users_total": 3_i64 },
            set_on_insert: doc! { "createdAt": "first" },
            ..Update::default()
        };

        let first = store.update_one("stats", &filter, &update, true).await.unwrap();
        assert!(first.upserted);
        let second = store.update_one("stats", &filter, &update, true).await.unwrap();
        assert_eq!(second.matched, 1);

        let docs = store.documents("stats");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str("type").unwrap(), "dashboard");
        assert_eq!(docs[0].get_str("createdAt").unwrap(), "first");
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_inc_and_push() {
        let store = MemoryStore::connected();
        store.seed("users", users());
        let update = Update {
            inc: doc! { "balance": -0.5 },
            push: doc! { "transactions": { "type": "debit", "reason": "x", "amount": 0.5 } },
            ..Update::default()
        };
        store
            .update_one("users", &Filter::eq("user_id", 1_i64), &update, false)
            .await
            .unwrap();

        let user = &store.documents("users")[0];
        assert_eq!(user.get_f64("balance").unwrap(), 10.0);
        assert_eq!(user.get_array("transactions").unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_disconnected_and_failing_reads() {
        let store = MemoryStore::new();
        assert_eq!(
            store.count_documents("users", &Filter::All).await,
            Err(StoreError::NotConnected)
        );

        store.connect().await.unwrap();
        store.set_fail_reads(true);
        assert!(matches!(
            store.find("users", &Filter::All, &FindOptions::default()).await,
            Err(StoreError::Query(_))
        ));
    }
}
