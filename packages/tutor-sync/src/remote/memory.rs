//! In-process [`RemoteStore`] with fault injection.
//!
//! Behaves like the cloud store for the subset of features the coordinator
//! uses (merge writes, equality/range filters, single-field ordering) and can
//! be told to delay or fail every call. Every call is counted, including the
//! ones that fail.

use std::collections::BTreeMap;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::remote::{
    Direction, Document, FilterOp, Query, RemoteError, RemotePath, RemoteResult, RemoteStore,
    SetOptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallCounts {
    pub add: usize,
    pub set: usize,
    pub get: usize,
    pub query: usize,
    pub batch_delete: usize,
}

impl CallCounts {
    pub fn total(&self) -> usize {
        self.add + self.set + self.get + self.query + self.batch_delete
    }
}

#[derive(Debug, Clone, Default)]
struct Faults {
    delay: Option<Duration>,
    error: Option<RemoteError>,
}

#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    documents: Mutex<BTreeMap<RemotePath, Map<String, Value>>>,
    faults: Mutex<Faults>,
    add_calls: AtomicUsize,
    set_calls: AtomicUsize,
    get_calls: AtomicUsize,
    query_calls: AtomicUsize,
    batch_delete_calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call sleeps this long before doing anything.
    pub fn set_delay(&self, delay: Duration) {
        self.faults.lock().delay = Some(delay);
    }

    /// Every subsequent call fails with `error` (after any delay).
    pub fn fail_with(&self, error: RemoteError) {
        self.faults.lock().error = Some(error);
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            add: self.add_calls.load(AtomicOrdering::SeqCst),
            set: self.set_calls.load(AtomicOrdering::SeqCst),
            get: self.get_calls.load(AtomicOrdering::SeqCst),
            query: self.query_calls.load(AtomicOrdering::SeqCst),
            batch_delete: self.batch_delete_calls.load(AtomicOrdering::SeqCst),
        }
    }

    /// Direct read that bypasses faults and counters.
    pub fn document(&self, doc: &RemotePath) -> Option<Map<String, Value>> {
        self.documents.lock().get(doc).cloned()
    }

    pub fn document_count(&self, collection: &RemotePath) -> usize {
        self.documents
            .lock()
            .keys()
            .filter(|path| path.parent().as_ref() == Some(collection))
            .count()
    }

    async fn enter(&self, counter: &AtomicUsize) -> RemoteResult<()> {
        counter.fetch_add(1, AtomicOrdering::SeqCst);
        let faults = self.faults.lock().clone();
        if let Some(delay) = faults.delay {
            tokio::time::sleep(delay).await;
        }
        match faults.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn add(&self, collection: &RemotePath, data: Map<String, Value>) -> RemoteResult<String> {
        self.enter(&self.add_calls).await?;
        ensure_collection(collection)?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        self.documents
            .lock()
            .insert(collection.clone().doc(id.clone()), data);
        Ok(id)
    }

    async fn set(&self, doc: &RemotePath, data: Map<String, Value>, options: SetOptions) -> RemoteResult<()> {
        self.enter(&self.set_calls).await?;
        ensure_document(doc)?;

        let mut documents = self.documents.lock();
        if options.merge {
            if let Some(existing) = documents.get_mut(doc) {
                deep_merge(existing, data);
                return Ok(());
            }
        }
        documents.insert(doc.clone(), data);
        Ok(())
    }

    async fn get(&self, doc: &RemotePath) -> RemoteResult<Option<Map<String, Value>>> {
        self.enter(&self.get_calls).await?;
        ensure_document(doc)?;
        Ok(self.documents.lock().get(doc).cloned())
    }

    async fn query(&self, collection: &RemotePath, query: &Query) -> RemoteResult<Vec<Document>> {
        self.enter(&self.query_calls).await?;
        ensure_collection(collection)?;

        let mut matches: Vec<Document> = self
            .documents
            .lock()
            .iter()
            .filter(|(path, _)| path.parent().as_ref() == Some(collection))
            .filter(|(_, data)| query.filters.iter().all(|f| matches_filter(data, f.op, &f.field, &f.value)))
            .map(|(path, data)| Document {
                path: path.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some((field, direction)) = &query.order_by {
            // Documents without the ordered field are excluded, as in the cloud store.
            matches.retain(|doc| doc.data.contains_key(field));
            matches.sort_by(|a, b| {
                let ord = compare_values(&a.data[field], &b.data[field]).unwrap_or(Ordering::Equal);
                match direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }

        Ok(matches)
    }

    async fn batch_delete(&self, docs: &[RemotePath]) -> RemoteResult<()> {
        self.enter(&self.batch_delete_calls).await?;
        for doc in docs {
            ensure_document(doc)?;
        }

        let mut documents = self.documents.lock();
        for doc in docs {
            documents.remove(doc);
        }
        Ok(())
    }
}

fn ensure_document(path: &RemotePath) -> RemoteResult<()> {
    if path.is_document() {
        Ok(())
    } else {
        Err(RemoteError::new("invalid-argument", format!("{path} is not a document path")))
    }
}

fn ensure_collection(path: &RemotePath) -> RemoteResult<()> {
    if path.is_document() || path.segments().is_empty() {
        Err(RemoteError::new("invalid-argument", format!("{path} is not a collection path")))
    } else {
        Ok(())
    }
}

fn deep_merge(target: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Object(nested) if matches!(target.get(&key), Some(Value::Object(_))) => {
                if let Some(Value::Object(existing)) = target.get_mut(&key) {
                    deep_merge(existing, nested);
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}

fn matches_filter(data: &Map<String, Value>, op: FilterOp, field: &str, expected: &Value) -> bool {
    let Some(actual) = data.get(field) else {
        return false;
    };
    match op {
        FilterOp::Eq => compare_values(actual, expected) == Some(Ordering::Equal),
        FilterOp::Gte => matches!(
            compare_values(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn merge_set_keeps_untouched_fields() {
        let store = MemoryRemoteStore::new();
        let doc = RemotePath::user_collection("u1", "vocabulary").doc("好");

        store
            .set(&doc, body(json!({"rating": "good", "pinyin": "hǎo"})), SetOptions::MERGE)
            .await
            .unwrap();
        store
            .set(&doc, body(json!({"bookmarked": true})), SetOptions::MERGE)
            .await
            .unwrap();

        let stored = store.document(&doc).unwrap();
        assert_eq!(stored["rating"], "good");
        assert_eq!(stored["bookmarked"], true);
    }

    #[tokio::test]
    async fn replace_set_drops_old_fields() {
        let store = MemoryRemoteStore::new();
        let doc = RemotePath::user_collection("u1", "settings").doc("goals");

        store.set(&doc, body(json!({"dailyWords": 5})), SetOptions::REPLACE).await.unwrap();
        store.set(&doc, body(json!({"dailyMinutes": 20})), SetOptions::REPLACE).await.unwrap();

        let stored = store.document(&doc).unwrap();
        assert!(!stored.contains_key("dailyWords"));
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryRemoteStore::new();
        let results = RemotePath::user_collection("u1", "results");
        for ts in [5, 1, 9, 3] {
            store.add(&results, body(json!({"timestamp": ts, "type": "quiz"}))).await.unwrap();
        }
        store
            .add(&RemotePath::user_collection("u2", "results"), body(json!({"timestamp": 100})))
            .await
            .unwrap();

        let docs = store
            .query(
                &results,
                &Query::new()
                    .where_gte("timestamp", 3)
                    .order_by("timestamp", Direction::Desc)
                    .limit(2),
            )
            .await
            .unwrap();

        let stamps: Vec<_> = docs.iter().map(|d| d.data["timestamp"].as_i64().unwrap()).collect();
        assert_eq!(stamps, vec![9, 5]);
    }

    #[tokio::test]
    async fn injected_failure_is_counted() {
        let store = MemoryRemoteStore::new();
        store.fail_with(RemoteError::permission_denied("rules"));

        let doc = RemotePath::collection("audio_cache").doc("abc");
        let err = store.get(&doc).await.unwrap_err();
        assert_eq!(err.code, "permission-denied");
        assert_eq!(store.calls().get, 1);

        store.clear_faults();
        assert!(store.get(&doc).await.unwrap().is_none());
        assert_eq!(store.calls().total(), 2);
    }

    #[tokio::test]
    async fn batch_delete_removes_documents() {
        let store = MemoryRemoteStore::new();
        let chat = RemotePath::user_collection("u1", "chat_history");
        let a = chat.clone().doc("a");
        let b = chat.clone().doc("b");
        store.set(&a, body(json!({"text": "a"})), SetOptions::REPLACE).await.unwrap();
        store.set(&b, body(json!({"text": "b"})), SetOptions::REPLACE).await.unwrap();

        store.batch_delete(&[a, b]).await.unwrap();
        assert_eq!(store.document_count(&chat), 0);
    }
}
