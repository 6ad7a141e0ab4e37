//! Cloud document store port.
//!
//! Documents live at slash-separated paths: an odd number of segments names a
//! collection, an even number names a document. Per-user data sits under
//! `users/{uid}/…`; the shared audio cache is the top-level `audio_cache`
//! collection. Adapters report failures as raw [`RemoteError`]s; deciding
//! what a failure means is left to the coordinator.

pub mod firestore;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use firestore::FirestoreRestStore;
pub use memory::MemoryRemoteStore;

pub const USERS: &str = "users";
pub const AUDIO_CACHE: &str = "audio_cache";

/// Error exactly as the backend reported it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RemoteError {
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new("permission-denied", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("unavailable", message)
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

// ============================================================
// Paths
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemotePath {
    segments: Vec<String>,
}

impl RemotePath {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// `users/{uid}/{name}`
    pub fn user_collection(uid: &str, name: &str) -> Self {
        Self::collection(USERS).doc(uid).child(name)
    }

    pub fn doc(mut self, id: impl Into<String>) -> Self {
        self.segments.push(id.into());
        self
    }

    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.segments.push(name.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_document(&self) -> bool {
        !self.segments.is_empty() && self.segments.len() % 2 == 0
    }

    /// Last segment: document id or collection id.
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<RemotePath> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

// ============================================================
// Documents and queries
// ============================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: RemotePath,
    pub data: Map<String, Value>,
}

impl Document {
    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> RemoteResult<T> {
        serde_json::from_value(Value::Object(self.data.clone())).map_err(|e| {
            RemoteError::new("data-loss", format!("malformed document {}: {e}", self.path))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetOptions {
    /// Merge top-level fields into the existing document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub const REPLACE: SetOptions = SetOptions { merge: false };
    pub const MERGE: SetOptions = SetOptions { merge: true };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    pub fn where_gte(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.to_string(),
            op: FilterOp::Gte,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some((field.to_string(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ============================================================
// Port
// ============================================================

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates a document with a generated id and returns that id.
    async fn add(&self, collection: &RemotePath, data: Map<String, Value>) -> RemoteResult<String>;

    async fn set(&self, doc: &RemotePath, data: Map<String, Value>, options: SetOptions) -> RemoteResult<()>;

    async fn get(&self, doc: &RemotePath) -> RemoteResult<Option<Map<String, Value>>>;

    async fn query(&self, collection: &RemotePath, query: &Query) -> RemoteResult<Vec<Document>>;

    async fn batch_delete(&self, docs: &[RemotePath]) -> RemoteResult<()>;
}

/// Serializes a record into a document body.
pub fn to_document<T: serde::Serialize>(value: &T) -> RemoteResult<Map<String, Value>> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RemoteError::new(
            "invalid-argument",
            format!("document body must be an object, got {other}"),
        )),
        Err(e) => Err(RemoteError::new("invalid-argument", e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_paths_alternate_collection_and_doc() {
        let collection = RemotePath::user_collection("u1", "vocabulary");
        assert_eq!(collection.to_string(), "users/u1/vocabulary");
        assert!(!collection.is_document());

        let doc = collection.clone().doc("你好");
        assert!(doc.is_document());
        assert_eq!(doc.id(), "你好");
        assert_eq!(doc.parent(), Some(collection));
    }

    #[test]
    fn to_document_rejects_non_objects() {
        assert!(to_document(&3).is_err());
        let map = to_document(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(map["a"], 1);
    }
}
