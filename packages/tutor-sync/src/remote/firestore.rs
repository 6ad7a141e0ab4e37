//! Cloud Firestore REST (v1) adapter.
//!
//! Documents are exchanged as JSON objects and translated to and from
//! Firestore's typed value encoding here. Error bodies are passed through as
//! `RemoteError { code: <status>, message }`, e.g. `PERMISSION_DENIED`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Number, Value};

use crate::auth::AuthProvider;
use crate::remote::{
    Direction, Document, Filter, FilterOp, Query, RemoteError, RemotePath, RemoteResult,
    RemoteStore, SetOptions,
};

/// Commit requests accept at most this many writes.
const MAX_WRITES_PER_COMMIT: usize = 500;

pub struct FirestoreRestStore {
    client: Client,
    base_url: String,
    project_id: String,
    auth: Arc<dyn AuthProvider>,
}

impl FirestoreRestStore {
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
    ) -> RemoteResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| RemoteError::new("internal", format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            auth,
        })
    }

    /// `projects/{p}/databases/(default)/documents`
    fn database_root(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn document_name(&self, path: &RemotePath) -> String {
        format!("{}/{}", self.database_root(), path)
    }

    fn url_for(&self, path: Option<&RemotePath>, suffix: &str) -> String {
        let mut url = format!("{}/{}", self.base_url, self.database_root());
        if let Some(path) = path {
            for segment in path.segments() {
                url.push('/');
                url.push_str(&urlencoding::encode(segment));
            }
        }
        url.push_str(suffix);
        url
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match self.auth.id_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn path_from_name(&self, name: &str) -> RemotePath {
        let relative = name
            .strip_prefix(&self.database_root())
            .unwrap_or(name)
            .trim_start_matches('/');
        let mut segments = relative.split('/');
        let mut path = RemotePath::collection(segments.next().unwrap_or_default());
        for segment in segments {
            path = path.child(segment);
        }
        path
    }
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<FirestoreDocument>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl RemoteStore for FirestoreRestStore {
    async fn add(&self, collection: &RemotePath, data: Map<String, Value>) -> RemoteResult<String> {
        let url = self.url_for(Some(collection), "");
        let body = json!({ "fields": encode_fields(&data) });
        let response = send(self.request(Method::POST, url).json(&body)).await?;
        let doc: FirestoreDocument = read_json(response).await?;
        Ok(self.path_from_name(&doc.name).id().to_string())
    }

    async fn set(&self, doc: &RemotePath, data: Map<String, Value>, options: SetOptions) -> RemoteResult<()> {
        let url = self.url_for(Some(doc), "");
        let mut request = self.request(Method::PATCH, url);
        if options.merge {
            let mask: Vec<(&str, &str)> = data
                .keys()
                .map(|key| ("updateMask.fieldPaths", key.as_str()))
                .collect();
            request = request.query(&mask);
        }
        let body = json!({ "fields": encode_fields(&data) });
        send(request.json(&body)).await?;
        Ok(())
    }

    async fn get(&self, doc: &RemotePath) -> RemoteResult<Option<Map<String, Value>>> {
        let url = self.url_for(Some(doc), "");
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let doc: FirestoreDocument = read_json(response).await?;
        Ok(Some(decode_fields(&doc.fields)))
    }

    async fn query(&self, collection: &RemotePath, query: &Query) -> RemoteResult<Vec<Document>> {
        let parent = collection.parent();
        let url = self.url_for(parent.as_ref(), ":runQuery");
        let body = json!({ "structuredQuery": structured_query(collection.id(), query) });

        let response = send(self.request(Method::POST, url).json(&body)).await?;
        let items: Vec<RunQueryItem> = read_json(response).await?;

        Ok(items
            .into_iter()
            .filter_map(|item| item.document)
            .map(|doc| Document {
                path: self.path_from_name(&doc.name),
                data: decode_fields(&doc.fields),
            })
            .collect())
    }

    async fn batch_delete(&self, docs: &[RemotePath]) -> RemoteResult<()> {
        for chunk in docs.chunks(MAX_WRITES_PER_COMMIT) {
            let writes: Vec<Value> = chunk
                .iter()
                .map(|doc| json!({ "delete": self.document_name(doc) }))
                .collect();
            let url = self.url_for(None, ":commit");
            send(self.request(Method::POST, url).json(&json!({ "writes": writes }))).await?;
        }
        Ok(())
    }
}

async fn send(request: RequestBuilder) -> RemoteResult<Response> {
    let response = request.send().await.map_err(transport_error)?;
    check_status(response).await
}

async fn check_status(response: Response) -> RemoteResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) if !envelope.error.status.is_empty() => {
            RemoteError::new(envelope.error.status, envelope.error.message)
        }
        _ => RemoteError::new(status.as_u16().to_string(), text),
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> RemoteResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| RemoteError::new("data-loss", format!("malformed response: {e}")))
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::new("deadline-exceeded", err.to_string())
    } else {
        RemoteError::unavailable(err.to_string())
    }
}

fn structured_query(collection_id: &str, query: &Query) -> Value {
    let mut structured = json!({ "from": [{ "collectionId": collection_id }] });

    let filters: Vec<Value> = query.filters.iter().map(field_filter).collect();
    match filters.len() {
        0 => {}
        1 => structured["where"] = filters.into_iter().next().unwrap_or(Value::Null),
        _ => {
            structured["where"] = json!({
                "compositeFilter": { "op": "AND", "filters": filters }
            })
        }
    }

    if let Some((field, direction)) = &query.order_by {
        let direction = match direction {
            Direction::Asc => "ASCENDING",
            Direction::Desc => "DESCENDING",
        };
        structured["orderBy"] = json!([{ "field": { "fieldPath": field }, "direction": direction }]);
    }

    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }

    structured
}

fn field_filter(filter: &Filter) -> Value {
    let op = match filter.op {
        FilterOp::Eq => "EQUAL",
        FilterOp::Gte => "GREATER_THAN_OR_EQUAL",
    };
    json!({
        "fieldFilter": {
            "field": { "fieldPath": filter.field },
            "op": op,
            "value": encode_value(&filter.value),
        }
    })
}

// ============================================================
// Typed value encoding
// ============================================================

pub(crate) fn encode_fields(data: &Map<String, Value>) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

pub(crate) fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub(crate) fn decode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}

pub(crate) fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|map| map.iter().next()) else {
        return Value::Null;
    };

    match kind.as_str() {
        "booleanValue" => inner.clone(),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        },
        "doubleValue" => inner
            .as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthHandle;

    fn store() -> FirestoreRestStore {
        FirestoreRestStore::new(
            "https://firestore.example.test/v1/",
            "demo-project",
            Arc::new(AuthHandle::signed_out()),
        )
        .unwrap()
    }

    #[test]
    fn values_survive_encoding() {
        let original = json!({
            "character": "你好",
            "lastReviewed": 1_700_000_000_000_i64,
            "bookmarked": true,
            "score": 0.5,
            "groundingUrls": [{ "uri": "https://a", "title": "A" }],
            "audio": null,
        });
        let map = original.as_object().unwrap();

        let encoded = encode_fields(map);
        assert_eq!(encoded["lastReviewed"], json!({ "integerValue": "1700000000000" }));
        assert_eq!(encoded["character"], json!({ "stringValue": "你好" }));

        assert_eq!(Value::Object(decode_fields(&encoded)), original);
    }

    #[test]
    fn structured_query_uses_composite_filter_for_many() {
        let query = Query::new()
            .where_eq("bookmarked", true)
            .where_eq("level", "HSK1")
            .order_by("lastReviewed", Direction::Desc)
            .limit(5);
        let structured = structured_query("vocabulary", &query);

        assert_eq!(structured["from"][0]["collectionId"], "vocabulary");
        assert_eq!(structured["where"]["compositeFilter"]["filters"].as_array().unwrap().len(), 2);
        assert_eq!(structured["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(structured["limit"], 5);
    }

    #[test]
    fn single_filter_is_a_field_filter() {
        let structured = structured_query("results", &Query::new().where_gte("timestamp", 10));
        assert_eq!(structured["where"]["fieldFilter"]["op"], "GREATER_THAN_OR_EQUAL");
        assert_eq!(structured["where"]["fieldFilter"]["value"], json!({ "integerValue": "10" }));
    }

    #[test]
    fn urls_are_percent_encoded_per_segment() {
        let store = store();
        let doc = RemotePath::user_collection("u1", "vocabulary").doc("你好");
        let url = store.url_for(Some(&doc), "");
        assert!(url.starts_with(
            "https://firestore.example.test/v1/projects/demo-project/databases/(default)/documents/users/u1/vocabulary/"
        ));
        assert!(url.ends_with("%E4%BD%A0%E5%A5%BD"));

        let top = store.url_for(None, ":commit");
        assert!(top.ends_with("/documents:commit"));
    }

    #[test]
    fn document_names_map_back_to_paths() {
        let store = store();
        let name = "projects/demo-project/databases/(default)/documents/users/u1/results/abc";
        let path = store.path_from_name(name);
        assert_eq!(path.to_string(), "users/u1/results/abc");
        assert!(path.is_document());
    }
}
