//! Qdrant vector store over its REST API.

use async_trait::async_trait;
use reqwest::StatusCode;
use scry_core::{PointPayload, ScryError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Condition, Filter, Point, ScoredPoint, ScrollPage, StoredPoint, VectorStore};

/// [`VectorStore`] backed by a Qdrant server.
///
/// # Examples
///
/// ```
/// use scry_index::vector::QdrantStore;
///
/// let store = QdrantStore::new("http://localhost:6333/", None);
/// assert_eq!(store.url(), "http://localhost:6333");
/// ```
pub struct QdrantStore {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct RawPoint {
    id: Value,
    #[serde(default)]
    score: Option<f64>,
    payload: Option<PointPayload>,
}

#[derive(Deserialize)]
struct RawScroll {
    points: Vec<RawPoint>,
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct RawCount {
    count: usize,
}

impl QdrantStore {
    pub fn new(url: &str, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{path}", self.url));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    /// Send a request, mapping 404 to [`ScryError::CollectionNotFound`].
    async fn send<T: DeserializeOwned>(
        &self,
        collection: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ScryError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ScryError::VectorStore(format!("Qdrant request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ScryError::CollectionNotFound(collection.to_string()));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read response body".into());
            return Err(ScryError::VectorStore(format!(
                "Qdrant returned {status}: {body}"
            )));
        }

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| ScryError::VectorStore(format!("failed to parse Qdrant response: {e}")))?;
        Ok(envelope.result)
    }
}

fn filter_json(filter: &Filter) -> Value {
    let conditions = |cs: &[Condition]| -> Vec<Value> {
        cs.iter()
            .map(|c| json!({ "key": c.field.key(), "match": { "value": c.value } }))
            .collect()
    };
    let mut body = serde_json::Map::new();
    if !filter.must_conditions().is_empty() {
        body.insert("must".into(), Value::Array(conditions(filter.must_conditions())));
    }
    if !filter.should_conditions().is_empty() {
        body.insert(
            "should".into(),
            Value::Array(conditions(filter.should_conditions())),
        );
    }
    Value::Object(body)
}

fn id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn payload_of(point: &RawPoint) -> Result<PointPayload, ScryError> {
    point.payload.clone().ok_or_else(|| {
        ScryError::VectorStore(format!("point {} returned without payload", id_string(&point.id)))
    })
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), ScryError> {
        if self.collection_exists(name).await? {
            return Ok(());
        }
        let body = json!({ "vectors": { "size": dimensions, "distance": "Cosine" } });
        let _: Value = self
            .send(
                name,
                self.request(reqwest::Method::PUT, &format!("/collections/{name}"))
                    .json(&body),
            )
            .await?;
        tracing::debug!(collection = name, dimensions, "created Qdrant collection");
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, ScryError> {
        let result: Result<Value, ScryError> = self
            .send(
                name,
                self.request(reqwest::Method::GET, &format!("/collections/{name}")),
            )
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(ScryError::CollectionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn upsert(&self, name: &str, points: &[Point]) -> Result<(), ScryError> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<Value> = points
            .iter()
            .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
            .collect();
        let _: Value = self
            .send(
                name,
                self.request(
                    reqwest::Method::PUT,
                    &format!("/collections/{name}/points?wait=true"),
                )
                .json(&json!({ "points": points })),
            )
            .await?;
        Ok(())
    }

    async fn delete_by_ids(&self, name: &str, ids: &[String]) -> Result<(), ScryError> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: Value = self
            .send(
                name,
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{name}/points/delete?wait=true"),
                )
                .json(&json!({ "points": ids })),
            )
            .await?;
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        limit: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<ScoredPoint>, ScryError> {
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(filter) = filter {
            body["filter"] = filter_json(filter);
        }

        let raw: Vec<RawPoint> = self
            .send(
                name,
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{name}/points/search"),
                )
                .json(&body),
            )
            .await?;

        raw.iter()
            .map(|p| {
                Ok(ScoredPoint {
                    id: id_string(&p.id),
                    score: p.score.unwrap_or_default(),
                    payload: payload_of(p)?,
                })
            })
            .collect()
    }

    async fn scroll(
        &self,
        name: &str,
        limit: usize,
        cursor: Option<&str>,
        filter: Option<&Filter>,
    ) -> Result<ScrollPage, ScryError> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(cursor) = cursor {
            body["offset"] = Value::String(cursor.to_string());
        }
        if let Some(filter) = filter {
            body["filter"] = filter_json(filter);
        }

        let raw: RawScroll = self
            .send(
                name,
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{name}/points/scroll"),
                )
                .json(&body),
            )
            .await?;

        let points = raw
            .points
            .iter()
            .map(|p| {
                Ok(StoredPoint {
                    id: id_string(&p.id),
                    payload: payload_of(p)?,
                })
            })
            .collect::<Result<Vec<_>, ScryError>>()?;

        Ok(ScrollPage {
            points,
            next_cursor: raw
                .next_page_offset
                .filter(|v| !v.is_null())
                .map(|v| id_string(&v)),
        })
    }

    async fn count(&self, name: &str, filter: Option<&Filter>) -> Result<usize, ScryError> {
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = filter_json(filter);
        }
        let raw: RawCount = self
            .send(
                name,
                self.request(
                    reqwest::Method::POST,
                    &format!("/collections/{name}/points/count"),
                )
                .json(&body),
            )
            .await?;
        Ok(raw.count)
    }

    async fn drop_collection(&self, name: &str) -> Result<(), ScryError> {
        let result: Result<Value, ScryError> = self
            .send(
                name,
                self.request(reqwest::Method::DELETE, &format!("/collections/{name}")),
            )
            .await;
        match result {
            Ok(_) | Err(ScryError::CollectionNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
