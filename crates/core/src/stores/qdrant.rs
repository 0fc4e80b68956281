use crate::models::Metadata;
use crate::store::{IncludeField, QueryResponse, UpsertBatch, VectorStore};
use crate::StoreError;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;
use url::Url;
use uuid::Uuid;

const BACKEND: &str = "qdrant";

/// Qdrant over its REST API. Point ids are UUIDs derived from the chunk id,
/// the chunk id itself travels in the payload.
pub struct QdrantStore {
    endpoint: Url,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: &str) -> Result<Self, StoreError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            client: Client::new(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Unavailable(format!("{} cannot be a base url", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn collection_url(&self, name: &str) -> Result<Url, StoreError> {
        self.url(&["collections", name])
    }

    fn point_url(&self, name: &str, action: Option<&str>) -> Result<Url, StoreError> {
        match action {
            Some(action) => self.url(&["collections", name, "points", action]),
            None => self.url(&["collections", name, "points"]),
        }
    }
}

pub fn point_id(chunk_id: &str) -> Uuid {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn backend_error(response: Response) -> StoreError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    StoreError::BackendResponse {
        backend: BACKEND.to_string(),
        details: format!("{status}: {body}"),
    }
}

fn hits_to_response(hits: &[Value], include: &[IncludeField]) -> QueryResponse {
    let wants = |field: IncludeField| include.contains(&field);

    let ids = hits
        .iter()
        .filter_map(|hit| hit.pointer("/payload/chunk_id").and_then(Value::as_str))
        .map(str::to_string)
        .collect::<Vec<_>>();
    let documents = hits
        .iter()
        .map(|hit| {
            hit.pointer("/payload/document")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect::<Vec<_>>();
    let metadatas = hits
        .iter()
        .map(|hit| {
            hit.pointer("/payload/metadata")
                .and_then(Value::as_object)
                .cloned()
        })
        .collect::<Vec<Option<Metadata>>>();
    let distances = hits
        .iter()
        .map(|hit| {
            hit.pointer("/score")
                .and_then(Value::as_f64)
                .map(|score| (1.0 - score) as f32)
        })
        .collect::<Option<Vec<_>>>();

    QueryResponse {
        // partial columns would misalign with the documents
        ids: (ids.len() == hits.len()).then(|| vec![ids]),
        documents: wants(IncludeField::Documents).then(|| vec![documents]),
        metadatas: wants(IncludeField::Metadatas).then(|| vec![metadatas]),
        distances: distances
            .filter(|_| wants(IncludeField::Distances))
            .map(|column| vec![column]),
    }
}

impl VectorStore for QdrantStore {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let response = self.client.get(self.url(&["collections"])?).send()?;
        if !response.status().is_success() {
            return Err(backend_error(response));
        }

        let parsed: Value = response.json()?;
        Ok(parsed
            .pointer("/result/collections")
            .and_then(Value::as_array)
            .map(|collections| {
                collections
                    .iter()
                    .filter_map(|collection| collection.pointer("/name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        let response = self.client.get(self.collection_url(name)?).send()?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(backend_error(response)),
        }
    }

    fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError> {
        if self.has_collection(name)? {
            return Ok(());
        }

        let response = self
            .client
            .put(self.collection_url(name)?)
            .json(&json!({
                "vectors": { "size": dimensions, "distance": "Cosine" }
            }))
            .send()?;

        // another writer may have created it in the meantime
        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            info!(collection = name, dimensions, "created qdrant collection");
            return Ok(());
        }

        Err(backend_error(response))
    }

    fn upsert_batch(&self, name: &str, batch: &UpsertBatch) -> Result<(), StoreError> {
        batch.check_columns().map_err(|details| StoreError::Write {
            collection: name.to_string(),
            details,
        })?;

        if batch.is_empty() {
            return Ok(());
        }

        let points = (0..batch.len())
            .map(|index| {
                json!({
                    "id": point_id(&batch.ids[index]).to_string(),
                    "vector": batch.embeddings[index],
                    "payload": {
                        "chunk_id": batch.ids[index],
                        "document": batch.documents[index],
                        "metadata": batch.metadatas[index],
                    },
                })
            })
            .collect::<Vec<_>>();

        let mut url = self.point_url(name, None)?;
        url.query_pairs_mut().append_pair("wait", "true");
        let response = self
            .client
            .put(url)
            .json(&json!({ "points": points }))
            .send()?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StoreError::CollectionNotFound(name.to_string())),
            _ => {
                let status = response.status();
                let body = response.text().unwrap_or_default();
                Err(StoreError::Write {
                    collection: name.to_string(),
                    details: format!("{status}: {body}"),
                })
            }
        }
    }

    fn query(
        &self,
        name: &str,
        query_vector: &[f32],
        n_results: usize,
        include: &[IncludeField],
    ) -> Result<QueryResponse, StoreError> {
        let response = self
            .client
            .post(self.point_url(name, Some("search"))?)
            .json(&json!({
                "vector": query_vector,
                "limit": n_results,
                "with_payload": true,
            }))
            .send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StoreError::CollectionNotFound(name.to_string()));
        }
        if !response.status().is_success() {
            return Err(backend_error(response));
        }

        let parsed: Value = response.json()?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits_to_response(&hits, include))
    }

    /// Upserts are sent with `wait=true`, so acknowledged points are already
    /// durable.
    fn persist(&self, _name: &str) -> Result<(), StoreError> {
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<bool, StoreError> {
        let response = self.client.delete(self.collection_url(name)?).send()?;
        match response.status() {
            status if status.is_success() => {
                let parsed: Value = response.json()?;
                Ok(parsed.pointer("/result").and_then(Value::as_bool).unwrap_or(true))
            }
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(backend_error(response)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_per_chunk() {
        assert_eq!(point_id("doc_p1_c0"), point_id("doc_p1_c0"));
        assert_ne!(point_id("doc_p1_c0"), point_id("doc_p1_c1"));
    }

    #[test]
    fn urls_are_built_under_the_endpoint() -> Result<(), StoreError> {
        let store = QdrantStore::new("http://localhost:6333/")?;
        assert_eq!(
            store.collection_url("kb")?.as_str(),
            "http://localhost:6333/collections/kb"
        );
        assert_eq!(
            store.point_url("kb", Some("search"))?.as_str(),
            "http://localhost:6333/collections/kb/points/search"
        );
        Ok(())
    }

    #[test]
    fn search_hits_become_columns() {
        let hits = vec![
            json!({
                "id": "x",
                "score": 0.75,
                "payload": {
                    "chunk_id": "doc_p1_c0",
                    "document": "first",
                    "metadata": { "page": 1, "source": "doc.pdf" }
                }
            }),
            json!({ "id": "y", "score": 0.5, "payload": { "document": "second" } }),
        ];
        let response = hits_to_response(
            &hits,
            &[IncludeField::Documents, IncludeField::Metadatas, IncludeField::Distances],
        );

        assert!(response.ids.is_none());
        assert_eq!(
            response.documents,
            Some(vec![vec![Some("first".to_string()), Some("second".to_string())]])
        );
        let metadatas = response.metadatas.unwrap();
        assert!(metadatas[0][0].is_some());
        assert!(metadatas[0][1].is_none());
        assert_eq!(response.distances, Some(vec![vec![0.25, 0.5]]));
    }
}
