use crate::models::Metadata;
use crate::store::{IncludeField, QueryResponse, UpsertBatch, VectorStore};
use crate::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

const BACKEND: &str = "local";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    document: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Collection {
    name: String,
    dimensions: usize,
    updated_at: DateTime<Utc>,
    records: BTreeMap<String, StoredRecord>,
}

/// Brute-force cosine store keeping every collection in memory. When opened
/// on a directory, `persist` writes one `<collection>.json` file there.
pub struct LocalVectorStore {
    root: Option<PathBuf>,
    collections: RwLock<BTreeMap<String, Collection>>,
}

impl LocalVectorStore {
    pub fn in_memory() -> Self {
        Self {
            root: None,
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut collections = BTreeMap::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "json");
            if !is_json {
                continue;
            }

            let loaded = fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<Collection>(&bytes)?));
            let collection = match loaded {
                Ok(collection) => collection,
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping unreadable collection file");
                    continue;
                }
            };
            debug!(
                collection = %collection.name,
                records = collection.records.len(),
                "loaded collection"
            );
            collections.insert(collection.name.clone(), collection);
        }

        Ok(Self {
            root: Some(root),
            collections: RwLock::new(collections),
        })
    }

    /// Opens a persistent store, degrading to a memory-only one when the
    /// directory cannot be used. Writes then succeed but `persist` reports
    /// [`StoreError::PersistUnsupported`].
    pub fn open_or_in_memory(root: impl AsRef<Path>) -> Self {
        match Self::open(root.as_ref()) {
            Ok(store) => {
                info!(path = %root.as_ref().display(), "opened persistent vector store");
                store
            }
            Err(error) => {
                warn!(
                    path = %root.as_ref().display(),
                    %error,
                    "persistent store unavailable, falling back to in-memory store"
                );
                Self::in_memory()
            }
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.root.is_some()
    }

    pub fn len(&self, name: &str) -> Result<usize, StoreError> {
        let collections = self.read()?;
        collections
            .get(name)
            .map(|collection| collection.records.len())
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Collection>>, StoreError> {
        self.collections
            .read()
            .map_err(|_| StoreError::Unavailable("collection lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Collection>>, StoreError> {
        self.collections
            .write()
            .map_err(|_| StoreError::Unavailable("collection lock poisoned".to_string()))
    }

    fn collection_path(root: &Path, name: &str) -> PathBuf {
        root.join(format!("{name}.json"))
    }
}

fn validate_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::Write {
            collection: name.to_string(),
            details: "collection names may only contain ascii letters, digits, '_', '-' and '.'"
                .to_string(),
        })
    }
}

fn cosine_distance(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 1.0;
    }
    1.0 - dot / (left_norm * right_norm)
}

impl VectorStore for LocalVectorStore {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read()?.keys().cloned().collect())
    }

    fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError> {
        validate_name(name)?;
        let mut collections = self.write()?;

        if let Some(existing) = collections.get(name) {
            if existing.dimensions != dimensions {
                return Err(StoreError::Write {
                    collection: name.to_string(),
                    details: format!(
                        "collection has dimension {}, requested {dimensions}",
                        existing.dimensions
                    ),
                });
            }
            return Ok(());
        }

        collections.insert(
            name.to_string(),
            Collection {
                name: name.to_string(),
                dimensions,
                updated_at: Utc::now(),
                records: BTreeMap::new(),
            },
        );
        info!(collection = name, dimensions, "created collection");
        Ok(())
    }

    fn upsert_batch(&self, name: &str, batch: &UpsertBatch) -> Result<(), StoreError> {
        batch.check_columns().map_err(|details| StoreError::Write {
            collection: name.to_string(),
            details,
        })?;

        let mut collections = self.write()?;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        if let Some((id, embedding)) = batch
            .ids
            .iter()
            .zip(&batch.embeddings)
            .find(|(_, embedding)| embedding.len() != collection.dimensions)
        {
            return Err(StoreError::Write {
                collection: name.to_string(),
                details: format!(
                    "embedding for '{id}' has dimension {}, expected {}",
                    embedding.len(),
                    collection.dimensions
                ),
            });
        }

        for (index, id) in batch.ids.iter().enumerate() {
            collection.records.insert(
                id.clone(),
                StoredRecord {
                    document: batch.documents[index].clone(),
                    metadata: batch.metadatas[index].clone(),
                    embedding: batch.embeddings[index].clone(),
                },
            );
        }
        collection.updated_at = Utc::now();
        Ok(())
    }

    fn query(
        &self,
        name: &str,
        query_vector: &[f32],
        n_results: usize,
        include: &[IncludeField],
    ) -> Result<QueryResponse, StoreError> {
        let collections = self.read()?;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        if query_vector.len() != collection.dimensions {
            return Err(StoreError::BackendResponse {
                backend: BACKEND.to_string(),
                details: format!(
                    "query vector dim {} is not {}",
                    query_vector.len(),
                    collection.dimensions
                ),
            });
        }

        let mut ranked = collection
            .records
            .iter()
            .map(|(id, record)| (id, record, cosine_distance(query_vector, &record.embedding)))
            .collect::<Vec<_>>();
        ranked.sort_by(|left, right| left.2.total_cmp(&right.2));
        ranked.truncate(n_results);

        let wants = |field: IncludeField| include.contains(&field);

        Ok(QueryResponse {
            ids: Some(vec![ranked.iter().map(|(id, _, _)| (*id).clone()).collect()]),
            documents: wants(IncludeField::Documents).then(|| {
                vec![ranked
                    .iter()
                    .map(|(_, record, _)| Some(record.document.clone()))
                    .collect()]
            }),
            metadatas: wants(IncludeField::Metadatas).then(|| {
                vec![ranked
                    .iter()
                    .map(|(_, record, _)| Some(record.metadata.clone()))
                    .collect()]
            }),
            distances: wants(IncludeField::Distances)
                .then(|| vec![ranked.iter().map(|(_, _, distance)| *distance).collect()]),
        })
    }

    fn persist(&self, name: &str) -> Result<(), StoreError> {
        let root = self.root.as_ref().ok_or(StoreError::PersistUnsupported)?;
        let collections = self.read()?;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;

        let persist_error = |error: &dyn std::fmt::Display| StoreError::Persist {
            collection: name.to_string(),
            details: error.to_string(),
        };

        let target = Self::collection_path(root, name);
        let staging = root.join(format!(".{name}.json.tmp"));
        let payload = serde_json::to_vec(collection).map_err(|error| persist_error(&error))?;
        fs::write(&staging, payload).map_err(|error| persist_error(&error))?;
        fs::rename(&staging, &target).map_err(|error| persist_error(&error))?;

        debug!(collection = name, path = %target.display(), "persisted collection");
        Ok(())
    }

    fn drop_collection(&self, name: &str) -> Result<bool, StoreError> {
        let removed = self.write()?.remove(name).is_some();

        if let Some(root) = &self.root {
            let path = Self::collection_path(root, name);
            if path.exists() {
                fs::remove_file(&path)?;
                return Ok(true);
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::tempdir;

    const ALL: [IncludeField; 3] = [
        IncludeField::Documents,
        IncludeField::Metadatas,
        IncludeField::Distances,
    ];

    fn batch(entries: &[(&str, &str, [f32; 2])]) -> UpsertBatch {
        let mut batch = UpsertBatch::default();
        for (id, text, vector) in entries {
            let mut metadata = Metadata::new();
            metadata.insert("source".to_string(), Value::from(format!("{id}.pdf")));
            batch.ids.push(id.to_string());
            batch.documents.push(text.to_string());
            batch.metadatas.push(metadata);
            batch.embeddings.push(vector.to_vec());
        }
        batch
    }

    #[test]
    fn query_ranks_closest_first() -> Result<(), StoreError> {
        let store = LocalVectorStore::in_memory();
        store.ensure_collection("kb", 2)?;
        store.upsert_batch(
            "kb",
            &batch(&[
                ("far", "far text", [-1.0, 0.0]),
                ("near", "near text", [1.0, 0.1]),
                ("mid", "mid text", [0.0, 1.0]),
            ]),
        )?;

        let response = store.query("kb", &[1.0, 0.0], 2, &ALL)?;
        assert_eq!(
            response.ids,
            Some(vec![vec!["near".to_string(), "mid".to_string()]])
        );
        let distances = &response.distances.unwrap()[0];
        assert!(distances[0] <= distances[1]);
        Ok(())
    }

    #[test]
    fn upsert_replaces_existing_ids() -> Result<(), StoreError> {
        let store = LocalVectorStore::in_memory();
        store.ensure_collection("kb", 2)?;
        store.upsert_batch("kb", &batch(&[("a", "old", [1.0, 0.0])]))?;
        store.upsert_batch("kb", &batch(&[("a", "new", [1.0, 0.0])]))?;

        assert_eq!(store.len("kb")?, 1);
        let response = store.query("kb", &[1.0, 0.0], 5, &ALL)?;
        assert_eq!(response.documents, Some(vec![vec![Some("new".to_string())]]));
        Ok(())
    }

    #[test]
    fn dimension_mismatch_rejects_whole_batch() -> Result<(), StoreError> {
        let store = LocalVectorStore::in_memory();
        store.ensure_collection("kb", 2)?;
        let mut bad = batch(&[("a", "ok", [1.0, 0.0]), ("b", "bad", [0.0, 1.0])]);
        bad.embeddings[1] = vec![1.0, 2.0, 3.0];

        let result = store.upsert_batch("kb", &bad);
        assert!(matches!(result, Err(StoreError::Write { .. })));
        assert_eq!(store.len("kb")?, 0);
        Ok(())
    }

    #[test]
    fn excluded_fields_are_absent() -> Result<(), StoreError> {
        let store = LocalVectorStore::in_memory();
        store.ensure_collection("kb", 2)?;
        store.upsert_batch("kb", &batch(&[("a", "text", [1.0, 0.0])]))?;

        let response = store.query("kb", &[1.0, 0.0], 1, &[IncludeField::Documents])?;
        assert!(response.documents.is_some());
        assert!(response.metadatas.is_none());
        assert!(response.distances.is_none());
        Ok(())
    }

    #[test]
    fn missing_collection_is_not_found() {
        let store = LocalVectorStore::in_memory();
        let result = store.query("absent", &[1.0, 0.0], 1, &ALL);
        assert!(matches!(result, Err(StoreError::CollectionNotFound(name)) if name == "absent"));
    }

    #[test]
    fn in_memory_store_cannot_persist() -> Result<(), StoreError> {
        let store = LocalVectorStore::in_memory();
        store.ensure_collection("kb", 2)?;
        assert!(matches!(store.persist("kb"), Err(StoreError::PersistUnsupported)));
        Ok(())
    }

    #[test]
    fn persisted_collection_survives_reopen() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let store = LocalVectorStore::open(dir.path())?;
            store.ensure_collection("kb", 2)?;
            store.upsert_batch("kb", &batch(&[("a", "kept", [0.5, 0.5])]))?;
            store.persist("kb")?;
        }

        let reopened = LocalVectorStore::open(dir.path())?;
        assert_eq!(reopened.list_collections()?, vec!["kb".to_string()]);
        assert_eq!(reopened.len("kb")?, 1);
        Ok(())
    }

    #[test]
    fn drop_collection_removes_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path())?;
        store.ensure_collection("kb", 2)?;
        store.persist("kb")?;
        assert!(dir.path().join("kb.json").exists());

        assert!(store.drop_collection("kb")?);
        assert!(!dir.path().join("kb.json").exists());
        assert!(!store.has_collection("kb")?);
        assert!(!store.drop_collection("kb")?);
        Ok(())
    }

    #[test]
    fn unusable_directory_falls_back_to_memory() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"not a directory")?;

        let store = LocalVectorStore::open_or_in_memory(blocker.join("store"));
        assert!(!store.is_persistent());
        Ok(())
    }

    #[test]
    fn invalid_collection_names_are_rejected() {
        let store = LocalVectorStore::in_memory();
        assert!(store.ensure_collection("../escape", 2).is_err());
        assert!(store.ensure_collection("", 2).is_err());
    }

    #[test]
    fn unreadable_collection_file_does_not_hide_the_others() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        {
            let store = LocalVectorStore::open(dir.path())?;
            store.ensure_collection("kb", 2)?;
            store.upsert_batch("kb", &batch(&[("a", "alpha", [1.0, 0.0])]))?;
            store.persist("kb")?;
        }
        fs::write(dir.path().join("broken.json"), b"{ not a collection")?;

        let store = LocalVectorStore::open(dir.path())?;
        assert!(store.is_persistent());
        assert_eq!(store.list_collections()?, vec!["kb".to_string()]);
        assert_eq!(store.len("kb")?, 1);
        Ok(())
    }
}
