use crate::error::StoreError;
use crate::models::Metadata;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Fields a caller may ask a store to return alongside ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeField {
    Documents,
    Metadatas,
    Distances,
}

/// Column-oriented write payload; entry `i` of every column describes the
/// same record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertBatch {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub embeddings: Vec<Vec<f32>>,
}

impl UpsertBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn check_columns(&self) -> Result<(), String> {
        let expected = self.ids.len();
        let columns = [
            ("documents", self.documents.len()),
            ("metadatas", self.metadatas.len()),
            ("embeddings", self.embeddings.len()),
        ];
        for (column, actual) in columns {
            if actual != expected {
                return Err(format!("{column} has {actual} entries for {expected} ids"));
            }
        }

        let mut seen = HashSet::with_capacity(expected);
        if let Some(repeated) = self.ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(format!("id '{repeated}' appears more than once in the batch"));
        }
        Ok(())
    }
}

/// Raw nearest-neighbour answer in list-of-lists form, one inner list per
/// query vector. Any column may be missing or shorter than the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub ids: Option<Vec<Vec<String>>>,
    #[serde(default)]
    pub documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    pub distances: Option<Vec<Vec<f32>>>,
}

/// Capability surface every vector backend is adapted to. Backend quirks
/// (client construction, auto-created collections, missing persistence)
/// stay inside the implementations.
pub trait VectorStore {
    /// May return [`StoreError::Unsupported`] when the backend cannot list.
    fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        match self.list_collections() {
            Ok(names) => Ok(names.iter().any(|candidate| candidate == name)),
            Err(StoreError::Unsupported(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Creates the collection if it is absent.
    fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError>;

    /// Add-or-replace by id. The batch is applied entirely or not at all.
    fn upsert_batch(&self, name: &str, batch: &UpsertBatch) -> Result<(), StoreError>;

    /// Nearest neighbours of `query_vector`, closest first.
    fn query(
        &self,
        name: &str,
        query_vector: &[f32],
        n_results: usize,
        include: &[IncludeField],
    ) -> Result<QueryResponse, StoreError>;

    fn persist(&self, _name: &str) -> Result<(), StoreError> {
        Err(StoreError::PersistUnsupported)
    }

    /// Returns whether a collection was removed.
    fn drop_collection(&self, name: &str) -> Result<bool, StoreError>;
}

impl<S: VectorStore + ?Sized> VectorStore for Box<S> {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        (**self).list_collections()
    }

    fn has_collection(&self, name: &str) -> Result<bool, StoreError> {
        (**self).has_collection(name)
    }

    fn ensure_collection(&self, name: &str, dimensions: usize) -> Result<(), StoreError> {
        (**self).ensure_collection(name, dimensions)
    }

    fn upsert_batch(&self, name: &str, batch: &UpsertBatch) -> Result<(), StoreError> {
        (**self).upsert_batch(name, batch)
    }

    fn query(
        &self,
        name: &str,
        query_vector: &[f32],
        n_results: usize,
        include: &[IncludeField],
    ) -> Result<QueryResponse, StoreError> {
        (**self).query(name, query_vector, n_results, include)
    }

    fn persist(&self, name: &str) -> Result<(), StoreError> {
        (**self).persist(name)
    }

    fn drop_collection(&self, name: &str) -> Result<bool, StoreError> {
        (**self).drop_collection(name)
    }
}
