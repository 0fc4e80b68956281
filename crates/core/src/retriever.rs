use crate::error::StoreError;
use crate::models::Hit;
use crate::store::{IncludeField, QueryResponse, VectorStore};
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 3;

/// Ids are not requested: some backends reject them as an include field and
/// return them unasked anyway.
pub const QUERY_FIELDS: [IncludeField; 3] = [
    IncludeField::Metadatas,
    IncludeField::Documents,
    IncludeField::Distances,
];

/// Top-`k` hits for `query_vector`, in the store's own order.
pub fn retrieve<S>(
    store: &S,
    collection: &str,
    query_vector: &[f32],
    k: usize,
) -> Result<Vec<Hit>, StoreError>
where
    S: VectorStore + ?Sized,
{
    if !store.has_collection(collection)? {
        return Err(StoreError::CollectionNotFound(collection.to_string()));
    }

    if k == 0 {
        return Ok(Vec::new());
    }

    let response = store.query(collection, query_vector, k, &QUERY_FIELDS)?;
    let hits = normalize_hits(response, k);
    debug!(collection, k, returned = hits.len(), "retrieved hits");
    Ok(hits)
}

fn first_query<T>(column: Option<Vec<Vec<T>>>) -> Vec<T> {
    column
        .and_then(|per_query| per_query.into_iter().next())
        .unwrap_or_default()
}

/// Builds hits from a possibly ragged response. The document column decides
/// how many hits exist; every other field falls back to a default when its
/// column is missing or too short.
pub fn normalize_hits(response: QueryResponse, k: usize) -> Vec<Hit> {
    let documents = first_query(response.documents);
    let mut ids = first_query(response.ids).into_iter();
    let mut metadatas = first_query(response.metadatas).into_iter();
    let mut distances = first_query(response.distances).into_iter();

    documents
        .into_iter()
        .take(k)
        .map(|document| Hit {
            id: ids.next(),
            text: document.unwrap_or_default(),
            metadata: metadatas.next().flatten().unwrap_or_default(),
            distance: distances.next(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;
    use crate::store::UpsertBatch;
    use crate::stores::LocalVectorStore;
    use serde_json::Value;

    #[test]
    fn short_metadata_column_defaults_to_empty() {
        let response = QueryResponse {
            ids: None,
            documents: Some(vec![vec![Some("a".to_string()), Some("b".to_string())]]),
            metadatas: Some(vec![vec![Some(Metadata::new())]]),
            distances: Some(vec![vec![0.1, 0.2]]),
        };

        let hits = normalize_hits(response, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].text, "b");
        assert!(hits[1].metadata.is_empty());
        assert_eq!(hits[1].distance, Some(0.2));
        assert_eq!(hits[0].id, None);
    }

    #[test]
    fn missing_columns_never_panic() {
        let response = QueryResponse {
            documents: Some(vec![vec![None, Some("x".to_string())]]),
            ..QueryResponse::default()
        };
        let hits = normalize_hits(response, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "");
        assert_eq!(hits[1].distance, None);

        assert!(normalize_hits(QueryResponse::default(), 3).is_empty());
        let empty_outer = QueryResponse {
            documents: Some(Vec::new()),
            ..QueryResponse::default()
        };
        assert!(normalize_hits(empty_outer, 3).is_empty());
    }

    #[test]
    fn store_order_is_kept_and_k_bounds_output() {
        let response = QueryResponse {
            ids: Some(vec![vec!["c".to_string(), "a".to_string(), "b".to_string()]]),
            documents: Some(vec![vec![
                Some("third".to_string()),
                Some("first".to_string()),
                Some("second".to_string()),
            ]]),
            metadatas: None,
            distances: Some(vec![vec![0.9, 0.1, 0.5]]),
        };

        let hits = normalize_hits(response, 2);
        let ids: Vec<_> = hits.iter().map(|hit| hit.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("c"), Some("a")]);
    }

    fn two_vector_store() -> Result<LocalVectorStore, StoreError> {
        let store = LocalVectorStore::in_memory();
        store.ensure_collection("kb", 2)?;
        let mut metadata = Metadata::new();
        metadata.insert("page".to_string(), Value::from(1));
        store.upsert_batch(
            "kb",
            &UpsertBatch {
                ids: vec!["doc_p1_c0".to_string(), "doc_p1_c1".to_string()],
                documents: vec!["north".to_string(), "east".to_string()],
                metadatas: vec![metadata.clone(), metadata],
                embeddings: vec![vec![0.0, 1.0], vec![1.0, 0.0]],
            },
        )?;
        Ok(store)
    }

    #[test]
    fn asking_for_more_than_available_returns_what_exists() -> Result<(), StoreError> {
        let store = two_vector_store()?;
        let hits = retrieve(&store, "kb", &[1.0, 0.1], 5)?;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id.as_deref(), Some("doc_p1_c1"));
        assert_eq!(hits[0].page(), Some(1));
        assert!(hits[0].distance <= hits[1].distance);
        Ok(())
    }

    #[test]
    fn missing_collection_names_the_collection() {
        let store = LocalVectorStore::in_memory();
        let error = retrieve(&store, "kb_collection", &[1.0, 0.0], 3).unwrap_err();

        assert!(matches!(&error, StoreError::CollectionNotFound(name) if name == "kb_collection"));
        let message = error.to_string();
        assert!(message.contains("kb_collection"));
        assert!(message.contains("Run ingestion first"));
    }

    #[test]
    fn zero_k_returns_no_hits() -> Result<(), StoreError> {
        let store = two_vector_store()?;
        assert!(retrieve(&store, "kb", &[1.0, 0.0], 0)?.is_empty());
        Ok(())
    }
}
