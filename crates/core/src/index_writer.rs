use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, PipelineError, StoreError};
use crate::models::ChunkRecord;
use crate::store::{UpsertBatch, VectorStore};
use tracing::{info, warn};

/// What a successful write reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertAck {
    pub collection: String,
    pub written: usize,
    /// False when the store could not flush; the data may then only live for
    /// this session.
    pub persisted: bool,
}

/// Embeds every chunk and writes the whole set as one add-or-replace batch.
///
/// Any embedding or write failure fails the call with nothing reported as
/// written, and so does a chunk id repeated within `chunks`. A failed flush
/// afterwards is only logged.
pub fn upsert_chunks<S, E>(
    store: &S,
    collection: &str,
    chunks: &[ChunkRecord],
    embedder: &E,
) -> Result<UpsertAck, PipelineError>
where
    S: VectorStore + ?Sized,
    E: Embedder + ?Sized,
{
    store.ensure_collection(collection, embedder.dimensions())?;

    if chunks.is_empty() {
        return Ok(UpsertAck {
            collection: collection.to_string(),
            written: 0,
            persisted: false,
        });
    }

    let texts = chunks
        .iter()
        .map(|chunk| chunk.text.clone())
        .collect::<Vec<_>>();
    let embeddings = embedder.encode(&texts)?;

    if embeddings.len() != chunks.len() {
        return Err(EmbeddingError::CountMismatch {
            expected: chunks.len(),
            actual: embeddings.len(),
        }
        .into());
    }

    let batch = UpsertBatch {
        ids: chunks.iter().map(|chunk| chunk.chunk_id.clone()).collect(),
        documents: texts,
        metadatas: chunks.iter().map(ChunkRecord::metadata).collect(),
        embeddings,
    };
    batch.check_columns().map_err(|details| StoreError::Write {
        collection: collection.to_string(),
        details,
    })?;
    store.upsert_batch(collection, &batch)?;

    let persisted = match store.persist(collection) {
        Ok(()) => true,
        Err(error) => {
            warn!(collection, %error, "vector store was not persisted");
            false
        }
    };

    info!(collection, written = batch.len(), persisted, "upserted chunks");
    Ok(UpsertAck {
        collection: collection.to_string(),
        written: batch.len(),
        persisted,
    })
}
