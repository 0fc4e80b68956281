use crate::embeddings::Embedder;
use crate::error::PipelineError;
use crate::extractor::PdfExtractor;
use crate::generator::{answer_or_fallback, Generator};
use crate::index_writer::{upsert_chunks, UpsertAck};
use crate::ingest::DocumentIngestor;
use crate::models::{Answer, ChunkRecord, Hit};
use crate::retriever::retrieve;
use crate::store::VectorStore;
use std::path::Path;

/// Ingest and question-answering entry points over a borrowed store and
/// embedder. Whoever builds the pipeline owns both and decides their
/// lifetime.
pub struct QaPipeline<'a, S: ?Sized, E: ?Sized> {
    store: &'a S,
    embedder: &'a E,
    collection: String,
}

impl<'a, S, E> QaPipeline<'a, S, E>
where
    S: VectorStore + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(store: &'a S, embedder: &'a E, collection: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn index(&self, chunks: &[ChunkRecord]) -> Result<UpsertAck, PipelineError> {
        upsert_chunks(self.store, &self.collection, chunks, self.embedder)
    }

    /// extract, chunk, embed, upsert for one document.
    pub fn ingest_document<X: PdfExtractor>(
        &self,
        ingestor: &DocumentIngestor<X>,
        path: &Path,
        doc_id: Option<&str>,
    ) -> Result<UpsertAck, PipelineError> {
        let chunks = ingestor.ingest(path, doc_id)?;
        self.index(&chunks)
    }

    pub fn retrieve(&self, question: &str, k: usize) -> Result<Vec<Hit>, PipelineError> {
        let query_vector = self.embedder.embed(question)?;
        Ok(retrieve(self.store, &self.collection, &query_vector, k)?)
    }

    /// Retrieval errors are returned; generation problems only downgrade the
    /// answer to the retrieved chunks.
    pub fn ask<G>(
        &self,
        question: &str,
        k: usize,
        generator: Option<&G>,
        max_length: usize,
    ) -> Result<Answer, PipelineError>
    where
        G: Generator + ?Sized,
    {
        let hits = self.retrieve(question, k)?;
        if hits.is_empty() {
            return Ok(Answer::Extractive {
                hits,
                reason: "no matching chunks".to_string(),
            });
        }
        Ok(answer_or_fallback(generator, question, hits, max_length))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::{GenerationError, IngestError, StoreError};
    use crate::extractor::PageText;
    use crate::generator::NOT_FOUND_ANSWER;
    use crate::models::IngestionOptions;
    use crate::stores::LocalVectorStore;
    use tempfile::tempdir;

    struct PagesExtractor(Vec<String>);

    impl PdfExtractor for PagesExtractor {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Ok(self
                .0
                .iter()
                .enumerate()
                .map(|(index, text)| PageText {
                    number: index as u32 + 1,
                    text: text.clone(),
                })
                .collect())
        }
    }

    struct CannedGenerator;

    impl Generator for CannedGenerator {
        fn is_ready(&self) -> bool {
            true
        }

        fn generate(&self, prompt: &str, _max_length: usize) -> Result<String, GenerationError> {
            if prompt.contains("page: 3") {
                Ok("Remote work needs manager approval (handbook.pdf, page 3).".to_string())
            } else {
                Ok(NOT_FOUND_ANSWER.to_string())
            }
        }
    }

    fn handbook() -> DocumentIngestor<PagesExtractor> {
        DocumentIngestor::new(
            PagesExtractor(vec![
                "Vacation policy: employees receive twenty days of paid vacation each year."
                    .to_string(),
                "   ".to_string(),
                "Remote work policy: remote work requires written manager approval.".to_string(),
            ]),
            IngestionOptions::default(),
        )
        .expect("default options are valid")
    }

    #[test]
    fn ingest_then_retrieve_finds_the_relevant_page() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let store = LocalVectorStore::open(dir.path())?;
        let embedder = CharacterNgramEmbedder::default();
        let pipeline = QaPipeline::new(&store, &embedder, "kb_collection");

        let ack = pipeline.ingest_document(&handbook(), Path::new("handbook.pdf"), None)?;
        assert_eq!(ack.written, 2);
        assert!(ack.persisted);

        let hits = pipeline.retrieve("remote work manager approval", 1)?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_deref(), Some("handbook.pdf_p3_c0"));
        assert_eq!(hits[0].page(), Some(3));
        assert_eq!(hits[0].source(), Some("handbook.pdf"));
        Ok(())
    }

    #[test]
    fn index_survives_reopening_the_store() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CharacterNgramEmbedder::default();
        {
            let store = LocalVectorStore::open(dir.path())?;
            QaPipeline::new(&store, &embedder, "kb")
                .ingest_document(&handbook(), Path::new("handbook.pdf"), Some("hb"))?;
        }

        let store = LocalVectorStore::open(dir.path())?;
        let hits = QaPipeline::new(&store, &embedder, "kb").retrieve("vacation days", 5)?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id(), Some("hb"));
        Ok(())
    }

    #[test]
    fn asking_before_ingestion_is_a_structural_error() {
        let store = LocalVectorStore::in_memory();
        let embedder = CharacterNgramEmbedder::default();
        let pipeline = QaPipeline::new(&store, &embedder, "kb_collection");

        let result = pipeline.ask::<CannedGenerator>("anything", 3, None, 64);
        assert!(matches!(
            result,
            Err(PipelineError::Store(StoreError::CollectionNotFound(_)))
        ));
    }

    #[test]
    fn ask_uses_generator_when_available() -> Result<(), Box<dyn std::error::Error>> {
        let store = LocalVectorStore::in_memory();
        let embedder = CharacterNgramEmbedder::default();
        let pipeline = QaPipeline::new(&store, &embedder, "kb");
        pipeline.ingest_document(&handbook(), Path::new("handbook.pdf"), None)?;

        let generated = pipeline.ask(
            "What does remote work require?",
            2,
            Some(&CannedGenerator),
            64,
        )?;
        assert!(matches!(generated, Answer::Generated { .. }));
        assert_eq!(generated.hits().len(), 2);

        let extractive = pipeline.ask::<CannedGenerator>("What does remote work require?", 2, None, 64)?;
        assert!(matches!(extractive, Answer::Extractive { .. }));
        assert_eq!(extractive.hits().len(), 2);
        Ok(())
    }
}
