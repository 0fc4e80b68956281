pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod format;
pub mod generator;
pub mod index_writer;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod retriever;
pub mod store;
pub mod stores;

pub use chunking::{chunk_text, chunk_with_config, ChunkWindow, ChunkWindows, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{EmbeddingError, GenerationError, IngestError, PipelineError, StoreError};
pub use extractor::{extract_page_texts, page_text, LopdfExtractor, PageText, PdfExtractor};
pub use format::{format_hit_header, format_metadata, highlight_html, highlight_terms};
pub use generator::{
    answer_or_fallback, build_prompt, synthesize, Generator, GeneratorConfig, HttpGenerator,
    DEFAULT_MAX_LENGTH,
};
pub use index_writer::{upsert_chunks, UpsertAck};
pub use ingest::{
    chunk_pages, default_doc_id, discover_pdf_files, DocumentIngestor, IngestionReport,
    SkippedPdf,
};
pub use models::{Answer, ChunkRecord, Hit, IngestionOptions, Metadata};
pub use pipeline::QaPipeline;
pub use retriever::{normalize_hits, retrieve, DEFAULT_TOP_K};
pub use store::{IncludeField, QueryResponse, UpsertBatch, VectorStore};
pub use stores::{LocalVectorStore, QdrantStore};
