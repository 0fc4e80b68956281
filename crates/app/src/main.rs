use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use docqa_core::{
    discover_pdf_files, format_hit_header, format_metadata, highlight_terms, page_text, Answer,
    CharacterNgramEmbedder, DocumentIngestor, GeneratorConfig, HttpGenerator, IngestionOptions,
    LocalVectorStore, LopdfExtractor, Metadata, QaPipeline, QdrantStore, VectorStore,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_MAX_LENGTH,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const HIGHLIGHT_OPEN: &str = "\x1b[1;33m";
const HIGHLIGHT_CLOSE: &str = "\x1b[0m";

#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory of the local vector store
    #[arg(long, env = "DOCQA_STORE_DIR", default_value = "data/vector_store")]
    store_dir: PathBuf,

    /// Collection holding the document chunks
    #[arg(long, env = "DOCQA_COLLECTION", default_value = "kb_collection")]
    collection: String,

    /// Qdrant base URL; when set it replaces the local store
    #[arg(long, env = "DOCQA_QDRANT_URL")]
    qdrant_url: Option<String>,

    /// Embedding vector size
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Text generation endpoint used to synthesize answers
    #[arg(long, env = "DOCQA_GENERATOR_ENDPOINT")]
    generator_endpoint: Option<String>,

    /// Bearer token for the generation endpoint
    #[arg(long, env = "DOCQA_GENERATOR_API_KEY", hide_env_values = true)]
    generator_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk PDFs and upsert them into the collection.
    Ingest {
        /// PDF files to ingest.
        paths: Vec<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Document id for a single file; defaults to the file name.
        #[arg(long)]
        doc_id: Option<String>,
        /// Maximum characters per chunk.
        #[arg(long, default_value = "800")]
        max_chars: usize,
        /// Characters shared by consecutive chunks.
        #[arg(long, default_value = "150")]
        overlap: usize,
    },
    /// Retrieve the closest chunks for a question and answer it.
    Ask {
        /// The question.
        question: String,
        /// Number of chunks to retrieve.
        #[arg(long, default_value = "3", value_parser = clap::value_parser!(u16).range(1..=50))]
        top_k: u16,
        /// Skip answer generation and only show retrieved chunks.
        #[arg(long, default_value_t = false)]
        no_generate: bool,
        /// Maximum length of the generated answer.
        #[arg(long, default_value_t = DEFAULT_MAX_LENGTH)]
        max_length: usize,
    },
    /// Print the extracted text of one page of a source document.
    ShowPage {
        /// Path of the document, as stored in a hit's `source`.
        #[arg(long)]
        source: PathBuf,
        /// 1-based page number.
        #[arg(long)]
        page: u32,
    },
    /// List collections in the store.
    Collections,
    /// Delete the collection and everything in it.
    Clear {
        /// Confirm the deletion.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

fn open_store(cli: &Cli) -> anyhow::Result<Box<dyn VectorStore>> {
    match &cli.qdrant_url {
        Some(url) => {
            let store = QdrantStore::new(url).with_context(|| format!("invalid qdrant url {url}"))?;
            info!(url = %url, "using qdrant vector store");
            Ok(Box::new(store))
        }
        None => Ok(Box::new(LocalVectorStore::open_or_in_memory(&cli.store_dir))),
    }
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "docqa boot"
    );

    let store = open_store(&cli)?;
    let embedder = CharacterNgramEmbedder {
        dimensions: cli.embedding_dimensions,
    };
    let generator = GeneratorConfig::from_values(
        cli.generator_endpoint.clone(),
        cli.generator_api_key.clone(),
    )
    .map(HttpGenerator::new);
    let pipeline = QaPipeline::new(&store, &embedder, cli.collection.clone());

    match cli.command {
        Command::Ingest {
            paths,
            folder,
            doc_id,
            max_chars,
            overlap,
        } => {
            let options = IngestionOptions {
                chunk_max_chars: max_chars,
                chunk_overlap_chars: overlap,
            };
            let ingestor = DocumentIngestor::new(LopdfExtractor, options)?;

            if let Some(doc_id) = doc_id {
                let [path] = paths.as_slice() else {
                    bail!("--doc-id needs exactly one path");
                };
                let ack = pipeline
                    .ingest_document(&ingestor, path, Some(doc_id.as_str()))
                    .with_context(|| format!("ingestion failed for {}", path.display()))?;
                println!(
                    "{} chunks from {} upserted into '{}' at {}",
                    ack.written,
                    path.display(),
                    ack.collection,
                    Utc::now().to_rfc3339()
                );
                return Ok(());
            }

            let mut files = paths;
            if let Some(folder) = &folder {
                let found = discover_pdf_files(folder);
                if found.is_empty() {
                    bail!("no pdf files found in {}", folder.display());
                }
                files.extend(found);
                files.sort_unstable();
                files.dedup();
            }
            if files.is_empty() {
                bail!("nothing to ingest: pass PDF paths or --folder");
            }

            let report = ingestor.ingest_all(&files);
            if !report.skipped_files.is_empty() {
                warn!(skipped = report.skipped_files.len(), "some documents were skipped");
                for skipped in &report.skipped_files {
                    println!("skipped {}: {}", skipped.path.display(), skipped.reason);
                }
            }

            if report.chunks.is_empty() {
                println!("0 chunks ingested (all files were skipped or blank)");
                return Ok(());
            }

            info!(
                documents = report.documents,
                chunk_count = report.chunks.len(),
                "indexing chunks"
            );
            let ack = pipeline.index(&report.chunks).context("indexing failed")?;
            if !ack.persisted {
                println!("warning: store persistence unavailable, data may not survive this session");
            }
            println!(
                "{} chunks from {} document(s) upserted into '{}' at {}",
                ack.written,
                report.documents,
                ack.collection,
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask {
            question,
            top_k,
            no_generate,
            max_length,
        } => {
            if question.trim().is_empty() {
                bail!("question is empty");
            }

            let generator = generator.as_ref().filter(|_| !no_generate);
            let answer = pipeline
                .ask(&question, usize::from(top_k), generator, max_length)
                .context("retrieval error")?;

            if answer.hits().is_empty() {
                println!("No results found. Try ingesting documents or increasing --top-k.");
                return Ok(());
            }

            println!("Top retrieved chunks");
            let terms = vec![question.clone()];
            for (rank, hit) in answer.hits().iter().enumerate() {
                println!("{}", format_hit_header(rank + 1, hit));
                if let Some(id) = &hit.id {
                    println!("  id={id}");
                }
                println!(
                    "{}\n",
                    highlight_terms(&hit.text, &terms, HIGHLIGHT_OPEN, HIGHLIGHT_CLOSE)
                );
            }

            match answer {
                Answer::Generated { text, .. } => {
                    println!("Generated answer\n{text}");
                }
                Answer::Extractive { reason, .. } => {
                    println!("Generation unavailable ({reason}); the chunks above are the evidence.");
                }
            }
        }
        Command::ShowPage { source, page } => {
            let text = page_text(&LopdfExtractor, &source, page)
                .with_context(|| format!("could not open source {}", source.display()))?;
            let mut metadata = Metadata::new();
            metadata.insert("source".to_string(), source.display().to_string().into());
            metadata.insert("page".to_string(), page.into());
            println!("{}", format_metadata(&metadata));
            if text.trim().is_empty() {
                println!("(No text detected on this page)");
            } else {
                println!("{text}");
            }
        }
        Command::Collections => {
            for name in store.list_collections()? {
                println!("{name}");
            }
        }
        Command::Clear { yes } => {
            if !yes {
                bail!("refusing to delete '{}' without --yes", cli.collection);
            }
            if store.drop_collection(&cli.collection)? {
                println!("collection '{}' deleted", cli.collection);
            } else {
                println!("collection '{}' did not exist", cli.collection);
            }
        }
    }

    Ok(())
}
