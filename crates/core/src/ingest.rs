use crate::chunking::{chunk_with_config, ChunkingConfig};
use crate::extractor::{LopdfExtractor, PageText, PdfExtractor};
use crate::{ChunkRecord, IngestError, IngestionOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

/// The document id used when the caller does not supply one: the file name.
pub fn default_doc_id(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

/// Turns extracted pages into chunk records. Blank pages produce nothing and
/// chunk indexes restart at zero on every page.
pub fn chunk_pages(
    doc_id: &str,
    source: &str,
    pages: &[PageText],
    options: &IngestionOptions,
) -> Result<Vec<ChunkRecord>, IngestError> {
    options.validate()?;
    let config = ChunkingConfig::from(options);
    let mut records = Vec::new();

    for page in pages {
        if page.text.trim().is_empty() {
            debug!(doc_id, page = page.number, "skipping blank page");
            continue;
        }

        let before = records.len();
        for (index, window) in chunk_with_config(&page.text, config)?.enumerate() {
            records.push(ChunkRecord {
                doc_id: doc_id.to_string(),
                chunk_id: ChunkRecord::make_chunk_id(doc_id, page.number, index),
                page: page.number,
                text: window.text.to_string(),
                start_char: window.start_char,
                end_char: window.end_char,
                source: source.to_string(),
            });
        }
        debug!(doc_id, page = page.number, chunks = records.len() - before, "chunked page");
    }

    Ok(records)
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub chunks: Vec<ChunkRecord>,
    pub documents: usize,
    pub skipped_files: Vec<SkippedPdf>,
}

pub struct DocumentIngestor<E = LopdfExtractor> {
    extractor: E,
    options: IngestionOptions,
}

impl Default for DocumentIngestor<LopdfExtractor> {
    fn default() -> Self {
        Self {
            extractor: LopdfExtractor,
            options: IngestionOptions::default(),
        }
    }
}

impl<E: PdfExtractor> DocumentIngestor<E> {
    pub fn new(extractor: E, options: IngestionOptions) -> Result<Self, IngestError> {
        options.validate()?;
        Ok(Self { extractor, options })
    }

    /// Extracts and chunks one document. An extraction failure fails the
    /// whole document; nothing is returned for it.
    pub fn ingest(&self, path: &Path, doc_id: Option<&str>) -> Result<Vec<ChunkRecord>, IngestError> {
        let doc_id = match doc_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            Some(_) => {
                return Err(IngestError::InvalidArgument(
                    "doc_id must not be blank".to_string(),
                ))
            }
            None => default_doc_id(path)?,
        };
        let source = path.to_string_lossy().to_string();

        let pages = self.extractor.extract_pages(path)?;
        let records = chunk_pages(&doc_id, &source, &pages, &self.options)?;

        info!(
            doc_id = %doc_id,
            pages = pages.len(),
            chunks = records.len(),
            "ingested document"
        );
        Ok(records)
    }

    /// Ingests every path, collecting failures instead of stopping at the
    /// first one. Each document still either contributes all of its chunks or
    /// none. A document whose default doc_id was already taken by an earlier
    /// path (same file name in another folder) is skipped.
    pub fn ingest_all(&self, paths: &[PathBuf]) -> IngestionReport {
        let mut chunks = Vec::new();
        let mut documents = 0;
        let mut skipped_files = Vec::new();
        let mut claimed: HashMap<String, &Path> = HashMap::new();

        for path in paths {
            let outcome = default_doc_id(path).and_then(|doc_id| {
                if let Some(first) = claimed.get(&doc_id) {
                    return Err(IngestError::DuplicateDocId {
                        first: first.display().to_string(),
                        doc_id,
                    });
                }
                let records = self.ingest(path, Some(&doc_id))?;
                Ok((doc_id, records))
            });

            match outcome {
                Ok((doc_id, records)) => {
                    claimed.insert(doc_id, path);
                    documents += 1;
                    chunks.extend(records);
                }
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipped pdf");
                    skipped_files.push(SkippedPdf {
                        path: path.clone(),
                        reason: error.to_string(),
                    });
                }
            }
        }

        IngestionReport {
            chunks,
            documents,
            skipped_files,
        }
    }

    pub fn ingest_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        Ok(self.ingest_all(&files))
    }
}
