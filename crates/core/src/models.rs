use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Provenance fields persisted next to each vector.
pub type Metadata = Map<String, Value>;

pub const DEFAULT_CHUNK_MAX_CHARS: usize = 800;
pub const DEFAULT_CHUNK_OVERLAP_CHARS: usize = 150;

/// The atomic retrievable unit produced by the ingestor.
///
/// `start_char` and `end_char` are character offsets of the untrimmed window
/// inside the page text, so they line up with a fresh extraction of the same
/// page even when `text` had surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub chunk_id: String,
    pub page: u32,
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub source: String,
}

impl ChunkRecord {
    pub fn make_chunk_id(doc_id: &str, page: u32, index: usize) -> String {
        format!("{doc_id}_p{page}_c{index}")
    }

    pub fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("doc_id".to_string(), Value::from(self.doc_id.clone()));
        metadata.insert("page".to_string(), Value::from(self.page));
        metadata.insert("source".to_string(), Value::from(self.source.clone()));
        metadata.insert("start_char".to_string(), Value::from(self.start_char));
        metadata.insert("end_char".to_string(), Value::from(self.end_char));
        metadata
    }
}

/// One ranked result of a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: Option<String>,
    pub text: String,
    pub metadata: Metadata,
    pub distance: Option<f32>,
}

impl Hit {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(Value::as_str)
    }

    pub fn page(&self) -> Option<u32> {
        self.metadata
            .get("page")
            .and_then(Value::as_u64)
            .and_then(|page| u32::try_from(page).ok())
    }

    pub fn doc_id(&self) -> Option<&str> {
        self.metadata.get("doc_id").and_then(Value::as_str)
    }
}

/// Result of a question: either a generated answer grounded in `hits`, or the
/// hits themselves when generation could not run.
#[derive(Debug, Clone)]
pub enum Answer {
    Generated { text: String, hits: Vec<Hit> },
    Extractive { hits: Vec<Hit>, reason: String },
}

impl Answer {
    pub fn hits(&self) -> &[Hit] {
        match self {
            Answer::Generated { hits, .. } | Answer::Extractive { hits, .. } => hits,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
}

impl IngestionOptions {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_max_chars must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap_chars >= self.chunk_max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than max_chars {}",
                self.chunk_overlap_chars, self.chunk_max_chars
            )));
        }
        Ok(())
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: DEFAULT_CHUNK_MAX_CHARS,
            chunk_overlap_chars: DEFAULT_CHUNK_OVERLAP_CHARS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_follows_page_and_index() {
        assert_eq!(ChunkRecord::make_chunk_id("manual.pdf", 3, 7), "manual.pdf_p3_c7");
    }

    #[test]
    fn metadata_carries_provenance_fields() {
        let record = ChunkRecord {
            doc_id: "doc".to_string(),
            chunk_id: "doc_p2_c0".to_string(),
            page: 2,
            text: "body".to_string(),
            start_char: 0,
            end_char: 4,
            source: "/tmp/doc.pdf".to_string(),
        };

        let metadata = record.metadata();
        assert_eq!(metadata.len(), 5);
        assert_eq!(metadata["page"], Value::from(2));
        assert_eq!(metadata["source"], Value::from("/tmp/doc.pdf"));
        assert_eq!(metadata["end_char"], Value::from(4));
    }

    #[test]
    fn overlap_not_smaller_than_max_is_rejected() {
        let options = IngestionOptions {
            chunk_max_chars: 10,
            chunk_overlap_chars: 10,
        };
        assert!(options.validate().is_err());
        assert!(IngestionOptions::default().validate().is_ok());
    }
}
