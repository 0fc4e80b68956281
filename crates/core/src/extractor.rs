use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    /// Returns one entry per page, in page order, numbered from 1. Pages with
    /// no extractable text are kept with an empty `text`.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| {
            IngestError::Extraction(format!("{}: {error}", path.display()))
        })?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document.extract_text(&[page_no]).map_err(|error| {
                IngestError::Extraction(format!(
                    "{} page {page_no}: {error}",
                    path.display()
                ))
            })?;

            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}

/// Re-opens `path` and returns the text of the 1-based `page`.
pub fn page_text(
    extractor: &impl PdfExtractor,
    path: &Path,
    page: u32,
) -> Result<String, IngestError> {
    let pages = extractor.extract_pages(path)?;
    pages
        .into_iter()
        .find(|candidate| candidate.number == page)
        .map(|found| found.text)
        .ok_or_else(|| {
            IngestError::InvalidArgument(format!(
                "page {page} is out of range for {}",
                path.display()
            ))
        })
}
