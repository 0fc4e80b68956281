use crate::error::IngestError;
use crate::models::IngestionOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

/// A window over the page text. Offsets are character positions of the raw
/// window, end-exclusive; `text` is the window with whitespace trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow<'a> {
    pub text: &'a str,
    pub start_char: usize,
    pub end_char: usize,
}

/// Lazy iterator over overlapping windows, see [`chunk_text`].
#[derive(Debug, Clone)]
pub struct ChunkWindows<'a> {
    text: &'a str,
    // byte offset of every char start, plus the total byte length
    boundaries: Vec<usize>,
    max_chars: usize,
    overlap_chars: usize,
    cursor: usize,
    finished: bool,
}

impl<'a> ChunkWindows<'a> {
    fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }
}

impl<'a> Iterator for ChunkWindows<'a> {
    type Item = ChunkWindow<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let length = self.char_len();
        if self.finished || self.cursor >= length {
            self.finished = true;
            return None;
        }

        let start = self.cursor;
        let end = (start + self.max_chars).min(length);
        let raw = &self.text[self.boundaries[start]..self.boundaries[end]];

        if end == length {
            self.finished = true;
        } else {
            self.cursor = end.saturating_sub(self.overlap_chars);
        }

        Some(ChunkWindow {
            text: raw.trim(),
            start_char: start,
            end_char: end,
        })
    }
}

/// Splits `text` into windows of at most `max_chars` characters where each
/// window starts `overlap_chars` before the previous one ended.
///
/// Empty text yields no windows. The last window always ends at the text
/// length.
pub fn chunk_text(
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Result<ChunkWindows<'_>, IngestError> {
    if max_chars == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "max_chars must be greater than zero".to_string(),
        ));
    }
    if overlap_chars >= max_chars {
        return Err(IngestError::InvalidChunkConfig(format!(
            "overlap {overlap_chars} must be smaller than max_chars {max_chars}"
        )));
    }

    let boundaries = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();

    Ok(ChunkWindows {
        text,
        boundaries,
        max_chars,
        overlap_chars,
        cursor: 0,
        finished: false,
    })
}

pub fn chunk_with_config(
    text: &str,
    config: ChunkingConfig,
) -> Result<ChunkWindows<'_>, IngestError> {
    chunk_text(text, config.max_chars, config.overlap_chars)
}
