//! This module splits raw document text into overlapping, bounded-length passages
//! for embedding and retrieval in a RAG (Retrieval Augmented Generation) pipeline.
//!
//! The splitter walks the text with a sliding window measured in **characters**
//! (not bytes), so offsets are stable across encodings and can be reported back to
//! users as positions in the original document.
//!
//! # Key Features
//!
//! *   **Bounded Chunks**: no chunk is longer than `chunk_size` characters.
//! *   **Exact Overlap**: consecutive chunks share exactly `chunk_overlap` characters,
//!     so a sentence cut at a window edge still appears whole in one of its neighbours.
//! *   **Preferred Split Points**: before falling back to a hard cut, the splitter
//!     looks back a short distance from the window edge for a paragraph break, then
//!     a sentence end, then a line break, then any whitespace. The split is placed
//!     *after* the matched delimiter. The lookback never reaches into the overlap
//!     region, which guarantees forward progress.
//! *   **Lossless Coverage**: the first chunk followed by every later chunk minus its
//!     first `chunk_overlap` characters reconstructs the input exactly.
//!
//! # Usage
//!
//! ```
//! use docqa_context::text::TextSplitter;
//!
//! let splitter = TextSplitter::new(500, 50).unwrap();
//! let text = "x".repeat(1200);
//! let spans = splitter.split(&text);
//!
//! let offsets: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
//! assert_eq!(offsets, vec![(0, 500), (450, 950), (900, 1200)]);
//! ```
use regex::Regex;
use serde::Serialize;

/// Preferred split points, most significant first.
///
/// - `\n[ \t]*\n`: paragraph breaks (a blank line, possibly with trailing spaces).
/// - `[.!?]\s`: sentence ends followed by whitespace.
/// - `\n`: line breaks.
/// - `\s`: any whitespace, the most granular boundary before a hard cut.
pub const DEFAULT_BOUNDARIES: &[&str] = &[
    r"\n[ \t]*\n", // Paragraphs
    r"[.!?]\s",    // Sentences
    r"\n",         // Line breaks
    r"\s",         // Whitespace
];

/// How far back from a window edge (in characters) the splitter searches for a boundary.
pub const DEFAULT_BOUNDARY_LOOKBACK: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error(
        "invalid chunking parameters: overlap {overlap} must be smaller than chunk size {chunk_size}"
    )]
    InvalidParameters { chunk_size: usize, overlap: usize },

    #[error("invalid boundary pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A contiguous slice of a document, addressed by character offsets `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    /// Length in characters.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Sliding-window splitter with boundary-aware window edges.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    boundary_lookback: usize,
    boundaries: Vec<Regex>,
}

impl TextSplitter {
    /// Creates a splitter using [`DEFAULT_BOUNDARIES`] and [`DEFAULT_BOUNDARY_LOOKBACK`].
    ///
    /// Fails with [`ChunkError::InvalidParameters`] unless `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkError> {
        if chunk_overlap >= chunk_size {
            return Err(ChunkError::InvalidParameters {
                chunk_size,
                overlap: chunk_overlap,
            });
        }

        Ok(Self {
            chunk_size,
            chunk_overlap,
            boundary_lookback: DEFAULT_BOUNDARY_LOOKBACK,
            boundaries: compile_boundaries(DEFAULT_BOUNDARIES)?,
        })
    }

    /// Replace the boundary patterns. An empty list means every window ends with a hard cut.
    pub fn with_boundaries(self, patterns: &[&str]) -> Result<Self, ChunkError> {
        Ok(Self {
            boundaries: compile_boundaries(patterns)?,
            ..self
        })
    }

    pub fn with_lookback(self, boundary_lookback: usize) -> Self {
        Self {
            boundary_lookback,
            ..self
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Splits `text` into overlapping spans. Empty text yields no spans.
    pub fn split(&self, text: &str) -> Vec<TextSpan> {
        // byte_at[i] is the byte offset of character i; the extra entry is text.len()
        let byte_at: Vec<usize> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = byte_at.len() - 1;

        let mut spans = Vec::new();
        if total == 0 {
            return spans;
        }

        let mut start = 0;
        loop {
            if total - start <= self.chunk_size {
                spans.push(make_span(text, &byte_at, start, total));
                break;
            }

            let end = self.window_end(text, &byte_at, start);
            spans.push(make_span(text, &byte_at, start, end));
            start = end - self.chunk_overlap;
        }

        spans
    }

    // Picks where the window starting at `start` ends. The result is always within
    // (start + overlap, start + chunk_size], so the next window starts strictly later.
    fn window_end(&self, text: &str, byte_at: &[usize], start: usize) -> usize {
        let hard_end = start + self.chunk_size;
        let lower = (start + self.chunk_overlap + 1)
            .max(hard_end.saturating_sub(self.boundary_lookback));
        if lower >= hard_end {
            return hard_end;
        }

        let window = &text[byte_at[lower]..byte_at[hard_end]];
        for boundary in &self.boundaries {
            if let Some(mat) = boundary.find_iter(window).last() {
                return lower + window[..mat.end()].chars().count();
            }
        }

        hard_end
    }
}

/// Convenience wrapper: split `text` with default boundaries.
pub fn split(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<TextSpan>, ChunkError> {
    Ok(TextSplitter::new(chunk_size, chunk_overlap)?.split(text))
}

fn compile_boundaries(patterns: &[&str]) -> Result<Vec<Regex>, ChunkError> {
    patterns
        .iter()
        .map(|&pattern| {
            Regex::new(pattern).map_err(|source| ChunkError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
        })
        .collect()
}

fn make_span(text: &str, byte_at: &[usize], start: usize, end: usize) -> TextSpan {
    TextSpan {
        text: text[byte_at[start]..byte_at[end]].to_string(),
        start,
        end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(spans: &[TextSpan], overlap: usize) -> String {
        let mut out = String::new();
        for (i, span) in spans.iter().enumerate() {
            if i == 0 {
                out.push_str(&span.text);
            } else {
                out.extend(span.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn test_hard_cut_offsets() {
        let text = "abcdefghij".repeat(120);
        let spans = TextSplitter::new(500, 50).unwrap().split(&text);

        let offsets: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(offsets, vec![(0, 500), (450, 950), (900, 1200)]);
        assert_eq!(reconstruct(&spans, 50), text);
    }

    #[test]
    fn test_empty_text() {
        let spans = split("", 500, 50).unwrap();
        assert!(spans.is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let text = "A very short document.";
        let spans = split(text, 500, 50).unwrap();

        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, text);
        assert_eq!((spans[0].start, spans[0].end), (0, text.chars().count()));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            TextSplitter::new(100, 100),
            Err(ChunkError::InvalidParameters { chunk_size: 100, overlap: 100 })
        ));
        assert!(TextSplitter::new(100, 150).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(100, 0).is_ok());
    }

    #[test]
    fn test_invalid_pattern() {
        let result = TextSplitter::new(100, 10).unwrap().with_boundaries(&["("]);
        assert!(matches!(result, Err(ChunkError::InvalidPattern { .. })));
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let text = (0..40)
            .map(|i| format!("Sentence number {i} is here. "))
            .collect::<String>();
        let spans = split(&text, 200, 20).unwrap();

        assert!(spans.len() > 1);
        for span in &spans[..spans.len() - 1] {
            assert!(span.len() <= 200);
            assert!(span.text.ends_with(". "), "chunk ended mid-sentence: {:?}", span.text);
        }
        assert_eq!(reconstruct(&spans, 20), text);
    }

    #[test]
    fn test_prefers_paragraph_over_sentence() {
        let first = "First paragraph. It has two sentences.\n\n";
        let second = "Second paragraph runs on and on without any ending punctuation at all so it must be cut";
        let text = format!("{first}{second}");
        let spans = TextSplitter::new(60, 5).unwrap().with_lookback(40).split(&text);

        assert_eq!(spans[0].text, first);
        assert_eq!(spans[0].end, first.chars().count());
    }

    #[test]
    fn test_offsets_are_characters() {
        let text = "é".repeat(30);
        let spans = split(&text, 10, 2).unwrap();

        assert_eq!((spans[0].start, spans[0].end), (0, 10));
        assert_eq!((spans[1].start, spans[1].end), (8, 18));
        assert_eq!(spans[0].text.chars().count(), 10);
        assert_eq!(reconstruct(&spans, 2), text);
    }

    #[test]
    fn test_coverage_and_overlap_invariants() {
        let text = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.\nSed do eiusmod tempor.\n\n"
            .repeat(25);
        for (size, overlap) in [(50, 0), (50, 10), (120, 30), (300, 299), (1000, 100)] {
            let spans = split(&text, size, overlap).unwrap();
            assert!(!spans.is_empty());
            assert_eq!(spans[0].start, 0);
            assert_eq!(spans.last().unwrap().end, text.chars().count());
            for pair in spans.windows(2) {
                assert_eq!(pair[1].start, pair[0].end - overlap);
                assert!(pair[1].start > pair[0].start);
            }
            for span in &spans {
                assert!(span.len() <= size);
                assert_eq!(span.text.chars().count(), span.len());
            }
            assert_eq!(reconstruct(&spans, overlap), text);
        }
    }
}
