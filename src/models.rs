//! Core data models for the question-answering pipeline.
//!
//! These types flow from the parser through the segmenter, index, and
//! synthesizer, and out through the HTTP layer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Opaque identifier for one ingested document's corpus.
pub type CorpusHandle = Uuid;

/// Metadata of the source document a corpus was built from.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    pub name: Option<String>,
    pub media_type: String,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle state of a corpus.
///
/// Transitions: `Pending → Indexing → Ready | Failed`. Failure is terminal;
/// eviction removes the corpus from the registry entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusStatus {
    Pending,
    Indexing,
    Ready,
    Failed,
}

impl std::fmt::Display for CorpusStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CorpusStatus::Pending => "pending",
            CorpusStatus::Indexing => "indexing",
            CorpusStatus::Ready => "ready",
            CorpusStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Extracted text plus structural metadata from the parser.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Full extracted text, form feeds stripped. Offsets elsewhere in the
    /// pipeline are character offsets into this string.
    pub text: String,
    pub structure: DocStructure,
}

/// Structural metadata preserved by the parser so passages can report
/// page provenance.
#[derive(Debug, Clone)]
pub struct DocStructure {
    /// Page spans in ascending order, covering the full text.
    pub pages: Vec<PageSpan>,
}

/// One page's character span within the extracted text.
#[derive(Debug, Clone, Copy)]
pub struct PageSpan {
    /// 1-based page number.
    pub page: u32,
    /// Inclusive start character offset.
    pub start: usize,
    /// Exclusive end character offset.
    pub end: usize,
}

impl DocStructure {
    /// Single page spanning the whole text.
    pub fn single_page(char_len: usize) -> Self {
        Self {
            pages: vec![PageSpan {
                page: 1,
                start: 0,
                end: char_len,
            }],
        }
    }

    /// Page containing the given character offset. Falls back to the last
    /// page for offsets at or past the end of the text.
    pub fn page_at(&self, offset: usize) -> u32 {
        self.pages
            .iter()
            .find(|p| offset >= p.start && offset < p.end)
            .or(self.pages.last())
            .map(|p| p.page)
            .unwrap_or(1)
    }
}

/// A bounded, citable span of document text.
#[derive(Debug, Clone)]
pub struct Passage {
    /// Deterministic id derived from the corpus handle and sequence index.
    pub id: Uuid,
    pub corpus: CorpusHandle,
    /// Position within the corpus's passage sequence, starting at 0.
    pub seq: usize,
    /// Inclusive start character offset into the extracted text.
    pub start: usize,
    /// Exclusive end character offset into the extracted text.
    pub end: usize,
    /// 1-based page the passage starts on.
    pub page: u32,
    pub text: String,
}

impl Passage {
    /// Short excerpt for display in citations.
    pub fn excerpt(&self, max_chars: usize) -> String {
        if self.text.chars().count() <= max_chars {
            return self.text.clone();
        }
        let cut: String = self.text.chars().take(max_chars).collect();
        format!("{}…", cut.trim_end())
    }
}

/// A passage returned by retrieval, with its similarity score in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Retrieved {
    pub passage: Passage,
    pub score: f32,
}

/// Reference to a passage used to ground an answer.
#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub passage_id: Uuid,
    pub seq: usize,
    pub page: u32,
    pub excerpt: String,
}

/// A grounded answer: generated text plus the passages it was composed from.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    /// Ordered by retrieval rank; always a subset of the retrieved passages.
    pub citations: Vec<Citation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_at_maps_offsets_to_pages() {
        let structure = DocStructure {
            pages: vec![
                PageSpan {
                    page: 1,
                    start: 0,
                    end: 100,
                },
                PageSpan {
                    page: 2,
                    start: 100,
                    end: 250,
                },
            ],
        };
        assert_eq!(structure.page_at(0), 1);
        assert_eq!(structure.page_at(99), 1);
        assert_eq!(structure.page_at(100), 2);
        assert_eq!(structure.page_at(249), 2);
        // Past the end falls back to the last page
        assert_eq!(structure.page_at(250), 2);
    }

    #[test]
    fn excerpt_truncates_long_text() {
        let p = Passage {
            id: Uuid::new_v4(),
            corpus: Uuid::new_v4(),
            seq: 0,
            start: 0,
            end: 10,
            page: 1,
            text: "abcdefghij".to_string(),
        };
        assert_eq!(p.excerpt(20), "abcdefghij");
        assert_eq!(p.excerpt(4), "abcd…");
    }
}
