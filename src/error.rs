//! Error taxonomies for the question-answering core.
//!
//! Three families, matching how they are reported:
//! - [`ParseError`] — caller-fixable input validation, reported immediately
//!   and never retried internally.
//! - [`IndexError`] — build failures recorded on the corpus as its terminal
//!   `failed` reason.
//! - [`AskError`] — resource/state errors on query; safe for the caller to
//!   retry later (ready-state is monotonic except for eviction).
//!
//! "No evidence found" is deliberately *not* here: declining to answer is a
//! successful grounded outcome, modeled as [`crate::synthesize::Synthesis`].

use thiserror::Error;

use crate::models::CorpusStatus;

/// Input-validation failures from document acceptance and parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Declared media type does not match the binary signature.
    #[error("declared media type {declared} does not match detected content {detected}")]
    FormatMismatch { declared: String, detected: String },

    /// Document exceeds the configured size bound.
    #[error("document of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    /// Stream is unreadable, truncated, or yields no text.
    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    /// Media type is not one the parser supports.
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

/// Failures while building a corpus's embedding index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding dimensionality mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("no passages to index")]
    EmptyCorpus,
}

/// Resource/state failures when querying a corpus.
#[derive(Debug, Error)]
pub enum AskError {
    /// Handle is unknown or the corpus has been evicted.
    #[error("corpus not found")]
    CorpusNotFound,

    /// Ingestion has not completed yet.
    #[error("corpus not ready (status: {0})")]
    CorpusNotReady(CorpusStatus),

    /// Ingestion failed; the reason is terminal and recorded.
    #[error("corpus failed: {0}")]
    CorpusFailed(String),
}
