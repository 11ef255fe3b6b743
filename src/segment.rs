//! Sliding-window passage segmenter.
//!
//! Splits extracted text into overlapping, bounded-length passages. Windows
//! advance by `window - overlap` characters, so consecutive passages share
//! `overlap` characters of context while their sequence order stays
//! non-overlapping. The union of passage spans covers the entire text.
//!
//! Each passage receives a deterministic UUID derived from the corpus handle
//! and sequence index, so segmenting the same input twice yields an
//! identical passage sequence.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::SegmenterConfig;
use crate::models::{CorpusHandle, DocStructure, Passage};

/// Split text into passages of at most `window_chars` characters, each
/// consecutive pair sharing `overlap_chars`. Offsets are character offsets.
pub fn segment(
    corpus: CorpusHandle,
    text: &str,
    structure: &DocStructure,
    config: &SegmenterConfig,
) -> Vec<Passage> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let window = config.window_chars.max(1);
    // Clamped here as well as in config validation so a hand-built config
    // cannot cause an infinite loop.
    let overlap = config.overlap_chars.min(window - 1);
    let stride = window - overlap;

    let mut passages = Vec::new();
    let mut start = 0usize;
    let mut seq = 0usize;

    loop {
        let end = (start + window).min(chars.len());
        let passage_text: String = chars[start..end].iter().collect();
        passages.push(Passage {
            id: passage_id(corpus, seq),
            corpus,
            seq,
            start,
            end,
            page: structure.page_at(start),
            text: passage_text,
        });
        if end == chars.len() {
            break;
        }
        start += stride;
        seq += 1;
    }

    passages
}

/// Deterministic passage id: first 16 bytes of
/// SHA-256(corpus handle ‖ sequence index).
fn passage_id(corpus: CorpusHandle, seq: usize) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(corpus.as_bytes());
    hasher.update((seq as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}
