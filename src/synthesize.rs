//! Extractive answer synthesis with mandatory citation grounding.
//!
//! The synthesizer composes an answer exclusively from sentences of the
//! retrieved passages, so every claim is attributable by construction. When
//! no retrieved passage clears the relevance threshold it returns
//! [`Synthesis::NoEvidence`] instead of fabricating an answer — declining is
//! a valid grounded outcome, not a fault.

use std::collections::HashSet;

use crate::config::RetrievalConfig;
use crate::embedding::tokenize;
use crate::models::{Answer, Citation, Retrieved};

/// Maximum excerpt length carried in a citation.
const EXCERPT_CHARS: usize = 200;

/// Outcome of answer synthesis.
#[derive(Debug)]
pub enum Synthesis {
    Answer(Answer),
    /// No retrieved passage exceeded the relevance threshold.
    NoEvidence,
}

/// Compose a grounded answer for `question` from `retrieved` passages
/// (ordered by descending retrieval score).
pub fn synthesize(question: &str, retrieved: &[Retrieved], config: &RetrievalConfig) -> Synthesis {
    let evidentiary: Vec<&Retrieved> = retrieved
        .iter()
        .filter(|r| r.score >= config.relevance_threshold)
        .collect();

    if evidentiary.is_empty() {
        return Synthesis::NoEvidence;
    }

    let question_terms: HashSet<String> = tokenize(question).collect();

    // Candidate sentences from every evidentiary passage, scored by how many
    // distinct question terms they contain.
    struct Candidate {
        rank: usize,
        sentence_idx: usize,
        text: String,
        term_hits: usize,
    }

    let mut candidates = Vec::new();
    for (rank, r) in evidentiary.iter().enumerate() {
        for (sentence_idx, sentence) in split_sentences(&r.passage.text).into_iter().enumerate() {
            let sentence_terms: HashSet<String> = tokenize(&sentence).collect();
            let term_hits = sentence_terms.intersection(&question_terms).count();
            candidates.push(Candidate {
                rank,
                sentence_idx,
                text: sentence,
                term_hits,
            });
        }
    }

    let any_hits = candidates.iter().any(|c| c.term_hits > 0);
    if any_hits {
        candidates.retain(|c| c.term_hits > 0);
    } else {
        // No lexical anchor in any sentence; still grounded: lead with the
        // top-scoring passage's opening sentence.
        candidates.truncate(1);
    }

    candidates.sort_by(|a, b| {
        b.term_hits
            .cmp(&a.term_hits)
            .then(a.rank.cmp(&b.rank))
            .then(a.sentence_idx.cmp(&b.sentence_idx))
    });
    candidates.truncate(config.max_answer_sentences);

    // Present selected sentences in document order for readability.
    candidates.sort_by_key(|c| (evidentiary[c.rank].passage.seq, c.sentence_idx));

    let text = candidates
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    // Cite exactly the passages a sentence was taken from, in retrieval order.
    let used_ranks: HashSet<usize> = candidates.iter().map(|c| c.rank).collect();
    let citations: Vec<Citation> = evidentiary
        .iter()
        .enumerate()
        .filter(|(rank, _)| used_ranks.contains(rank))
        .map(|(_, r)| Citation {
            passage_id: r.passage.id,
            seq: r.passage.seq,
            page: r.passage.page,
            excerpt: r.passage.excerpt(EXCERPT_CHARS),
        })
        .collect();

    Synthesis::Answer(Answer { text, citations })
}

/// Naive sentence splitter: breaks after `.`, `!`, or `?` followed by
/// whitespace. Good enough for extractive selection; never splits inside a
/// sentence terminator run ("...").
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let next_is_boundary = chars.peek().map(|c| c.is_whitespace()).unwrap_or(true);
            let next_is_terminator = chars.peek().map(|c| matches!(c, '.' | '!' | '?')).unwrap_or(false);
            if next_is_boundary && !next_is_terminator {
                let trimmed = current.trim();
                if !trimmed.is_empty() {
                    sentences.push(trimmed.to_string());
                }
                current.clear();
            }
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}
