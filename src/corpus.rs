//! Corpus lifecycle management.
//!
//! The [`CorpusManager`] owns the handle→corpus registry and is the single
//! point of truth for whether a corpus is usable. Per corpus the state
//! machine is `pending → indexing → ready | failed`; failure is terminal,
//! and eviction removes the entry outright.
//!
//! Concurrency model: the registry lock guards only map access and is never
//! held across await points; each entry carries its own state lock, so
//! transitions on different handles never block each other. A ready corpus
//! is an immutable `Arc` snapshot — `ask` clones the `Arc` and works on a
//! consistent view even if the corpus is evicted mid-flight. The index is
//! built entirely off to the side and published in one state write, so a
//! partially built index is never observable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use crate::config::Config;
use crate::embedding;
use crate::error::{AskError, ParseError};
use crate::index::VectorIndex;
use crate::models::{CorpusHandle, CorpusStatus, DocumentMeta, Passage, Retrieved};
use crate::parse;
use crate::segment::segment;
use crate::synthesize::{synthesize, Synthesis};

/// Immutable snapshot of a fully indexed corpus.
pub struct ReadyCorpus {
    pub passages: Vec<Passage>,
    pub index: VectorIndex,
}

enum CorpusState {
    Pending,
    Indexing,
    Ready(Arc<ReadyCorpus>),
    Failed { reason: String },
}

struct CorpusEntry {
    meta: DocumentMeta,
    state: RwLock<CorpusState>,
    /// Unix millis of last use, for LRU capacity eviction.
    last_used: AtomicI64,
}

impl CorpusEntry {
    fn touch(&self) {
        self.last_used
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

/// Point-in-time view of a corpus's lifecycle, as reported to callers.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: CorpusStatus,
    /// Failure reason, present only when `status` is `failed`.
    pub reason: Option<String>,
    /// Number of passages, present once the corpus is ready.
    pub passage_count: Option<usize>,
}

/// Owns all corpora and runs their ingestion pipelines.
pub struct CorpusManager {
    config: Arc<Config>,
    corpora: RwLock<HashMap<CorpusHandle, Arc<CorpusEntry>>>,
}

impl CorpusManager {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            corpora: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accept a document and start its ingestion pipeline.
    ///
    /// Size and binary-signature validation run synchronously so
    /// caller-fixable errors are reported immediately; parsing, segmenting,
    /// embedding, and index construction run as a spawned task. The returned
    /// handle starts in `pending`. Re-ingesting after a failure always
    /// issues a fresh handle — failed corpora stay terminal.
    pub fn ingest(
        self: &Arc<Self>,
        bytes: Vec<u8>,
        media_type: String,
        name: Option<String>,
    ) -> Result<CorpusHandle, ParseError> {
        parse::validate(&bytes, &media_type, self.config.document.max_bytes)?;

        let handle = Uuid::new_v4();
        let entry = Arc::new(CorpusEntry {
            meta: DocumentMeta {
                name,
                media_type: media_type.clone(),
                size_bytes: bytes.len(),
                created_at: Utc::now(),
            },
            state: RwLock::new(CorpusState::Pending),
            last_used: AtomicI64::new(Utc::now().timestamp_millis()),
        });

        {
            let mut corpora = self.corpora.write().unwrap();
            if corpora.len() >= self.config.corpus.max_corpora {
                if let Some(victim) = lru_victim(&corpora) {
                    corpora.remove(&victim);
                    tracing::info!(corpus = %victim, "evicted least-recently-used corpus at capacity");
                }
            }
            corpora.insert(handle, entry);
        }

        tracing::info!(corpus = %handle, media_type = %media_type, "ingest accepted");

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(reason) = manager.build_corpus(handle, bytes, media_type).await {
                tracing::warn!(corpus = %handle, %reason, "ingestion failed");
                manager.set_state(handle, CorpusState::Failed { reason });
            }
        });

        Ok(handle)
    }

    /// The full pipeline for one corpus: parse → segment → embed → build →
    /// publish. Any stage error becomes the terminal failure reason. If the
    /// corpus is evicted mid-build, the partial work is simply dropped —
    /// [`set_state`](Self::set_state) on a missing entry is a no-op, so
    /// nothing partial is ever published.
    async fn build_corpus(
        &self,
        handle: CorpusHandle,
        bytes: Vec<u8>,
        media_type: String,
    ) -> std::result::Result<(), String> {
        let max_bytes = self.config.document.max_bytes;
        let parsed = tokio::task::spawn_blocking(move || {
            parse::parse(&bytes, &media_type, max_bytes)
        })
        .await
        .map_err(|e| format!("parser task panicked: {}", e))?
        .map_err(|e| e.to_string())?;

        let passages = segment(
            handle,
            &parsed.text,
            &parsed.structure,
            &self.config.segmenter,
        );
        if passages.is_empty() {
            return Err("document produced no passages".to_string());
        }

        if !self.set_state(handle, CorpusState::Indexing) {
            return Ok(()); // evicted while parsing; discard
        }
        tracing::debug!(corpus = %handle, passages = passages.len(), "indexing");

        let mut embeddings = Vec::with_capacity(passages.len());
        for batch in passages.chunks(self.config.embedding.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|p| p.text.clone()).collect();
            let batch_vecs = embedding::embed_texts(&self.config.embedding, &texts)
                .await
                .map_err(|e| format!("embedding failed: {}", e))?;
            embeddings.extend(batch_vecs);
        }

        let index = VectorIndex::build(embeddings).map_err(|e| e.to_string())?;
        let ready = Arc::new(ReadyCorpus { passages, index });

        if self.set_state(handle, CorpusState::Ready(ready)) {
            tracing::info!(corpus = %handle, "corpus ready");
        }
        Ok(())
    }

    /// Replace an entry's state. Returns false when the handle is gone
    /// (evicted), in which case the new state is dropped.
    fn set_state(&self, handle: CorpusHandle, state: CorpusState) -> bool {
        let entry = {
            let corpora = self.corpora.read().unwrap();
            corpora.get(&handle).cloned()
        };
        match entry {
            Some(entry) => {
                *entry.state.write().unwrap() = state;
                true
            }
            None => false,
        }
    }

    /// Current lifecycle state, or `None` for unknown/evicted handles.
    pub fn status(&self, handle: CorpusHandle) -> Option<StatusReport> {
        let entry = {
            let corpora = self.corpora.read().unwrap();
            corpora.get(&handle).cloned()
        }?;
        let state = entry.state.read().unwrap();
        Some(match &*state {
            CorpusState::Pending => StatusReport {
                status: CorpusStatus::Pending,
                reason: None,
                passage_count: None,
            },
            CorpusState::Indexing => StatusReport {
                status: CorpusStatus::Indexing,
                reason: None,
                passage_count: None,
            },
            CorpusState::Ready(ready) => StatusReport {
                status: CorpusStatus::Ready,
                reason: None,
                passage_count: Some(ready.passages.len()),
            },
            CorpusState::Failed { reason } => StatusReport {
                status: CorpusStatus::Failed,
                reason: Some(reason.clone()),
                passage_count: None,
            },
        })
    }

    /// Source document metadata, if the corpus still exists.
    pub fn document_meta(&self, handle: CorpusHandle) -> Option<DocumentMeta> {
        let corpora = self.corpora.read().unwrap();
        corpora.get(&handle).map(|e| e.meta.clone())
    }

    /// Snapshot of a ready corpus, or the appropriate [`AskError`].
    fn ready_corpus(&self, handle: CorpusHandle) -> std::result::Result<Arc<ReadyCorpus>, AskError> {
        let entry = {
            let corpora = self.corpora.read().unwrap();
            corpora.get(&handle).cloned()
        }
        .ok_or(AskError::CorpusNotFound)?;

        entry.touch();
        let state = entry.state.read().unwrap();
        match &*state {
            CorpusState::Ready(ready) => Ok(Arc::clone(ready)),
            CorpusState::Pending => Err(AskError::CorpusNotReady(CorpusStatus::Pending)),
            CorpusState::Indexing => Err(AskError::CorpusNotReady(CorpusStatus::Indexing)),
            CorpusState::Failed { reason } => Err(AskError::CorpusFailed(reason.clone())),
        }
    }

    /// Top-`k` passages for a question against a ready corpus, descending by
    /// score with ties broken by ascending sequence index. `k` out of range
    /// clamps to `[1, max_top_k]`.
    pub async fn retrieve(
        &self,
        handle: CorpusHandle,
        question: &str,
        k: Option<usize>,
    ) -> Result<Vec<Retrieved>> {
        let ready = self.ready_corpus(handle)?;
        let k = k
            .unwrap_or(self.config.retrieval.top_k)
            .clamp(1, self.config.retrieval.max_top_k);

        let query_vec = embedding::embed_query(&self.config.embedding, question).await?;
        let hits = ready.index.search(&query_vec, k);

        Ok(hits
            .into_iter()
            .map(|(seq, score)| Retrieved {
                passage: ready.passages[seq].clone(),
                score,
            })
            .collect())
    }

    /// Answer a question against a ready corpus: retrieve then synthesize.
    ///
    /// Domain failures surface as [`AskError`] inside the `anyhow` error
    /// (downcast at the HTTP layer). Reads never block ingestion of other
    /// corpora; the retrieval runs on an `Arc` snapshot of the index.
    pub async fn ask(
        &self,
        handle: CorpusHandle,
        question: &str,
        k: Option<usize>,
    ) -> Result<Synthesis> {
        let retrieved = self.retrieve(handle, question, k).await?;
        Ok(synthesize(question, &retrieved, &self.config.retrieval))
    }

    /// Remove a corpus, releasing its passages and index. Idempotent:
    /// returns false when the handle was already gone. In-flight asks
    /// holding the `Arc` snapshot complete against their consistent view.
    pub fn evict(&self, handle: CorpusHandle) -> bool {
        let removed = self.corpora.write().unwrap().remove(&handle).is_some();
        if removed {
            tracing::info!(corpus = %handle, "corpus evicted");
        }
        removed
    }

    /// Number of corpora currently registered.
    pub fn len(&self) -> usize {
        self.corpora.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait until the corpus leaves `pending`/`indexing`. Intended for the
    /// one-shot CLI flow and tests; the HTTP layer polls via `status`.
    pub async fn wait_until_settled(&self, handle: CorpusHandle) -> Option<StatusReport> {
        loop {
            let report = self.status(handle)?;
            match report.status {
                CorpusStatus::Ready | CorpusStatus::Failed => return Some(report),
                _ => tokio::time::sleep(std::time::Duration::from_millis(10)).await,
            }
        }
    }
}

fn lru_victim(corpora: &HashMap<CorpusHandle, Arc<CorpusEntry>>) -> Option<CorpusHandle> {
    corpora
        .iter()
        .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
        .map(|(h, _)| *h)
}
