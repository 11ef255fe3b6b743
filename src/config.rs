use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub document: DocumentConfig,
    #[serde(default)]
    pub segmenter: SegmenterConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7431".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    /// Maximum accepted document size in bytes (the UI advertises 50 MB).
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
        }
    }
}

fn default_max_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct SegmenterConfig {
    /// Target passage length in characters.
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    /// Shared span between consecutive passages, strictly less than
    /// `window_chars`.
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_window_chars() -> usize {
    800
}
fn default_overlap_chars() -> usize {
    150
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Passages retrieved per question when the caller does not specify `k`.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Upper clamp for caller-specified `k`.
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Minimum similarity below which passages are non-evidentiary.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
    /// Maximum sentences composed into one answer.
    #[serde(default = "default_max_answer_sentences")]
    pub max_answer_sentences: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            relevance_threshold: default_relevance_threshold(),
            max_answer_sentences: default_max_answer_sentences(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_max_top_k() -> usize {
    20
}
fn default_relevance_threshold() -> f32 {
    0.10
}
fn default_max_answer_sentences() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hashed` (deterministic local), `openai`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "hashed".to_string()
}
fn default_dims() -> usize {
    256
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Capacity bound; exceeding it evicts the least-recently-used corpus.
    #[serde(default = "default_max_corpora")]
    pub max_corpora: usize,
    /// Per-request deadline for `ask`.
    #[serde(default = "default_ask_timeout_secs")]
    pub ask_timeout_secs: u64,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            max_corpora: default_max_corpora(),
            ask_timeout_secs: default_ask_timeout_secs(),
        }
    }
}

fn default_max_corpora() -> usize {
    64
}
fn default_ask_timeout_secs() -> u64 {
    30
}

impl Config {
    /// All-defaults configuration for running without a config file.
    pub fn builtin() -> Self {
        Self {
            server: ServerConfig::default(),
            document: DocumentConfig::default(),
            segmenter: SegmenterConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            corpus: CorpusConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.segmenter.window_chars == 0 {
        anyhow::bail!("segmenter.window_chars must be > 0");
    }
    if config.segmenter.overlap_chars >= config.segmenter.window_chars {
        anyhow::bail!("segmenter.overlap_chars must be strictly less than window_chars");
    }

    if config.retrieval.top_k < 1 || config.retrieval.top_k > config.retrieval.max_top_k {
        anyhow::bail!(
            "retrieval.top_k must be in [1, {}]",
            config.retrieval.max_top_k
        );
    }
    if !(0.0..=1.0).contains(&config.retrieval.relevance_threshold) {
        anyhow::bail!("retrieval.relevance_threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.max_answer_sentences == 0 {
        anyhow::bail!("retrieval.max_answer_sentences must be > 0");
    }

    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    match config.embedding.provider.as_str() {
        "hashed" | "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hashed, openai, or ollama.",
            other
        ),
    }
    if config.embedding.provider != "hashed" && config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified when provider is '{}'",
            config.embedding.provider
        );
    }

    if config.document.max_bytes == 0 {
        anyhow::bail!("document.max_bytes must be > 0");
    }
    if config.corpus.max_corpora == 0 {
        anyhow::bail!("corpus.max_corpora must be > 0");
    }

    Ok(())
}
