//! Embedding providers and vector math.
//!
//! One `embed_texts` entry point serves both index building and query
//! embedding — passages and questions must pass through the same embedding
//! function or retrieval quality silently degrades.
//!
//! Providers, dispatched on `embedding.provider`:
//! - **`hashed`** (default) — deterministic feature-hashed bag of words.
//!   Runs entirely in process with no model download or network call, which
//!   also keeps the grounding and threshold test suites reproducible.
//! - **`openai`** — `POST /v1/embeddings` with batching, retry, and backoff.
//! - **`ollama`** — a local Ollama instance's `/api/embed` endpoint.
//!
//! Remote providers retry rate limits (429), server errors (5xx), and
//! network failures with exponential backoff capped at 32s; other client
//! errors fail the batch immediately.

use anyhow::{bail, Result};
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// Embed a batch of texts using the configured provider. Output vectors are
/// in input order, one per text.
pub async fn embed_texts(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    match config.provider.as_str() {
        "hashed" => Ok(texts
            .iter()
            .map(|t| embed_hashed(t, config.dims))
            .collect()),
        "openai" => embed_openai(config, texts).await,
        "ollama" => embed_ollama(config, texts).await,
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Embed a single question for retrieval.
pub async fn embed_query(config: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
    let results = embed_texts(config, &[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

// ============ Hashed provider ============

/// Tokens too common to carry evidence; kept small and lowercase.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "do", "does", "for", "from", "how",
    "in", "is", "it", "its", "of", "on", "or", "that", "the", "this", "to", "was", "what", "when",
    "where", "which", "who", "why", "will", "with",
];

/// Deterministic feature-hashed bag-of-words embedding.
///
/// Each non-stopword token is hashed into one of `dims` buckets with a
/// signed contribution; the vector is L2-normalized. Texts sharing content
/// words get positive cosine similarity; lexically unrelated texts land
/// near zero.
pub fn embed_hashed(text: &str, dims: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dims];
    for token in tokenize(text) {
        let h = fnv1a64(token.as_bytes());
        let bucket = (h % dims as u64) as usize;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vec[bucket] += sign;
    }
    l2_normalize(&mut vec);
    vec
}

pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

// ============ Remote providers ============

/// Delay before retry `attempt` (1-based): 1s, 2s, 4s, ... capped at 32s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

fn transient(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

async fn embed_openai(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let api_key =
        std::env::var("OPENAI_API_KEY").map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let body = serde_json::json!({ "model": model, "input": texts });

    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        let resp = client
            .post("https://api.openai.com/v1/embeddings")
            .bearer_auth(&api_key)
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_openai_response(&json);
                }
                let body_text = response.text().await.unwrap_or_default();
                if !transient(status) {
                    bail!("OpenAI embeddings request failed ({}): {}", status, body_text);
                }
                last_err = Some(anyhow::anyhow!(
                    "OpenAI embeddings request failed ({}): {}",
                    status,
                    body_text
                ));
            }
            Err(e) => last_err = Some(e.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("OpenAI embedding gave up after retries")))
}

fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("OpenAI response missing data array"))?;

    data.iter()
        .map(|item| {
            let embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow::anyhow!("OpenAI response item missing embedding"))?;
            Ok(embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect())
        })
        .collect()
}

async fn embed_ollama(config: &EmbeddingConfig, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let model = config
        .model
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("embedding.model required"))?;
    let url = config.url.as_deref().unwrap_or("http://localhost:11434");

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let body = serde_json::json!({ "model": model, "input": texts });

    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(attempt)).await;
        }

        let resp = client
            .post(format!("{}/api/embed", url))
            .json(&body)
            .send()
            .await;

        match resp {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let json: serde_json::Value = response.json().await?;
                    return parse_ollama_response(&json);
                }
                let body_text = response.text().await.unwrap_or_default();
                if !transient(status) {
                    bail!("Ollama embeddings request failed ({}): {}", status, body_text);
                }
                last_err = Some(anyhow::anyhow!(
                    "Ollama embeddings request failed ({}): {}",
                    status,
                    body_text
                ));
            }
            Err(e) => {
                last_err = Some(anyhow::anyhow!("cannot reach Ollama at {}: {}", url, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Ollama embedding gave up after retries")))
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Ollama response missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            Ok(embedding
                .as_array()
                .ok_or_else(|| anyhow::anyhow!("Ollama embedding is not an array"))?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect())
        })
        .collect()
}

// ============ Vector math ============

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
