//! # cortexqa
//!
//! A document question-answering service: ingest a PDF, DOCX, or plain-text
//! document, index it in memory, and ask questions that are answered with
//! sentences extracted verbatim from the document, each answer carrying
//! citations back to the passages it came from.
//!
//! The pipeline per document is parse → segment → embed → index; questions
//! then run embed → retrieve → synthesize against the frozen index.
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`parse`] | Bytes → plain text with page structure |
//! | [`segment`] | Text → overlapping passages with stable identities |
//! | [`embedding`] | Texts → vectors (local hashed, OpenAI, or Ollama) |
//! | [`index`] | Exact cosine KNN over passage vectors |
//! | [`synthesize`] | Retrieved passages → grounded answer with citations |
//! | [`corpus`] | Per-document lifecycle and the handle registry |
//! | [`server`] | JSON HTTP API |

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod parse;
pub mod segment;
pub mod server;
pub mod synthesize;
