//! # DocQA
//!
//! A single-document question-answering service.
//!
//! DocQA ingests one PDF or DOCX document at a time (uploading a new file
//! atomically replaces the previous corpus), indexes it as embedded text
//! chunks in SQLite, and answers natural-language questions grounded in the
//! retrieved chunks. Answers cite their origin as `file (Hal. page)` and the
//! model is instructed to refuse rather than invent when the document does
//! not contain the answer. A standalone grammar-analysis endpoint shares the
//! generation provider.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Upload  │──▶│   Pipeline    │──▶│  SQLite    │
//! │ PDF/DOCX │   │ Chunk+Embed  │   │ VectorIdx │
//! └──────────┘   └──────────────┘   └────┬──────┘
//!                                        │
//!                    ┌───────────────────┤
//!                    ▼                   ▼
//!               ┌──────────┐       ┌──────────┐
//!               │   CLI    │       │   HTTP   │
//!               │ (docqa)  │       │  (axum)  │
//!               └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa ingest ./report.pdf          # index a document
//! docqa ask "Who wrote the report?"  # one-shot question
//! docqa serve                        # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF/DOCX page-level text extraction |
//! | [`chunk`] | Recursive text chunking with overlap |
//! | [`embedding`] | Embedding provider abstraction (OpenAI, Ollama) |
//! | [`generation`] | Text generation abstraction (Gemini, OpenAI, Ollama) |
//! | [`index`] | SQLite vector index with cosine search |
//! | [`corpus`] | Active corpus: ingestion and atomic replacement |
//! | [`rewrite`] | Conversational query rewriting |
//! | [`engine`] | Retrieval + grounded answer synthesis |
//! | [`grammar`] | Standalone grammar analysis |
//! | [`server`] | HTTP API (axum) |

pub mod chunk;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod engine;
pub mod extract;
pub mod generation;
pub mod grammar;
pub mod index;
pub mod models;
pub mod rewrite;
pub mod server;
