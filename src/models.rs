//! Core data models used throughout docqa.
//!
//! These types represent the document, chunks, conversation turns, and query
//! results that flow through the ingestion and question-answering pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One page (or section) of extracted document text.
#[derive(Debug, Clone)]
pub struct Page {
    /// Zero-indexed page number as produced by extraction.
    pub number: usize,
    pub text: String,
}

/// The single active document. Created on upload, fully superseded
/// (and its index replaced) by the next upload.
#[derive(Debug, Clone)]
pub struct Document {
    pub file_name: String,
    pub pages: Vec<Page>,
}

/// A bounded text window derived from one page of the active document.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// File name of the document this chunk came from.
    pub source: String,
    /// Zero-indexed source page number.
    pub page: usize,
    /// Position within the document's chunk sequence.
    pub chunk_index: i64,
    /// SHA-256 hash of `text`.
    pub hash: String,
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One turn of the caller-owned chat history. The pipeline treats the
/// history as read-only input and never persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Result of one `ask` call. Produced fresh per call, never retained.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub answer: String,
    /// Human-readable source attributions, `"{file} (Hal. {page})"` with
    /// 1-indexed page numbers. Deduplicated; order not guaranteed.
    pub sources: HashSet<String>,
    /// The effective query after conversational rewriting (equal to the
    /// raw query when no history was supplied).
    pub rewritten_query: String,
}

/// Summary returned by a successful ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub file_name: String,
    pub chunk_count: usize,
}
