//! Retrieval-synthesis engine.
//!
//! Answers a question from the active corpus: rewrite the query against the
//! conversation history, retrieve the top-K most similar chunks, and issue
//! one generation call whose prompt embeds the retrieved text verbatim as
//! context. The prompt instructs the model to answer only from that context
//! and to reply with a fixed refusal sentence otherwise; with an empty
//! corpus the context is empty and the same instruction yields the refusal,
//! with no special-cased branch. This is the anti-hallucination contract of
//! the whole system.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::corpus::ActiveCorpus;
use crate::embedding::Embedder;
use crate::generation::Generator;
use crate::index::Hit;
use crate::models::{ConversationTurn, QueryResult};
use crate::rewrite::rewrite_query;

/// The fixed refusal sentence the generation prompt mandates when the
/// retrieved context does not contain the answer.
pub const REFUSAL: &str = "Maaf, jawaban tidak ditemukan di dalam dokumen.";

pub struct QueryEngine {
    corpus: Arc<ActiveCorpus>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    top_k: usize,
    history_turns: usize,
}

impl QueryEngine {
    pub fn new(
        corpus: Arc<ActiveCorpus>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: &Config,
    ) -> Self {
        Self {
            corpus,
            embedder,
            generator,
            top_k: config.retrieval.top_k,
            history_turns: config.rewrite.history_turns,
        }
    }

    /// Answer `query` from the active corpus. Rewrite and generation
    /// failures propagate; no partial or degraded answer is fabricated.
    pub async fn ask(&self, query: &str, history: &[ConversationTurn]) -> Result<QueryResult> {
        let effective_query =
            rewrite_query(self.generator.as_ref(), history, query, self.history_turns).await?;

        let query_vector = self.embedder.embed_one(&effective_query).await?;
        let hits = self.corpus.search(&query_vector, self.top_k).await?;
        tracing::debug!(query = %effective_query, hits = hits.len(), "retrieved context");

        let prompt = answer_prompt(&hits, &effective_query);
        let answer = self.generator.generate(&prompt).await?;

        let sources: HashSet<String> = hits
            .iter()
            .map(|hit| format_source(&hit.source, hit.page))
            .collect();

        Ok(QueryResult {
            answer: answer.trim().to_string(),
            sources,
            rewritten_query: effective_query,
        })
    }
}

/// Build the grounded answer prompt. Retrieved chunk texts appear verbatim
/// as context; the refusal instruction covers both off-topic questions and
/// an empty context.
pub fn answer_prompt(hits: &[Hit], question: &str) -> String {
    let context = hits
        .iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "Answer the question using ONLY the context below. If the context \
         does not contain the answer, reply with exactly this sentence and \
         nothing else: \"{}\"\n\n\
         Context:\n{}\n\nQuestion: {}\n\nAnswer:",
        REFUSAL, context, question
    )
}

/// Render one retrieved chunk's origin for the user: 1-indexed page even
/// though extraction pages are 0-indexed.
pub fn format_source(source: &str, page: usize) -> String {
    format!("{} (Hal. {})", source, page + 1)
}
