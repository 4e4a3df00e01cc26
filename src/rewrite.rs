//! Conversational query rewriting.
//!
//! A follow-up question like "what is his email?" is meaningless on its own;
//! [`rewrite_query`] turns it into a standalone question by showing the
//! generation capability the trailing conversation turns and asking it to
//! restate (not answer) the question with every reference resolved.
//!
//! With no history there is nothing to resolve, so the raw query is returned
//! unchanged without a capability call.

use crate::generation::{GenerationError, Generator};
use crate::models::ConversationTurn;

/// Query rewrite failure. Wraps the underlying generation failure; the
/// caller decides whether to surface it (there is no silent fallback to the
/// raw query here).
#[derive(Debug)]
pub struct RewriteError(pub GenerationError);

impl std::fmt::Display for RewriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "query rewrite failed: {}", self.0)
    }
}

impl std::error::Error for RewriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Rewrite `raw_query` into a standalone question using the last
/// `history_turns` conversation turns. No-op (and no capability call) when
/// the history is empty.
pub async fn rewrite_query(
    generator: &dyn Generator,
    history: &[ConversationTurn],
    raw_query: &str,
    history_turns: usize,
) -> Result<String, RewriteError> {
    if history.is_empty() {
        return Ok(raw_query.to_string());
    }

    let prompt = rewrite_prompt(history, raw_query, history_turns);
    let rewritten = generator.generate(&prompt).await.map_err(RewriteError)?;
    Ok(rewritten.trim().to_string())
}

/// Build the rewrite instruction with a role-tagged transcript of the last
/// `history_turns` turns.
pub fn rewrite_prompt(
    history: &[ConversationTurn],
    raw_query: &str,
    history_turns: usize,
) -> String {
    format!(
        "Given the conversation below and a follow-up question, rewrite the \
         follow-up question as a single self-contained question that resolves \
         every pronoun and implicit reference using the conversation. \
         Do NOT answer the question. Reply with the rewritten question only.\n\n\
         Conversation:\n{}\n\nFollow-up question: {}\n\nStandalone question:",
        format_transcript(history, history_turns),
        raw_query
    )
}

fn format_transcript(history: &[ConversationTurn], history_turns: usize) -> String {
    let start = history.len().saturating_sub(history_turns);
    history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.label(), turn.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Fake generator that resolves "his/her/their" to any capitalized name
    /// appearing in the prompt transcript, recording every prompt it sees.
    struct ResolvingGenerator {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ResolvingGenerator {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for ResolvingGenerator {
        fn model_name(&self) -> &str {
            "fake-rewriter"
        }

        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if prompt.contains("John") {
                Ok("What is John's email address?".to_string())
            } else {
                Ok("standalone question".to_string())
            }
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError::Api("quota exceeded".to_string()))
        }
    }

    #[tokio::test]
    async fn empty_history_returns_raw_query_without_capability_call() {
        let generator = ResolvingGenerator::new();
        let result = rewrite_query(&generator, &[], "What is the deadline?", 4)
            .await
            .unwrap();
        assert_eq!(result, "What is the deadline?");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn follow_up_pronoun_is_resolved_from_history() {
        let generator = ResolvingGenerator::new();
        let history = vec![
            ConversationTurn::user("Who is the manager?"),
            ConversationTurn::assistant("John."),
        ];
        let result = rewrite_query(&generator, &history, "What is his email?", 4)
            .await
            .unwrap();
        assert!(result.contains("John"), "pronoun not resolved: {}", result);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transcript_is_limited_to_last_n_turns() {
        let generator = ResolvingGenerator::new();
        let history = vec![
            ConversationTurn::user("ancient question one"),
            ConversationTurn::assistant("ancient answer one"),
            ConversationTurn::user("recent question"),
            ConversationTurn::assistant("recent answer"),
        ];
        rewrite_query(&generator, &history, "and then?", 2)
            .await
            .unwrap();

        let prompts = generator.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert!(prompt.contains("User: recent question"));
        assert!(prompt.contains("Assistant: recent answer"));
        assert!(!prompt.contains("ancient question one"));
    }

    #[tokio::test]
    async fn prompt_instructs_restating_not_answering() {
        let history = vec![ConversationTurn::user("hello")];
        let prompt = rewrite_prompt(&history, "what now?", 4);
        assert!(prompt.contains("Do NOT answer"));
        assert!(prompt.contains("Follow-up question: what now?"));
    }

    #[tokio::test]
    async fn generation_failure_propagates_as_rewrite_error() {
        let history = vec![ConversationTurn::user("hello")];
        let err = rewrite_query(&FailingGenerator, &history, "and then?", 4)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("query rewrite failed"));
        assert!(matches!(err.0, GenerationError::Api(_)));
    }
}
