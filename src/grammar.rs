//! Grammar analysis.
//!
//! A stateless pass-through: the text is wrapped in a fixed instruction
//! template and sent to the generation capability in one call. No corpus or
//! index involvement.

use crate::generation::{GenerationError, Generator};

const GRAMMAR_TEMPLATE: &str = "Analisis tata bahasa (grammar) dari teks berikut. \
Tunjukkan salahnya dimana dan berikan versi yang benar:";

/// Analyze the grammar of `text` and return the analysis verbatim.
pub async fn analyze(generator: &dyn Generator, text: &str) -> Result<String, GenerationError> {
    let prompt = format!("{}\n\n{}", GRAMMAR_TEMPLATE, text);
    generator.generate(&prompt).await
}
