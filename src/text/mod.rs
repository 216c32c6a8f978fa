//! Text preparation: dialogue generation and speech normalisation

pub mod dialogue;
pub mod numbers;

pub use dialogue::{DialogueEngine, OllamaClient};
pub use numbers::{number_to_words, EnglishNumberSpeller, TextTransform};

use crate::error::{PipelineError, Result};

/// Prompt asking for a short, spoken-style reply to `input`
pub fn conversational_prompt(input: &str) -> String {
    format!(
        "As a helpful and friendly AI assistant, respond naturally and conversationally \
         to the following query. Keep your answer concise, ideally within 1-2 sentences, \
         and make it sound like a real person talking: \n{}",
        input
    )
}

/// Prompt asking for a bare one or two line answer to `input`
pub fn answer_prompt(input: &str) -> String {
    format!(
        "simple in 1-2 line English sentences, only answer,always check and clarify the answer: \n{}",
        input
    )
}

/// Generate the spoken reply for a conversational request
pub async fn converse(engine: &dyn DialogueEngine, input: &str) -> Result<String> {
    let input = non_empty(input)?;
    let answer = engine.generate(&conversational_prompt(input)).await?;
    log::info!("Dialogue engine {} answered with {} chars", engine.engine_name(), answer.len());
    Ok(answer)
}

/// Text-only answer to a question, without any media
pub async fn answer_only(engine: &dyn DialogueEngine, question: &str) -> Result<String> {
    let question = non_empty(question)?;
    engine.generate(&answer_prompt(question)).await
}

fn non_empty(input: &str) -> Result<&str> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PipelineError::Validation("text must not be empty".to_string()));
    }
    Ok(input)
}

/// Apply the optional transform; without one the text passes through unchanged
pub fn normalize(text: &str, transform: Option<&dyn TextTransform>) -> String {
    match transform {
        Some(transform) => {
            let out = transform.apply(text);
            if out != text {
                log::debug!("{} rewrote text: {:?}", transform.name(), out);
            }
            out
        }
        None => text.to_string(),
    }
}
