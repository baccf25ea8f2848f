//! Grounded answer generation.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ChatError;
use crate::llm::{CompletionRequest, LlmClient};
use crate::types::RetrievedContext;

/// Block emitted when retrieval produced no rows.
pub const NO_DATA_BLOCK: &str =
    "=== NO MATCHING DATA ===\nNo rows in the CRM dataset matched this question.";

/// Turns retrieved rows and session memory into an answer.
#[derive(Clone)]
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
    temperature: Option<f32>,
    apology: String,
}

impl AnswerSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        max_tokens: u32,
        temperature: Option<f32>,
        apology: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            max_tokens,
            temperature,
            apology: apology.into(),
        }
    }

    /// Render the context blocks handed to the model.
    ///
    /// Empty tables are skipped. When no table has rows an explicit
    /// no-data block is emitted before the memory block.
    pub fn build_context(context: &RetrievedContext, memory: &str) -> String {
        let mut blocks: Vec<String> = context
            .non_empty()
            .map(|(category, table)| {
                format!(
                    "=== {} DATA ===\n{}",
                    category.as_str().to_uppercase(),
                    table.render_text()
                )
            })
            .collect();

        if context.has_no_rows() {
            blocks.push(NO_DATA_BLOCK.to_string());
        }
        if !memory.is_empty() {
            blocks.push(format!("=== CONVERSATION MEMORY ===\n{}", memory));
        }
        blocks.join("\n\n")
    }

    pub fn build_prompt(question: &str, context: &RetrievedContext, memory: &str) -> String {
        format!(
            "You are an assistant answering questions about a CRM dataset.\n\
             Answer strictly from the data below and never invent facts.\n\
             Write naturally and use bullet points where they help.\n\n\
             QUESTION:\n{}\n\n\
             DATA:\n{}\n\n\
             Give a short, accurate answer based only on the data above.\n",
            question,
            Self::build_context(context, memory)
        )
    }

    /// Generate an answer, surfacing remote failures as `SynthesisFailure`.
    pub async fn try_synthesize(
        &self,
        question: &str,
        context: &RetrievedContext,
        memory: &str,
    ) -> Result<String, ChatError> {
        let request = CompletionRequest::new(
            Self::build_prompt(question, context, memory),
            self.max_tokens,
        )
        .with_temperature(self.temperature);

        self.llm
            .complete(&request)
            .await
            .map_err(|e| ChatError::SynthesisFailure(e.to_string()))
    }

    /// Generate an answer, returning the apology message on failure.
    pub async fn synthesize(
        &self,
        question: &str,
        context: &RetrievedContext,
        memory: &str,
    ) -> String {
        match self.try_synthesize(question, context, memory).await {
            Ok(answer) => {
                debug!(chars = answer.len(), "Answer synthesized");
                answer
            }
            Err(e) => {
                warn!(error = %e, "Synthesis failed, returning apology");
                self.apology.clone()
            }
        }
    }
}

impl std::fmt::Debug for AnswerSynthesizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerSynthesizer")
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}
