//! Intent classification through the completion backend.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::ChatError;
use crate::llm::{CompletionRequest, LlmClient};
use crate::types::Intent;

/// Asks the model to label a message with one of the eight intents.
#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: u32) -> Self {
        Self { llm, max_tokens }
    }

    /// Build the classification prompt for `message`.
    pub fn prompt(message: &str) -> String {
        let mut prompt = String::from(
            "You classify questions sent to a CRM assistant.\n\n\
             Message:\n\"\"\"",
        );
        prompt.push_str(message);
        prompt.push_str("\"\"\"\n\nPick exactly one label from this list:\n\n");
        for intent in Intent::ALL {
            prompt.push_str("- ");
            prompt.push_str(intent.label());
            prompt.push('\n');
        }
        prompt.push_str("\nReply with the label only.\n");
        prompt
    }

    /// Classify, surfacing remote failures and unknown labels as
    /// `ClassificationFailure`.
    pub async fn try_classify(&self, message: &str) -> Result<Intent, ChatError> {
        let request =
            CompletionRequest::new(Self::prompt(message), self.max_tokens).with_temperature(Some(0.0));
        let reply = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| ChatError::ClassificationFailure(e.to_string()))?;

        parse_label(&reply).ok_or_else(|| {
            ChatError::ClassificationFailure(format!("unrecognised label: {:?}", reply))
        })
    }

    /// Classify, falling back to `GeneralQuestion` on any failure.
    pub async fn classify(&self, message: &str) -> Intent {
        match self.try_classify(message).await {
            Ok(intent) => {
                debug!(intent = %intent, "Message classified");
                intent
            }
            Err(e) => {
                warn!(error = %e, "Classification failed, using general_question");
                Intent::GeneralQuestion
            }
        }
    }
}

impl std::fmt::Debug for IntentClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentClassifier")
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Normalise a model reply and map it to an intent.
///
/// Tolerates surrounding whitespace, quotes, backticks, trailing
/// punctuation and case differences.
pub fn parse_label(reply: &str) -> Option<Intent> {
    let cleaned = reply
        .trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`'))
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | '!' | ';' | ':'))
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`'))
        .trim()
        .to_lowercase();
    cleaned.parse().ok()
}
