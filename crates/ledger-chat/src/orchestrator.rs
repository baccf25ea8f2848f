//! Chat orchestrator: central coordinator wiring classifier, retrieval,
//! synthesis, and session memory.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use ledger_core::config::{ChatConfig, LlmConfig};
use ledger_storage::TableStore;

use crate::classifier::IntentClassifier;
use crate::error::ChatError;
use crate::llm::LlmClient;
use crate::memory::{MemoryStore, Turn};
use crate::retrieval::RetrievalDispatcher;
use crate::synthesizer::AnswerSynthesizer;
use crate::types::ChatReply;

/// Runs one chat turn end to end.
pub struct ChatOrchestrator {
    classifier: IntentClassifier,
    dispatcher: RetrievalDispatcher,
    synthesizer: AnswerSynthesizer,
    memory: MemoryStore,
    max_message_length: usize,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<TableStore>,
        llm: Arc<dyn LlmClient>,
        llm_config: &LlmConfig,
        chat_config: &ChatConfig,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(llm.clone(), llm_config.classify_max_tokens),
            dispatcher: RetrievalDispatcher::new(store),
            synthesizer: AnswerSynthesizer::new(
                llm,
                llm_config.synthesis_max_tokens,
                llm_config.synthesis_temperature,
                chat_config.apology_message.clone(),
            ),
            memory: MemoryStore::new(chat_config.memory_turns, chat_config.session_timeout_minutes),
            max_message_length: chat_config.max_message_length,
        }
    }

    /// Handle an incoming chat message.
    ///
    /// Remote failures are absorbed (general intent, apology answer); only
    /// invalid input and session faults are returned as errors.
    pub async fn handle_message(
        &self,
        message: &str,
        session_id: Uuid,
    ) -> Result<ChatReply, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidRequest("message is required".to_string()));
        }
        if message.chars().count() > self.max_message_length {
            return Err(ChatError::MessageTooLong(self.max_message_length));
        }

        let intent = self.classifier.classify(message).await;
        let context = self.dispatcher.dispatch(intent, message);
        let memory = self.memory.render(session_id)?;
        let answer = self.synthesizer.synthesize(message, &context, &memory).await;

        let turns = self
            .memory
            .append(session_id, Turn::new(message, answer.clone()))?;

        info!(
            %session_id,
            intent = %intent,
            rows = context.total_rows(),
            turns,
            "Chat turn handled"
        );

        Ok(ChatReply {
            answer,
            intent,
            session_id,
        })
    }

    /// Drop a session's memory.
    pub fn clear_session(&self, session_id: Uuid) -> Result<(), ChatError> {
        self.memory.clear(session_id)
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn store(&self) -> &TableStore {
        self.dispatcher.store()
    }
}

impl std::fmt::Debug for ChatOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatOrchestrator")
            .field("classifier", &self.classifier)
            .field("synthesizer", &self.synthesizer)
            .field("max_message_length", &self.max_message_length)
            .finish()
    }
}
