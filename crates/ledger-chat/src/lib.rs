//! Conversational interface over the CRM tables.
//!
//! Classifies each question with a remote model, retrieves matching rows
//! from the in-memory [`TableStore`](ledger_storage::TableStore), and asks the
//! model for an answer grounded in those rows and the session's memory.

pub mod classifier;
pub mod error;
pub mod llm;
pub mod memory;
pub mod orchestrator;
pub mod retrieval;
pub mod synthesizer;
pub mod types;

pub use classifier::IntentClassifier;
pub use error::ChatError;
pub use llm::{CompletionRequest, LlmClient, MockLlm, OpenAiClient};
pub use memory::{MemoryStore, SessionMemory, Turn};
pub use orchestrator::ChatOrchestrator;
pub use retrieval::RetrievalDispatcher;
pub use synthesizer::AnswerSynthesizer;
pub use types::{Category, ChatReply, Intent, RetrievedContext};
