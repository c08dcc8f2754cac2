//! docforge - conversational HTML document editing
//!
//! Turns one user utterance plus conversation history plus the current
//! document into either a direct answer or a set of validated, deduplicated
//! full-document candidates:
//! - Prompt builders with explicit response schemas
//! - A gateway that samples completions and keeps whatever parses
//! - Model-assisted pruning of near-duplicate candidates
//! - Deterministic formatting and a linear, revertible document history

pub mod types;
pub mod config;
pub mod schema;
pub mod prompts;
pub mod gateway;
pub mod openai;
pub mod pruning;
pub mod formatter;
pub mod history;
pub mod pipeline;
pub mod session;
pub mod tasks;
pub mod server;

pub use types::*;
pub use config::{ForgeConfig, ModelCatalog};
pub use gateway::{Gateway, GatewayError, ModelBackend, ScriptedBackend};
pub use openai::OpenAiBackend;
pub use history::{DocumentHistory, HistoryError, HistorySnapshot};
pub use pipeline::{DocumentPipeline, PipelineError, StageObserver, CANDIDATE_COUNT};
pub use session::{EditorSession, SessionError, TurnOutcome};

#[cfg(test)]
mod tests;
