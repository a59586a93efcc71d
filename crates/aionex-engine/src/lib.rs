//! AI generation for aionex: the OpenRouter client, prompts, the
//! generate → suggest pipeline, and the [`Session`] facade.

pub mod llm;
pub mod orchestrator;
pub mod session;

pub use orchestrator::{
    error_response, GenerationOrchestrator, GenerationReport, GenerationRequest, Generated,
    OrchestratorState, QuickSuggestRequest, Suggested,
};
pub use session::{ResponseDisplay, Session, SessionDefaults};
