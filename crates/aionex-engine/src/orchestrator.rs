//! Generate → suggest pipeline
//!
//! ```text
//! Idle -> Generating -> Suggesting -> Idle
//!              \-> Idle (on error)
//! ```
//!
//! A successful generation is recorded in history before suggestions are
//! requested. Suggestion failures never undo a generation; they degrade to an
//! empty result.

use crate::llm::{parse_ai_response, parse_suggestions, prompts};
use aionex_core::error::{Error, Result};
use aionex_core::history::{HistoryStore, NewHistoryItem};
use aionex_core::protocol::{
    Agent, AiClient, AiProvider, AiResponse, CompletionRequest, GenerationSettings, ResponseSchema,
    SuggestionResult,
};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    Generating,
    Suggesting,
}

/// Everything a generation needs, captured at the moment it was requested.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub file_path: String,
    pub file_content: String,
    pub prompt: String,
    pub settings: GenerationSettings,
    pub agent: Agent,
    pub supervisor_instruction: String,
    pub orchestrator_instruction: String,
}

/// First phase: the response and the history entry it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub response: AiResponse,
    pub history_id: u64,
}

/// Second phase. `error` is set when the request failed and `result` is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Suggested {
    pub result: SuggestionResult,
    pub error: Option<Error>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub generation: Generated,
    pub suggestions: Suggested,
}

#[derive(Debug, Clone)]
pub struct QuickSuggestRequest {
    pub provider: AiProvider,
    pub file_path: String,
    pub prompt: String,
    pub last_response: AiResponse,
}

/// Display-only stand-in shown when a generation fails.
pub fn error_response(err: &Error) -> AiResponse {
    AiResponse::new(format!("**Error:** {}", err), format!("// Error: {}", err))
}

pub struct GenerationOrchestrator {
    client: Arc<dyn AiClient>,
    history: Arc<HistoryStore>,
    state: Mutex<OrchestratorState>,
}

/// Returns the orchestrator to `Idle` however the operation ends.
struct PhaseGuard<'a> {
    orchestrator: &'a GenerationOrchestrator,
}

impl PhaseGuard<'_> {
    fn advance(&self, next: OrchestratorState) {
        *self.orchestrator.lock() = next;
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *self.orchestrator.lock() = OrchestratorState::Idle;
    }
}

impl GenerationOrchestrator {
    pub fn new(client: Arc<dyn AiClient>, history: Arc<HistoryStore>) -> Self {
        Self {
            client,
            history,
            state: Mutex::new(OrchestratorState::Idle),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        *self.lock()
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    fn begin(&self, phase: OrchestratorState) -> Result<PhaseGuard<'_>> {
        let mut state = self.lock();
        if *state != OrchestratorState::Idle {
            tracing::debug!("Rejecting request while {:?}", *state);
            return Err(Error::Busy);
        }
        *state = phase;
        Ok(PhaseGuard { orchestrator: self })
    }

    /// Run both phases. Errors come only from the generation phase; nothing is
    /// recorded in history when it fails.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationReport> {
        let guard = self.begin(OrchestratorState::Generating)?;

        tracing::info!(
            "Generating for {} with {} ({})",
            request.file_path,
            request.agent,
            request.settings.provider
        );
        let response = match self.request_response(&request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!("Generation failed: {}", err);
                return Err(err);
            }
        };

        let entry = self.history.append(NewHistoryItem {
            prompt: request.prompt.clone(),
            response: response.clone(),
            file_path: request.file_path.clone(),
            file_content: request.file_content.clone(),
            agent: request.agent,
        });

        guard.advance(OrchestratorState::Suggesting);
        let suggestions = match self
            .request_suggestions(
                request.settings.provider,
                &request.file_path,
                &request.prompt,
                &response,
            )
            .await
        {
            Ok(result) => Suggested {
                result,
                error: None,
            },
            Err(err) => {
                tracing::warn!("Follow-up suggestions unavailable: {}", err);
                Suggested {
                    result: SuggestionResult::default(),
                    error: Some(err),
                }
            }
        };

        Ok(GenerationReport {
            generation: Generated {
                response,
                history_id: entry.id,
            },
            suggestions,
        })
    }

    /// One suggestion request, independent of any generation. Returns the
    /// first suggestion, if any. Does not touch history.
    pub async fn quick_suggest(&self, request: QuickSuggestRequest) -> Result<Option<String>> {
        let _guard = self.begin(OrchestratorState::Suggesting)?;
        let prompt = if request.prompt.trim().is_empty() {
            prompts::STARTER_PROMPT
        } else {
            request.prompt.as_str()
        };
        let result = self
            .request_suggestions(
                request.provider,
                &request.file_path,
                prompt,
                &request.last_response,
            )
            .await?;
        Ok(result.suggestions.into_iter().next())
    }

    async fn request_response(&self, request: &GenerationRequest) -> Result<AiResponse> {
        let system_prompt = prompts::generation_system(&prompts::GenerationPrompt {
            file_name: &request.file_path,
            file_content: &request.file_content,
            user_prompt: &request.prompt,
            agent: request.agent,
            supervisor_instruction: &request.supervisor_instruction,
            orchestrator_instruction: &request.orchestrator_instruction,
        });
        let text = self
            .client
            .complete(CompletionRequest {
                provider: request.settings.provider,
                system_prompt,
                schema: ResponseSchema::ai_response(),
                temperature: request.settings.temperature,
            })
            .await?;
        parse_ai_response(&text)
    }

    async fn request_suggestions(
        &self,
        provider: AiProvider,
        file_path: &str,
        prompt: &str,
        last_response: &AiResponse,
    ) -> Result<SuggestionResult> {
        let text = self
            .client
            .complete(CompletionRequest {
                provider,
                system_prompt: prompts::suggestion_system(
                    file_path,
                    prompt,
                    &last_response.code_content,
                ),
                schema: ResponseSchema::suggestions(),
                temperature: prompts::SUGGESTION_TEMPERATURE,
            })
            .await?;
        Ok(parse_suggestions(&text))
    }

    fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
