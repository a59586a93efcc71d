//! One connected repository and everything the user does with it
//!
//! `Session` wires the tree, file state, history, and generation pipeline
//! together and keeps the composer (prompt, agent, settings, instructions)
//! and the response display that a front end renders.

use crate::llm::prompts::{
    DEFAULT_ORCHESTRATOR_INSTRUCTION, DEFAULT_SUPERVISOR_INSTRUCTION, EXAMPLE_PROMPTS,
};
use crate::orchestrator::{
    error_response, GenerationOrchestrator, GenerationReport, GenerationRequest,
    QuickSuggestRequest,
};
use aionex_core::error::{Error, Result};
use aionex_core::file_state::{FileSnapshot, FileStateManager, FileStatus, SelectOutcome};
use aionex_core::history::{HistoryItem, HistoryStore};
use aionex_core::protocol::{Agent, AiClient, AiProvider, AiResponse, GenerationSettings};
use aionex_core::store::{RemoteFileStore, StoreCapabilities, VersionToken};
use aionex_core::tree::{build_tree, FileTree};
use std::sync::Arc;

/// Composer values a session starts with, usually from config.
#[derive(Debug, Clone, Default)]
pub struct SessionDefaults {
    pub settings: GenerationSettings,
    pub agent: Agent,
    pub supervisor_instruction: Option<String>,
    pub orchestrator_instruction: Option<String>,
}

#[derive(Debug, Clone)]
struct Composer {
    prompt: String,
    agent: Agent,
    settings: GenerationSettings,
    supervisor_instruction: String,
    orchestrator_instruction: String,
}

/// What the response panel shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseDisplay {
    pub response: Option<AiResponse>,
    pub suggestions: Vec<String>,
    pub hint: Option<String>,
    /// Set when the last generation failed; `response` then holds the
    /// synthetic error response.
    pub error: Option<String>,
}

pub struct Session {
    store: Arc<dyn RemoteFileStore>,
    tree: FileTree,
    files: FileStateManager,
    orchestrator: GenerationOrchestrator,
    composer: Composer,
    display: ResponseDisplay,
}

impl Session {
    /// List the store and build the tree. Malformed entries are skipped and
    /// kept in [`Session::skipped_entries`].
    pub async fn connect(
        store: Arc<dyn RemoteFileStore>,
        ai: Arc<dyn AiClient>,
        defaults: SessionDefaults,
    ) -> Result<Self> {
        let entries = store.list_entries().await?;
        let tree = build_tree(&entries);
        tracing::info!(
            "Connected to {}: {} files ({} entries skipped)",
            store.label(),
            tree.file_count(),
            tree.skipped.len()
        );
        for err in &tree.skipped {
            tracing::warn!("Skipped entry: {}", err);
        }

        let composer = Composer {
            prompt: String::new(),
            agent: defaults.agent,
            settings: defaults.settings,
            supervisor_instruction: defaults
                .supervisor_instruction
                .unwrap_or_else(|| DEFAULT_SUPERVISOR_INSTRUCTION.to_string()),
            orchestrator_instruction: defaults
                .orchestrator_instruction
                .unwrap_or_else(|| DEFAULT_ORCHESTRATOR_INSTRUCTION.to_string()),
        };

        Ok(Self {
            files: FileStateManager::new(store.clone()),
            orchestrator: GenerationOrchestrator::new(ai, Arc::new(HistoryStore::new())),
            store,
            tree,
            composer,
            display: ResponseDisplay::default(),
        })
    }

    pub fn label(&self) -> String {
        self.store.label()
    }

    pub fn capabilities(&self) -> StoreCapabilities {
        self.store.capabilities()
    }

    pub fn tree(&self) -> &FileTree {
        &self.tree
    }

    pub fn skipped_entries(&self) -> &[Error] {
        &self.tree.skipped
    }

    // ─────────────────────────────────────────────────────────────────────
    // Active file
    // ─────────────────────────────────────────────────────────────────────

    pub async fn select_file(&self, path: &str) -> Result<SelectOutcome> {
        if self.tree.find(path).is_some_and(|node| node.is_dir()) {
            return Err(Error::validation(path, "is a directory"));
        }
        self.files.select_file(path).await
    }

    pub fn edit(&self, content: impl Into<String>) -> Result<()> {
        self.files.edit(content)
    }

    pub async fn commit(&self, message: &str) -> Result<VersionToken> {
        self.files.commit(message).await
    }

    pub fn file_status(&self) -> FileStatus {
        self.files.status()
    }

    pub fn snapshot(&self) -> Option<FileSnapshot> {
        self.files.snapshot()
    }

    /// Drop the active file, tree, and display. History is kept.
    pub fn disconnect(&mut self) {
        tracing::info!("Disconnecting from {}", self.store.label());
        self.files.disconnect();
        self.tree = FileTree::default();
        self.display = ResponseDisplay::default();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Composer
    // ─────────────────────────────────────────────────────────────────────

    pub fn prompt(&self) -> &str {
        &self.composer.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.composer.prompt = prompt.into();
    }

    pub fn agent(&self) -> Agent {
        self.composer.agent
    }

    pub fn set_agent(&mut self, agent: Agent) {
        self.composer.agent = agent;
    }

    pub fn settings(&self) -> GenerationSettings {
        self.composer.settings
    }

    /// Returns the temperature actually applied after clamping.
    pub fn set_temperature(&mut self, temperature: f32) -> f32 {
        self.composer.settings = self.composer.settings.with_temperature(temperature);
        self.composer.settings.temperature
    }

    pub fn set_provider(&mut self, provider: AiProvider) {
        self.composer.settings.provider = provider;
    }

    pub fn supervisor_instruction(&self) -> &str {
        &self.composer.supervisor_instruction
    }

    /// `None` restores the default text.
    pub fn set_supervisor_instruction(&mut self, instruction: Option<String>) {
        self.composer.supervisor_instruction =
            instruction.unwrap_or_else(|| DEFAULT_SUPERVISOR_INSTRUCTION.to_string());
    }

    pub fn orchestrator_instruction(&self) -> &str {
        &self.composer.orchestrator_instruction
    }

    /// `None` restores the default text.
    pub fn set_orchestrator_instruction(&mut self, instruction: Option<String>) {
        self.composer.orchestrator_instruction =
            instruction.unwrap_or_else(|| DEFAULT_ORCHESTRATOR_INSTRUCTION.to_string());
    }

    pub fn example_prompts(&self) -> &'static [&'static str] {
        EXAMPLE_PROMPTS
    }

    // ─────────────────────────────────────────────────────────────────────
    // Generation
    // ─────────────────────────────────────────────────────────────────────

    pub fn display(&self) -> &ResponseDisplay {
        &self.display
    }

    /// Newest first.
    pub fn history(&self) -> Vec<HistoryItem> {
        self.orchestrator.history().items()
    }

    /// Generate for the current buffer and prompt, then fetch follow-up
    /// suggestions. On failure the display shows a synthetic error response
    /// and the error is returned.
    pub async fn generate(&mut self) -> Result<GenerationReport> {
        let snapshot = self.loaded_snapshot()?;
        if self.composer.prompt.trim().is_empty() {
            return Err(Error::invalid_state("Enter a prompt first"));
        }

        self.display = ResponseDisplay::default();
        let request = GenerationRequest {
            file_path: snapshot.path,
            file_content: snapshot.content,
            prompt: self.composer.prompt.clone(),
            settings: self.composer.settings,
            agent: self.composer.agent,
            supervisor_instruction: self.composer.supervisor_instruction.clone(),
            orchestrator_instruction: self.composer.orchestrator_instruction.clone(),
        };

        match self.orchestrator.generate(request).await {
            Ok(report) => {
                self.display.response = Some(report.generation.response.clone());
                self.display.suggestions = report.suggestions.result.suggestions.clone();
                self.display.hint = report.suggestions.result.hint.clone();
                Ok(report)
            }
            Err(err) => {
                self.display.response = Some(error_response(&err));
                self.display.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Ask for one prompt idea. A non-empty answer replaces the prompt being
    /// composed and is returned.
    pub async fn quick_suggest(&mut self) -> Result<Option<String>> {
        let snapshot = self.loaded_snapshot()?;
        let request = QuickSuggestRequest {
            provider: self.composer.settings.provider,
            file_path: snapshot.path,
            prompt: self.composer.prompt.clone(),
            last_response: self.display.response.clone().unwrap_or_default(),
        };
        let suggestion = self.orchestrator.quick_suggest(request).await?;
        if let Some(text) = &suggestion {
            self.composer.prompt = text.clone();
        }
        Ok(suggestion)
    }

    /// Copy a displayed suggestion (0-based) into the prompt.
    pub fn use_suggestion(&mut self, index: usize) -> Result<&str> {
        let suggestion = self
            .display
            .suggestions
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("suggestion {}", index + 1)))?;
        self.composer.prompt = suggestion.clone();
        Ok(&self.composer.prompt)
    }

    /// Put the session back where history entry `id` was made. The prompt,
    /// agent and response come back first. The file is then re-read for a
    /// fresh version token and its buffer replaced with the historical
    /// content, so it is dirty. If the re-read fails the error is returned
    /// and the previously open file is left as it was. The AI is not called.
    pub async fn restore(&mut self, id: u64) -> Result<()> {
        let snapshot = self.orchestrator.history().restore(id)?;
        tracing::info!("Restoring history entry {} ({})", id, snapshot.path);

        self.composer.prompt = snapshot.prompt;
        self.composer.agent = snapshot.agent;
        self.display = ResponseDisplay {
            response: Some(snapshot.response),
            ..ResponseDisplay::default()
        };

        match self.files.select_file(&snapshot.path).await {
            Ok(SelectOutcome::Loaded) => self.files.edit(snapshot.content),
            Ok(SelectOutcome::Superseded) => Err(Error::invalid_state(format!(
                "Another file was opened while restoring {}",
                snapshot.path
            ))),
            Err(err) => {
                tracing::warn!("Could not re-read {} for restore: {}", snapshot.path, err);
                Err(err)
            }
        }
    }

    fn loaded_snapshot(&self) -> Result<FileSnapshot> {
        match self.files.status() {
            FileStatus::Loaded { .. } => self
                .files
                .snapshot()
                .ok_or_else(|| Error::invalid_state("Open a file first")),
            FileStatus::NoFile => Err(Error::invalid_state("Open a file first")),
            FileStatus::Loading { path } => {
                Err(Error::invalid_state(format!("{} is still loading", path)))
            }
            FileStatus::Committing { path } => {
                Err(Error::invalid_state(format!("{} is being committed", path)))
            }
        }
    }
}
