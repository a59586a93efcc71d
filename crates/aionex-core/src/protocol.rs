use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

/// Persona that selects the system-prompt behavior of the AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    /// Creative: ideas, UI/UX, explanatory content.
    #[default]
    Lyra,
    /// Technical: analysis, refactoring, tests, performance.
    Kara,
}

impl Agent {
    pub fn id(&self) -> &'static str {
        match self {
            Agent::Lyra => "lyra",
            Agent::Kara => "kara",
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Agent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lyra" => Ok(Agent::Lyra),
            "kara" => Ok(Agent::Kara),
            other => Err(Error::validation(other, "unknown agent (expected lyra or kara)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Gemini,
    OpenAi,
}

impl AiProvider {
    pub fn id(&self) -> &'static str {
        match self {
            AiProvider::Gemini => "gemini",
            AiProvider::OpenAi => "openai",
        }
    }
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for AiProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(AiProvider::Gemini),
            "openai" => Ok(AiProvider::OpenAi),
            other => Err(Error::validation(other, "unknown provider (expected gemini or openai)")),
        }
    }
}

pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const MAX_TEMPERATURE: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub provider: AiProvider,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: AiProvider::default(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GenerationSettings {
    /// Clamp the temperature into the range the providers accept.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = if temperature.is_finite() {
            temperature.clamp(0.0, MAX_TEMPERATURE)
        } else {
            DEFAULT_TEMPERATURE
        };
        self
    }
}

/// The two-field result of a generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    /// Markdown or HTML suitable for a rendered preview.
    pub preview_content: String,
    /// Raw code or text.
    pub code_content: String,
}

impl AiResponse {
    pub fn new(preview_content: impl Into<String>, code_content: impl Into<String>) -> Self {
        Self {
            preview_content: preview_content.into(),
            code_content: code_content.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.preview_content.is_empty() && self.code_content.is_empty()
    }
}

/// Follow-up prompts and a usage hint. Replaced on every request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionResult {
    pub suggestions: Vec<String>,
    pub hint: Option<String>,
}

impl SuggestionResult {
    pub const MAX_SUGGESTIONS: usize = 3;

    pub fn is_empty(&self) -> bool {
        self.suggestions.is_empty() && self.hint.is_none()
    }
}

/// JSON schema the AI must answer with.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    pub fn ai_response() -> Self {
        Self {
            name: "ai_response",
            schema: json!({
                "type": "object",
                "properties": {
                    "previewContent": {
                        "type": "string",
                        "description": "User-friendly Markdown or self-contained HTML rendered in a preview panel."
                    },
                    "codeContent": {
                        "type": "string",
                        "description": "The raw code or text: full source for generated code, commented code for explanations, the complete corrected file for fixes."
                    }
                },
                "required": ["previewContent", "codeContent"],
                "additionalProperties": false
            }),
        }
    }

    pub fn suggestions() -> Self {
        Self {
            name: "suggestions",
            schema: json!({
                "type": "object",
                "properties": {
                    "suggestions": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Up to 3 concise, actionable follow-up prompts. May be empty."
                    },
                    "hint": {
                        "type": "string",
                        "description": "One brief hint about using the application. May be empty."
                    }
                },
                "required": ["suggestions", "hint"],
                "additionalProperties": false
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub provider: AiProvider,
    pub system_prompt: String,
    pub schema: ResponseSchema,
    pub temperature: f32,
}

pub type AiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Generative backend. Returns the raw JSON text produced for the schema.
pub trait AiClient: Send + Sync {
    fn complete<'a>(&'a self, request: CompletionRequest) -> AiFuture<'a, String>;
}
