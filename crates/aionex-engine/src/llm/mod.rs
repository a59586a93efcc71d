pub mod client;
pub mod parse;
pub mod prompts;

pub use client::{model_id, OpenRouterClient};
pub use parse::{parse_ai_response, parse_suggestions};
pub use prompts::{
    GenerationPrompt, DEFAULT_ORCHESTRATOR_INSTRUCTION, DEFAULT_SUPERVISOR_INSTRUCTION,
    EXAMPLE_PROMPTS, STARTER_PROMPT,
};
