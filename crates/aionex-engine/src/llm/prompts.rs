use aionex_core::protocol::Agent;
use aionex_core::util::head_chars;

// ═══════════════════════════════════════════════════════════════════════════════
// INSTRUCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

pub const DEFAULT_SUPERVISOR_INSTRUCTION: &str = "You are an elite software architect. Prioritize code that is scalable, maintainable, and idiomatic for its language. Keep explanations short and focused on the reasoning behind the code. Think step by step before producing the final response, and answer exactly what the user asked.";

pub const DEFAULT_ORCHESTRATOR_INSTRUCTION: &str = "System task: first determine the intent of the user's prompt (generation, refactoring, explanation, debugging). Then act as the selected agent with the full context provided: file content, user prompt, and supervisor instruction. Finally check that the answer is correct and follows the response schema before returning it.";

/// Persona text for each agent.
pub fn agent_persona(agent: Agent) -> &'static str {
    match agent {
        Agent::Lyra => "You are Lyra, a creative AI assistant. You specialize in new ideas, UI/UX improvements, and explanatory content, in a friendly and engaging tone.",
        Agent::Kara => "You are Kara, a technical AI analyst. You specialize in code analysis, refactoring, writing tests, and finding performance bottlenecks. Your answers are precise and focused on code quality.",
    }
}

/// Prompts offered to users who don't know where to start.
pub const EXAMPLE_PROMPTS: &[&str] = &[
    "Generate a responsive hero section with a call-to-action button.",
    "Analyze this file for code smells and suggest refactoring improvements.",
    "Write unit tests for the main function in this file.",
    "Create a Dockerfile for this application.",
    "Add keyboard accessibility to this component.",
    "Convert this code to use async/await.",
    "Add doc comments to every exported function.",
    "Explain what this file does, section by section.",
];

/// Prompt used by quick-suggest when the composer is empty.
pub const STARTER_PROMPT: &str = "Suggest a starting prompt.";

/// Characters of the last generated code shown to the suggestion model.
pub const SUGGESTION_CODE_PREVIEW_CHARS: usize = 800;

pub const SUGGESTION_TEMPERATURE: f32 = 0.5;

const EMPTY_FILE_PLACEHOLDER: &str = "(This file is empty)";

// ═══════════════════════════════════════════════════════════════════════════════
// PROMPTS
// ═══════════════════════════════════════════════════════════════════════════════

const GENERATION_FIELD_RULES: &str = r#"**INSTRUCTIONS**

Based on the file content and the user's prompt, answer by strictly following the JSON schema.

- **`previewContent`**: content rendered directly in a preview panel.
  - When generating a page or UI component, the complete self-contained HTML for it.
  - When explaining, analyzing, or documenting, well-formatted Markdown.
  - When fixing code, a Markdown or HTML explanation of the changes.

- **`codeContent`**: the raw code or text.
  - When generating a page, the complete self-contained HTML source.
  - When explaining code, the original code with detailed line-by-line comments.
  - When fixing or modifying code, the complete, corrected, final version of the file.

Now produce the JSON response."#;

const SUGGESTION_RULES: &str = r#"You suggest follow-up actions and usage hints to a user working on a coding task.

From the user's last prompt and the AI's answer, produce a JSON object with `suggestions` and `hint`.

RULES FOR `suggestions`:
- Suggest the next logical step (after generating code: tests, documentation, accessibility).
- Phrase each as a direct instruction, e.g. "Add input validation to the form."
- Keep each one short.
- At most 3. The array may be empty.

RULES FOR `hint`:
- One brief hint about using the application to get better results.
- Good: "Lower the temperature for more deterministic output."
- Good: "Restore an earlier generation from the history list."
- Good: "Override the supervisor instruction to steer every answer."
- May be an empty string."#;

/// Inputs to the generation prompt.
#[derive(Debug, Clone, Copy)]
pub struct GenerationPrompt<'a> {
    pub file_name: &'a str,
    pub file_content: &'a str,
    pub user_prompt: &'a str,
    pub agent: Agent,
    pub supervisor_instruction: &'a str,
    pub orchestrator_instruction: &'a str,
}

pub fn generation_system(input: &GenerationPrompt<'_>) -> String {
    let content = if input.file_content.is_empty() {
        EMPTY_FILE_PLACEHOLDER
    } else {
        input.file_content
    };
    format!(
        "**SYSTEM ORCHESTRATOR INSTRUCTION**\n{orchestrator}\n\n\
         **AI SUPERVISOR INSTRUCTION**\n{supervisor}\n\n\
         **PRIMARY AGENT ROLE: {agent_id}**\n{persona}\n\n\
         You are an expert programming assistant. Help the user generate, modify, explain, \
         or debug code using the open file and their prompt as context. Be clear and concise.\n\n\
         **CONTEXT**\n\n\
         File Name: `{file_name}`\n\
         File Content:\n```\n{content}\n```\n\n\
         **USER REQUEST**\n\n\
         Prompt: \"{user_prompt}\"\n\n\
         {rules}",
        orchestrator = input.orchestrator_instruction,
        supervisor = input.supervisor_instruction,
        agent_id = input.agent.id().to_uppercase(),
        persona = agent_persona(input.agent),
        file_name = input.file_name,
        content = content,
        user_prompt = input.user_prompt,
        rules = GENERATION_FIELD_RULES,
    )
}

pub fn suggestion_system(file_name: &str, user_prompt: &str, last_code: &str) -> String {
    format!(
        "{rules}\n\n\
         CONTEXT OF LAST INTERACTION:\n\
         - File Name: `{file_name}`\n\
         - User's Prompt: \"{user_prompt}\"\n\
         - Last AI-generated code:\n```\n{code}...\n```\n\n\
         Now produce the JSON object.",
        rules = SUGGESTION_RULES,
        file_name = file_name,
        user_prompt = user_prompt,
        code = head_chars(last_code, SUGGESTION_CODE_PREVIEW_CHARS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt<'a>(content: &'a str) -> GenerationPrompt<'a> {
        GenerationPrompt {
            file_name: "src/app.js",
            file_content: content,
            user_prompt: "Add tests",
            agent: Agent::Kara,
            supervisor_instruction: "SUPERVISE",
            orchestrator_instruction: "ORCHESTRATE",
        }
    }

    #[test]
    fn test_generation_prompt_sections_in_order() {
        let text = generation_system(&prompt("let x = 1;"));
        let positions: Vec<usize> = [
            "ORCHESTRATE",
            "SUPERVISE",
            "PRIMARY AGENT ROLE: KARA",
            "File Name: `src/app.js`",
            "let x = 1;",
            "Prompt: \"Add tests\"",
            "`previewContent`",
        ]
        .iter()
        .map(|needle| text.find(needle).unwrap_or_else(|| panic!("missing {}", needle)))
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);
    }

    #[test]
    fn test_empty_file_uses_placeholder() {
        let text = generation_system(&prompt(""));
        assert!(text.contains(EMPTY_FILE_PLACEHOLDER));
    }

    #[test]
    fn test_suggestion_prompt_caps_code_preview() {
        let code = "a".repeat(SUGGESTION_CODE_PREVIEW_CHARS) + "TAIL";
        let text = suggestion_system("f.rs", "p", &code);
        assert!(!text.contains("TAIL"));
        assert!(text.contains(&"a".repeat(SUGGESTION_CODE_PREVIEW_CHARS)));
    }
}
