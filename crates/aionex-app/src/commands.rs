//! Interactive command parsing

use aionex_core::{Agent, AiProvider};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Tree,
    Open(String),
    Show,
    /// Replace the buffer with the contents of a local file.
    Edit(PathBuf),
    /// Write the buffer to a local file.
    Save(PathBuf),
    Commit(String),
    Prompt(String),
    Agent(Agent),
    Temperature(f32),
    Provider(AiProvider),
    /// `None` resets to the default instruction.
    Supervisor(Option<String>),
    Orchestrator(Option<String>),
    Generate,
    Suggest,
    /// 1-based, as listed.
    Use(usize),
    History,
    Restore(u64),
    Examples,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
  tree                      List repository files
  open <path>               Load a file
  show                      Print the buffer
  edit <local-file>         Replace the buffer with a local file
  save <local-file>         Write the buffer to a local file
  commit <message>          Commit the buffer to the repository
  prompt <text>             Set the prompt
  agent <lyra|kara>         Choose the agent
  temp <0-2>                Set the temperature
  provider <gemini|openai>  Choose the model provider
  supervisor <text|reset>   Override the supervisor instruction
  orchestrator <text|reset> Override the orchestrator instruction
  generate                  Generate with the current prompt
  suggest                   Suggest a prompt
  use <n>                   Copy suggestion n into the prompt
  history                   List past generations
  restore <id>              Restore a past generation
  examples                  Show example prompts
  status                    Show session state
  help                      Show this help
  quit                      Exit";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "tree" | "ls" => Command::Tree,
        "open" => Command::Open(required(rest, "open <path>")?.to_string()),
        "show" | "cat" => Command::Show,
        "edit" => Command::Edit(PathBuf::from(required(rest, "edit <local-file>")?)),
        "save" => Command::Save(PathBuf::from(required(rest, "save <local-file>")?)),
        "commit" => Command::Commit(required(rest, "commit <message>")?.to_string()),
        "prompt" => Command::Prompt(required(rest, "prompt <text>")?.to_string()),
        "agent" => Command::Agent(
            required(rest, "agent <lyra|kara>")?
                .parse()
                .map_err(|e: aionex_core::Error| e.to_string())?,
        ),
        "temp" | "temperature" => {
            let value = required(rest, "temp <0-2>")?;
            Command::Temperature(
                value
                    .parse::<f32>()
                    .ok()
                    .filter(|t| t.is_finite())
                    .ok_or_else(|| format!("Not a number: {}", value))?,
            )
        }
        "provider" => Command::Provider(
            required(rest, "provider <gemini|openai>")?
                .parse()
                .map_err(|e: aionex_core::Error| e.to_string())?,
        ),
        "supervisor" => Command::Supervisor(instruction(required(
            rest,
            "supervisor <text|reset>",
        )?)),
        "orchestrator" => Command::Orchestrator(instruction(required(
            rest,
            "orchestrator <text|reset>",
        )?)),
        "generate" | "gen" => Command::Generate,
        "suggest" => Command::Suggest,
        "use" => {
            let value = required(rest, "use <n>")?;
            match value.parse::<usize>() {
                Ok(n) if n >= 1 => Command::Use(n),
                _ => return Err(format!("Not a suggestion number: {}", value)),
            }
        }
        "history" => Command::History,
        "restore" => {
            let value = required(rest, "restore <id>")?;
            Command::Restore(
                value
                    .parse()
                    .map_err(|_| format!("Not a history id: {}", value))?,
            )
        }
        "examples" => Command::Examples,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
    };
    Ok(Some(command))
}

fn required<'a>(rest: &'a str, usage: &str) -> Result<&'a str, String> {
    if rest.is_empty() {
        Err(format!("Usage: {}", usage))
    } else {
        Ok(rest)
    }
}

fn instruction(text: &str) -> Option<String> {
    if text.eq_ignore_ascii_case("reset") {
        None
    } else {
        Some(text.to_string())
    }
}
