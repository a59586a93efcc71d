//! Line-oriented interactive session

use crate::commands::{self, Command, HELP};
use aionex_core::file_state::FileStatus;
use aionex_core::AiResponse;
use aionex_engine::llm::model_id;
use aionex_engine::Session;
use anyhow::{Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Read commands from stdin until `quit` or end of input.
pub async fn run(session: &mut Session) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = std::io::stdout();

    writeln!(out, "  Connected to {}. Type 'help' for commands.", session.label())?;
    loop {
        write!(out, "aionex> ")?;
        out.flush()?;
        let Some(line) = lines.next_line().await? else {
            writeln!(out)?;
            break;
        };
        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                writeln!(out, "  ! {}", message)?;
                continue;
            }
        };
        match execute(session, command, &mut out).await {
            Ok(Flow::Quit) => break,
            Ok(Flow::Continue) => {}
            Err(err) => writeln!(out, "  ! {:#}", err)?,
        }
    }
    Ok(())
}

pub async fn execute<W: Write>(session: &mut Session, command: Command, out: &mut W) -> Result<Flow> {
    match command {
        Command::Tree => print_tree(session, out)?,
        Command::Open(path) => {
            session.select_file(&path).await?;
            writeln!(out, "  + Opened {}", path)?;
        }
        Command::Show => {
            let snapshot = session
                .snapshot()
                .context("No file is open. Use 'open <path>'.")?;
            let marker = if snapshot.dirty { " (modified)" } else { "" };
            writeln!(out, "  ── {}{} @ {} ──", snapshot.path, marker, snapshot.version)?;
            writeln!(out, "{}", snapshot.content)?;
        }
        Command::Edit(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            session.edit(content)?;
            writeln!(out, "  + Buffer replaced from {}", path.display())?;
        }
        Command::Save(path) => {
            let snapshot = session.snapshot().context("No file is open")?;
            std::fs::write(&path, snapshot.content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            writeln!(out, "  + Buffer written to {}", path.display())?;
        }
        Command::Commit(message) => match session.commit(&message).await {
            Ok(version) => writeln!(out, "  + Committed (version {})", version)?,
            Err(err) if err.is_conflict() => {
                writeln!(out, "  Your edits are kept. 'save' them locally, then 'open' the file again.")?;
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        },
        Command::Prompt(text) => {
            session.set_prompt(text);
        }
        Command::Agent(agent) => {
            session.set_agent(agent);
            writeln!(out, "  Agent: {}", agent)?;
        }
        Command::Temperature(value) => {
            let applied = session.set_temperature(value);
            writeln!(out, "  Temperature: {:.1}", applied)?;
        }
        Command::Provider(provider) => {
            session.set_provider(provider);
            writeln!(out, "  Provider: {} ({})", provider, model_id(provider))?;
        }
        Command::Supervisor(text) => {
            let reset = text.is_none();
            session.set_supervisor_instruction(text);
            writeln!(out, "  Supervisor instruction {}", if reset { "reset" } else { "set" })?;
        }
        Command::Orchestrator(text) => {
            let reset = text.is_none();
            session.set_orchestrator_instruction(text);
            writeln!(out, "  Orchestrator instruction {}", if reset { "reset" } else { "set" })?;
        }
        Command::Generate => {
            let settings = session.settings();
            writeln!(
                out,
                "  Generating with {} ({}, temperature {:.1})...",
                session.agent(),
                model_id(settings.provider),
                settings.temperature
            )?;
            let result = session.generate().await;
            if let Some(response) = &session.display().response {
                print_response(response, out)?;
            }
            result?;
            print_suggestions(session, out)?;
        }
        Command::Suggest => match session.quick_suggest().await? {
            Some(prompt) => writeln!(out, "  Prompt: {}", prompt)?,
            None => writeln!(out, "  No suggestion this time")?,
        },
        Command::Use(n) => {
            let prompt = session.use_suggestion(n - 1)?;
            writeln!(out, "  Prompt: {}", prompt)?;
        }
        Command::History => {
            let items = session.history();
            if items.is_empty() {
                writeln!(out, "  No generations yet")?;
            }
            for item in items {
                writeln!(
                    out,
                    "  [{}] {} {} ({}) {}",
                    item.id,
                    item.timestamp.format("%H:%M:%S"),
                    item.file_path,
                    item.agent,
                    item.prompt
                )?;
            }
        }
        Command::Restore(id) => {
            session.restore(id).await?;
            writeln!(out, "  + Restored entry {}. The buffer holds its file content.", id)?;
            if let Some(response) = &session.display().response {
                print_response(response, out)?;
            }
        }
        Command::Examples => {
            for example in session.example_prompts() {
                writeln!(out, "  - {}", example)?;
            }
        }
        Command::Status => print_status(session, out)?,
        Command::Help => writeln!(out, "{}", HELP)?,
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn print_tree<W: Write>(session: &Session, out: &mut W) -> Result<()> {
    for entry in session.tree().flatten() {
        let suffix = if entry.is_dir { "/" } else { "" };
        writeln!(out, "  {}{}{}", "  ".repeat(entry.depth), entry.name, suffix)?;
    }
    let skipped = session.skipped_entries();
    if !skipped.is_empty() {
        writeln!(out, "  Skipped {} entries:", skipped.len())?;
        for err in skipped.iter().take(3) {
            writeln!(out, "    - {}", err)?;
        }
        if skipped.len() > 3 {
            writeln!(out, "    ({} more)", skipped.len() - 3)?;
        }
    }
    let reclassified = &session.tree().reclassified;
    if !reclassified.is_empty() {
        writeln!(
            out,
            "  Shown as directories (listed as files): {}",
            reclassified.join(", ")
        )?;
    }
    Ok(())
}

fn print_response<W: Write>(response: &AiResponse, out: &mut W) -> Result<()> {
    writeln!(out, "  ── Preview ──")?;
    writeln!(out, "{}", response.preview_content)?;
    writeln!(out, "  ── Code ──")?;
    writeln!(out, "{}", response.code_content)?;
    Ok(())
}

fn print_suggestions<W: Write>(session: &Session, out: &mut W) -> Result<()> {
    let display = session.display();
    if !display.suggestions.is_empty() {
        writeln!(out, "  Next steps:")?;
        for (i, suggestion) in display.suggestions.iter().enumerate() {
            writeln!(out, "    [{}] {}", i + 1, suggestion)?;
        }
    }
    if let Some(hint) = &display.hint {
        writeln!(out, "  Hint: {}", hint)?;
    }
    Ok(())
}

fn print_status<W: Write>(session: &Session, out: &mut W) -> Result<()> {
    let access = if session.capabilities().writable {
        "read-write"
    } else {
        "read-only"
    };
    writeln!(out, "  Repository: {} ({})", session.label(), access)?;
    let file = match session.file_status() {
        FileStatus::NoFile => "none".to_string(),
        FileStatus::Loading { path } => format!("{} (loading)", path),
        FileStatus::Loaded { path, dirty: true } => format!("{} (modified)", path),
        FileStatus::Loaded { path, dirty: false } => path,
        FileStatus::Committing { path } => format!("{} (committing)", path),
    };
    writeln!(out, "  File: {}", file)?;
    let settings = session.settings();
    writeln!(
        out,
        "  Agent: {}  Model: {}  Temperature: {:.1}",
        session.agent(),
        model_id(settings.provider),
        settings.temperature
    )?;
    writeln!(out, "  History: {} entries", session.history().len())?;
    if !session.prompt().is_empty() {
        writeln!(out, "  Prompt: {}", session.prompt())?;
    }
    Ok(())
}
