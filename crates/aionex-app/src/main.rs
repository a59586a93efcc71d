//! aionex - browse a repository, edit a file, and iterate on it with AI
//!
//! Connects to a GitHub repository (or the built-in demo), opens files into
//! an edit buffer, generates new content with OpenRouter, and commits the
//! result back.

mod commands;
mod repl;

use aionex_adapters::config::{self, Config};
use aionex_adapters::demo::{demo_store, DEMO_START_FILE};
use aionex_adapters::github::{GitHubStore, RepoSlug};
use aionex_adapters::keyring;
use aionex_core::store::RemoteFileStore;
use aionex_engine::llm::OpenRouterClient;
use aionex_engine::{Session, SessionDefaults};
use anyhow::Result;
use clap::{ArgAction, Parser};
use std::sync::Arc;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "aionex",
    about = "Edit repository files with an AI assistant",
    long_about = "Browse a GitHub repository, open a file, generate and refine its\n\
                  content with AI, and commit the result back.",
    version
)]
struct Args {
    /// Repository to open, as owner/repo or a GitHub URL
    #[arg(long, conflicts_with = "demo")]
    repo: Option<String>,

    /// Use the built-in read-only demo repository
    #[arg(long)]
    demo: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Set up the OpenRouter API key
    #[arg(long)]
    setup: bool,

    /// Store a GitHub personal access token
    #[arg(long)]
    github_token: bool,
}

const LOG_ENV: &str = "AIONEX_LOG";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.setup {
        return setup_api_key();
    }
    if args.github_token {
        config::setup_github_token_interactive().map_err(|e| anyhow::anyhow!("{}", e))?;
        return Ok(());
    }

    let mut config = Config::load();
    let api_key = match config.get_api_key() {
        Some(key) => key,
        None => {
            eprintln!("  No OpenRouter API key found.");
            eprintln!("  Run 'aionex --setup' or set {}.", config::API_KEY_ENV);
            return Err(anyhow::anyhow!("missing API key"));
        }
    };
    let mut ai = OpenRouterClient::new(api_key)?.with_user(Some(config.openrouter_user()));
    if let Some(url) = &config.openrouter_url {
        ai = ai.with_url(url.clone());
    }

    let (store, is_demo) = open_store(&args, &config)?;
    eprintln!("  Loading {}...", store.label());
    let mut session = Session::connect(
        store,
        Arc::new(ai),
        SessionDefaults {
            settings: config.generation_settings(),
            agent: config.agent,
            supervisor_instruction: config.supervisor_instruction.clone(),
            orchestrator_instruction: config.orchestrator_instruction.clone(),
        },
    )
    .await?;
    eprintln!(
        "  {} files{}",
        session.tree().file_count(),
        if is_demo { " (demo, read-only)" } else { "" }
    );

    if is_demo && session.tree().contains_file(DEMO_START_FILE) {
        session.select_file(DEMO_START_FILE).await?;
        eprintln!("  Opened {}", DEMO_START_FILE);
    }

    repl::run(&mut session).await
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3)
        .init();

    debug!("aionex started with verbosity level: {}", verbose);
}

/// `--repo`, then the configured default, then the demo.
fn open_store(args: &Args, config: &Config) -> Result<(Arc<dyn RemoteFileStore>, bool)> {
    let repo = if args.demo {
        None
    } else {
        args.repo.clone().or_else(|| config.default_repo.clone())
    };
    let Some(repo) = repo else {
        return Ok((Arc::new(demo_store()), true));
    };

    let slug = RepoSlug::parse(&repo)?;
    let token = config.get_github_token();
    if token.is_none() {
        eprintln!("  No GitHub token: read-only access to public repositories.");
        eprintln!("  Run 'aionex --github-token' to enable commits.");
    }
    let mut store = GitHubStore::new(slug, token)?;
    if let Some(url) = &config.github_api_url {
        store = store.with_api_url(url)?;
    }
    Ok((Arc::new(store), false))
}

/// Set up the API key interactively
fn setup_api_key() -> Result<()> {
    config::setup_api_key_interactive().map_err(|e| anyhow::anyhow!("{}", e))?;

    let config = Config::load();
    match config.get_api_key() {
        Some(_) => {
            println!("  + API key verified and ready to use!");
            println!("  Settings live in {}", Config::config_location());
        }
        None => {
            eprintln!();
            eprintln!("  ! Warning: API key was saved but cannot be read back.");
            eprintln!(
                "  ! This may be due to {} access issues.",
                keyring::credentials_store_label()
            );
            eprintln!();
            eprintln!("  Workaround: Set the {} environment variable:", config::API_KEY_ENV);
            eprintln!("    export {}=\"your-key-here\"", config::API_KEY_ENV);
            eprintln!();
            return Err(anyhow::anyhow!("API key verification failed"));
        }
    }

    Ok(())
}
