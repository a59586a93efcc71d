//! Configuration management for aionex
//!
//! Stores settings in `<config_dir>/aionex/config.json`. Secrets never go
//! here; see [`crate::keyring`].

use crate::keyring;
use aionex_core::protocol::{Agent, AiProvider, GenerationSettings, DEFAULT_TEMPERATURE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: AiProvider,
    pub temperature: f32,
    pub agent: Agent,
    /// Replaces the built-in AI supervisor instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supervisor_instruction: Option<String>,
    /// Replaces the built-in system orchestrator instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestrator_instruction: Option<String>,
    /// `owner/repo` opened when no repository is given on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openrouter_url: Option<String>,
    /// Anonymous id sent as OpenRouter's `user` field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openrouter_user_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: AiProvider::default(),
            temperature: DEFAULT_TEMPERATURE,
            agent: Agent::default(),
            supervisor_instruction: None,
            orchestrator_instruction: None,
            default_repo: None,
            github_api_url: None,
            openrouter_url: None,
            openrouter_user_id: None,
        }
    }
}

fn non_blank(value: &mut Option<String>) {
    if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *value = None;
    }
}

impl Config {
    fn sanitize(&mut self) {
        self.temperature = GenerationSettings::default()
            .with_temperature(self.temperature)
            .temperature;
        non_blank(&mut self.supervisor_instruction);
        non_blank(&mut self.orchestrator_instruction);
        non_blank(&mut self.default_repo);
        non_blank(&mut self.github_api_url);
        non_blank(&mut self.openrouter_url);
    }

    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("aionex"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from an explicit file. A file that fails to parse is moved aside
    /// to `config.json.corrupt` and defaults are returned.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Config>(&content) {
            Ok(mut config) => {
                config.sanitize();
                config
            }
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    "Config file {} was corrupted ({}). A backup was saved and defaults were loaded.",
                    path.display(),
                    err
                );
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), String> {
        let path =
            Self::config_path().ok_or_else(|| "Could not determine config directory".to_string())?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let mut sanitized = self.clone();
        sanitized.sanitize();

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                    tracing::warn!("Failed to set config directory permissions: {}", e);
                }
            }
        }

        let content = serde_json::to_string_pretty(&sanitized)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        write_config_atomic(path, &content).map_err(|e| format!("Failed to write config: {}", e))
    }

    pub fn generation_settings(&self) -> GenerationSettings {
        GenerationSettings {
            provider: self.provider,
            temperature: self.temperature,
        }
        .with_temperature(self.temperature)
    }

    /// OpenRouter key: environment first, then the credential store.
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(key) = env_value(API_KEY_ENV) {
            return Some(key);
        }
        match keyring::get_api_key() {
            Ok(key) => key,
            Err(err) => {
                keyring::warn_keychain_error_once("API key", &err);
                None
            }
        }
    }

    /// Store the key and read it back to make sure it stuck.
    pub fn set_api_key(&self, key: &str) -> Result<(), String> {
        let store = keyring::credentials_store_label();
        keyring::set_api_key(key).map_err(|e| {
            format!(
                "Failed to store API key in {}: {}. You can set {} instead.",
                store, e, API_KEY_ENV
            )
        })?;
        match keyring::get_api_key() {
            Ok(Some(stored)) if stored == key => Ok(()),
            Ok(_) => Err(format!(
                "API key verification failed: the key was not persisted to {}. You can set {} instead.",
                store, API_KEY_ENV
            )),
            Err(e) => Err(format!(
                "API key verification failed: couldn't read back from {} ({}).",
                store, e
            )),
        }
    }

    /// GitHub token: environment first, then the credential store.
    pub fn get_github_token(&self) -> Option<String> {
        if let Some(token) = env_value(GITHUB_TOKEN_ENV) {
            return Some(token);
        }
        match keyring::get_github_token() {
            Ok(token) => token,
            Err(err) => {
                keyring::warn_keychain_error_once("GitHub token", &err);
                None
            }
        }
    }

    pub fn set_github_token(&self, token: &str) -> Result<(), String> {
        keyring::set_github_token(token).map_err(|e| {
            format!(
                "Failed to store GitHub token in {}: {}. You can set {} instead.",
                keyring::credentials_store_label(),
                e,
                GITHUB_TOKEN_ENV
            )
        })
    }

    pub fn validate_api_key_format(key: &str) -> bool {
        key.trim().starts_with("sk-or-")
    }

    /// Stable anonymous id for OpenRouter, created and saved on first use.
    pub fn openrouter_user(&mut self) -> String {
        if let Some(id) = &self.openrouter_user_id {
            return id.clone();
        }
        let id = format!("aionex_{}", Uuid::new_v4());
        self.openrouter_user_id = Some(id.clone());
        if let Err(err) = self.save() {
            tracing::debug!("Could not persist OpenRouter user id: {}", err);
        }
        id
    }

    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/aionex/config.json".to_string())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_secret(label: &str) -> Result<String, String> {
    use std::io;

    print!("  {}: ", label);
    io::stdout().flush().map_err(|e| e.to_string())?;
    let mut value = String::new();
    io::stdin()
        .read_line(&mut value)
        .map_err(|e| e.to_string())?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(format!("No {} provided", label.to_lowercase()));
    }
    Ok(value)
}

/// Interactive prompt to store the OpenRouter API key
pub fn setup_api_key_interactive() -> Result<String, String> {
    println!();
    println!("  AIONEX SETUP");
    println!();
    println!("  aionex sends the open file and your prompt to OpenRouter.");
    println!("    1) Create a key at https://openrouter.ai/keys");
    println!("    2) Paste it below and press Enter");
    println!();
    println!(
        "  The key is stored in your {}. Prefer env vars? Set {} instead.",
        keyring::credentials_store_label(),
        API_KEY_ENV
    );
    println!();

    let key = read_secret("API Key")?;
    if !Config::validate_api_key_format(&key) {
        println!("  Warning: this doesn't look like an OpenRouter key (usually starts with sk-or-). Saving anyway.");
    }
    Config::load().set_api_key(&key)?;
    println!("  + API key saved to {}", keyring::credentials_store_label());
    println!();
    Ok(key)
}

/// Interactive prompt to store a GitHub token
pub fn setup_github_token_interactive() -> Result<String, String> {
    println!();
    println!("  A GitHub token with `contents: write` access is needed to commit.");
    println!("  Create one at https://github.com/settings/tokens");
    println!();

    let token = read_secret("GitHub Token")?;
    Config::load().set_github_token(&token)?;
    println!("  + GitHub token saved to {}", keyring::credentials_store_label());
    println!();
    Ok(token)
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> Result<(), String> {
    use std::fs::OpenOptions;

    let tmp_path = path.with_extension("tmp");
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)
        .map_err(|e| e.to_string())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!("Failed to set temp config file permissions: {}", e);
        }
    }

    file.write_all(content.as_bytes())
        .map_err(|e| e.to_string())?;

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.to_string());
    }
    Ok(())
}
