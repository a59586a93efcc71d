//! Credential storage
//!
//! The OpenRouter key and the GitHub token live together in one system
//! keychain entry as a JSON blob, so unlocking happens at most once per run.
//! Setting `AIONEX_DISABLE_KEYRING=1` switches to a local credentials file
//! (`<config_dir>/aionex/credentials.json`, or `AIONEX_CREDENTIALS_FILE`).

use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

const KEYRING_SERVICE: &str = "aionex-credentials";
const KEYRING_USERNAME: &str = "default";

pub const DISABLE_KEYRING_ENV: &str = "AIONEX_DISABLE_KEYRING";
pub const CREDENTIALS_FILE_ENV: &str = "AIONEX_CREDENTIALS_FILE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    openrouter_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    github_token: Option<String>,
}

type KeyringResult<T> = Result<T, String>;

static CACHED: OnceLock<Mutex<Option<StoredCredentials>>> = OnceLock::new();
static KEYCHAIN_WARNED: AtomicBool = AtomicBool::new(false);

fn cache() -> MutexGuard<'static, Option<StoredCredentials>> {
    let lock = CACHED.get_or_init(|| Mutex::new(None));
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes"
    )
}

fn keyring_disabled() -> bool {
    cfg!(test) || env_flag(DISABLE_KEYRING_ENV)
}

/// Where credentials end up, for user-facing messages.
pub fn credentials_store_label() -> &'static str {
    if keyring_disabled() {
        "local credentials file"
    } else {
        "system keychain"
    }
}

fn credentials_file() -> KeyringResult<PathBuf> {
    if let Ok(path) = std::env::var(CREDENTIALS_FILE_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Ok(PathBuf::from(trimmed));
        }
    }
    if cfg!(test) {
        return Ok(std::env::temp_dir().join("aionex-test-credentials.json"));
    }
    dirs::config_dir()
        .map(|dir| dir.join("aionex").join("credentials.json"))
        .ok_or_else(|| "Could not determine credentials file path".to_string())
}

fn read_file_backend() -> KeyringResult<StoredCredentials> {
    let path = credentials_file()?;
    if !path.exists() {
        return Ok(StoredCredentials::default());
    }
    let json = fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    serde_json::from_str(&json).map_err(|e| format!("Failed to parse '{}': {}", path.display(), e))
}

fn write_file_backend(creds: &StoredCredentials) -> KeyringResult<()> {
    let path = credentials_file()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
    }
    let content = serde_json::to_string(creds)
        .map_err(|e| format!("Failed to serialize credentials: {}", e))?;

    let tmp_path = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp_path)
        .map_err(|e| format!("Failed to create '{}': {}", tmp_path.display(), e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!("Could not restrict credentials file permissions: {}", err);
        }
    }
    file.write_all(content.as_bytes())
        .map_err(|e| format!("Failed to write '{}': {}", tmp_path.display(), e))?;
    fs::rename(&tmp_path, &path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        format!("Failed to finalize '{}': {}", path.display(), e)
    })
}

fn keychain_entry() -> KeyringResult<Entry> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME).map_err(|e| e.to_string())
}

fn load() -> KeyringResult<StoredCredentials> {
    if keyring_disabled() {
        return read_file_backend();
    }
    match keychain_entry()?.get_password() {
        Ok(json) => {
            serde_json::from_str(&json).map_err(|e| format!("Failed to parse credentials: {}", e))
        }
        Err(keyring::Error::NoEntry) => Ok(StoredCredentials::default()),
        Err(err) => Err(err.to_string()),
    }
}

fn store(creds: &StoredCredentials) -> KeyringResult<()> {
    if keyring_disabled() {
        return write_file_backend(creds);
    }
    let json = serde_json::to_string(creds)
        .map_err(|e| format!("Failed to serialize credentials: {}", e))?;
    keychain_entry()?
        .set_password(&json)
        .map_err(|e| e.to_string())
}

fn cached_credentials() -> KeyringResult<StoredCredentials> {
    let mut guard = cache();
    if let Some(creds) = guard.as_ref() {
        return Ok(creds.clone());
    }
    let creds = load()?;
    *guard = Some(creds.clone());
    Ok(creds)
}

fn update(apply: impl FnOnce(&mut StoredCredentials)) -> KeyringResult<()> {
    let mut creds = cached_credentials().unwrap_or_default();
    apply(&mut creds);
    store(&creds)?;
    *cache() = Some(creds);
    Ok(())
}

/// Log a keychain failure once per process.
pub fn warn_keychain_error_once(context: &str, err: &str) {
    if KEYCHAIN_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    tracing::warn!(
        "Couldn't access the system keychain for {}: {}. Set {}=1 to use a local file, \
         or provide OPENROUTER_API_KEY / GITHUB_TOKEN in the environment.",
        context,
        err,
        DISABLE_KEYRING_ENV
    );
}

pub fn get_api_key() -> KeyringResult<Option<String>> {
    Ok(cached_credentials()?.openrouter_api_key)
}

pub fn set_api_key(key: &str) -> KeyringResult<()> {
    update(|creds| creds.openrouter_api_key = Some(key.to_string()))
}

pub fn get_github_token() -> KeyringResult<Option<String>> {
    Ok(cached_credentials()?.github_token)
}

pub fn set_github_token(token: &str) -> KeyringResult<()> {
    update(|creds| creds.github_token = Some(token.to_string()))
}

#[cfg(test)]
pub(crate) fn reset_for_tests() {
    *cache() = None;
    KEYCHAIN_WARNED.store(false, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_are_omitted_and_tolerated() {
        let creds = StoredCredentials {
            openrouter_api_key: Some("sk-or-test".to_string()),
            github_token: None,
        };
        let json = serde_json::to_string(&creds).unwrap();
        assert!(!json.contains("github_token"));

        let parsed: StoredCredentials = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, StoredCredentials::default());
    }

    #[test]
    fn test_tests_always_use_the_file_backend() {
        assert_eq!(credentials_store_label(), "local credentials file");
    }

    #[test]
    fn test_file_backend_keeps_both_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("credentials.json");
        std::env::set_var(CREDENTIALS_FILE_ENV, &path);
        reset_for_tests();

        set_api_key("sk-or-test-key").unwrap();
        set_github_token("ghp-test-token").unwrap();
        reset_for_tests();

        assert_eq!(get_api_key().unwrap().as_deref(), Some("sk-or-test-key"));
        assert_eq!(get_github_token().unwrap().as_deref(), Some("ghp-test-token"));
        assert!(path.exists());

        std::env::remove_var(CREDENTIALS_FILE_ENV);
        reset_for_tests();
    }
}
