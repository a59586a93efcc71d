//! Error taxonomy shared by every aionex crate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Remote content could not be decoded (unsupported encoding, not UTF-8).
    #[error("Could not decode {path}: {reason}")]
    Decode { path: String, reason: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The version token sent with a write no longer matches the remote.
    #[error("Conflict: {path} changed remotely since version {expected}. Reload the file to continue.")]
    Conflict { path: String, expected: String },

    #[error("AI response did not match the expected format: {0}")]
    Schema(String),

    #[error("Invalid entry '{path}': {reason}")]
    Validation { path: String, reason: String },

    /// The backend does not support writes.
    #[error("{0} is read-only")]
    ReadOnly(String),

    /// The operation is not legal from the current state.
    #[error("{0}")]
    InvalidState(String),

    #[error("A generation is already in progress")]
    Busy,
}

impl Error {
    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_path_and_version() {
        let err = Error::Conflict {
            path: "src/main.rs".to_string(),
            expected: "v1".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("src/main.rs"));
        assert!(message.contains("v1"));
        assert!(err.is_conflict());
        assert!(!Error::Busy.is_conflict());
    }

    #[test]
    fn test_validation_names_the_entry() {
        let err = Error::validation("a//b", "empty path segment");
        assert_eq!(err.to_string(), "Invalid entry 'a//b': empty path segment");
    }
}
