//! Generation history
//!
//! Append-only record of every successful generation for the session.
//! Entries are never mutated or removed; restoring one only reads it.

use crate::error::{Error, Result};
use crate::protocol::{Agent, AiResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryItem {
    /// Monotonic within a store, starting at 1.
    pub id: u64,
    pub prompt: String,
    pub response: AiResponse,
    pub file_path: String,
    /// Buffer contents the generation was based on.
    pub file_content: String,
    pub timestamp: DateTime<Utc>,
    pub agent: Agent,
}

/// Everything needed to create a history entry except its id and timestamp.
#[derive(Debug, Clone)]
pub struct NewHistoryItem {
    pub prompt: String,
    pub response: AiResponse,
    pub file_path: String,
    pub file_content: String,
    pub agent: Agent,
}

/// What a caller needs to put the session back where an entry was made.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreSnapshot {
    pub path: String,
    pub content: String,
    pub prompt: String,
    pub response: AiResponse,
    pub agent: Agent,
}

#[derive(Debug, Default)]
struct HistoryState {
    items: Vec<HistoryItem>,
    last_id: u64,
}

#[derive(Debug, Default)]
pub struct HistoryStore {
    state: Mutex<HistoryState>,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, item: NewHistoryItem) -> HistoryItem {
        let mut state = self.lock();
        state.last_id += 1;
        let entry = HistoryItem {
            id: state.last_id,
            prompt: item.prompt,
            response: item.response,
            file_path: item.file_path,
            file_content: item.file_content,
            timestamp: Utc::now(),
            agent: item.agent,
        };
        state.items.push(entry.clone());
        tracing::debug!("History entry {} recorded for {}", entry.id, entry.file_path);
        entry
    }

    /// All entries, newest first.
    pub fn items(&self) -> Vec<HistoryItem> {
        self.lock().items.iter().rev().cloned().collect()
    }

    pub fn get(&self, id: u64) -> Option<HistoryItem> {
        self.lock().items.iter().find(|item| item.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn restore(&self, id: u64) -> Result<RestoreSnapshot> {
        let item = self
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("history entry {}", id)))?;
        Ok(RestoreSnapshot {
            path: item.file_path,
            content: item.file_content,
            prompt: item.prompt,
            response: item.response,
            agent: item.agent,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(prompt: &str, path: &str) -> NewHistoryItem {
        NewHistoryItem {
            prompt: prompt.to_string(),
            response: AiResponse::new(format!("preview {}", prompt), format!("code {}", prompt)),
            file_path: path.to_string(),
            file_content: format!("content of {}", path),
            agent: Agent::Kara,
        }
    }

    #[test]
    fn test_ids_are_monotonic_and_items_newest_first() {
        let history = HistoryStore::new();
        let first = history.append(entry("one", "a.txt"));
        let second = history.append(entry("two", "b.txt"));

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        let prompts: Vec<_> = history.items().into_iter().map(|i| i.prompt).collect();
        assert_eq!(prompts, vec!["two", "one"]);
        assert_eq!(history.get(2).unwrap().prompt, "two");
    }

    #[test]
    fn test_restore_is_pure() {
        let history = HistoryStore::new();
        history.append(entry("one", "a.txt"));
        let before = history.items();

        let snapshot = history.restore(1).unwrap();
        let again = history.restore(1).unwrap();

        assert_eq!(snapshot, again);
        assert_eq!(snapshot.path, "a.txt");
        assert_eq!(snapshot.content, "content of a.txt");
        assert_eq!(snapshot.prompt, "one");
        assert_eq!(snapshot.agent, Agent::Kara);
        assert_eq!(history.items(), before);
    }

    #[test]
    fn test_restore_unknown_id_is_not_found() {
        let history = HistoryStore::new();
        assert!(matches!(history.restore(7), Err(Error::NotFound(_))));
        assert!(history.is_empty());
    }
}
