//! Built-in demo repository
//!
//! A read-only in-memory store with a handful of small files, used when no
//! repository is configured. Commits are rejected by capability.

use aionex_core::memory::MemoryStore;

pub const DEMO_LABEL: &str = "demo/spa-generator";

/// File opened automatically when a demo session starts.
pub const DEMO_START_FILE: &str = "home/smart-light.html";

const DEMO_FILES: &[(&str, &str)] = &[
    (
        "home/smart-light.html",
        include_str!("../fixtures/demo/home/smart-light.html"),
    ),
    (
        "home/smart-light.md",
        include_str!("../fixtures/demo/home/smart-light.md"),
    ),
    (
        "office/task-list.html",
        include_str!("../fixtures/demo/office/task-list.html"),
    ),
    (
        "office/task-list.md",
        include_str!("../fixtures/demo/office/task-list.md"),
    ),
    (
        "internet/api-client.js",
        include_str!("../fixtures/demo/internet/api-client.js"),
    ),
    (
        "internet/api-usage.md",
        include_str!("../fixtures/demo/internet/api-usage.md"),
    ),
];

pub fn demo_store() -> MemoryStore {
    DEMO_FILES
        .iter()
        .fold(MemoryStore::read_only(DEMO_LABEL), |store, (path, content)| {
            store.with_file(path, content)
        })
        .with_directory("home")
        .with_directory("office")
        .with_directory("internet")
}

#[cfg(test)]
mod tests {
    use super::*;
    use aionex_core::store::RemoteFileStore;
    use aionex_core::tree::build_tree;

    #[tokio::test]
    async fn test_demo_tree_has_three_folders_and_start_file() {
        let store = demo_store();
        let tree = build_tree(&store.list_entries().await.unwrap());

        let roots: Vec<_> = tree.roots.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(roots, vec!["home", "internet", "office"]);
        assert!(tree.contains_file(DEMO_START_FILE));
        assert_eq!(tree.file_count(), DEMO_FILES.len());
    }

    #[tokio::test]
    async fn test_demo_store_is_read_only() {
        let store = demo_store();
        assert!(!store.capabilities().writable);
        let blob = store.read_file(DEMO_START_FILE).await.unwrap();
        assert!(blob.content.contains("Smart Light"));
    }
}
