//! Repository tree construction
//!
//! Remote stores hand back a flat, path-keyed listing in no particular order.
//! Parents may come after their children or be missing entirely, so the
//! builder synthesizes any implied directory and links nodes by path prefix.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// One row of a remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Full '/'-delimited path; unique across the tree.
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
    /// Always empty for files.
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Find a node by path in this subtree.
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        if self.path == path {
            return Some(self);
        }
        let prefix = format!("{}/", self.path);
        if !path.starts_with(&prefix) {
            return None;
        }
        self.children.iter().find_map(|child| child.find(path))
    }
}

/// Flattened row for list-style display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatTreeEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub depth: usize,
}

/// Result of a tree build: the forest plus every entry that was skipped.
#[derive(Debug, Clone, Default)]
pub struct FileTree {
    pub roots: Vec<TreeNode>,
    /// Entries left out of the forest.
    pub skipped: Vec<Error>,
    /// Paths listed as files that have children. They stay in the forest as
    /// directories.
    pub reclassified: Vec<String>,
}

impl FileTree {
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        self.roots.iter().find_map(|root| root.find(path))
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.find(path).is_some_and(|node| !node.is_dir())
    }

    pub fn file_count(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            if node.is_dir() {
                node.children.iter().map(count).sum()
            } else {
                1
            }
        }
        self.roots.iter().map(count).sum()
    }

    /// Pre-order walk, directories before files at each level.
    pub fn flatten(&self) -> Vec<FlatTreeEntry> {
        fn walk(node: &TreeNode, depth: usize, out: &mut Vec<FlatTreeEntry>) {
            out.push(FlatTreeEntry {
                name: node.name.clone(),
                path: node.path.clone(),
                is_dir: node.is_dir(),
                depth,
            });
            for child in &node.children {
                walk(child, depth + 1, out);
            }
        }

        let mut out = Vec::new();
        for root in &self.roots {
            walk(root, 0, &mut out);
        }
        out
    }
}

/// Reject paths that cannot be placed in the tree.
pub fn validate_path(path: &str) -> Result<(), Error> {
    if path.is_empty() {
        return Err(Error::validation(path, "path is empty"));
    }
    if path.starts_with('/') {
        return Err(Error::validation(path, "leading slash"));
    }
    if path.ends_with('/') {
        return Err(Error::validation(path, "trailing slash"));
    }
    for segment in path.split('/') {
        match segment {
            "" => return Err(Error::validation(path, "empty path segment")),
            "." | ".." => return Err(Error::validation(path, "relative path segment")),
            _ => {}
        }
    }
    Ok(())
}

/// Everything before the last '/', or `None` for a root-level path.
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx])
}

fn leaf_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Build a forest from an unordered listing.
///
/// Malformed entries are skipped and reported in [`FileTree::skipped`].
/// When two entries claim the same path the later one wins. A path listed as
/// a file that turns out to have children is kept as a directory and listed
/// in [`FileTree::reclassified`].
pub fn build_tree(entries: &[TreeEntry]) -> FileTree {
    let mut skipped = Vec::new();
    let mut reclassified = Vec::new();
    let mut kinds: BTreeMap<String, EntryKind> = BTreeMap::new();

    for entry in entries {
        if let Err(err) = validate_path(&entry.path) {
            tracing::warn!("Skipping tree entry: {}", err);
            skipped.push(err);
            continue;
        }
        kinds.insert(entry.path.clone(), entry.kind);
    }

    // Synthesize every implied ancestor directory.
    let declared: Vec<String> = kinds.keys().cloned().collect();
    for path in &declared {
        let mut parent = parent_path(path);
        while let Some(dir) = parent {
            let previous = kinds.insert(dir.to_string(), EntryKind::Directory);
            if previous == Some(EntryKind::File) {
                tracing::warn!(
                    "'{}' is listed as a file but has children; treating it as a directory",
                    dir
                );
                reclassified.push(dir.to_string());
            }
            parent = parent_path(dir);
        }
    }

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut root_paths: Vec<&str> = Vec::new();
    for path in kinds.keys() {
        match parent_path(path) {
            Some(parent) => children.entry(parent).or_default().push(path),
            None => root_paths.push(path),
        }
    }

    let mut roots: Vec<TreeNode> = root_paths
        .into_iter()
        .map(|path| build_node(path, &kinds, &children))
        .collect();
    roots.sort_by(compare_nodes);

    FileTree {
        roots,
        skipped,
        reclassified,
    }
}

fn build_node(
    path: &str,
    kinds: &BTreeMap<String, EntryKind>,
    children: &HashMap<&str, Vec<&str>>,
) -> TreeNode {
    let kind = kinds.get(path).copied().unwrap_or(EntryKind::Directory);
    let mut nodes: Vec<TreeNode> = match kind {
        EntryKind::Directory => children
            .get(path)
            .map(|paths| {
                paths
                    .iter()
                    .map(|child| build_node(child, kinds, children))
                    .collect()
            })
            .unwrap_or_default(),
        EntryKind::File => Vec::new(),
    };
    nodes.sort_by(compare_nodes);

    TreeNode {
        path: path.to_string(),
        name: leaf_name(path).to_string(),
        kind,
        children: nodes,
    }
}

/// Directories first, then case-insensitive by name.
fn compare_nodes(a: &TreeNode, b: &TreeNode) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}
