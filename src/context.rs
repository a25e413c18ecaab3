//! TaskContext — per-task file cache and pending-operation journal.
//!
//! Exclusively owned by one task; threaded by mutable reference into every
//! tool call. The cache holds the current view of each path, the journal
//! holds the ordered edits. Invariant: after any mutation the cache and the
//! journal agree about the current content of a path — the journal entry
//! appended last for a path matches what the cache serves (or the cache has
//! no entry for a deleted path).

use std::collections::HashMap;

use crate::task::{AgentLog, FileAction, FileOperation, LogLevel};

/// Per-task mutable state. Never shared across tasks.
#[derive(Debug, Default)]
pub struct TaskContext {
    files: HashMap<String, String>,
    journal: Vec<FileOperation>,
    branch: String,
    logs: Vec<AgentLog>,
}

impl TaskContext {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Default::default()
        }
    }

    /// The working branch remote reads resolve against.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Cached content for a path, if any.
    pub fn cached(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    /// Populate the cache from a remote read. Does not journal anything.
    pub fn cache_file(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.files.insert(path.into(), content.into());
    }

    /// Record a write. The action is `Create` when the path has never been
    /// seen (neither cached nor journaled), `Update` otherwise.
    pub fn record_write(&mut self, path: &str, content: String) -> FileAction {
        let original = self.files.get(path).cloned();
        let seen = original.is_some() || self.journal.iter().any(|op| op.path == path);
        let action = if seen {
            FileAction::Update
        } else {
            FileAction::Create
        };

        self.journal.push(FileOperation {
            path: path.to_string(),
            action,
            content: Some(content.clone()),
            original,
        });
        self.files.insert(path.to_string(), content);
        action
    }

    /// Record a deletion and evict the path from the cache.
    pub fn record_delete(&mut self, path: &str) {
        let original = self.files.remove(path);
        self.journal.push(FileOperation {
            path: path.to_string(),
            action: FileAction::Delete,
            content: None,
            original,
        });
    }

    /// The raw, append-only journal.
    pub fn journal(&self) -> &[FileOperation] {
        &self.journal
    }

    /// Operations appended since `mark` (a previous `journal().len()`).
    pub fn journal_since(&self, mark: usize) -> &[FileOperation] {
        &self.journal[mark..]
    }

    pub fn has_changes(&self) -> bool {
        !self.journal.is_empty()
    }

    /// Collapse the journal to one operation per path, last write wins.
    /// Order follows each path's final appearance in the journal.
    pub fn effective_operations(&self) -> Vec<FileOperation> {
        let mut latest: HashMap<&str, usize> = HashMap::new();
        for (i, op) in self.journal.iter().enumerate() {
            latest.insert(op.path.as_str(), i);
        }

        let mut indices: Vec<usize> = latest.into_values().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .filter_map(|i| {
                let last = &self.journal[i];
                // A path first created then rewritten still creates; a path
                // created and then deleted never existed remotely at all.
                let first = self
                    .journal
                    .iter()
                    .find(|op| op.path == last.path)
                    .unwrap_or(last);
                let action = match (first.action, last.action) {
                    (FileAction::Create, FileAction::Delete) => return None,
                    (FileAction::Create, FileAction::Update) => FileAction::Create,
                    _ => last.action,
                };
                Some(FileOperation {
                    action,
                    ..last.clone()
                })
            })
            .collect()
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(AgentLog::new(level, message));
    }

    pub fn logs(&self) -> &[AgentLog] {
        &self.logs
    }
}
