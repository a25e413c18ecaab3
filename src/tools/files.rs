//! File tools — the only tools that touch the operation journal.
//!
//! `read_file` is the single lazy entry point into the content cache;
//! writes and deletes stage operations against the context and never reach
//! the remote repository themselves.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{str_arg, ParamKind, Tool, ToolParameter};
use crate::context::TaskContext;
use crate::github::{GitHubClient, GitHubError};
use crate::task::{FileAction, RepoId, StepKind, StepOutcome};

/// Read a file from the cache, falling back to the remote repository.
pub struct ReadFile {
    github: Arc<GitHubClient>,
    repo: RepoId,
}

impl ReadFile {
    pub fn new(github: Arc<GitHubClient>, repo: RepoId) -> Self {
        Self { github, repo }
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file from the repository."
    }

    fn parameters(&self) -> &[ToolParameter] {
        const PARAMS: &[ToolParameter] = &[ToolParameter::required(
            "path",
            ParamKind::String,
            "Path of the file to read",
        )];
        PARAMS
    }

    fn step_kind(&self) -> StepKind {
        StepKind::Read
    }

    async fn execute(&self, args: &Value, ctx: &mut TaskContext) -> StepOutcome {
        let path = str_arg(args, "path");

        if let Some(content) = ctx.cached(path) {
            return StepOutcome::ok(content.to_string());
        }

        match self
            .github
            .file_content(&self.repo, path, ctx.branch())
            .await
        {
            Ok(content) => {
                ctx.cache_file(path, content.clone());
                StepOutcome::ok(content)
            }
            Err(GitHubError::NotFound(_)) => {
                StepOutcome::err(format!("file not found: {path}"))
            }
            Err(e) => StepOutcome::err(format!("failed to read {path}: {e}")),
        }
    }
}

/// Stage a file creation or update in the journal.
pub struct WriteFile {
    max_file_size: usize,
}

impl WriteFile {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Create or update a file. The change is staged and committed together \
         with all other changes when the task finishes."
    }

    fn parameters(&self) -> &[ToolParameter] {
        const PARAMS: &[ToolParameter] = &[
            ToolParameter::required("path", ParamKind::String, "Path of the file to write"),
            ToolParameter::required("content", ParamKind::String, "Full new file content"),
        ];
        PARAMS
    }

    fn step_kind(&self) -> StepKind {
        StepKind::Write
    }

    async fn execute(&self, args: &Value, ctx: &mut TaskContext) -> StepOutcome {
        let path = str_arg(args, "path");
        let content = str_arg(args, "content");

        if content.len() > self.max_file_size {
            return StepOutcome::err(format!(
                "content for {path} is {} bytes, over the {} byte limit",
                content.len(),
                self.max_file_size
            ));
        }

        let action = ctx.record_write(path, content.to_string());
        debug!(path, ?action, "staged write");
        let verb = match action {
            FileAction::Create => "create",
            _ => "update",
        };
        StepOutcome::ok_message(format!("staged {verb} of {path}"))
    }
}

/// Stage a file deletion in the journal.
pub struct DeleteFile;

#[async_trait]
impl Tool for DeleteFile {
    fn name(&self) -> &str {
        "delete_file"
    }

    fn description(&self) -> &str {
        "Delete a file. The deletion is staged and committed with the task's \
         other changes."
    }

    fn parameters(&self) -> &[ToolParameter] {
        const PARAMS: &[ToolParameter] = &[ToolParameter::required(
            "path",
            ParamKind::String,
            "Path of the file to delete",
        )];
        PARAMS
    }

    fn step_kind(&self) -> StepKind {
        StepKind::Delete
    }

    async fn execute(&self, args: &Value, ctx: &mut TaskContext) -> StepOutcome {
        let path = str_arg(args, "path");
        ctx.record_delete(path);
        StepOutcome::ok_message(format!("staged deletion of {path}"))
    }
}
