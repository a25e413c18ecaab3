//! Repository mutation transaction — one commit for all staged changes.
//!
//! Builds the commit from the git-data primitives (blobs, trees, commit
//! objects) instead of one contents call per file, so observers never see a
//! partial set of changes. The branch ref is the only externally visible
//! pointer; everything before the ref update is invisible bookkeeping, and
//! the ref update itself is fast-forward-only. If the branch moved while
//! the task was running the update is rejected and the transaction aborts —
//! no retry, no force.

use tracing::{debug, info};

use crate::github::{GitHubClient, GitHubError, NewTreeEntry, PullRequest};
use crate::task::{FileAction, FileOperation, RepoId};

/// Errors ending a commit transaction.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("nothing to commit")]
    EmptyJournal,

    #[error("branch '{0}' moved concurrently; aborting without overwriting")]
    RefConflict(String),

    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

/// Commits a task's staged operations to its working branch.
pub struct ChangeTransaction<'a> {
    github: &'a GitHubClient,
    repo: &'a RepoId,
}

impl<'a> ChangeTransaction<'a> {
    pub fn new(github: &'a GitHubClient, repo: &'a RepoId) -> Self {
        Self { github, repo }
    }

    /// Make sure `branch` exists, creating it from the tip of
    /// `default_branch` when it doesn't. Returns true if it was created.
    pub async fn ensure_branch(
        &self,
        branch: &str,
        default_branch: &str,
    ) -> Result<bool, GitHubError> {
        if self.github.branch_exists(self.repo, branch).await? {
            return Ok(false);
        }
        let tip = self.github.branch_sha(self.repo, default_branch).await?;
        self.github.create_branch(self.repo, branch, &tip).await?;
        info!(branch, from = default_branch, "created working branch");
        Ok(true)
    }

    /// Commit `operations` to `branch` as a single commit; returns its sha.
    ///
    /// Steps: resolve the branch tip and its tree, upload one blob per
    /// create/update, build one tree (deletes as tombstones), create one
    /// commit parented on the tip, then fast-forward the ref. Failure
    /// anywhere before the ref update leaves the branch untouched.
    pub async fn commit(
        &self,
        branch: &str,
        message: &str,
        operations: &[FileOperation],
    ) -> Result<String, TransactionError> {
        if operations.is_empty() {
            return Err(TransactionError::EmptyJournal);
        }

        let head_sha = self.github.branch_sha(self.repo, branch).await?;
        let base_tree = self.github.commit_tree_sha(self.repo, &head_sha).await?;
        debug!(branch, head = %head_sha, "resolved branch tip");

        let mut entries = Vec::with_capacity(operations.len());
        for op in operations {
            match op.action {
                FileAction::Create | FileAction::Update => {
                    let content = op.content.as_deref().unwrap_or_default();
                    let blob_sha = self.github.create_blob(self.repo, content).await?;
                    entries.push(NewTreeEntry::blob(op.path.clone(), blob_sha));
                }
                FileAction::Delete => {
                    entries.push(NewTreeEntry::tombstone(op.path.clone()));
                }
            }
        }

        let tree_sha = self
            .github
            .create_tree(self.repo, &base_tree, &entries)
            .await?;
        let commit_sha = self
            .github
            .create_commit(self.repo, message, &tree_sha, &[head_sha.clone()])
            .await?;

        match self.github.update_ref(self.repo, branch, &commit_sha).await {
            Ok(()) => {}
            Err(GitHubError::Status { status, .. }) if status == 409 || status == 422 => {
                return Err(TransactionError::RefConflict(branch.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        info!(branch, commit = %commit_sha, files = operations.len(), "committed changes");
        Ok(commit_sha)
    }

    /// Open a pull request from `head` into `base`.
    pub async fn open_pull_request(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<PullRequest, GitHubError> {
        self.github
            .create_pull_request(self.repo, title, body, head, base)
            .await
    }
}

/// Commit message for a set of operations: the task description as the
/// subject, an operation summary as the body.
pub fn commit_message(description: &str, operations: &[FileOperation]) -> String {
    let mut message = format!("{description}\n\n");
    for op in operations {
        let verb = match op.action {
            FileAction::Create => "create",
            FileAction::Update => "update",
            FileAction::Delete => "delete",
        };
        message.push_str(&format!("- {verb} {}\n", op.path));
    }
    message
}

/// Pull request body: what was done, and which files it touches.
pub fn pull_request_body(description: &str, summary: &str, operations: &[FileOperation]) -> String {
    let mut body = format!("## Task\n\n{description}\n\n## Summary\n\n{summary}\n\n## Files\n\n");
    for op in operations {
        let verb = match op.action {
            FileAction::Create => "created",
            FileAction::Update => "updated",
            FileAction::Delete => "deleted",
        };
        body.push_str(&format!("- `{}` ({verb})\n", op.path));
    }
    body
}
