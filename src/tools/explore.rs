//! Read-only repository exploration tools.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{str_arg, u64_arg, ParamKind, Tool, ToolParameter};
use crate::context::TaskContext;
use crate::github::{EntryKind, GitHubClient, TreeNode};
use crate::task::{RepoId, StepKind, StepOutcome};

/// List one directory level.
pub struct ListDirectory {
    github: Arc<GitHubClient>,
    repo: RepoId,
}

impl ListDirectory {
    pub fn new(github: Arc<GitHubClient>, repo: RepoId) -> Self {
        Self { github, repo }
    }
}

#[async_trait]
impl Tool for ListDirectory {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Directories are marked with a \
         trailing slash."
    }

    fn parameters(&self) -> &[ToolParameter] {
        const PARAMS: &[ToolParameter] = &[ToolParameter::optional(
            "path",
            ParamKind::String,
            "Directory path; omit for the repository root",
        )];
        PARAMS
    }

    fn step_kind(&self) -> StepKind {
        StepKind::Analyze
    }

    async fn execute(&self, args: &Value, ctx: &mut TaskContext) -> StepOutcome {
        let path = str_arg(args, "path");
        match self
            .github
            .list_directory(&self.repo, path, ctx.branch())
            .await
        {
            Ok(entries) if entries.is_empty() => {
                StepOutcome::ok_message(format!("no entries under '{path}'"))
            }
            Ok(entries) => {
                let listing = entries
                    .iter()
                    .map(|e| match e.kind {
                        EntryKind::Dir => format!("{}/", e.name),
                        _ => e.name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                StepOutcome::ok(listing)
            }
            Err(e) => StepOutcome::err(format!("failed to list '{path}': {e}")),
        }
    }
}

/// Recursive project overview with a depth ceiling and skip-list.
pub struct ProjectStructure {
    github: Arc<GitHubClient>,
    repo: RepoId,
}

impl ProjectStructure {
    pub fn new(github: Arc<GitHubClient>, repo: RepoId) -> Self {
        Self { github, repo }
    }
}

#[async_trait]
impl Tool for ProjectStructure {
    fn name(&self) -> &str {
        "get_project_structure"
    }

    fn description(&self) -> &str {
        "Show the project tree up to a depth limit. Build output and \
         dependency directories are skipped."
    }

    fn parameters(&self) -> &[ToolParameter] {
        const PARAMS: &[ToolParameter] = &[ToolParameter::optional(
            "max_depth",
            ParamKind::Number,
            "Maximum directory depth (default 2)",
        )];
        PARAMS
    }

    fn step_kind(&self) -> StepKind {
        StepKind::Analyze
    }

    async fn execute(&self, args: &Value, ctx: &mut TaskContext) -> StepOutcome {
        let max_depth = u64_arg(args, "max_depth", 2) as usize;
        match self
            .github
            .full_structure(&self.repo, ctx.branch(), max_depth)
            .await
        {
            Ok(nodes) => StepOutcome::ok(format_tree(&nodes, 0)),
            Err(e) => StepOutcome::err(format!("failed to fetch structure: {e}")),
        }
    }
}

fn format_tree(nodes: &[TreeNode], indent: usize) -> String {
    let mut out = String::new();
    for node in nodes {
        for _ in 0..indent {
            out.push_str("  ");
        }
        out.push_str(&node.name);
        if node.kind == EntryKind::Dir {
            out.push('/');
        }
        out.push('\n');
        if !node.children.is_empty() {
            out.push_str(&format_tree(&node.children, indent + 1));
        }
    }
    out
}
