//! Task data model — tasks, plans, step records, file operations.
//!
//! A `Task` is one end-to-end request to modify a repository. The agent
//! produces a `Plan` once, then appends `StepRecord`s as it works. Pending
//! edits accumulate as `FileOperation`s until the commit transaction
//! flushes them in a single commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Repository coordinates, `owner/name` on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    /// Parse `owner/name`. Rejects empty segments and extra slashes.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: (*owner).to_string(),
                name: (*name).to_string(),
            }),
            _ => Err(format!("invalid repository '{s}', expected owner/name")),
        }
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl std::str::FromStr for RepoId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Planning,
    Executing,
    Completed,
    Failed,
}

/// One end-to-end request to modify a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    pub repository: RepoId,
    /// Working branch. Generated as `agent/<short-id>` when not given.
    pub branch: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(description: impl Into<String>, repository: RepoId) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            repository,
            branch: None,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// The working branch for this task, generating one from the task id
    /// when none was requested.
    pub fn working_branch(&self) -> String {
        match &self.branch {
            Some(b) => b.clone(),
            None => {
                let id = self.id.simple().to_string();
                format!("agent/{}", &id[..8])
            }
        }
    }
}

/// What kind of work a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Analyze,
    Read,
    Write,
    Delete,
    Search,
    CreateBranch,
    Commit,
    CreatePr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Result payload of a finished step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepOutcome {
    pub fn ok(data: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data.into()),
            message: None,
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Render this outcome as the observation text fed back to the model.
    pub fn observation(&self) -> String {
        if self.success {
            self.data
                .clone()
                .or_else(|| self.message.clone())
                .unwrap_or_else(|| "ok".into())
        } else {
            format!(
                "error: {}",
                self.message.as_deref().unwrap_or("unspecified failure")
            )
        }
    }
}

/// Append-only record of something the loop attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: Uuid,
    pub kind: StepKind,
    pub description: String,
    pub status: StepStatus,
    pub params: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRecord {
    pub fn started(kind: StepKind, description: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            description: description.into(),
            status: StepStatus::Running,
            params,
            result: None,
            error: None,
        }
    }

    pub fn complete(&mut self, outcome: StepOutcome) {
        self.status = if outcome.success {
            StepStatus::Completed
        } else {
            StepStatus::Failed
        };
        self.result = Some(outcome);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
    }
}

/// One planned step, as proposed by the planning completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub kind: StepKind,
    pub description: String,
}

/// The plan a task executes against. Produced once, immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub summary: String,
    pub steps: Vec<PlanStep>,
    pub estimated_files: Vec<String>,
}

/// Pending change to a single path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAction {
    Create,
    Update,
    Delete,
}

/// A single pending create/update/delete recorded against a path.
///
/// The journal of these is the sole source of truth for what the commit
/// transaction will write; nothing touches the remote until then.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOperation {
    pub path: String,
    pub action: FileAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original: Option<String>,
}

impl FileOperation {
    /// Unified diff between the original and new content, for display.
    /// `None` when neither side has content to compare.
    pub fn diff(&self) -> Option<String> {
        let old = self.original.as_deref().unwrap_or("");
        let new = self.content.as_deref().unwrap_or("");
        if old.is_empty() && new.is_empty() {
            return None;
        }
        let text = similar::TextDiff::from_lines(old, new)
            .unified_diff()
            .header(&format!("a/{}", self.path), &format!("b/{}", self.path))
            .to_string();
        Some(text)
    }
}

/// Log severity. `Success` marks milestones the host may highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Success,
}

/// A timestamped log line accumulated on the task context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl AgentLog {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_id_parses() {
        let id = RepoId::parse("acme/widgets").unwrap();
        assert_eq!(id.owner, "acme");
        assert_eq!(id.name, "widgets");
        assert_eq!(id.to_string(), "acme/widgets");
    }

    #[test]
    fn repo_id_rejects_malformed() {
        assert!(RepoId::parse("no-slash").is_err());
        assert!(RepoId::parse("/name").is_err());
        assert!(RepoId::parse("owner/").is_err());
        assert!(RepoId::parse("a/b/c").is_err());
    }

    #[test]
    fn working_branch_generated_from_id() {
        let task = Task::new("fix the bug", RepoId::parse("acme/widgets").unwrap());
        let branch = task.working_branch();
        assert!(branch.starts_with("agent/"));
        assert_eq!(branch.len(), "agent/".len() + 8);
    }

    #[test]
    fn working_branch_respects_explicit() {
        let task = Task::new("fix", RepoId::parse("a/b").unwrap()).with_branch("feature/x");
        assert_eq!(task.working_branch(), "feature/x");
    }

    #[test]
    fn step_record_transitions() {
        let mut step = StepRecord::started(StepKind::Read, "read src/lib.rs", serde_json::json!({}));
        assert_eq!(step.status, StepStatus::Running);

        step.complete(StepOutcome {
            success: true,
            data: Some("contents".into()),
            message: None,
        });
        assert_eq!(step.status, StepStatus::Completed);

        let mut failing = StepRecord::started(StepKind::Write, "write", serde_json::json!({}));
        failing.fail("disk full");
        assert_eq!(failing.status, StepStatus::Failed);
        assert_eq!(failing.error.as_deref(), Some("disk full"));
    }

    #[test]
    fn file_operation_diff() {
        let op = FileOperation {
            path: "src/main.rs".into(),
            action: FileAction::Update,
            content: Some("fn main() {}\n".into()),
            original: Some("fn main() { panic!() }\n".into()),
        };
        let diff = op.diff().unwrap();
        assert!(diff.contains("a/src/main.rs"));
        assert!(diff.contains("-fn main() { panic!() }"));
        assert!(diff.contains("+fn main() {}"));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Executing).unwrap();
        assert_eq!(json, "\"executing\"");
        let json = serde_json::to_string(&StepKind::CreatePr).unwrap();
        assert_eq!(json, "\"create_pr\"");
    }
}
