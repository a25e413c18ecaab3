//! Pipeline — ordered stages of bounded agent loops over one shared context.
//!
//! Each stage is a role, a step budget, and a prompt template that receives
//! the original request plus the previous stage's result. Stages run
//! strictly sequentially; a failed stage halts the pipeline with the
//! completed stages' results preserved. File changes accumulate in the one
//! `TaskContext` across stages and only become durable in the commit
//! transaction after the final stage.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::agent::{plan::parse_plan, prompts, LoopError, StepLoop};
use crate::config::AgentConfig;
use crate::context::TaskContext;
use crate::events::{AgentEvent, EventSink};
use crate::github::{GitHubClient, GitHubError, PullRequest};
use crate::llm::client::LlmError;
use crate::llm::types::Message;
use crate::llm::LlmPool;
use crate::task::{
    AgentLog, LogLevel, Plan, StepKind, StepOutcome, StepRecord, StepStatus, Task, TaskStatus,
};
use crate::tools::ToolRegistry;
use crate::transaction::{
    commit_message, pull_request_body, ChangeTransaction, TransactionError,
};

/// One stage: a role label, a step budget, and a prompt template.
#[derive(Debug, Clone)]
pub struct Stage {
    pub role: &'static str,
    pub max_turns: usize,
    pub prompt: fn(&str, Option<&str>) -> String,
}

/// The two supported pipeline shapes. The orchestrator itself is
/// shape-agnostic; these only differ in stage count, budgets, and prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineShape {
    ThreeStage,
    FiveStage,
}

impl PipelineShape {
    pub fn stages(self) -> Vec<Stage> {
        match self {
            PipelineShape::ThreeStage => vec![
                Stage {
                    role: "analyze",
                    max_turns: 8,
                    prompt: prompts::analyze,
                },
                Stage {
                    role: "implement",
                    max_turns: 24,
                    prompt: prompts::implement,
                },
                Stage {
                    role: "review",
                    max_turns: 12,
                    prompt: prompts::review,
                },
            ],
            PipelineShape::FiveStage => vec![
                Stage {
                    role: "analyze",
                    max_turns: 6,
                    prompt: prompts::analyze,
                },
                Stage {
                    role: "design",
                    max_turns: 6,
                    prompt: prompts::design,
                },
                Stage {
                    role: "plan",
                    max_turns: 6,
                    prompt: prompts::plan,
                },
                Stage {
                    role: "implement",
                    max_turns: 24,
                    prompt: prompts::implement,
                },
                Stage {
                    role: "test",
                    max_turns: 12,
                    prompt: prompts::test_review,
                },
            ],
        }
    }
}

impl std::str::FromStr for PipelineShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "3" | "three" => Ok(PipelineShape::ThreeStage),
            "5" | "five" => Ok(PipelineShape::FiveStage),
            other => Err(format!("unknown pipeline shape '{other}', expected 3 or 5")),
        }
    }
}

/// Result of one completed or failed stage.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub role: String,
    pub status: StepStatus,
    pub result: Option<String>,
}

/// Everything a finished pipeline produced.
#[derive(Debug)]
pub struct PipelineReport {
    pub plan: Plan,
    pub stages: Vec<StageResult>,
    pub steps: Vec<StepRecord>,
    pub logs: Vec<AgentLog>,
    pub commit_sha: Option<String>,
    pub pull_request: Option<PullRequest>,
    pub summary: String,
}

/// Terminal pipeline failures.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage '{role}' failed: {reason}")]
    StageFailed {
        role: String,
        reason: String,
        /// Results of the stages that completed before the failure.
        completed: Vec<StageResult>,
    },

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Runs tasks end to end: plan, staged loops, commit, pull request.
pub struct Pipeline {
    config: AgentConfig,
    llm: LlmPool,
    github: Arc<GitHubClient>,
    sink: EventSink,
}

impl Pipeline {
    pub fn new(config: AgentConfig, sink: EventSink) -> Self {
        let llm = match &config.llm_base_url {
            Some(base) => LlmPool::with_base_url(
                config.anthropic_api_key.clone(),
                &config.model,
                base.clone(),
                config.llm_timeout,
            ),
            None => LlmPool::new(
                config.anthropic_api_key.clone(),
                &config.model,
                config.llm_timeout,
            ),
        };
        let github = Arc::new(match &config.github_base_url {
            Some(base) => GitHubClient::with_base_url(
                config.github_token.clone(),
                base.clone(),
                config.github_timeout,
            ),
            None => GitHubClient::new(config.github_token.clone(), config.github_timeout),
        });

        Self {
            config,
            llm,
            github,
            sink,
        }
    }

    /// Run `task` through `stages`, committing staged changes at the end.
    pub async fn run(
        &self,
        task: &mut Task,
        stages: &[Stage],
    ) -> Result<PipelineReport, PipelineError> {
        match self.run_inner(task, stages).await {
            Ok(report) => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
                Ok(report)
            }
            Err(e) => {
                task.status = TaskStatus::Failed;
                task.completed_at = Some(Utc::now());
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        task: &mut Task,
        stages: &[Stage],
    ) -> Result<PipelineReport, PipelineError> {
        task.status = TaskStatus::Planning;
        self.sink.log(
            LogLevel::Info,
            format!("task {} on {}", task.id, task.repository),
        );

        let repo = task.repository.clone();
        let repo_info = self.github.repository(&repo).await?;
        let branch = task.working_branch();
        task.branch = Some(branch.clone());

        let mut steps: Vec<StepRecord> = Vec::new();
        let tx = ChangeTransaction::new(&self.github, &repo);
        self.ensure_branch(&tx, &branch, &repo_info.default_branch, &mut steps)
            .await?;

        // One planning completion, then the plan is immutable.
        let planning = prompts::planning_request(&task.description);
        let response = self
            .llm
            .complete(
                None,
                vec![Message::user(planning)],
                self.config.max_tokens,
                Some(prompts::AGENT_SYSTEM_PROMPT),
            )
            .await?;
        let plan = parse_plan(
            &task.description,
            &response.text().unwrap_or_default(),
        );
        self.sink.emit(AgentEvent::Plan(plan.clone()));
        info!(steps = plan.steps.len(), "plan ready");

        task.status = TaskStatus::Executing;
        let mut ctx = TaskContext::new(branch.clone());
        let registry =
            ToolRegistry::baseline(self.github.clone(), repo.clone(), self.config.max_file_size);

        let mut completed: Vec<StageResult> = Vec::new();
        let mut previous: Option<String> = None;

        for stage in stages {
            self.sink.log(
                LogLevel::Info,
                format!("stage '{}' starting ({} turn budget)", stage.role, stage.max_turns),
            );
            let step_loop = StepLoop::new(
                &self.llm,
                &registry,
                &self.sink,
                stage.max_turns,
                self.config.max_tokens,
            );
            let prompt = (stage.prompt)(&task.description, previous.as_deref());

            match step_loop
                .run(prompts::AGENT_SYSTEM_PROMPT, prompt, &mut ctx, &mut steps)
                .await
            {
                Ok(text) => {
                    self.sink
                        .log(LogLevel::Success, format!("stage '{}' completed", stage.role));
                    ctx.log(
                        LogLevel::Success,
                        format!("stage '{}' completed", stage.role),
                    );
                    completed.push(StageResult {
                        role: stage.role.to_string(),
                        status: StepStatus::Completed,
                        result: Some(text.clone()),
                    });
                    previous = Some(text);
                }
                Err(LoopError::BudgetExhausted(turns)) => {
                    return Err(PipelineError::StageFailed {
                        role: stage.role.to_string(),
                        reason: format!("step budget exhausted after {turns} turns"),
                        completed,
                    });
                }
                Err(LoopError::Llm(e)) => return Err(e.into()),
            }
        }

        let summary = previous.unwrap_or_default();
        let operations = ctx.effective_operations();
        let mut commit_sha = None;
        let mut pull_request = None;

        if operations.is_empty() {
            self.sink.log(
                LogLevel::Warn,
                "no file changes were staged; nothing to commit",
            );
        } else {
            commit_sha = Some(
                self.commit_changes(&tx, task, &branch, &operations, &mut steps)
                    .await?,
            );
            if self.config.open_pull_request {
                pull_request = Some(
                    self.open_pr(
                        &tx,
                        task,
                        &summary,
                        &operations,
                        &branch,
                        &repo_info.default_branch,
                        &mut steps,
                    )
                    .await?,
                );
            }
        }

        Ok(PipelineReport {
            plan,
            stages: completed,
            steps,
            logs: ctx.logs().to_vec(),
            commit_sha,
            pull_request,
            summary,
        })
    }

    async fn ensure_branch(
        &self,
        tx: &ChangeTransaction<'_>,
        branch: &str,
        default_branch: &str,
        steps: &mut Vec<StepRecord>,
    ) -> Result<(), PipelineError> {
        let mut record = StepRecord::started(
            StepKind::CreateBranch,
            format!("ensure branch {branch}"),
            serde_json::json!({ "branch": branch, "from": default_branch }),
        );
        self.sink.emit(AgentEvent::StepStart { step_id: record.id });

        match tx.ensure_branch(branch, default_branch).await {
            Ok(created) => {
                let outcome = StepOutcome::ok_message(if created {
                    format!("created {branch} from {default_branch}")
                } else {
                    format!("{branch} already exists")
                });
                self.sink.emit(AgentEvent::StepComplete {
                    step_id: record.id,
                    result: outcome.clone(),
                });
                record.complete(outcome);
                steps.push(record);
                Ok(())
            }
            Err(e) => {
                self.sink.emit(AgentEvent::StepError {
                    step_id: record.id,
                    error: e.to_string(),
                });
                record.fail(e.to_string());
                steps.push(record);
                Err(e.into())
            }
        }
    }

    async fn commit_changes(
        &self,
        tx: &ChangeTransaction<'_>,
        task: &Task,
        branch: &str,
        operations: &[crate::task::FileOperation],
        steps: &mut Vec<StepRecord>,
    ) -> Result<String, PipelineError> {
        let mut record = StepRecord::started(
            StepKind::Commit,
            format!("commit {} operations to {branch}", operations.len()),
            serde_json::json!({ "branch": branch, "operations": operations.len() }),
        );
        self.sink.emit(AgentEvent::StepStart { step_id: record.id });

        let message = commit_message(&task.description, operations);
        match tx.commit(branch, &message, operations).await {
            Ok(sha) => {
                let outcome = StepOutcome::ok(sha.clone());
                self.sink.emit(AgentEvent::StepComplete {
                    step_id: record.id,
                    result: outcome.clone(),
                });
                record.complete(outcome);
                steps.push(record);
                self.sink
                    .log(LogLevel::Success, format!("committed {sha} to {branch}"));
                Ok(sha)
            }
            Err(e) => {
                self.sink.emit(AgentEvent::StepError {
                    step_id: record.id,
                    error: e.to_string(),
                });
                record.fail(e.to_string());
                steps.push(record);
                Err(e.into())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn open_pr(
        &self,
        tx: &ChangeTransaction<'_>,
        task: &Task,
        summary: &str,
        operations: &[crate::task::FileOperation],
        branch: &str,
        default_branch: &str,
        steps: &mut Vec<StepRecord>,
    ) -> Result<PullRequest, PipelineError> {
        let mut record = StepRecord::started(
            StepKind::CreatePr,
            format!("open pull request {branch} -> {default_branch}"),
            serde_json::json!({ "head": branch, "base": default_branch }),
        );
        self.sink.emit(AgentEvent::StepStart { step_id: record.id });

        let title = pr_title(&task.description);
        let body = pull_request_body(&task.description, summary, operations);
        match tx
            .open_pull_request(&title, &body, branch, default_branch)
            .await
        {
            Ok(pr) => {
                let outcome = StepOutcome::ok(pr.html_url.clone());
                self.sink.emit(AgentEvent::StepComplete {
                    step_id: record.id,
                    result: outcome.clone(),
                });
                record.complete(outcome);
                steps.push(record);
                self.sink.emit(AgentEvent::PrCreated {
                    url: pr.html_url.clone(),
                    number: pr.number,
                });
                Ok(pr)
            }
            Err(e) => {
                self.sink.emit(AgentEvent::StepError {
                    step_id: record.id,
                    error: e.to_string(),
                });
                record.fail(e.to_string());
                steps.push(record);
                Err(e.into())
            }
        }
    }
}

/// First line of the description, trimmed to a git-subject length.
fn pr_title(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or(description);
    if first_line.len() <= 72 {
        first_line.to_string()
    } else {
        let mut cut = 69;
        while !first_line.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &first_line[..cut])
    }
}
