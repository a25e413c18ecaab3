//! repopilot — an autonomous coding agent for remote repositories.
//!
//! A task flows through a staged pipeline: a planning completion, a
//! sequence of bounded tool-calling loops that stage file edits against an
//! in-memory context, then one atomic commit of everything staged, with an
//! optional pull request. Progress streams out as tagged events.
//!
//! ## Architecture
//!
//! - `task`: data model — tasks, plans, step records, file operations
//! - `context`: per-task file cache and operation journal
//! - `events`: the event stream and its sink
//! - `config`: runtime configuration
//! - `llm`: Anthropic Messages API client (the completion contract)
//! - `github`: GitHub REST client (the repository hosting contract)
//! - `tools`: tool trait, registry, and the baseline tool set
//! - `agent`: the bounded step loop, prompts, plan parsing
//! - `transaction`: atomic multi-file commit and pull request
//! - `pipeline`: the stage orchestrator
//! - `worker`: off-thread pipeline runs with event streaming

pub mod agent;
pub mod config;
pub mod context;
pub mod events;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod task;
pub mod tools;
pub mod transaction;
pub mod worker;

pub use config::AgentConfig;
pub use events::AgentEvent;
pub use pipeline::{Pipeline, PipelineReport, PipelineShape};
pub use task::{RepoId, Task, TaskStatus};
pub use worker::{spawn, TaskHandle};
