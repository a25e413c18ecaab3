//! Tool framework — named, schema-described operations the model invokes.
//!
//! Tools don't think — they execute. Each implements `Tool` and registers
//! into a `ToolRegistry`, which owns parameter validation so individual
//! tools never re-check presence or types. All mutable state lives in the
//! `TaskContext` threaded into every call; tools themselves are stateless.

pub mod explore;
pub mod files;
pub mod search;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::TaskContext;
use crate::github::GitHubClient;
use crate::llm::types::ToolDefinition;
use crate::task::{RepoId, StepKind, StepOutcome};

/// Errors from tool lookup and validation. These are fed back to the model
/// as observations, never raised out of the step loop.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid parameters for {tool}: {reason}")]
    InvalidParameters { tool: String, reason: String },
}

/// JSON-schema primitive kinds a parameter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Array,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Array => value.is_array(),
        }
    }
}

/// Declared parameter of a tool.
#[derive(Debug, Clone)]
pub struct ToolParameter {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
}

impl ToolParameter {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            description,
            required: false,
        }
    }
}

/// A named operation the model can invoke against the task context.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls this tool by (unique within a registry).
    fn name(&self) -> &str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &str;

    /// Declared parameters, validated by the registry before dispatch.
    fn parameters(&self) -> &[ToolParameter];

    /// Which kind of step record an invocation produces.
    fn step_kind(&self) -> StepKind;

    /// Execute against validated arguments. Failures are returned as
    /// unsuccessful outcomes, not errors — the loop recovers conversationally.
    async fn execute(&self, args: &Value, ctx: &mut TaskContext) -> StepOutcome;
}

/// Name-keyed tool lookup with generic parameter validation.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The baseline tool set every task gets: file edits against the
    /// context, read-only repository exploration and search.
    pub fn baseline(github: Arc<GitHubClient>, repo: RepoId, max_file_size: usize) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(files::ReadFile::new(github.clone(), repo.clone())));
        registry.register(Arc::new(files::WriteFile::new(max_file_size)));
        registry.register(Arc::new(files::DeleteFile));
        registry.register(Arc::new(explore::ListDirectory::new(
            github.clone(),
            repo.clone(),
        )));
        registry.register(Arc::new(explore::ProjectStructure::new(
            github.clone(),
            repo.clone(),
        )));
        registry.register(Arc::new(search::SearchCode::new(
            github.clone(),
            repo.clone(),
        )));
        registry.register(Arc::new(search::FindFile::new(github, repo)));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Tool schemas in registration order, for the completion request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| {
                let mut properties = serde_json::Map::new();
                let mut required = Vec::new();
                for param in tool.parameters() {
                    properties.insert(
                        param.name.to_string(),
                        serde_json::json!({
                            "type": param.kind.json_type(),
                            "description": param.description,
                        }),
                    );
                    if param.required {
                        required.push(Value::String(param.name.to_string()));
                    }
                }
                let mut schema = serde_json::Map::new();
                schema.insert("type".into(), Value::String("object".into()));
                schema.insert("properties".into(), Value::Object(properties));
                if !required.is_empty() {
                    schema.insert("required".into(), Value::Array(required));
                }
                ToolDefinition {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    input_schema: Value::Object(schema),
                }
            })
            .collect()
    }

    /// Validate arguments and dispatch. `Err` means the call never reached
    /// the tool; the caller folds it into the conversation as an observation.
    pub async fn execute(
        &self,
        name: &str,
        args: &Value,
        ctx: &mut TaskContext,
    ) -> Result<StepOutcome, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        validate(tool.as_ref(), args)?;
        Ok(tool.execute(args, ctx).await)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(tool: &dyn Tool, args: &Value) -> Result<(), ToolError> {
    let empty = serde_json::Map::new();
    let object = match args {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(ToolError::InvalidParameters {
                tool: tool.name().to_string(),
                reason: "arguments must be an object".into(),
            })
        }
    };

    for param in tool.parameters() {
        match object.get(param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    return Err(ToolError::InvalidParameters {
                        tool: tool.name().to_string(),
                        reason: format!("missing required parameter '{}'", param.name),
                    });
                }
            }
            Some(value) => {
                if !param.kind.matches(value) {
                    return Err(ToolError::InvalidParameters {
                        tool: tool.name().to_string(),
                        reason: format!(
                            "parameter '{}' must be a {}",
                            param.name,
                            param.kind.json_type()
                        ),
                    });
                }
            }
        }
    }

    Ok(())
}

/// Fetch a validated string argument.
pub(crate) fn str_arg<'a>(args: &'a Value, name: &str) -> &'a str {
    args.get(name).and_then(Value::as_str).unwrap_or_default()
}

/// Fetch a validated numeric argument, with a default.
pub(crate) fn u64_arg(args: &Value, name: &str, default: u64) -> u64 {
    args.get(name).and_then(Value::as_u64).unwrap_or(default)
}
