//! StepLoop — the bounded think-act-observe loop.
//!
//! One run drives one conversation with the completion service. Tool calls
//! within a turn execute strictly in the order the model requested them,
//! since later calls may depend on cache state mutated by earlier ones.
//! Tool failures become observations and the loop continues; only transport
//! failures or an exhausted turn budget end it abnormally.

use serde_json::Value;
use tracing::debug;

use crate::context::TaskContext;
use crate::events::{AgentEvent, EventSink};
use crate::llm::client::LlmError;
use crate::llm::types::{ContentBlock, Message, ToolDefinition, ToolUse};
use crate::llm::LlmPool;
use crate::task::{LogLevel, StepKind, StepOutcome, StepRecord};
use crate::tools::ToolRegistry;

/// Name of the termination tool the loop itself provides.
pub const FINISH_TOOL: &str = "finish_task";

/// Abnormal loop endings. Tool errors never show up here.
#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("step budget exhausted after {0} turns")]
    BudgetExhausted(usize),
}

fn finish_definition() -> ToolDefinition {
    ToolDefinition {
        name: FINISH_TOOL.into(),
        description: "Signal that this stage of work is complete.".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "What was accomplished, for the next stage"
                }
            },
            "required": ["summary"]
        }),
    }
}

fn describe_call(name: &str, input: &Value) -> String {
    for key in ["path", "query", "filename"] {
        if let Some(value) = input.get(key).and_then(Value::as_str) {
            return format!("{name}: {value}");
        }
    }
    name.to_string()
}

/// Drives one bounded conversation against the tool registry.
pub struct StepLoop<'a> {
    llm: &'a LlmPool,
    registry: &'a ToolRegistry,
    sink: &'a EventSink,
    max_turns: usize,
    max_tokens: u32,
}

impl<'a> StepLoop<'a> {
    pub fn new(
        llm: &'a LlmPool,
        registry: &'a ToolRegistry,
        sink: &'a EventSink,
        max_turns: usize,
        max_tokens: u32,
    ) -> Self {
        Self {
            llm,
            registry,
            sink,
            max_turns,
            max_tokens,
        }
    }

    /// Run until the model terminates or the turn budget runs out.
    /// Returns the stage's final text.
    pub async fn run(
        &self,
        system: &str,
        prompt: String,
        ctx: &mut TaskContext,
        records: &mut Vec<StepRecord>,
    ) -> Result<String, LoopError> {
        let mut definitions = self.registry.definitions();
        definitions.push(finish_definition());

        let mut messages = vec![Message::user(prompt)];

        for turn in 1..=self.max_turns {
            let response = self
                .llm
                .complete_with_tools(
                    None,
                    messages.clone(),
                    self.max_tokens,
                    Some(system),
                    definitions.clone(),
                )
                .await?;

            let tool_uses = response.tool_uses();
            messages.push(Message::assistant(response.content.clone()));

            if tool_uses.is_empty() {
                debug!(turn, "loop completed with final text");
                return Ok(response.text().unwrap_or_default());
            }

            let mut results = Vec::with_capacity(tool_uses.len());
            for call in &tool_uses {
                if call.name == FINISH_TOOL {
                    let summary = call
                        .input
                        .get("summary")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .or_else(|| response.text())
                        .unwrap_or_default();
                    debug!(turn, "loop completed via finish_task");
                    return Ok(summary);
                }

                let outcome = self.dispatch(call, ctx, records).await;
                results.push(ContentBlock::ToolResult {
                    tool_use_id: call.id.clone(),
                    content: outcome.observation(),
                    is_error: (!outcome.success).then_some(true),
                });
            }
            messages.push(Message::tool_results(results));
        }

        Err(LoopError::BudgetExhausted(self.max_turns))
    }

    /// Execute one tool call, recording it and emitting step events.
    async fn dispatch(
        &self,
        call: &ToolUse,
        ctx: &mut TaskContext,
        records: &mut Vec<StepRecord>,
    ) -> StepOutcome {
        let kind = self
            .registry
            .get(&call.name)
            .map(|t| t.step_kind())
            .unwrap_or(StepKind::Analyze);
        let mut record = StepRecord::started(
            kind,
            describe_call(&call.name, &call.input),
            call.input.clone(),
        );
        self.sink.emit(AgentEvent::StepStart { step_id: record.id });

        let mark = ctx.journal().len();
        let outcome = match self.registry.execute(&call.name, &call.input, ctx).await {
            Ok(outcome) => outcome,
            // Unknown tool or bad parameters: recover conversationally.
            Err(e) => StepOutcome::err(e.to_string()),
        };

        for op in ctx.journal_since(mark) {
            self.sink.emit(AgentEvent::FileChange(op.clone()));
        }

        if outcome.success {
            self.sink.emit(AgentEvent::StepComplete {
                step_id: record.id,
                result: outcome.clone(),
            });
            record.complete(outcome.clone());
        } else {
            let error = outcome
                .message
                .clone()
                .unwrap_or_else(|| "tool failed".into());
            self.sink.emit(AgentEvent::StepError {
                step_id: record.id,
                error: error.clone(),
            });
            ctx.log(LogLevel::Warn, format!("{} failed: {error}", call.name));
            record.fail(error);
        }
        records.push(record);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::github::GitHubClient;
    use crate::task::{RepoId, StepStatus};

    fn text_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "msg_t",
            "model": "claude-sonnet-4-5-20250514",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        })
    }

    fn tool_use_response(name: &str, input: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": "msg_t",
            "model": "claude-sonnet-4-5-20250514",
            "content": [
                {"type": "tool_use", "id": "tu_1", "name": name, "input": input}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        })
    }

    async fn harness(
        llm_server: &MockServer,
        github_server: &MockServer,
    ) -> (LlmPool, ToolRegistry) {
        let llm = LlmPool::with_base_url(
            "k".into(),
            "sonnet",
            llm_server.uri(),
            Duration::from_secs(5),
        );
        let github = Arc::new(GitHubClient::with_base_url(
            "t".into(),
            github_server.uri(),
            Duration::from_secs(5),
        ));
        let registry =
            ToolRegistry::baseline(github, RepoId::parse("acme/widgets").unwrap(), 1024 * 1024);
        (llm, registry)
    }

    #[tokio::test]
    async fn plain_text_response_completes_loop() {
        let llm_server = MockServer::start().await;
        let github_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("all done")))
            .expect(1)
            .mount(&llm_server)
            .await;

        let (llm, registry) = harness(&llm_server, &github_server).await;
        let sink = EventSink::discard();
        let step_loop = StepLoop::new(&llm, &registry, &sink, 5, 1024);

        let mut ctx = TaskContext::new("main");
        let mut records = Vec::new();
        let result = step_loop
            .run("system", "do it".into(), &mut ctx, &mut records)
            .await
            .unwrap();
        assert_eq!(result, "all done");
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn tool_call_then_finish() {
        let llm_server = MockServer::start().await;
        let github_server = MockServer::start().await;

        // Turn 1: stage a write. Turn 2 (request carries the observation):
        // finish with a summary.
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_string_contains("tool_result"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_response(
                FINISH_TOOL,
                serde_json::json!({"summary": "wrote foo.txt"}),
            )))
            .expect(1)
            .mount(&llm_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_response(
                "write_file",
                serde_json::json!({"path": "foo.txt", "content": "A"}),
            )))
            .expect(1)
            .mount(&llm_server)
            .await;

        let (llm, registry) = harness(&llm_server, &github_server).await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink = EventSink::new(tx);
        let step_loop = StepLoop::new(&llm, &registry, &sink, 5, 1024);

        let mut ctx = TaskContext::new("main");
        let mut records = Vec::new();
        let result = step_loop
            .run("system", "create foo.txt".into(), &mut ctx, &mut records)
            .await
            .unwrap();

        assert_eq!(result, "wrote foo.txt");
        assert_eq!(ctx.journal().len(), 1);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, StepKind::Write);
        assert_eq!(records[0].status, StepStatus::Completed);

        // step_start, file_change, step_complete — in that order
        assert!(matches!(rx.try_recv().unwrap(), AgentEvent::StepStart { .. }));
        assert!(matches!(rx.try_recv().unwrap(), AgentEvent::FileChange(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            AgentEvent::StepComplete { .. }
        ));
    }

    #[tokio::test]
    async fn failed_tool_is_an_observation_not_an_error() {
        let llm_server = MockServer::start().await;
        let github_server = MockServer::start().await;

        // read_file will 404 against the github mock
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&github_server)
            .await;

        // Turn 2 must carry the error observation back to the model.
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_string_contains("is_error"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("gave up")))
            .expect(1)
            .mount(&llm_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_response(
                "read_file",
                serde_json::json!({"path": "missing.rs"}),
            )))
            .expect(1)
            .mount(&llm_server)
            .await;

        let (llm, registry) = harness(&llm_server, &github_server).await;
        let sink = EventSink::discard();
        let step_loop = StepLoop::new(&llm, &registry, &sink, 5, 1024);

        let mut ctx = TaskContext::new("main");
        let mut records = Vec::new();
        let result = step_loop
            .run("system", "read it".into(), &mut ctx, &mut records)
            .await
            .unwrap();

        assert_eq!(result, "gave up");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_tool_recovers_conversationally() {
        let llm_server = MockServer::start().await;
        let github_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_string_contains("unknown tool"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok then")))
            .mount(&llm_server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_response(
                "run_shell",
                serde_json::json!({"command": "rm -rf /"}),
            )))
            .mount(&llm_server)
            .await;

        let (llm, registry) = harness(&llm_server, &github_server).await;
        let sink = EventSink::discard();
        let step_loop = StepLoop::new(&llm, &registry, &sink, 5, 1024);

        let mut ctx = TaskContext::new("main");
        let mut records = Vec::new();
        let result = step_loop
            .run("system", "go".into(), &mut ctx, &mut records)
            .await
            .unwrap();
        assert_eq!(result, "ok then");
    }

    #[tokio::test]
    async fn budget_exhaustion_fails_the_loop() {
        let llm_server = MockServer::start().await;
        let github_server = MockServer::start().await;

        // The model never terminates.
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_response(
                "write_file",
                serde_json::json!({"path": "x.txt", "content": "loop"}),
            )))
            .expect(3)
            .mount(&llm_server)
            .await;

        let (llm, registry) = harness(&llm_server, &github_server).await;
        let sink = EventSink::discard();
        let step_loop = StepLoop::new(&llm, &registry, &sink, 3, 1024);

        let mut ctx = TaskContext::new("main");
        let mut records = Vec::new();
        let err = step_loop
            .run("system", "go".into(), &mut ctx, &mut records)
            .await
            .unwrap_err();

        match err {
            LoopError::BudgetExhausted(turns) => assert_eq!(turns, 3),
            other => panic!("expected BudgetExhausted, got {other:?}"),
        }
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn transport_failure_aborts_the_loop() {
        let llm_server = MockServer::start().await;
        let github_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&llm_server)
            .await;

        let (llm, registry) = harness(&llm_server, &github_server).await;
        let sink = EventSink::discard();
        let step_loop = StepLoop::new(&llm, &registry, &sink, 5, 1024);

        let mut ctx = TaskContext::new("main");
        let mut records = Vec::new();
        let err = step_loop
            .run("system", "go".into(), &mut ctx, &mut records)
            .await
            .unwrap_err();
        assert!(matches!(err, LoopError::Llm(LlmError::ApiError { .. })));
    }
}
