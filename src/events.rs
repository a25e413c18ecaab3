//! Event stream — the only channel through which progress is observable.
//!
//! Events are serde-tagged (`type`/`data`) so a host can forward them
//! straight onto an SSE or websocket channel. The pipeline worker guarantees
//! the stream ends in exactly one `Complete` or `Error`.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::task::{AgentLog, FileOperation, LogLevel, Plan, StepOutcome};

/// Progress event emitted during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AgentEvent {
    Log(AgentLog),
    Plan(Plan),
    StepStart { step_id: Uuid },
    StepComplete { step_id: Uuid, result: StepOutcome },
    StepError { step_id: Uuid, error: String },
    FileChange(FileOperation),
    PrCreated { url: String, number: u64 },
    Complete { success: bool, message: String },
    Error { message: String },
}

/// Sending half of the event channel, threaded through the pipeline.
///
/// A closed or absent receiver is not an error: emission is fire-and-forget
/// so a host that stops listening never stalls the pipeline.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<UnboundedSender<AgentEvent>>,
}

impl EventSink {
    pub fn new(tx: UnboundedSender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything, for direct library use and tests.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    /// Emit a `Log` event.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(AgentEvent::Log(AgentLog::new(level, message)));
    }
}
