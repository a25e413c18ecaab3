//! Worker — runs a pipeline off the caller's control path.
//!
//! The event channel is the only thing that crosses the boundary; no
//! mutable state is shared with the host. The stream always ends in exactly
//! one `Complete` or `Error` event, so consumers never have to infer
//! completion from silence.

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;

use crate::config::AgentConfig;
use crate::events::{AgentEvent, EventSink};
use crate::pipeline::{Pipeline, PipelineError, PipelineReport, PipelineShape};
use crate::task::Task;

/// Handle to a spawned pipeline run.
pub struct TaskHandle {
    /// Event stream, terminated by `Complete` or `Error`.
    pub events: UnboundedReceiver<AgentEvent>,
    /// Joins to the report (or the error that ended the run).
    pub join: JoinHandle<Result<PipelineReport, PipelineError>>,
}

/// Spawn `task` through a pipeline of the given shape on a worker task.
pub fn spawn(config: AgentConfig, mut task: Task, shape: PipelineShape) -> TaskHandle {
    let (tx, events) = mpsc::unbounded_channel();

    let join = tokio::spawn(async move {
        let sink = EventSink::new(tx);
        let pipeline = Pipeline::new(config, sink.clone());
        let stages = shape.stages();

        let result = pipeline.run(&mut task, &stages).await;
        match &result {
            Ok(report) => {
                sink.emit(AgentEvent::Complete {
                    success: true,
                    message: report.summary.clone(),
                });
            }
            Err(e) => {
                sink.emit(AgentEvent::Error {
                    message: e.to_string(),
                });
            }
        }
        result
        // sink (and with it the channel sender) drops here, closing the stream
    });

    TaskHandle { events, join }
}
