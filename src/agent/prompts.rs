//! Prompt templates for the agent.
//!
//! One system prompt for every stage, one planning prompt, and a builder
//! per pipeline stage. Stage builders receive the original request and the
//! previous stage's result text (absent for the first stage).

/// System prompt for every step loop.
pub const AGENT_SYSTEM_PROMPT: &str = "\
You are a coding agent working on a remote repository. You cannot run code; \
you read, search, and edit files through the tools provided. File edits are \
staged and committed together when the task finishes.

Rules:
1. Read before you write. Always look at existing code before modifying it.
2. Make the smallest change that solves the problem.
3. Write complete file contents — write_file replaces the whole file.
4. If a tool call fails, analyze the error and try a different approach.
5. When your part is done, call finish_task with a clear summary.";

/// Planning prompt — asks for a structured, parseable plan.
pub const PLANNING_PROMPT: &str = "\
Before any changes are made, produce a plan for the task below.

Respond with a line starting with 'Summary:' followed by a numbered list of
steps. Each step may carry two indented fields:
- **Type**: one of analyze, read, write, delete, search
- **Files**: comma-separated file paths the step will touch

Do NOT start executing. Just produce the plan.";

/// Build the planning request for a task description.
pub fn planning_request(description: &str) -> String {
    format!("{PLANNING_PROMPT}\n\nTask: {description}")
}

fn with_previous(instructions: &str, request: &str, previous: Option<&str>) -> String {
    match previous {
        Some(prev) => {
            format!("{instructions}\n\nTask: {request}\n\nResult of the previous stage:\n{prev}")
        }
        None => format!("{instructions}\n\nTask: {request}"),
    }
}

/// Stage 1 of both shapes: understand the codebase and the task.
pub fn analyze(request: &str, previous: Option<&str>) -> String {
    with_previous(
        "Analyze the repository as it relates to the task. Explore the \
         structure, read the relevant files, and finish with a summary of \
         what needs to change and where. Do not edit anything yet.",
        request,
        previous,
    )
}

/// Design stage (5-stage shape): decide the approach.
pub fn design(request: &str, previous: Option<&str>) -> String {
    with_previous(
        "Based on the analysis, decide the implementation approach. Weigh \
         alternatives where they exist and finish with the chosen design, \
         listing the files to create, modify, or delete. Do not edit \
         anything yet.",
        request,
        previous,
    )
}

/// Plan stage (5-stage shape): order the work.
pub fn plan(request: &str, previous: Option<&str>) -> String {
    with_previous(
        "Turn the design into an ordered list of concrete edits, one per \
         file, each with a one-line rationale. Do not edit anything yet.",
        request,
        previous,
    )
}

/// Implementation stage: make the edits.
pub fn implement(request: &str, previous: Option<&str>) -> String {
    with_previous(
        "Implement the task now. Use write_file and delete_file to stage the \
         changes the previous stage laid out, reading any file before you \
         rewrite it. Finish with a summary of every change you staged.",
        request,
        previous,
    )
}

/// Review stage (3-stage shape): check and fix the staged changes.
pub fn review(request: &str, previous: Option<&str>) -> String {
    with_previous(
        "Review the staged changes against the task. Re-read the modified \
         files, look for mistakes, broken references, or missed cases, and \
         stage fixes for anything wrong. Finish with a verdict on whether \
         the changes are ready.",
        request,
        previous,
    )
}

/// Test-and-review stage (5-stage shape).
pub fn test_review(request: &str, previous: Option<&str>) -> String {
    with_previous(
        "Check the staged changes for correctness. Verify each edit against \
         the files it touches, confirm nothing references removed code, and \
         add or adjust tests where the repository has a test convention. \
         Stage fixes for any problem found, then finish with a verdict.",
        request,
        previous,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_mentions_staging() {
        assert!(AGENT_SYSTEM_PROMPT.contains("staged"));
        assert!(AGENT_SYSTEM_PROMPT.contains("finish_task"));
    }

    #[test]
    fn first_stage_has_no_previous_section() {
        let prompt = analyze("add a health endpoint", None);
        assert!(prompt.contains("Task: add a health endpoint"));
        assert!(!prompt.contains("previous stage"));
    }

    #[test]
    fn later_stage_threads_previous_result() {
        let prompt = implement("add a health endpoint", Some("edit src/routes.rs"));
        assert!(prompt.contains("previous stage"));
        assert!(prompt.contains("edit src/routes.rs"));
    }

    #[test]
    fn planning_request_includes_task() {
        let prompt = planning_request("rename the config module");
        assert!(prompt.contains("Summary:"));
        assert!(prompt.contains("rename the config module"));
    }
}
