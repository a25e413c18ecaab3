//! Parse the planning completion into a structured `Plan`.
//!
//! Expects a `Summary:` line followed by a numbered list:
//! ```text
//! Summary: add a health endpoint
//! 1. **Step**: find the router setup
//!    **Type**: search
//!    **Files**: src/routes.rs
//! 2. ...
//! ```
//! Models drift from the format, so every field is optional except the
//! numbered step lines themselves; an unparseable plan degrades to a
//! single analyze step rather than failing the task.

use crate::task::{Plan, PlanStep, StepKind};

/// Parse a model-produced plan. Never fails: an empty or free-form response
/// yields a one-step fallback plan.
pub fn parse_plan(description: &str, text: &str) -> Plan {
    let mut summary = String::new();
    let mut steps: Vec<PlanStep> = Vec::new();
    let mut estimated_files: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("Summary:") {
            if summary.is_empty() {
                summary = rest.trim().to_string();
            }
            continue;
        }

        if let Some(title) = try_parse_step_start(trimmed) {
            steps.push(PlanStep {
                kind: StepKind::Analyze,
                description: title,
            });
            continue;
        }

        if let Some(last) = steps.last_mut() {
            if let Some(value) = try_extract_field(trimmed, "Type") {
                last.kind = parse_kind(&value);
            } else if let Some(value) = try_extract_field(trimmed, "Files") {
                for file in value.split(',') {
                    let file = file.trim();
                    if !file.is_empty() && !estimated_files.iter().any(|f| f == file) {
                        estimated_files.push(file.to_string());
                    }
                }
            }
        }
    }

    if steps.is_empty() {
        steps.push(PlanStep {
            kind: StepKind::Analyze,
            description: description.to_string(),
        });
    }
    if summary.is_empty() {
        summary = description.to_string();
    }

    Plan {
        summary,
        steps,
        estimated_files,
    }
}

fn parse_kind(value: &str) -> StepKind {
    match value.trim().to_ascii_lowercase().as_str() {
        "read" => StepKind::Read,
        "write" => StepKind::Write,
        "delete" => StepKind::Delete,
        "search" => StepKind::Search,
        _ => StepKind::Analyze,
    }
}

/// Try to parse a numbered step start like "1. Do the thing" or
/// "1. **Step**: Do the thing".
fn try_parse_step_start(line: &str) -> Option<String> {
    let mut chars = line.chars();
    if !chars.next()?.is_ascii_digit() {
        return None;
    }
    let rest: String = chars.collect();
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());

    let after_dot = rest.strip_prefix(". ")?;
    let title = after_dot
        .trim_start_matches("**")
        .trim_start_matches("Step")
        .trim_start_matches("**")
        .trim_start_matches(':')
        .trim();

    if title.is_empty() {
        Some(after_dot.trim().to_string())
    } else {
        Some(title.to_string())
    }
}

/// Try to extract a field like "**Type**: write" or "- Type: write".
fn try_extract_field(line: &str, field: &str) -> Option<String> {
    let bold = format!("**{field}**:");
    if let Some(idx) = line.find(&bold) {
        return Some(line[idx + bold.len()..].trim().to_string());
    }
    let dashed = format!("- {field}:");
    if let Some(idx) = line.find(&dashed) {
        return Some(line[idx + dashed.len()..].trim().to_string());
    }
    let plain = format!("{field}:");
    if let Some(rest) = line.strip_prefix(&plain) {
        return Some(rest.trim().to_string());
    }
    None
}
