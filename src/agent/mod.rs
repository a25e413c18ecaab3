//! Agent core — the one part that thinks.
//!
//! ## Architecture
//!
//! - `prompts`: system prompt and per-stage prompt templates
//! - `plan`: parse the planning completion into a structured `Plan`
//! - `runner`: `StepLoop` — the bounded think-act-observe loop

pub mod plan;
pub mod prompts;
pub mod runner;

pub use runner::{LoopError, StepLoop, FINISH_TOOL};
