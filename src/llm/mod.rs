//! LLM Pool — model routing and connection management for the Anthropic API.
//!
//! Wraps AnthropicClient with model aliasing and default model selection.
//! This is the single request/response contract the agent loop consumes;
//! no other part of the crate knows the provider wire format.

pub mod client;
pub mod types;

use std::time::Duration;

use client::{AnthropicClient, LlmError};
use types::{resolve_model, Message, MessagesRequest, MessagesResponse, ToolDefinition};

/// LLM connection pool with model routing.
#[derive(Debug)]
pub struct LlmPool {
    client: AnthropicClient,
    default_model: String,
}

impl LlmPool {
    /// Create a pool with an explicit API key and default model.
    pub fn new(api_key: String, default_model: &str, timeout: Duration) -> Self {
        Self {
            client: AnthropicClient::new(api_key, timeout),
            default_model: resolve_model(default_model).to_string(),
        }
    }

    /// Create a pool with a custom base URL (for testing).
    pub fn with_base_url(
        api_key: String,
        default_model: &str,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            client: AnthropicClient::with_base_url(api_key, base_url, timeout),
            default_model: resolve_model(default_model).to_string(),
        }
    }

    /// Send a plain completion request (no tools).
    pub async fn complete(
        &self,
        model: Option<&str>,
        messages: Vec<Message>,
        max_tokens: u32,
        system: Option<&str>,
    ) -> Result<MessagesResponse, LlmError> {
        self.complete_with_tools(model, messages, max_tokens, system, Vec::new())
            .await
    }

    /// Send a completion request with tool definitions.
    ///
    /// - `model`: None means use the default model, Some resolves aliases.
    /// - `messages`: conversation history, oldest first.
    pub async fn complete_with_tools(
        &self,
        model: Option<&str>,
        messages: Vec<Message>,
        max_tokens: u32,
        system: Option<&str>,
        tools: Vec<ToolDefinition>,
    ) -> Result<MessagesResponse, LlmError> {
        let resolved_model = model
            .map(|m| resolve_model(m).to_string())
            .unwrap_or_else(|| self.default_model.clone());

        let request = MessagesRequest {
            model: resolved_model,
            max_tokens,
            messages,
            system: system.map(|s| s.to_string()),
            temperature: None,
            tools: if tools.is_empty() { None } else { Some(tools) },
        };

        self.client.messages(&request).await
    }

    /// Get the default model (resolved to full ID).
    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}
