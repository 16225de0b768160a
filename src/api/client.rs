//! The bound provider client.
//!
//! A [`ProviderClient`] is constructed from one [`SessionConfig`] snapshot
//! and never changes afterwards; the session service replaces the whole
//! client when a binding-relevant config field changes.

use async_trait::async_trait;
use tracing::debug;

use crate::api::{
    AnthropicRequest, AnthropicResponse, ChatMessage, ChatRequest, ChatResponse,
};
use crate::core::config::SessionConfig;
use crate::core::message::Message;
use crate::core::providers::{find_builtin_provider, resolve_credential};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Failure talking to a model provider. Wraps transport, auth, and
/// validation failures alike; provider-specific error shapes never reach
/// callers.
#[derive(Debug)]
pub struct ProviderError {
    provider: String,
    message: String,
}

impl ProviderError {
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.message)
    }
}

impl std::error::Error for ProviderError {}

/// The capability the session service depends on: send an ordered
/// conversation, get back one completion. The system prompt travels with
/// the call because it is not part of the network binding.
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(
        &self,
        conversation: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<String, ProviderError>;
}

/// Wire dialect of a bound provider. A closed set: adding a provider mode
/// means adding a variant and its request builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderMode {
    OpenAi,
    Anthropic,
}

#[derive(Debug)]
pub struct ProviderClient {
    http: reqwest::Client,
    mode: ProviderMode,
    provider_id: String,
    provider_name: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl ProviderClient {
    /// Bind a client to a config snapshot. Resolves the credential once
    /// (explicit value, then the provider's environment variable) and
    /// fails without touching the network when it is missing.
    pub fn bind(config: &SessionConfig) -> Result<Self, ProviderError> {
        let provider = find_builtin_provider(&config.provider).ok_or_else(|| {
            ProviderError::new(
                config.provider.clone(),
                format!("unknown provider '{}'", config.provider),
            )
        })?;

        let api_key = resolve_credential(&provider, config.api_key.as_deref())
            .map_err(|e| ProviderError::new(provider.display_name.clone(), e.to_string()))?;

        let mode = if provider.is_anthropic_mode() {
            ProviderMode::Anthropic
        } else {
            ProviderMode::OpenAi
        };

        Ok(Self {
            http: reqwest::Client::new(),
            mode,
            provider_id: provider.id.clone(),
            provider_name: provider.display_name.clone(),
            base_url: provider.base_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn error(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::new(self.provider_name.clone(), message)
    }

    async fn complete_openai(&self, messages: Vec<ChatMessage>) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let response = self
            .http
            .post(endpoint_url(&self.base_url, "chat/completions"))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.error(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(summarize_error_body(&body)));
        }

        let response: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("invalid response body: {e}")))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| self.error("response contained no completion"))
    }

    async fn complete_anthropic(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<String, ProviderError> {
        let (system, turns) = split_system_messages(messages);
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            system,
            messages: turns,
        };

        let response = self
            .http
            .post(endpoint_url(&self.base_url, "messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.error(e.to_string()))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.error(summarize_error_body(&body)));
        }

        let response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| self.error(format!("invalid response body: {e}")))?;

        let text: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect();

        if text.is_empty() {
            Err(self.error("response contained no completion"))
        } else {
            Ok(text)
        }
    }
}

#[async_trait]
impl CompletionApi for ProviderClient {
    async fn complete(
        &self,
        conversation: &[Message],
        system_prompt: Option<&str>,
    ) -> Result<String, ProviderError> {
        let messages = to_wire(&effective_messages(conversation, system_prompt));
        debug!(
            provider = %self.provider_id,
            model = %self.model,
            messages = messages.len(),
            "requesting completion"
        );

        match self.mode {
            ProviderMode::OpenAi => self.complete_openai(messages).await,
            ProviderMode::Anthropic => self.complete_anthropic(messages).await,
        }
    }
}

/// The message sequence actually sent to the provider: when a system
/// prompt is configured and the conversation carries no system message, a
/// synthetic one is prepended for this call only. The caller's
/// conversation is never touched.
pub fn effective_messages(conversation: &[Message], system_prompt: Option<&str>) -> Vec<Message> {
    if let Some(prompt) = system_prompt {
        if !conversation.iter().any(Message::is_system) {
            let mut messages = Vec::with_capacity(conversation.len() + 1);
            messages.push(Message::system(prompt));
            messages.extend_from_slice(conversation);
            return messages;
        }
    }
    conversation.to_vec()
}

fn to_wire(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect()
}

/// Anthropic-style APIs take the system prompt as a top-level field, not
/// as a message. Multiple system entries are joined with blank lines.
fn split_system_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<ChatMessage>) {
    let (system, turns): (Vec<ChatMessage>, Vec<ChatMessage>) =
        messages.into_iter().partition(|m| m.role == "system");

    let system = if system.is_empty() {
        None
    } else {
        Some(
            system
                .into_iter()
                .map(|m| m.content)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    };

    (system, turns)
}

fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Pull a human-readable summary out of a provider error body. Providers
/// disagree about the shape, so probe the common spots before falling
/// back to the collapsed raw text.
fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<no body>".to_string();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let summary = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .or_else(|| {
                value.get("error").and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.to_string()),
                    _ => None,
                })
            })
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str().map(str::to_owned))
            });

        if let Some(summary) = summary {
            let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");
            if !collapsed.is_empty() {
                return collapsed;
            }
        }
    }

    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}
