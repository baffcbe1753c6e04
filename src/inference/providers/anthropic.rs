//! Anthropic provider using the Messages API.
//!
//! Differences from the OpenAI adapter:
//! - System prompt travels as a top-level `system` field, not a message
//! - Response content is a list of blocks; every `text` block is kept
//! - There is no model discovery endpoint, so `models()` is a fixed list

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use super::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, HEALTH_CHECK_PROMPT, non_blank, send_json};
use crate::inference::{
    AiProvider, ChatMessage, Completion, CompletionOptions, HealthCheckResult, HealthFailure,
    HealthMetadata, HealthMonitor, ProviderError, RetryPolicy, Role, Termination, TokenUsage,
    VendorError, measure_latency, retry,
};

pub const VENDOR: &str = "Anthropic";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
pub const API_VERSION: &str = "2023-06-01";

pub const KNOWN_MODELS: &[&str] = &[
    "claude-3-haiku-20240307",
    "claude-3-sonnet-20240229",
    "claude-3-opus-20240229",
    "claude-3-5-sonnet-20241022",
];

// ============================================================================
// Messages API Types
// ============================================================================

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Deserialize, Debug)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug)]
struct WireUsage {
    input_tokens: u64,
    output_tokens: u64,
}

// ============================================================================
// Translation Layer
// ============================================================================

/// Splits chat messages into the `system` field and the user/assistant turns.
///
/// The Messages API only accepts user and assistant roles inline, so any
/// system-role messages are folded into `system` after the explicit prompt.
fn split_system<'a>(
    messages: &'a [ChatMessage],
    system_prompt: Option<&str>,
) -> (Option<String>, Vec<WireMessage<'a>>) {
    let mut system_parts: Vec<&str> = system_prompt.into_iter().collect();
    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::System => system_parts.push(&message.content),
            role => turns.push(WireMessage {
                role,
                content: &message.content,
            }),
        }
    }
    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n"))
    };
    (system, turns)
}

/// Joins every text block with newlines. `None` when there is no text.
fn collect_text(content: &[ContentBlock]) -> Option<String> {
    let text = content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Other => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    if text.trim().is_empty() { None } else { Some(text) }
}

// ============================================================================
// Provider Implementation
// ============================================================================

pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    model: String,
    retry_policy: RetryPolicy,
    client: reqwest::Client,
    health: HealthMonitor,
}

impl AnthropicProvider {
    /// Creates a new Anthropic provider. Fails without touching the network
    /// when the key is absent or blank.
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self, ProviderError> {
        let api_key = non_blank(api_key).ok_or_else(|| ProviderError::missing_api_key(VENDOR))?;
        Ok(Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: DEFAULT_MODEL.to_string(),
            retry_policy: RetryPolicy::default(),
            client: reqwest::Client::new(),
            health: HealthMonitor::default(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_health_monitor(mut self, monitor: HealthMonitor) -> Self {
        self.health = monitor;
        self
    }

    async fn create_message(
        &self,
        request: &MessagesRequest<'_>,
    ) -> Result<MessagesResponse, VendorError> {
        send_json(
            VENDOR,
            self.client
                .post(format!("{}/messages", self.base_url))
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(request),
        )
        .await
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &str {
        VENDOR
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn health(&self) -> &HealthMonitor {
        &self.health
    }

    async fn perform_health_check(&self) -> Result<HealthCheckResult, ProviderError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: 10,
            temperature: None,
            system: None,
            messages: vec![WireMessage {
                role: Role::User,
                content: HEALTH_CHECK_PROMPT,
            }],
        };

        let (outcome, latency) = measure_latency(self.create_message(&request)).await;
        Ok(match outcome {
            Ok(response) => HealthCheckResult::success(
                latency,
                HealthMetadata {
                    model: self.model.clone(),
                    tokens_used: Some(response.usage.input_tokens + response.usage.output_tokens),
                    termination: Some(Termination::Anthropic {
                        stop_reason: response.stop_reason,
                    }),
                },
            ),
            Err(err) => HealthCheckResult::failure(
                HealthFailure::from_vendor(VENDOR, &err),
                Some(HealthMetadata::model_only(&self.model)),
            ),
        })
    }

    async fn generate_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let (system, turns) = split_system(messages, options.system_prompt.as_deref());
        let request = MessagesRequest {
            model,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: Some(options.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
            system,
            messages: turns,
        };

        info!(
            "Anthropic messages request: model={}, message_count={}, has_system={}",
            model,
            request.messages.len(),
            request.system.is_some()
        );

        let response = retry(self.retry_policy, || self.create_message(&request))
            .await
            .map_err(|e| ProviderError::classify(VENDOR, e))?;

        let content = collect_text(&response.content)
            .ok_or_else(|| ProviderError::empty_response(VENDOR, "No text content in response"))?;

        Ok(Completion {
            content,
            model: model.to_string(),
            usage: Some(TokenUsage::new(
                response.usage.input_tokens,
                response.usage.output_tokens,
            )),
            termination: Termination::Anthropic {
                stop_reason: response.stop_reason,
            },
        })
    }

    async fn models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(KNOWN_MODELS.iter().map(|m| m.to_string()).collect())
    }
}
