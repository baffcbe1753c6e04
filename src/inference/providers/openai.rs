//! OpenAI provider using the Chat Completions API.
//!
//! - Health probe: a 5-token `chat/completions` call at temperature 0
//! - Completions: optional system prompt is prepended as a `system` message
//! - Models: `GET /models`, filtered to GPT ids
//! - Embeddings: `POST /embeddings`

use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use super::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, HEALTH_CHECK_PROMPT, non_blank, send_json};
use crate::inference::{
    AiProvider, ChatMessage, Completion, CompletionOptions, HealthCheckResult, HealthFailure,
    HealthMetadata, HealthMonitor, ProviderError, RetryPolicy, Role, Termination, TokenUsage,
    VendorError, measure_latency, retry,
};

pub const VENDOR: &str = "OpenAI";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

// ============================================================================
// Chat Completions API Types
// ============================================================================

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Serialize, Debug)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Deserialize, Debug)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize, Debug)]
struct ModelEntry {
    id: String,
}

#[derive(Serialize, Debug)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: EmbeddingUsage,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub usage: EmbeddingUsage,
}

// ============================================================================
// Translation Layer
// ============================================================================

/// Builds the message array, putting the system prompt (if any) first.
fn to_wire_messages<'a>(
    messages: &'a [ChatMessage],
    system_prompt: Option<&'a str>,
) -> Vec<WireMessage<'a>> {
    system_prompt
        .map(|content| WireMessage {
            role: Role::System,
            content,
        })
        .into_iter()
        .chain(messages.iter().map(|m| WireMessage {
            role: m.role,
            content: &m.content,
        }))
        .collect()
}

/// `choices[0].message.content`, if present and not blank.
fn first_choice_text(response: &ChatCompletionResponse) -> Option<&str> {
    response
        .choices
        .first()
        .and_then(|choice| choice.message.as_ref())
        .and_then(|message| message.content.as_deref())
        .filter(|content| !content.trim().is_empty())
}

// ============================================================================
// Provider Implementation
// ============================================================================

pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    retry_policy: RetryPolicy,
    client: reqwest::Client,
    health: HealthMonitor,
}

impl OpenAiProvider {
    /// Creates a new OpenAI provider. Fails without touching the network when
    /// the key is absent or blank.
    ///
    /// # Arguments
    /// * `api_key` - OpenAI API key
    /// * `base_url` - Optional custom base URL (defaults to OpenAI's API)
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

    async fn chat(
        &self,
        request: &ChatCompletionRequest<'_>,
    ) -> Result<ChatCompletionResponse, VendorError> {
        send_json(
            VENDOR,
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(&self.api_key)
                .json(request),
        )
        .await
    }

    /// Embeds each input text. Retried like completions.
    pub async fn generate_embeddings(
        &self,
        texts: &[String],
        model: Option<&str>,
    ) -> Result<Embeddings, ProviderError> {
        let request = EmbeddingRequest {
            model: model.unwrap_or(DEFAULT_EMBEDDING_MODEL),
            input: texts,
        };
        info!(
            "OpenAI embeddings request: model={}, input_count={}",
            request.model,
            texts.len()
        );

        let response: EmbeddingResponse = retry(self.retry_policy, || {
            send_json(
                VENDOR,
                self.client
                    .post(format!("{}/embeddings", self.base_url))
                    .bearer_auth(&self.api_key)
                    .json(&request),
            )
        })
        .await
        .map_err(|e| ProviderError::classify(VENDOR, e))?;

        Ok(Embeddings {
            vectors: response.data.into_iter().map(|d| d.embedding).collect(),
            usage: response.usage,
        })
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
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
        let probe = [ChatMessage::user(HEALTH_CHECK_PROMPT)];
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: to_wire_messages(&probe, None),
            max_tokens: 5,
            temperature: 0.0,
        };

        let (outcome, latency) = measure_latency(self.chat(&request)).await;
        Ok(match outcome {
            Ok(response) => HealthCheckResult::success(
                latency,
                HealthMetadata {
                    model: self.model.clone(),
                    tokens_used: Some(response.usage.as_ref().map_or(0, |u| u.total_tokens)),
                    termination: Some(Termination::OpenAi {
                        finish_reason: response
                            .choices
                            .first()
                            .and_then(|c| c.finish_reason.clone()),
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
        let request = ChatCompletionRequest {
            model,
            messages: to_wire_messages(messages, options.system_prompt.as_deref()),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        };

        info!(
            "OpenAI chat completion request: model={}, message_count={}",
            model,
            request.messages.len()
        );

        let response = retry(self.retry_policy, || self.chat(&request))
            .await
            .map_err(|e| ProviderError::classify(VENDOR, e))?;

        let content = first_choice_text(&response)
            .ok_or_else(|| ProviderError::empty_response(VENDOR, "No content in response"))?
            .to_string();

        Ok(Completion {
            content,
            model: model.to_string(),
            termination: Termination::OpenAi {
                finish_reason: response
                    .choices
                    .first()
                    .and_then(|c| c.finish_reason.clone()),
            },
            usage: response.usage.map(TokenUsage::from),
        })
    }

    async fn models(&self) -> Result<Vec<String>, ProviderError> {
        let list: ModelList = send_json(
            VENDOR,
            self.client
                .get(format!("{}/models", self.base_url))
                .bearer_auth(&self.api_key),
        )
        .await
        .map_err(|e| ProviderError::classify(VENDOR, e))?;

        let mut ids: Vec<String> = list
            .data
            .into_iter()
            .map(|m| m.id)
            .filter(|id| id.contains("gpt"))
            .collect();
        ids.sort();
        Ok(ids)
    }
}
