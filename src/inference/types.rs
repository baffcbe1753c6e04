use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

use super::error::{ProviderError, VendorError};

/// Role of a chat message (OpenAI terminology, shared by both vendors).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Per-request knobs. Anything left as `None` falls back to the adapter default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
    /// Registry key of the provider to try before the fallback order.
    pub preferred_provider: Option<String>,
}

impl CompletionOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_preferred_provider(mut self, key: impl Into<String>) -> Self {
        self.preferred_provider = Some(key.into());
        self
    }
}

/// Token counts reported by a vendor for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: input,
            output_tokens: output,
            total_tokens: input + output,
        }
    }
}

/// Why the vendor stopped generating. Each vendor names the field differently,
/// so the variant carries it under the vendor's own key when serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Termination {
    #[serde(rename_all = "camelCase")]
    OpenAi { finish_reason: Option<String> },
    #[serde(rename_all = "camelCase")]
    Anthropic { stop_reason: Option<String> },
}

impl Termination {
    pub fn reason(&self) -> Option<&str> {
        match self {
            Termination::OpenAi { finish_reason } => finish_reason.as_deref(),
            Termination::Anthropic { stop_reason } => stop_reason.as_deref(),
        }
    }
}

/// Uniform result of a single adapter's `generate_completion`.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub termination: Termination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionMetadata {
    pub model: String,
    #[serde(flatten)]
    pub termination: Termination,
}

/// Completion as served by the manager, tagged with the provider that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagedCompletion {
    pub content: String,
    pub provider: String,
    pub usage: Option<TokenUsage>,
    pub metadata: CompletionMetadata,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthFailureKind {
    Auth,
    RateLimit,
    Service,
    Api,
    Transport,
    Configuration,
}

impl HealthFailureKind {
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(401) => HealthFailureKind::Auth,
            Some(429) => HealthFailureKind::RateLimit,
            Some(500 | 502 | 503 | 504) => HealthFailureKind::Service,
            Some(_) => HealthFailureKind::Api,
            None => HealthFailureKind::Transport,
        }
    }
}

/// Why a probe failed, kept structured so callers can branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthFailure {
    pub kind: HealthFailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

impl HealthFailure {
    /// Describes a raw vendor failure as `"<Vendor> API error (<status>): <message>"`
    /// when a status is known, else the bare message.
    pub fn from_vendor(vendor: &str, err: &VendorError) -> Self {
        let message = match err.status {
            Some(status) => format!("{vendor} API error ({status}): {}", err.message),
            None => err.message.clone(),
        };
        Self {
            kind: HealthFailureKind::from_status(err.status),
            status: err.status,
            message,
        }
    }
}

impl From<&ProviderError> for HealthFailure {
    fn from(err: &ProviderError) -> Self {
        let kind = match err {
            ProviderError::Auth { .. } => HealthFailureKind::Auth,
            ProviderError::RateLimit { .. } => HealthFailureKind::RateLimit,
            ProviderError::Service { .. } => HealthFailureKind::Service,
            ProviderError::Api { .. } => HealthFailureKind::Api,
            ProviderError::MissingApiKey { .. } => HealthFailureKind::Configuration,
        };
        Self {
            kind,
            status: err.http_status(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetadata {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(flatten)]
    pub termination: Option<Termination>,
}

impl HealthMetadata {
    pub fn model_only(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            tokens_used: None,
            termination: None,
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Outcome of one health probe. A fresh value is produced on every probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthCheckResult {
    pub success: bool,
    #[serde(serialize_with = "as_millis")]
    pub latency: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HealthFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HealthMetadata>,
}

impl HealthCheckResult {
    pub fn success(latency: Duration, metadata: HealthMetadata) -> Self {
        Self {
            success: true,
            latency,
            error: None,
            metadata: Some(metadata),
        }
    }

    /// Failed probes report zero latency.
    pub fn failure(error: HealthFailure, metadata: Option<HealthMetadata>) -> Self {
        Self {
            success: false,
            latency: Duration::ZERO,
            error: Some(error),
            metadata,
        }
    }
}

/// Externally visible projection of a provider's last probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub healthy: bool,
    /// Milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<u64>,
    pub last_check: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<HealthFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HealthMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedHealth {
    pub healthy: bool,
    pub total_providers: usize,
    pub healthy_providers: usize,
    /// Keyed by registry key, in fallback order.
    pub statuses: IndexMap<String, ProviderStatus>,
}

impl AggregatedHealth {
    pub fn unhealthy_providers(&self) -> usize {
        self.total_providers - self.healthy_providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            "\"assistant\""
        );
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_termination_serializes_under_vendor_key() {
        let openai = CompletionMetadata {
            model: "gpt-4o-mini".to_string(),
            termination: Termination::OpenAi {
                finish_reason: Some("stop".to_string()),
            },
        };
        let json = serde_json::to_value(&openai).unwrap();
        assert_eq!(json["finishReason"], "stop");
        assert_eq!(json["model"], "gpt-4o-mini");
        assert!(json.get("stopReason").is_none());

        let anthropic = CompletionMetadata {
            model: "claude-3-haiku-20240307".to_string(),
            termination: Termination::Anthropic {
                stop_reason: Some("end_turn".to_string()),
            },
        };
        let json = serde_json::to_value(&anthropic).unwrap();
        assert_eq!(json["stopReason"], "end_turn");
        assert!(json.get("finishReason").is_none());
    }

    #[test]
    fn test_health_failure_from_vendor_with_status() {
        let failure = HealthFailure::from_vendor("OpenAI", &VendorError::http(401, "bad key"));
        assert_eq!(failure.kind, HealthFailureKind::Auth);
        assert_eq!(failure.status, Some(401));
        assert_eq!(failure.message, "OpenAI API error (401): bad key");
    }

    #[test]
    fn test_health_failure_from_vendor_without_status() {
        let failure =
            HealthFailure::from_vendor("Anthropic", &VendorError::transport("connection refused"));
        assert_eq!(failure.kind, HealthFailureKind::Transport);
        assert_eq!(failure.status, None);
        assert_eq!(failure.message, "connection refused");
    }

    #[test]
    fn test_failure_result_has_zero_latency() {
        let result = HealthCheckResult::failure(
            HealthFailure::from_vendor("OpenAI", &VendorError::http(503, "overloaded")),
            None,
        );
        assert!(!result.success);
        assert_eq!(result.latency, Duration::ZERO);
        assert_eq!(result.error.unwrap().kind, HealthFailureKind::Service);
    }

    #[test]
    fn test_health_result_serializes_latency_in_millis() {
        let result = HealthCheckResult::success(
            Duration::from_millis(250),
            HealthMetadata {
                model: "gpt-4o-mini".to_string(),
                tokens_used: Some(7),
                termination: Some(Termination::OpenAi {
                    finish_reason: Some("stop".to_string()),
                }),
            },
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["latency"], 250);
        assert_eq!(json["metadata"]["tokensUsed"], 7);
        assert_eq!(json["metadata"]["finishReason"], "stop");
        assert!(json.get("error").is_none());
    }
}
