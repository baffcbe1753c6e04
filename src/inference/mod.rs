pub mod error;
pub mod manager;
pub mod provider;
pub mod providers;
pub mod resilience;
pub mod types;

pub use error::{ManagerError, ProviderError, VendorError};
pub use manager::ProviderManager;
pub use provider::{AiProvider, DEFAULT_HEALTH_CHECK_INTERVAL, HealthMonitor};
pub use providers::{AnthropicProvider, OpenAiProvider};
pub use resilience::{RetryPolicy, measure_latency, retry};
pub use types::{
    AggregatedHealth, ChatMessage, Completion, CompletionMetadata, CompletionOptions,
    HealthCheckResult, HealthFailure, HealthFailureKind, HealthMetadata, ManagedCompletion,
    ProviderStatus, Role, Termination, TokenUsage,
};
