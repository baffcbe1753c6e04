//! # Provider Manager
//!
//! Owns the adapter registry and serves completions with provider fallback.
//!
//! ```text
//! generate_completion(messages, options)
//!        │
//!        ▼
//! get_healthy_provider(preferred)
//!   1. preferred registered and healthy?  ──► use it
//!   2. walk fallback order, first healthy ──► use it
//!   3. nobody healthy                     ──► NoHealthyProvider
//!        │
//!        ▼
//! provider.generate_completion(...)   (errors propagate as-is,
//!                                      no retry on the next provider)
//! ```
//!
//! The registry is built once and never changes, so it is shared freely
//! behind an `Arc<ProviderManager>`. Per-provider health caches live inside
//! each adapter.

use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use log::{debug, info, warn};

use crate::core::config::ProviderSettings;
use crate::inference::{
    AggregatedHealth, AiProvider, AnthropicProvider, ChatMessage, CompletionMetadata,
    CompletionOptions, HealthMonitor, ManagedCompletion, ManagerError, OpenAiProvider,
    ProviderStatus,
};

pub const OPENAI_KEY: &str = "openai";
pub const ANTHROPIC_KEY: &str = "anthropic";

pub struct ProviderManager {
    /// Registry key → provider, in fallback order.
    providers: IndexMap<String, Arc<dyn AiProvider>>,
}

impl ProviderManager {
    /// Builds a manager from an explicit preference list (earlier = tried first).
    ///
    /// Fails if the list is empty or a key appears twice.
    pub fn new(ordered: Vec<(String, Arc<dyn AiProvider>)>) -> Result<Self, ManagerError> {
        let mut providers = IndexMap::with_capacity(ordered.len());
        for (key, provider) in ordered {
            if providers.contains_key(&key) {
                return Err(ManagerError::DuplicateProvider(key));
            }
            providers.insert(key, provider);
        }

        if providers.is_empty() {
            return Err(ManagerError::NoProvidersInitialized);
        }

        info!(
            "Initialized {} AI provider(s): {}",
            providers.len(),
            providers.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(Self { providers })
    }

    /// Builds every vendor that has settings, OpenAI before Anthropic.
    ///
    /// A vendor that fails to construct is logged and left out; only an empty
    /// registry is fatal.
    pub fn from_config(settings: &ProviderSettings) -> Result<Self, ManagerError> {
        let mut ordered: Vec<(String, Arc<dyn AiProvider>)> = Vec::new();

        if let Some(vendor) = &settings.openai {
            match OpenAiProvider::new(Some(vendor.api_key.clone()), Some(vendor.base_url.clone())) {
                Ok(provider) => ordered.push((
                    OPENAI_KEY.to_string(),
                    Arc::new(
                        provider
                            .with_model(&vendor.model)
                            .with_retry_policy(settings.retry)
                            .with_health_monitor(HealthMonitor::new(settings.health_check_interval)),
                    ),
                )),
                Err(e) => warn!("Failed to initialize OpenAI provider: {e}"),
            }
        }

        if let Some(vendor) = &settings.anthropic {
            match AnthropicProvider::new(Some(vendor.api_key.clone()), Some(vendor.base_url.clone()))
            {
                Ok(provider) => ordered.push((
                    ANTHROPIC_KEY.to_string(),
                    Arc::new(
                        provider
                            .with_model(&vendor.model)
                            .with_retry_policy(settings.retry)
                            .with_health_monitor(HealthMonitor::new(settings.health_check_interval)),
                    ),
                )),
                Err(e) => warn!("Failed to initialize Anthropic provider: {e}"),
            }
        }

        Self::new(ordered)
    }

    pub fn get_provider(&self, key: &str) -> Option<Arc<dyn AiProvider>> {
        self.providers.get(key).cloned()
    }

    /// Registry keys in fallback order.
    pub fn get_provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Picks the first provider whose probe passes, trying `preferred` first.
    pub async fn get_healthy_provider(
        &self,
        preferred: Option<&str>,
    ) -> Result<Arc<dyn AiProvider>, ManagerError> {
        let preferred = preferred.filter(|key| self.providers.contains_key(*key));

        if let Some(key) = preferred {
            let provider = &self.providers[key];
            if provider.is_healthy().await {
                debug!("Using preferred provider {key}");
                return Ok(Arc::clone(provider));
            }
            warn!("Preferred provider {key} is unhealthy, falling back");
        }

        // The whole order is walked; a preferred provider that just failed is checked again.
        for (key, provider) in &self.providers {
            if provider.is_healthy().await {
                debug!("Using provider {key} from fallback order");
                return Ok(Arc::clone(provider));
            }
            warn!("Provider {key} is unhealthy, trying next");
        }

        Err(ManagerError::NoHealthyProvider)
    }

    /// Serves a completion from the first healthy provider.
    ///
    /// Fallback only happens through the health probe: if the chosen provider's
    /// completion call fails, that error is returned and no other provider is tried.
    pub async fn generate_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ManagedCompletion, ManagerError> {
        let provider = self
            .get_healthy_provider(options.preferred_provider.as_deref())
            .await?;

        let completion = provider.generate_completion(messages, options).await?;

        Ok(ManagedCompletion {
            content: completion.content,
            provider: provider.name().to_string(),
            usage: completion.usage,
            metadata: CompletionMetadata {
                model: completion.model,
                termination: completion.termination,
            },
        })
    }

    /// Status of every provider, keyed by registry key. Stale caches are
    /// refreshed concurrently.
    pub async fn get_all_statuses(&self) -> IndexMap<String, ProviderStatus> {
        let statuses = join_all(self.providers.values().map(|provider| provider.status())).await;
        self.providers.keys().cloned().zip(statuses).collect()
    }

    pub async fn has_healthy_provider(&self) -> bool {
        self.get_healthy_provider(None).await.is_ok()
    }

    /// Re-probes every provider concurrently, ignoring cache freshness.
    pub async fn perform_health_checks(&self) {
        let results = join_all(self.providers.values().map(|provider| provider.is_healthy())).await;
        for (key, healthy) in self.providers.keys().zip(results) {
            if !healthy {
                warn!("Health check failed for {key}");
            }
        }
    }

    pub async fn get_aggregated_health(&self) -> AggregatedHealth {
        let statuses = self.get_all_statuses().await;
        let healthy_providers = statuses.values().filter(|status| status.healthy).count();

        AggregatedHealth {
            healthy: healthy_providers > 0,
            total_providers: self.providers.len(),
            healthy_providers,
            statuses,
        }
    }
}
