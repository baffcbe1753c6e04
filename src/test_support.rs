//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::inference::{
    AiProvider, ChatMessage, Completion, CompletionOptions, HealthCheckResult, HealthFailure,
    HealthMetadata, HealthMonitor, ProviderError, Termination, TokenUsage, VendorError,
};

/// What a scripted provider does when asked for a completion.
#[derive(Debug, Clone)]
pub enum Generation {
    Reply(String),
    /// Vendor answers with an HTTP error of this status.
    Fail(u16),
}

/// A provider with no network behind it. Health and generation are scripted.
pub struct ScriptedProvider {
    name: String,
    healthy: AtomicBool,
    probe_errors: AtomicBool,
    recover_after: Option<usize>,
    generation: Generation,
    probes: AtomicUsize,
    generations: AtomicUsize,
    health: HealthMonitor,
}

impl ScriptedProvider {
    pub fn new(name: &str, healthy: bool, generation: Generation) -> Self {
        Self {
            name: name.to_string(),
            healthy: AtomicBool::new(healthy),
            probe_errors: AtomicBool::new(false),
            recover_after: None,
            generation,
            probes: AtomicUsize::new(0),
            generations: AtomicUsize::new(0),
            health: HealthMonitor::default(),
        }
    }

    pub fn healthy(name: &str, generation: Generation) -> Self {
        Self::new(name, true, generation)
    }

    pub fn unhealthy(name: &str) -> Self {
        Self::new(name, false, Generation::Fail(503))
    }

    /// `perform_health_check` itself returns an error instead of a result.
    pub fn erroring(name: &str) -> Self {
        Self {
            probe_errors: AtomicBool::new(true),
            ..Self::new(name, false, Generation::Fail(401))
        }
    }

    /// Turns healthy once this many health checks have failed.
    pub fn with_recovery_after(mut self, failed_probes: usize) -> Self {
        self.recover_after = Some(failed_probes);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Makes `perform_health_check` return an error instead of a result.
    pub fn set_probe_errors(&self, errors: bool) {
        self.probe_errors.store(errors, Ordering::SeqCst);
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn generation_count(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    fn health(&self) -> &HealthMonitor {
        &self.health
    }

    async fn perform_health_check(&self) -> Result<HealthCheckResult, ProviderError> {
        let check = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.recover_after.is_some_and(|failed| check > failed) {
            self.healthy.store(true, Ordering::SeqCst);
        }
        if self.probe_errors.load(Ordering::SeqCst) {
            return Err(ProviderError::classify(
                &self.name,
                VendorError::http(401, "scripted probe error"),
            ));
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(HealthCheckResult::success(
                Duration::from_millis(5),
                HealthMetadata::model_only("scripted-model"),
            ))
        } else {
            Ok(HealthCheckResult::failure(
                HealthFailure::from_vendor(&self.name, &VendorError::http(503, "scripted outage")),
                Some(HealthMetadata::model_only("scripted-model")),
            ))
        }
    }

    async fn generate_completion(
        &self,
        _messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        self.generations.fetch_add(1, Ordering::SeqCst);
        match &self.generation {
            Generation::Reply(text) => Ok(Completion {
                content: text.clone(),
                model: options
                    .model
                    .clone()
                    .unwrap_or_else(|| self.default_model().to_string()),
                usage: Some(TokenUsage::new(3, 4)),
                termination: Termination::OpenAi {
                    finish_reason: Some("stop".to_string()),
                },
            }),
            Generation::Fail(status) => Err(ProviderError::classify(
                &self.name,
                VendorError::http(*status, "scripted failure"),
            )),
        }
    }

    async fn models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec![self.default_model().to_string()])
    }
}
