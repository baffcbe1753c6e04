use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use parking_lot::Mutex;
use tokio::time::Instant;

use super::error::ProviderError;
use super::types::{
    ChatMessage, Completion, CompletionOptions, HealthCheckResult, HealthFailure, ProviderStatus,
};

/// How long a cached probe result is trusted before `status()` re-probes.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

struct HealthState {
    result: Option<HealthCheckResult>,
    /// Time of the last completed probe, or of construction before any.
    checked_at: DateTime<Utc>,
    checked_instant: Instant,
}

/// Per-provider cache of the most recent probe.
///
/// The lock is only taken for a swap or a read and is never held across an
/// await, so concurrent probes of the same provider simply last-write-win.
pub struct HealthMonitor {
    interval: Duration,
    state: Mutex<HealthState>,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTH_CHECK_INTERVAL)
    }
}

impl HealthMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(HealthState {
                result: None,
                checked_at: Utc::now(),
                checked_instant: Instant::now(),
            }),
        }
    }

    /// Stores the outcome of a completed probe and advances the check time.
    pub fn record(&self, result: HealthCheckResult) {
        let mut state = self.state.lock();
        state.result = Some(result);
        state.checked_at = Utc::now();
        state.checked_instant = Instant::now();
    }

    /// Stores the outcome of a probe that raised an error. The check time
    /// stays where the last completed probe left it.
    pub fn record_error(&self, result: HealthCheckResult) {
        self.state.lock().result = Some(result);
    }

    pub fn last_result(&self) -> Option<HealthCheckResult> {
        self.state.lock().result.clone()
    }

    /// True when a result exists and the check time is no older than the interval.
    pub fn is_fresh(&self) -> bool {
        let state = self.state.lock();
        state.result.is_some() && state.checked_instant.elapsed() <= self.interval
    }

    /// Builds the status projection from whatever is cached right now.
    pub fn project(&self, name: &str) -> ProviderStatus {
        let state = self.state.lock();
        match state.result.as_ref() {
            Some(result) => ProviderStatus {
                name: name.to_string(),
                healthy: result.success,
                latency: Some(result.latency.as_millis() as u64),
                last_check: state.checked_at,
                error: result.error.clone(),
                metadata: result.metadata.clone(),
            },
            None => ProviderStatus {
                name: name.to_string(),
                healthy: false,
                latency: None,
                last_check: state.checked_at,
                error: None,
                metadata: None,
            },
        }
    }
}

/// Contract every vendor adapter implements.
///
/// Adapters supply the vendor calls; health caching (`is_healthy`, `status`)
/// comes for free through the provided methods and the adapter's [`HealthMonitor`].
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Display name, e.g. "OpenAI".
    fn name(&self) -> &str;

    /// Model used when a request does not name one.
    fn default_model(&self) -> &str;

    fn health(&self) -> &HealthMonitor;

    /// One lightweight vendor call to assess availability and latency.
    async fn perform_health_check(&self) -> Result<HealthCheckResult, ProviderError>;

    async fn generate_completion(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError>;

    async fn models(&self) -> Result<Vec<String>, ProviderError>;

    /// Probes the vendor and caches the outcome. Never fails: errors are
    /// recorded as an unhealthy result.
    async fn is_healthy(&self) -> bool {
        match self.perform_health_check().await {
            Ok(result) => {
                let healthy = result.success;
                debug!(
                    "Health check for {}: healthy={} latency={}ms",
                    self.name(),
                    healthy,
                    result.latency.as_millis()
                );
                self.health().record(result);
                healthy
            }
            Err(err) => {
                warn!("Health check for {} raised an error: {}", self.name(), err);
                self.health()
                    .record_error(HealthCheckResult::failure(HealthFailure::from(&err), None));
                false
            }
        }
    }

    /// Cached status, re-probing first when the cache is empty or stale.
    async fn status(&self) -> ProviderStatus {
        if !self.health().is_fresh() {
            self.is_healthy().await;
        }
        self.health().project(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::types::HealthMetadata;
    use crate::test_support::{Generation, ScriptedProvider};

    #[test]
    fn test_project_without_result_is_unhealthy() {
        let monitor = HealthMonitor::default();
        let status = monitor.project("OpenAI");
        assert!(!status.healthy);
        assert!(status.latency.is_none());
        assert!(status.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_freshness_expires_after_interval() {
        let monitor = HealthMonitor::new(Duration::from_secs(60));
        assert!(!monitor.is_fresh());

        monitor.record(HealthCheckResult::success(
            Duration::from_millis(20),
            HealthMetadata::model_only("m"),
        ));
        assert!(monitor.is_fresh());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(monitor.is_fresh());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!monitor.is_fresh());
    }

    #[tokio::test]
    async fn test_is_healthy_records_success() {
        let provider = ScriptedProvider::healthy("OpenAI", Generation::Reply("hi".into()));
        assert!(provider.is_healthy().await);

        let result = provider.health().last_result().unwrap();
        assert!(result.success);
        assert_eq!(provider.probe_count(), 1);
    }

    #[tokio::test]
    async fn test_is_healthy_absorbs_probe_errors() {
        let provider = ScriptedProvider::erroring("Anthropic");
        assert!(!provider.is_healthy().await);

        let result = provider.health().last_result().unwrap();
        assert!(!result.success);
        assert_eq!(result.latency, Duration::ZERO);
        let failure = result.error.unwrap();
        assert_eq!(failure.status, Some(401));
        assert_eq!(failure.message, "Authentication failed for Anthropic");
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_error_keeps_last_check_time() {
        let provider = ScriptedProvider::healthy("OpenAI", Generation::Reply("hi".into()));
        let first = provider.status().await;
        assert!(first.healthy);

        tokio::time::advance(Duration::from_secs(50)).await;
        provider.set_probe_errors(true);
        assert!(!provider.is_healthy().await);

        let after_error = provider.status().await;
        assert!(!after_error.healthy);
        assert_eq!(after_error.last_check, first.last_check);
        assert_eq!(provider.probe_count(), 2);

        // 70s since the last completed probe, 20s since the error.
        tokio::time::advance(Duration::from_secs(20)).await;
        provider.set_probe_errors(false);
        let refreshed = provider.status().await;
        assert!(refreshed.healthy);
        assert_eq!(provider.probe_count(), 3);
    }

    #[test]
    fn test_record_error_before_any_check_keeps_construction_time() {
        let monitor = HealthMonitor::default();
        let created = monitor.project("OpenAI").last_check;

        monitor.record_error(HealthCheckResult::failure(
            HealthFailure::from(&ProviderError::missing_api_key("OpenAI")),
            None,
        ));
        let status = monitor.project("OpenAI");
        assert!(!status.healthy);
        assert_eq!(status.last_check, created);
        assert!(status.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_uses_cache_within_interval() {
        let provider = ScriptedProvider::healthy("OpenAI", Generation::Reply("hi".into()));

        let first = provider.status().await;
        assert!(first.healthy);
        assert_eq!(provider.probe_count(), 1);

        // Flip the vendor to unhealthy; the cached result should still be served.
        provider.set_healthy(false);
        tokio::time::advance(Duration::from_secs(30)).await;
        let second = provider.status().await;
        assert!(second.healthy);
        assert_eq!(second.last_check, first.last_check);
        assert_eq!(provider.probe_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reprobes_when_stale() {
        let provider = ScriptedProvider::healthy("OpenAI", Generation::Reply("hi".into()));
        assert!(provider.status().await.healthy);

        provider.set_healthy(false);
        tokio::time::advance(Duration::from_secs(61)).await;

        let status = provider.status().await;
        assert!(!status.healthy);
        assert_eq!(provider.probe_count(), 2);
        assert!(status.error.is_some());
    }

    #[tokio::test]
    async fn test_status_matches_latest_probe() {
        let provider = ScriptedProvider::healthy("OpenAI", Generation::Reply("hi".into()));
        provider.set_healthy(false);
        assert!(!provider.is_healthy().await);
        // A probe just ran, so status must reflect it without another probe.
        assert!(!provider.status().await.healthy);
        assert_eq!(provider.probe_count(), 1);

        provider.set_healthy(true);
        assert!(provider.is_healthy().await);
        assert!(provider.status().await.healthy);
        assert_eq!(provider.probe_count(), 2);
    }
}
