//! JSON bodies served by the health routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::Environment;
use crate::inference::{AggregatedHealth, ProviderStatus, TokenUsage};

pub const DEFAULT_TEST_MESSAGE: &str = "Hello, this is a test. Please respond with OK.";

// ============================================================================
// GET /health
// ============================================================================

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` when at least one provider is healthy, otherwise `"degraded"`.
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    /// Seconds since the server started.
    pub uptime: f64,
    pub environment: Environment,
    pub providers: ProviderCounts,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCounts {
    pub healthy: bool,
    pub total: usize,
    pub healthy_count: usize,
    pub unhealthy_count: usize,
}

impl From<&AggregatedHealth> for ProviderCounts {
    fn from(health: &AggregatedHealth) -> Self {
        Self {
            healthy: health.healthy,
            total: health.total_providers,
            healthy_count: health.healthy_providers,
            unhealthy_count: health.unhealthy_providers(),
        }
    }
}

// ============================================================================
// GET /health/detailed
// ============================================================================

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    /// `"healthy"` or `"unhealthy"`.
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub system: SystemInfo,
    pub providers: ProviderDetails,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub uptime: f64,
    pub platform: &'static str,
    pub arch: &'static str,
    pub environment: Environment,
}

impl SystemInfo {
    pub fn current(uptime: f64, environment: Environment) -> Self {
        Self {
            uptime,
            platform: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            environment,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ProviderDetails {
    pub summary: ProviderSummary,
    pub details: Vec<ProviderStatus>,
}

#[derive(Serialize, Debug)]
pub struct ProviderSummary {
    pub total: usize,
    pub healthy: usize,
    pub unhealthy: usize,
}

// ============================================================================
// GET /health/providers/{name}, POST /health/check
// ============================================================================

#[derive(Serialize, Debug)]
pub struct ProviderHealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderStatus,
}

#[derive(Serialize, Debug)]
pub struct HealthCheckResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub message: &'static str,
    pub results: AggregatedHealth,
}

// ============================================================================
// POST /health/test/{name}
// ============================================================================

#[derive(Deserialize, Debug, Default)]
pub struct TestRequest {
    pub message: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct TestResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    /// Display name of the provider that answered.
    pub provider: String,
    pub test: TestOutcome,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub input: String,
    pub output: String,
    /// Milliseconds.
    pub response_time: u64,
    pub usage: Option<TokenUsage>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_providers: Option<Vec<String>>,
}
