//! Health HTTP surface.
//!
//! Every route reads through the [`ProviderManager`]; nothing here holds
//! state of its own beyond the server start time.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use log::{debug, error, info};

use super::types::{
    DEFAULT_TEST_MESSAGE, DetailedHealthResponse, ErrorResponse, HealthCheckResponse,
    HealthResponse, ProviderCounts, ProviderDetails, ProviderHealthResponse, ProviderSummary,
    SystemInfo, TestOutcome, TestRequest, TestResponse,
};
use crate::core::config::Environment;
use crate::inference::{
    ChatMessage, CompletionOptions, ManagerError, ProviderError, ProviderManager, measure_latency,
};

pub struct AppState {
    pub manager: Arc<ProviderManager>,
    pub environment: Environment,
    pub started_at: Instant,
    pub version: String,
}

impl AppState {
    pub fn new(manager: Arc<ProviderManager>, environment: Environment) -> Self {
        Self {
            manager,
            environment,
            started_at: Instant::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn uptime(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(detailed_health))
        .route("/health/providers/{name}", get(provider_health))
        .route("/health/check", post(force_health_check))
        .route("/health/test/{name}", post(test_provider))
        .with_state(Arc::new(state))
}

/// Resolves once `signal` fires. If the signal handler could not be installed
/// this never resolves, so the server keeps running instead of stopping at once.
pub async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    available_providers: Option<Vec<String>>,
}

impl ApiError {
    pub fn not_found(name: &str, available_providers: Vec<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("Provider '{name}' not found"),
            available_providers: Some(available_providers),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            available_providers: None,
        }
    }

    /// Maps a manager error to a status. Server-side failures lose their
    /// message in production.
    pub fn from_manager(err: &ManagerError, environment: Environment) -> Self {
        let status = match err {
            ManagerError::DuplicateProvider(_) => StatusCode::CONFLICT,
            ManagerError::Provider(ProviderError::Auth { .. }) => StatusCode::UNAUTHORIZED,
            ManagerError::Provider(ProviderError::RateLimit { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status.is_server_error() {
            error!("Request failed: {err}");
            if environment.is_production() {
                "Internal server error".to_string()
            } else {
                err.to_string()
            }
        } else {
            err.to_string()
        };

        Self {
            status,
            message,
            available_providers: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            status: "error",
            timestamp: Utc::now(),
            message: self.message,
            available_providers: self.available_providers,
        };
        (self.status, Json(body)).into_response()
    }
}

fn health_code(healthy: bool) -> StatusCode {
    if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.manager.get_aggregated_health().await;

    let body = HealthResponse {
        status: if health.healthy { "ok" } else { "degraded" },
        timestamp: Utc::now(),
        version: state.version.clone(),
        uptime: state.uptime(),
        environment: state.environment,
        providers: ProviderCounts::from(&health),
    };
    (health_code(health.healthy), Json(body))
}

async fn detailed_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.manager.get_aggregated_health().await;
    let unhealthy = health.unhealthy_providers();

    let body = DetailedHealthResponse {
        status: if health.healthy { "healthy" } else { "unhealthy" },
        timestamp: Utc::now(),
        version: state.version.clone(),
        system: SystemInfo::current(state.uptime(), state.environment),
        providers: ProviderDetails {
            summary: ProviderSummary {
                total: health.total_providers,
                healthy: health.healthy_providers,
                unhealthy,
            },
            details: health.statuses.into_values().collect(),
        },
    };
    (health_code(body.providers.summary.healthy > 0), Json(body))
}

async fn provider_health(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = state
        .manager
        .get_provider(&name)
        .ok_or_else(|| ApiError::not_found(&name, state.manager.get_provider_names()))?;

    let status = provider.status().await;
    let healthy = status.healthy;
    let body = ProviderHealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        timestamp: Utc::now(),
        provider: status,
    };
    Ok((health_code(healthy), Json(body)))
}

async fn force_health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("Forced health check requested");
    state.manager.perform_health_checks().await;
    let results = state.manager.get_aggregated_health().await;

    Json(HealthCheckResponse {
        status: "complete",
        timestamp: Utc::now(),
        message: "Health checks performed on all providers",
        results,
    })
}

async fn test_provider(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: TestRequest = if body.is_empty() {
        TestRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {e}")))?
    };

    let provider = state
        .manager
        .get_provider(&name)
        .ok_or_else(|| ApiError::not_found(&name, state.manager.get_provider_names()))?;

    let input = request
        .message
        .unwrap_or_else(|| DEFAULT_TEST_MESSAGE.to_string());
    let options = CompletionOptions::default()
        .with_max_tokens(50)
        .with_temperature(0.0);
    debug!("Testing provider {name} with {} chars", input.len());

    let (outcome, elapsed) =
        measure_latency(provider.generate_completion(&[ChatMessage::user(input.clone())], &options))
            .await;
    let completion = outcome
        .map_err(|e| ApiError::from_manager(&ManagerError::from(e), state.environment))?;

    Ok(Json(TestResponse {
        status: "success",
        timestamp: Utc::now(),
        provider: provider.name().to_string(),
        test: TestOutcome {
            input,
            output: completion.content,
            response_time: elapsed.as_millis() as u64,
            usage: completion.usage,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::AiProvider;
    use crate::test_support::{Generation, ScriptedProvider};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(providers: Vec<(&str, Arc<ScriptedProvider>)>, environment: Environment) -> Router {
        let manager = ProviderManager::new(
            providers
                .into_iter()
                .map(|(key, p)| (key.to_string(), p as Arc<dyn AiProvider>))
                .collect(),
        )
        .unwrap();
        router(AppState::new(Arc::new(manager), environment))
    }

    async fn send(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn healthy(name: &str) -> Arc<ScriptedProvider> {
        ScriptedProvider::healthy(name, Generation::Reply("OK".into())).into_arc()
    }

    #[tokio::test]
    async fn test_health_ok_with_one_healthy_provider() {
        let app = app(
            vec![
                ("openai", ScriptedProvider::unhealthy("OpenAI").into_arc()),
                ("anthropic", healthy("Anthropic")),
            ],
            Environment::Test,
        );

        let (status, json) = send(app, "GET", "/health", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["environment"], "test");
        assert_eq!(json["providers"]["total"], 2);
        assert_eq!(json["providers"]["healthyCount"], 1);
        assert_eq!(json["providers"]["unhealthyCount"], 1);
    }

    #[tokio::test]
    async fn test_health_is_503_when_nothing_is_healthy() {
        let app = app(
            vec![("openai", ScriptedProvider::unhealthy("OpenAI").into_arc())],
            Environment::Test,
        );

        let (status, json) = send(app, "GET", "/health", Body::empty()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["providers"]["healthy"], false);
    }

    #[tokio::test]
    async fn test_detailed_health_lists_provider_details_in_order() {
        let app = app(
            vec![
                ("openai", healthy("OpenAI")),
                ("anthropic", ScriptedProvider::unhealthy("Anthropic").into_arc()),
            ],
            Environment::Test,
        );

        let (status, json) = send(app, "GET", "/health/detailed", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["providers"]["summary"]["unhealthy"], 1);
        assert_eq!(json["providers"]["details"][0]["name"], "OpenAI");
        assert_eq!(json["providers"]["details"][1]["healthy"], false);
        assert_eq!(json["providers"]["details"][1]["error"]["kind"], "service");
        assert!(json["system"]["platform"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_provider_is_404_with_available_names() {
        let app = app(vec![("openai", healthy("OpenAI"))], Environment::Test);

        let (status, json) = send(app, "GET", "/health/providers/mistral", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["message"], "Provider 'mistral' not found");
        assert_eq!(json["availableProviders"], serde_json::json!(["openai"]));
    }

    #[tokio::test]
    async fn test_provider_health_reflects_status() {
        let app = app(
            vec![("anthropic", ScriptedProvider::unhealthy("Anthropic").into_arc())],
            Environment::Test,
        );

        let (status, json) =
            send(app, "GET", "/health/providers/anthropic", Body::empty()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["provider"]["name"], "Anthropic");
    }

    #[tokio::test]
    async fn test_forced_check_reprobes_every_provider() {
        let openai = healthy("OpenAI");
        let app = app(vec![("openai", Arc::clone(&openai))], Environment::Test);

        let (status, json) = send(app, "POST", "/health/check", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "complete");
        assert_eq!(json["results"]["healthyProviders"], 1);
        // Forced probe, then served from cache for the summary.
        assert_eq!(openai.probe_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_test_uses_default_message() {
        let app = app(vec![("openai", healthy("OpenAI"))], Environment::Test);

        let (status, json) = send(app, "POST", "/health/test/openai", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["provider"], "OpenAI");
        assert_eq!(json["test"]["input"], DEFAULT_TEST_MESSAGE);
        assert_eq!(json["test"]["output"], "OK");
        assert_eq!(json["test"]["usage"]["totalTokens"], 7);
    }

    #[tokio::test]
    async fn test_provider_test_with_custom_message() {
        let app = app(vec![("openai", healthy("OpenAI"))], Environment::Test);

        let body = Body::from(r#"{"message": "ping"}"#);
        let (_, json) = send(app, "POST", "/health/test/openai", body).await;
        assert_eq!(json["test"]["input"], "ping");
    }

    #[tokio::test]
    async fn test_provider_test_rejects_malformed_body() {
        let app = app(vec![("openai", healthy("OpenAI"))], Environment::Test);

        let (status, json) =
            send(app, "POST", "/health/test/openai", Body::from("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_provider_test_maps_auth_failure_to_401() {
        let openai = ScriptedProvider::healthy("OpenAI", Generation::Fail(401)).into_arc();
        let app = app(vec![("openai", openai)], Environment::Production);

        let (status, json) = send(app, "POST", "/health/test/openai", Body::empty()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["message"], "Authentication failed for OpenAI");
    }

    #[tokio::test]
    async fn test_server_errors_are_masked_in_production() {
        let openai = ScriptedProvider::healthy("OpenAI", Generation::Fail(503)).into_arc();
        let app = app(vec![("openai", openai)], Environment::Production);

        let (status, json) = send(app, "POST", "/health/test/openai", Body::empty()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["message"], "Internal server error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_forever_when_signal_setup_fails() {
        let failed = async { Err(std::io::Error::other("no signal handler")) };
        let waited =
            tokio::time::timeout(Duration::from_secs(3600), wait_for_shutdown(failed)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_resolves_on_signal() {
        wait_for_shutdown(async { Ok(()) }).await;
    }

    #[test]
    fn test_error_status_mapping() {
        let duplicate = ManagerError::DuplicateProvider("openai".into());
        assert_eq!(
            ApiError::from_manager(&duplicate, Environment::Development).status(),
            StatusCode::CONFLICT
        );

        let none = ManagerError::NoHealthyProvider;
        let err = ApiError::from_manager(&none, Environment::Development);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "No healthy AI providers available");
    }
}
