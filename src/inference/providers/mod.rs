//! Vendor adapters plus the HTTP plumbing they share.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;

use log::{debug, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::inference::VendorError;

/// Fixed prompt for health probes.
pub const HEALTH_CHECK_PROMPT: &str = "Health check. Respond with just \"OK\".";

pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Both vendors wrap failures as `{"error": {"message": "..."}}`.
#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    message: String,
}

/// Pulls the vendor's error message out of a response body, falling back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) if body.trim().is_empty() => "unknown error".to_string(),
        Err(_) => body.to_string(),
    }
}

/// Sends a prepared request and decodes a JSON success body.
pub(crate) async fn send_json<T: DeserializeOwned>(
    vendor: &str,
    request: reqwest::RequestBuilder,
) -> Result<T, VendorError> {
    let response = request
        .send()
        .await
        .map_err(|e| VendorError::transport(e.to_string()))?;

    debug!("{vendor} response status: {}", response.status());

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let err_body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        warn!("{vendor} API error: {status} - {err_body}");
        return Err(VendorError::http(status, error_message(&err_body)));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| VendorError::transport(format!("invalid {vendor} response body: {e}")))
}

/// Normalizes a configured key: blank counts as absent.
pub(crate) fn non_blank(key: Option<String>) -> Option<String> {
    key.filter(|k| !k.trim().is_empty())
}
