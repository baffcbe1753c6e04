//! Error taxonomy for provider adapters and the provider manager.
//!
//! Adapters talk to vendors through [`VendorError`], the raw "what did the
//! wire say" failure. Before anything leaves an adapter it is classified into
//! a [`ProviderError`] by HTTP status, so callers can branch on auth, rate
//! limiting and vendor outages without parsing messages.

use thiserror::Error;

/// Unclassified failure from a single vendor HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct VendorError {
    /// HTTP status when the vendor answered, `None` for transport/decoding failures.
    pub status: Option<u16>,
    pub message: String,
}

impl VendorError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Unclassified vendor failure; carries the vendor's own status and message.
    #[error("{message}")]
    Api {
        provider: String,
        status: Option<u16>,
        message: String,
        #[source]
        cause: Option<VendorError>,
    },
    /// Vendor returned 401. Credentials are misconfigured.
    #[error("Authentication failed for {provider}")]
    Auth {
        provider: String,
        #[source]
        cause: VendorError,
    },
    /// Vendor returned 429. Callers should back off.
    #[error("Rate limit exceeded for {provider}")]
    RateLimit {
        provider: String,
        #[source]
        cause: VendorError,
    },
    /// Vendor 5xx, transport failure, or a response with nothing usable in it.
    #[error("Service error for {provider}: {detail}")]
    Service {
        provider: String,
        status: Option<u16>,
        detail: String,
        #[source]
        cause: Option<VendorError>,
    },
    /// Raised at construction, before any network call.
    #[error("{provider} API key is required")]
    MissingApiKey { provider: String },
}

impl ProviderError {
    /// Maps a raw vendor failure onto the taxonomy by HTTP status.
    pub fn classify(provider: &str, err: VendorError) -> Self {
        let provider = provider.to_string();
        match err.status {
            Some(401) => ProviderError::Auth {
                provider,
                cause: err,
            },
            Some(429) => ProviderError::RateLimit {
                provider,
                cause: err,
            },
            Some(status @ (500 | 502 | 503 | 504)) => ProviderError::Service {
                provider,
                status: Some(status),
                detail: err.message.clone(),
                cause: Some(err),
            },
            Some(status) => ProviderError::Api {
                provider,
                status: Some(status),
                message: err.message.clone(),
                cause: Some(err),
            },
            None => ProviderError::Service {
                provider,
                status: None,
                detail: err.message.clone(),
                cause: Some(err),
            },
        }
    }

    /// The vendor answered but the payload had nothing usable in it.
    pub fn empty_response(provider: &str, detail: impl Into<String>) -> Self {
        ProviderError::Service {
            provider: provider.to_string(),
            status: None,
            detail: detail.into(),
            cause: None,
        }
    }

    pub fn missing_api_key(provider: &str) -> Self {
        ProviderError::MissingApiKey {
            provider: provider.to_string(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Api { provider, .. }
            | ProviderError::Auth { provider, .. }
            | ProviderError::RateLimit { provider, .. }
            | ProviderError::Service { provider, .. }
            | ProviderError::MissingApiKey { provider } => provider,
        }
    }

    /// HTTP status this error stands for. Service errors without a vendor
    /// status count as 500.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => *status,
            ProviderError::Auth { .. } => Some(401),
            ProviderError::RateLimit { .. } => Some(429),
            ProviderError::Service { status, .. } => Some(status.unwrap_or(500)),
            ProviderError::MissingApiKey { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("No AI providers could be initialized. Check your API keys.")]
    NoProvidersInitialized,
    #[error("Provider '{0}' is already registered")]
    DuplicateProvider(String),
    #[error("No healthy AI providers available")]
    NoHealthyProvider,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
