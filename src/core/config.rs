//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.curator/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.
//! A `.env` file in the working directory is loaded before resolution.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use simplelog::LevelFilter;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::inference::RetryPolicy;
use crate::inference::providers::{anthropic, openai};
use crate::inference::resilience::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS};

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CuratorConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub openai: VendorConfig,
    #[serde(default)]
    pub anthropic: VendorConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GeneralConfig {
    pub environment: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VendorConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct HealthConfig {
    pub check_interval_secs: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_LOG_FILE: &str = "curator.log";
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Environment::Development => "development",
            Environment::Production => "production",
            Environment::Test => "test",
        };
        f.write_str(name)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(ConfigError::Invalid {
                key: "environment",
                value: other.to_string(),
            }),
        }
    }
}

// ============================================================================
// Resolved Config (concrete values, no Options except optional vendors)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct VendorSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Everything the provider manager needs to build its adapters.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub openai: Option<VendorSettings>,
    pub anthropic: Option<VendorSettings>,
    pub health_check_interval: Duration,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub environment: Environment,
    pub log_level: LevelFilter,
    pub log_file: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub providers: ProviderSettings,
}

/// Values supplied on the command line. `None` = not specified.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub environment: Option<String>,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("OpenAI API key is required (set OPENAI_API_KEY or [openai].api_key)")]
    MissingOpenAiKey,
}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.curator/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".curator").join("config.toml"))
}

/// Load config from `path`, or `~/.curator/config.toml` when `None`.
///
/// If the default file doesn't exist, generates a commented-out default and
/// returns `CuratorConfig::default()`. An explicit path that doesn't exist is
/// an I/O error. A malformed file is `ConfigError::Parse`.
pub fn load_config(path: Option<&Path>) -> Result<CuratorConfig, ConfigError> {
    if let Some(path) = path {
        return read_config(path);
    }

    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(CuratorConfig::default());
        }
    };

    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(&path);
        return Ok(CuratorConfig::default());
    }

    read_config(&path)
}

fn read_config(path: &Path) -> Result<CuratorConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: CuratorConfig = toml::from_str(&contents)?;
    info!("Loaded config from {}", path.display());
    debug!("Config sections: server={:?} health={:?}", config.server, config.health);
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &Path) {
    let default_content = r#"# Curator Configuration
# Everything except the OpenAI key is optional; defaults fill in the rest.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [general]
# environment = "development"        # "development", "production" or "test" (env: CURATOR_ENV)
# log_level = "info"                 # "error", "warn", "info", "debug", "trace" (env: LOG_LEVEL)
# log_file = "curator.log"

# [server]
# host = "0.0.0.0"
# port = 3001                        # env: PORT

# [openai]
# api_key = "sk-..."                 # Required. Or set OPENAI_API_KEY env var
# base_url = "https://api.openai.com/v1"
# model = "gpt-4o-mini"

# [anthropic]
# api_key = "sk-ant-..."             # Optional. Or set ANTHROPIC_API_KEY env var
# base_url = "https://api.anthropic.com/v1"
# model = "claude-3-haiku-20240307"

# [health]
# check_interval_secs = 60           # Cached health results older than this are re-probed
# retry_max_attempts = 3
# retry_base_delay_ms = 1000
"#;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config against the process environment.
pub fn resolve(config: &CuratorConfig, cli: &CliOverrides) -> Result<ResolvedConfig, ConfigError> {
    resolve_with(config, cli, |key| std::env::var(key).ok())
}

/// Resolve the final config by collapsing: defaults → config file → env → CLI.
///
/// `env` looks up a single environment variable; tests pass a map.
pub fn resolve_with<F>(
    config: &CuratorConfig,
    cli: &CliOverrides,
    env: F,
) -> Result<ResolvedConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    // Environment: CLI → env → config → default
    let environment = match cli
        .environment
        .clone()
        .or_else(|| env("CURATOR_ENV"))
        .or_else(|| config.general.environment.clone())
    {
        Some(raw) => raw.parse()?,
        None => Environment::default(),
    };

    let log_level = match env("LOG_LEVEL").or_else(|| config.general.log_level.clone()) {
        Some(raw) => LevelFilter::from_str(&raw).map_err(|_| ConfigError::Invalid {
            key: "log_level",
            value: raw,
        })?,
        None => LevelFilter::Info,
    };

    let log_file = config
        .general
        .log_file
        .clone()
        .or_else(|| Some(DEFAULT_LOG_FILE.to_string()))
        .filter(|f| !f.is_empty())
        .map(PathBuf::from);

    let host = cli
        .host
        .clone()
        .or_else(|| env("HOST"))
        .or_else(|| config.server.host.clone())
        .unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = match cli.port {
        Some(port) => port,
        None => match env("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "port",
                value: raw,
            })?,
            None => config.server.port.unwrap_or(DEFAULT_PORT),
        },
    };

    // OpenAI is mandatory, Anthropic is optional.
    let openai = resolve_vendor(
        &config.openai,
        &env,
        "OPENAI",
        openai::DEFAULT_BASE_URL,
        openai::DEFAULT_MODEL,
    );
    if openai.is_none() {
        return Err(ConfigError::MissingOpenAiKey);
    }
    let anthropic = resolve_vendor(
        &config.anthropic,
        &env,
        "ANTHROPIC",
        anthropic::DEFAULT_BASE_URL,
        anthropic::DEFAULT_MODEL,
    );
    if anthropic.is_none() {
        info!("No Anthropic API key configured, Anthropic provider disabled");
    }

    let interval_secs = match env("HEALTH_CHECK_INTERVAL_SECS") {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            key: "health_check_interval_secs",
            value: raw,
        })?,
        None => config
            .health
            .check_interval_secs
            .unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
    };

    let retry = RetryPolicy::new(
        config
            .health
            .retry_max_attempts
            .unwrap_or(DEFAULT_MAX_ATTEMPTS),
        config
            .health
            .retry_base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_BASE_DELAY),
    );

    Ok(ResolvedConfig {
        environment,
        log_level,
        log_file,
        host,
        port,
        providers: ProviderSettings {
            openai,
            anthropic,
            health_check_interval: Duration::from_secs(interval_secs),
            retry,
        },
    })
}

/// Vendor settings are only produced when a non-blank key is found (env → config).
fn resolve_vendor<F>(
    config: &VendorConfig,
    env: &F,
    prefix: &str,
    default_base_url: &str,
    default_model: &str,
) -> Option<VendorSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let api_key = env(&format!("{prefix}_API_KEY"))
        .or_else(|| config.api_key.clone())
        .filter(|k| !k.trim().is_empty())?;

    Some(VendorSettings {
        api_key,
        base_url: env(&format!("{prefix}_BASE_URL"))
            .or_else(|| config.base_url.clone())
            .unwrap_or_else(|| default_base_url.to_string()),
        model: env(&format!("{prefix}_MODEL"))
            .or_else(|| config.model.clone())
            .unwrap_or_else(|| default_model.to_string()),
    })
}
