use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::chunking::{ChunkingError, ChunkingOptions};
use crate::retry::RetryPolicy;

const DEFAULT_API_VERSION: &str = "2024-07-01-preview";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default character budget per transcript chunk.
pub const DEFAULT_CHUNK_CHAR_LIMIT: usize = 12_000;
/// Default fraction of a chunk's lines repeated at the head of the next chunk.
pub const DEFAULT_OVERLAP_RATIO: f64 = 0.15;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required environment variables were not provided.
    #[error(
        "Missing environment variable(s): {0}. Put them in a .env file or your shell environment"
    )]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Connection settings for the hosted completion provider.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Azure OpenAI resource.
    pub endpoint: String,
    /// API key sent in the `api-key` header.
    pub api_key: String,
    /// Deployment name of the chat model.
    pub deployment: String,
    /// REST API version appended to every request.
    pub api_version: String,
    /// Transport-level timeout applied to each HTTP request.
    pub request_timeout: Duration,
    /// Upper bound on attempts per completion call, including the first.
    pub max_attempts: u32,
}

impl Config {
    /// Load configuration from the process environment, honouring a `.env` file when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_lookup(|key| env::var(key).ok())?;
        tracing::debug!(
            endpoint = %config.endpoint,
            deployment = %config.deployment,
            api_version = %config.api_version,
            max_attempts = config.max_attempts,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Every missing required key is reported in a single error so users can fix their
    /// environment in one pass.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let endpoint = read("AZURE_OPENAI_ENDPOINT");
        let api_key = read("AZURE_OPENAI_API_KEY");
        let deployment = read("AZURE_OPENAI_DEPLOYMENT");

        let missing: Vec<&str> = [
            ("AZURE_OPENAI_ENDPOINT", endpoint.is_none()),
            ("AZURE_OPENAI_API_KEY", api_key.is_none()),
            ("AZURE_OPENAI_DEPLOYMENT", deployment.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();
        let (Some(endpoint), Some(api_key), Some(deployment)) = (endpoint, api_key, deployment)
        else {
            return Err(ConfigError::MissingVariable(missing.join(", ")));
        };

        let request_timeout_secs = read("RUSTYSUM_REQUEST_TIMEOUT_SECS")
            .map(|value| {
                value
                    .parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .ok_or_else(|| {
                        ConfigError::InvalidValue("RUSTYSUM_REQUEST_TIMEOUT_SECS".into())
                    })
            })
            .transpose()?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);

        let max_attempts = read("RUSTYSUM_MAX_ATTEMPTS")
            .map(|value| {
                value
                    .parse::<u32>()
                    .ok()
                    .filter(|attempts| *attempts > 0)
                    .ok_or_else(|| ConfigError::InvalidValue("RUSTYSUM_MAX_ATTEMPTS".into()))
            })
            .transpose()?
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);

        Ok(Self {
            endpoint,
            api_key,
            deployment,
            api_version: read("AZURE_OPENAI_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            request_timeout: Duration::from_secs(request_timeout_secs),
            max_attempts,
        })
    }

    /// Retry policy derived from the configured attempt budget.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            ..RetryPolicy::default()
        }
    }
}

/// Validated knobs for a single summarization run.
#[derive(Debug, Clone, Copy)]
pub struct SummarizerSettings {
    /// Chunk boundaries used when chunking is enabled.
    pub chunking: ChunkingOptions,
    /// When false the whole transcript is sent in one request.
    pub use_chunking: bool,
}

impl SummarizerSettings {
    /// Validate the chunk limit and overlap ratio up front so no request is made with a bad
    /// configuration.
    pub fn new(
        chunk_char_limit: usize,
        overlap_ratio: f64,
        use_chunking: bool,
    ) -> Result<Self, ChunkingError> {
        Ok(Self {
            chunking: ChunkingOptions::new(chunk_char_limit, overlap_ratio)?,
            use_chunking,
        })
    }
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkingOptions::default(),
            use_chunking: true,
        }
    }
}
