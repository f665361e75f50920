//! Text-completion abstraction consumed by the summarization pipeline.
//!
//! The pipeline only needs one capability from a hosted model: turn an instruction plus user
//! content into text. Errors are classified up front as transient or fatal so the retry layer can
//! decide what to do without knowing about HTTP.

mod azure;

pub use azure::AzureOpenAiClient;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System-level instructions describing the assistant's role.
    pub instructions: String,
    /// User message the model responds to.
    pub user_content: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
}

/// Provider failures expected to clear up on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// HTTP 429 or an explicit quota message.
    RateLimited,
    /// The request or the provider timed out.
    Timeout,
    /// The provider could not be reached.
    Connection,
    /// The provider returned a 5xx status.
    Server,
}

/// Provider failures that retrying will not fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    /// Credentials were rejected.
    Authentication,
    /// The provider refused the request payload.
    InvalidRequest,
    /// The response body did not match the expected schema.
    MalformedResponse,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::Connection => "connection failure",
            Self::Server => "server error",
        })
    }
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Authentication => "authentication failed",
            Self::InvalidRequest => "invalid request",
            Self::MalformedResponse => "malformed response",
        })
    }
}

/// Errors surfaced by completion providers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompletionError {
    /// Retryable provider failure.
    #[error("Transient provider error ({kind}): {message}")]
    Transient {
        /// Category of the failure.
        kind: TransientKind,
        /// Provider diagnostic.
        message: String,
    },
    /// Non-retryable provider failure.
    #[error("Fatal provider error ({kind}): {message}")]
    Fatal {
        /// Category of the failure.
        kind: FatalKind,
        /// Provider diagnostic.
        message: String,
    },
    /// The provider answered without any usable text.
    #[error("Provider returned an empty response")]
    EmptyResponse,
}

impl CompletionError {
    /// Convenience constructor for transient failures.
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        Self::Transient {
            kind,
            message: message.into(),
        }
    }

    /// Convenience constructor for fatal failures.
    pub fn fatal(kind: FatalKind, message: impl Into<String>) -> Self {
        Self::Fatal {
            kind,
            message: message.into(),
        }
    }

    /// Whether the retry layer should try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Interface implemented by hosted text-generation backends.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce the model's text response for `request`.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

#[async_trait]
impl<C> CompletionClient for std::sync::Arc<C>
where
    C: CompletionClient + ?Sized,
{
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        self.as_ref().complete(request).await
    }
}

#[async_trait]
impl<C> CompletionClient for &C
where
    C: CompletionClient + ?Sized,
{
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request).await
    }
}
