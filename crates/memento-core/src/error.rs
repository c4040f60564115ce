//! Error taxonomy shared by the agent loop and its collaborators

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while talking to the language-model service
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("authentication rejected (status {status}): {message}")]
    Auth { status: u16, message: String },

    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after_secs: Option<u64>,
    },

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// Whether the transport should try the request again
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ApiError::RateLimited { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Auth { .. } | ApiError::MalformedResponse(_) => false,
        }
    }

    /// Server-provided backoff hint, if any
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            ApiError::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}

/// Errors surfaced at the cycle boundary
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("api error: {0}")]
    Api(#[from] ApiError),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl AgentError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AgentError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Short category name used as a log field
    pub fn category(&self) -> &'static str {
        match self {
            AgentError::Storage { .. } => "storage",
            AgentError::Api(_) => "api",
            AgentError::Execution(_) => "execution",
            AgentError::Protocol(_) => "protocol",
        }
    }
}

/// Result alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;
