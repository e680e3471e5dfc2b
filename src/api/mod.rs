//! Upstream match API
//!
//! The harvester talks to the upstream service only through the [`MatchApi`] trait.
//! [`RiotHttpClient`] is the HTTP implementation; tests substitute scripted fakes.

use async_trait::async_trait;
use std::sync::Arc;

pub mod config;
pub mod credential;
pub mod http;
pub mod models;

pub use config::ApiConfig;
pub use credential::{
    ChainedCredentialSource, Credential, CredentialSource, FileCredentialSource,
    FnCredentialSource, PromptCredentialSource, StaticCredential,
};
pub use http::RiotHttpClient;
pub use models::{MatchDto, TimelineDto};

/// How the pipeline should react to a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Timeouts, 5xx, 429: skip the unit, it stays eligible on the next run
    Transient,
    /// 401/403: replace the credential and retry the same unit
    CredentialExpired,
    /// Unexpected shape or missing entity: skip the unit
    Malformed,
}

/// API errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network error (connect, timeout, TLS)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Server-side failure
    #[error("server error: HTTP {status}")]
    ServerError {
        /// Response status
        status: u16,
    },

    /// Upstream rate limit hit despite the governor
    #[error("rate limit exceeded (retry after {retry_after:?}s)")]
    RateLimitExceeded {
        /// `Retry-After` header, when present
        retry_after: Option<u64>,
    },

    /// Credential rejected
    #[error("credential rejected: HTTP {status}")]
    CredentialExpired {
        /// Response status (401 or 403)
        status: u16,
    },

    /// Requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Other client error
    #[error("HTTP error {status}: {message}")]
    HttpError {
        /// Response status
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("parse error: {0}")]
    ParseError(String),
}

impl ApiError {
    /// Classify the error for the pipeline
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NetworkError(_)
            | ApiError::ServerError { .. }
            | ApiError::RateLimitExceeded { .. } => ErrorKind::Transient,
            ApiError::CredentialExpired { .. } => ErrorKind::CredentialExpired,
            ApiError::NotFound(_) | ApiError::HttpError { .. } | ApiError::ParseError(_) => {
                ErrorKind::Malformed
            }
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Shared handle to an API implementation
pub type SharedApi = Arc<dyn MatchApi>;

/// The three logical upstream operations
#[async_trait]
pub trait MatchApi: Send + Sync {
    /// Resolve a seed identifier to its resource identifier (PUUID)
    async fn resolve_identity(&self, seed: &str) -> ApiResult<String>;

    /// List up to `count` most recent match ids for `identifier` in `queue`
    async fn list_match_ids(&self, identifier: &str, queue: u32, count: u32)
        -> ApiResult<Vec<String>>;

    /// Fetch the end-of-game summary for a match
    async fn fetch_match(&self, match_id: &str) -> ApiResult<MatchDto>;

    /// Fetch the frame-by-frame timeline for a match
    async fn fetch_timeline(&self, match_id: &str) -> ApiResult<TimelineDto>;
}
