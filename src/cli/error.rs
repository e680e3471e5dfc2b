//! CLI error types and conversions

use crate::api::ApiError;
use crate::harvest::HarvestError;
use crate::output::OutputError;
use crate::store::StoreError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Pipeline error
    #[error("harvest error: {0}")]
    HarvestError(#[from] HarvestError),

    /// API client error
    #[error("api error: {0}")]
    ApiError(#[from] ApiError),

    /// Store error
    #[error("store error: {0}")]
    StoreError(#[from] StoreError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// No API key given
    #[error("no API key: pass --api-key, set RIOT_API_KEY, or use --credentials-file")]
    MissingCredential,

    /// The credential expired and nothing offered a replacement
    #[error("run stopped: credential expired and no replacement was available")]
    CredentialUnavailable,

    /// Verification found problems
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}
