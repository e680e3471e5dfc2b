//! Rate governing, resolvers and pipeline orchestration
//!
//! Each resolver is a [`Stage`]: it lists its pending units from persisted state and processes
//! one unit at a time, returning a [`UnitOutcome`]. The [`PipelineDriver`] decides what happens
//! next: continue, replace the credential and retry, or stop.

use async_trait::async_trait;
use tracing::warn;

use crate::api::{ApiError, ErrorKind};
use crate::store::StoreError;

pub mod config;
pub mod driver;
pub mod identity;
pub mod match_detail;
pub mod match_index;
pub mod rate_limit;

pub use config::{HarvestConfig, IdentityDedup, RateConfig};
pub use driver::{HaltReason, PipelineDriver, RunReport, StageKind, StageReport};
pub use identity::IdentityResolver;
pub use match_detail::MatchDetailExtractor;
pub use match_index::MatchIndexResolver;
pub use rate_limit::{Clock, RateGovernor, SimulatedClock, TokioClock, WindowLimit};

/// Result of processing one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Output persisted; `added` counts new entries written
    Completed {
        /// New entries persisted by this unit
        added: usize,
    },
    /// Unit failed transiently or with bad data; it stays pending for the next run
    Skipped {
        /// Log-friendly reason
        reason: String,
    },
    /// Upstream rejected the credential; retry this unit after replacement
    CredentialExpired,
}

impl UnitOutcome {
    /// Map an API failure for `unit` in `stage` to an outcome, logging skips.
    pub fn from_api_error(stage: &'static str, unit: &str, error: &ApiError) -> Self {
        match error.kind() {
            ErrorKind::CredentialExpired => UnitOutcome::CredentialExpired,
            ErrorKind::Transient | ErrorKind::Malformed => {
                warn!(stage, unit, kind = ?error.kind(), error = %error, "Skipping unit");
                UnitOutcome::Skipped {
                    reason: error.to_string(),
                }
            }
        }
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            UnitOutcome::Completed { .. } => "completed",
            UnitOutcome::Skipped { .. } => "skipped",
            UnitOutcome::CredentialExpired => "credential_expired",
        }
    }
}

/// Errors that abort a run
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Persisted state could not be read or written
    #[error("storage error: {0}")]
    StoreError(#[from] StoreError),

    /// The credential kept being rejected after replacement
    #[error("credential rejected {attempts} times in a row during {stage}")]
    CredentialRejected {
        /// Stage that was running
        stage: &'static str,
        /// Consecutive replacements without progress
        attempts: u32,
    },

    /// Seed file missing or unreadable
    #[error("seed file error: {0}")]
    SeedError(String),
}

/// One resumable pipeline stage
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage name for logs, metrics and reports
    fn name(&self) -> &'static str;

    /// Units not yet done, in the order they should be offered
    async fn pending(&self) -> Vec<String>;

    /// Process one unit and persist its output. Only storage failures are errors.
    async fn process(&self, unit: &str) -> Result<UnitOutcome, HarvestError>;
}
