//! Pipeline driver
//!
//! Runs the stages in order. Within a stage, pending units are offered in order with up to
//! `concurrency` in flight. When a unit reports an expired credential, no further units are
//! offered; once in-flight units settle, the credential is replaced and every unit that was
//! rejected or never offered is queued again in its original order.

use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use super::config::{HarvestConfig, MAX_CREDENTIAL_REPLACEMENTS, SHARD_PREFIX};
use super::identity::IdentityResolver;
use super::match_detail::MatchDetailExtractor;
use super::match_index::MatchIndexResolver;
use super::{HarvestError, Stage, UnitOutcome};
use crate::api::{Credential, CredentialSource, SharedApi};
use crate::metrics;
use crate::shutdown::SharedShutdown;
use crate::store::{IdSet, IdentityMap, SeedFile, ShardStore};

/// The three pipeline stages, in run order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Seeds → resource identifiers
    Identities,
    /// Resource identifiers → match ids
    MatchIds,
    /// Match ids → records
    MatchDetails,
}

impl StageKind {
    /// Every stage in run order
    pub const ALL: [StageKind; 3] = [
        StageKind::Identities,
        StageKind::MatchIds,
        StageKind::MatchDetails,
    ];

    /// Stage name as used in logs and reports
    pub fn name(self) -> &'static str {
        match self {
            StageKind::Identities => "identities",
            StageKind::MatchIds => "match_ids",
            StageKind::MatchDetails => "match_details",
        }
    }
}

/// Why a stage stopped before its queue was empty
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// Shutdown was requested
    Shutdown,
    /// The credential expired and no replacement was offered
    CredentialUnavailable,
}

/// Counts for one stage of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    /// Stage
    pub stage: StageKind,
    /// Units pending when the stage started
    pub pending: usize,
    /// Units whose output was persisted
    pub completed: usize,
    /// Units skipped after a transient or data error
    pub skipped: usize,
    /// New entries persisted (identities, match ids or records)
    pub added: usize,
    /// Credential replacements performed
    pub credential_replacements: u32,
    /// Units left in the queue when the stage stopped
    pub remaining: usize,
    /// Set when the stage stopped early
    pub halted: Option<HaltReason>,
}

impl StageReport {
    fn new(stage: StageKind, pending: usize) -> Self {
        Self {
            stage,
            pending,
            completed: 0,
            skipped: 0,
            added: 0,
            credential_replacements: 0,
            remaining: 0,
            halted: None,
        }
    }
}

/// Summary of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// One entry per stage that ran
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Report for `stage`, if it ran
    pub fn stage(&self, stage: StageKind) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    /// Records appended by the match-detail stage
    pub fn records_appended(&self) -> usize {
        self.stage(StageKind::MatchDetails)
            .map_or(0, |report| report.added)
    }

    /// Why the run stopped early, if it did
    pub fn halted(&self) -> Option<HaltReason> {
        self.stages.iter().find_map(|report| report.halted)
    }
}

/// Sequences the stages against one API, credential and configuration.
pub struct PipelineDriver {
    api: SharedApi,
    credential: Credential,
    credential_source: Arc<dyn CredentialSource>,
    config: HarvestConfig,
    shutdown: Option<SharedShutdown>,
}

impl PipelineDriver {
    /// Driver for `api`; `credential` must be the handle the API reads on each request
    pub fn new(
        api: SharedApi,
        credential: Credential,
        credential_source: Arc<dyn CredentialSource>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            api,
            credential,
            credential_source,
            config,
            shutdown: None,
        }
    }

    /// Stop offering units once `shutdown` is requested
    pub fn with_shutdown(mut self, shutdown: SharedShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run every stage in order
    pub async fn run_all(&self) -> Result<RunReport, HarvestError> {
        self.run(&StageKind::ALL).await
    }

    /// Run `stages` in order, stopping after a stage that halted.
    pub async fn run(&self, stages: &[StageKind]) -> Result<RunReport, HarvestError> {
        let started_at = Utc::now();
        let mut reports = Vec::with_capacity(stages.len());

        for &stage in stages {
            let report = self.run_stage_kind(stage).await?;
            let halted = report.halted;
            reports.push(report);
            if let Some(reason) = halted {
                warn!(?stage, ?reason, "Stopping run early");
                break;
            }
        }

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            stages: reports,
        })
    }

    /// Build the resolver for `stage` from persisted state and run it
    pub async fn run_stage_kind(&self, stage: StageKind) -> Result<StageReport, HarvestError> {
        match stage {
            StageKind::Identities => {
                let resolver = self.identity_resolver()?;
                self.run_stage(stage, &resolver).await
            }
            StageKind::MatchIds => {
                let resolver = self.match_index_resolver()?;
                self.run_stage(stage, &resolver).await
            }
            StageKind::MatchDetails => {
                let extractor = self.match_detail_extractor()?;
                self.run_stage(stage, &extractor).await
            }
        }
    }

    fn identity_resolver(&self) -> Result<IdentityResolver, HarvestError> {
        let seeds = SeedFile::load(&self.config.seed_file)
            .map_err(|e| HarvestError::SeedError(e.to_string()))?;
        let map = IdentityMap::load(self.config.identity_path())?;
        Ok(IdentityResolver::new(self.api.clone(), &seeds, map))
    }

    fn match_index_resolver(&self) -> Result<MatchIndexResolver, HarvestError> {
        let map = IdentityMap::load(self.config.identity_path())?;
        let match_ids = IdSet::load(self.config.match_ids_path())?;
        let mut indexed = IdSet::load(self.config.indexed_path())?;
        if self.config.reindex && !indexed.is_empty() {
            info!(previously_indexed = indexed.len(), "Re-listing every identifier");
            indexed.clear()?;
        }
        Ok(MatchIndexResolver::new(
            self.api.clone(),
            &map,
            match_ids,
            indexed,
            &self.config,
        ))
    }

    fn match_detail_extractor(&self) -> Result<MatchDetailExtractor, HarvestError> {
        let match_ids = IdSet::load(self.config.match_ids_path())?;
        let store = ShardStore::load(
            self.config.match_details_dir(),
            SHARD_PREFIX,
            self.config.shard_capacity,
        )?;
        Ok(MatchDetailExtractor::new(self.api.clone(), &match_ids, store))
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|shutdown| shutdown.is_shutdown_requested())
    }

    /// Drive `stage` until its queue is empty or the run must stop.
    pub async fn run_stage<S: Stage>(
        &self,
        kind: StageKind,
        stage: &S,
    ) -> Result<StageReport, HarvestError> {
        let span = info_span!("stage", stage = stage.name());
        self.drive(kind, stage).instrument(span).await
    }

    async fn drive<S: Stage>(&self, kind: StageKind, stage: &S) -> Result<StageReport, HarvestError> {
        let mut queue = stage.pending().await;
        let mut report = StageReport::new(kind, queue.len());
        let progress = self.progress_bar(stage.name(), queue.len());
        let mut consecutive_replacements = 0u32;

        while !queue.is_empty() {
            if self.shutdown_requested() {
                report.halted = Some(HaltReason::Shutdown);
                break;
            }

            let mut settled = HashSet::with_capacity(queue.len());
            let mut expired = HashSet::new();
            let mut progressed = false;
            {
                let expired_seen = AtomicBool::new(false);
                let pass = self.run_pass(stage, &queue, &expired_seen);
                let mut results = std::pin::pin!(pass);

                while let Some((index, outcome)) = results.next().await {
                    settled.insert(index);
                    let outcome = outcome?;
                    metrics::record_unit(stage.name(), outcome.label());
                    match outcome {
                        UnitOutcome::Completed { added } => {
                            report.completed += 1;
                            report.added += added;
                            progressed = true;
                            progress.inc(1);
                        }
                        UnitOutcome::Skipped { .. } => {
                            report.skipped += 1;
                            progressed = true;
                            progress.inc(1);
                        }
                        UnitOutcome::CredentialExpired => {
                            metrics::record_credential_expired(stage.name());
                            expired.insert(index);
                        }
                    }
                }
            }

            queue = queue
                .into_iter()
                .enumerate()
                .filter(|(index, _)| expired.contains(index) || !settled.contains(index))
                .map(|(_, unit)| unit)
                .collect();

            if expired.is_empty() || self.shutdown_requested() {
                continue;
            }

            if progressed {
                consecutive_replacements = 0;
            }
            if consecutive_replacements >= MAX_CREDENTIAL_REPLACEMENTS {
                error!(
                    attempts = consecutive_replacements,
                    "Credential still rejected after replacement"
                );
                progress.abandon();
                return Err(HarvestError::CredentialRejected {
                    stage: stage.name(),
                    attempts: consecutive_replacements,
                });
            }

            warn!(
                rejected = expired.len(),
                requeued = queue.len(),
                "Credential expired, requesting replacement"
            );
            let current = self.credential.current();
            match self.credential_source.replace(&current).await {
                Some(key) => {
                    self.credential.replace(key);
                    consecutive_replacements += 1;
                    report.credential_replacements += 1;
                    info!(requeued = queue.len(), "Credential replaced, resuming");
                }
                None => {
                    warn!(remaining = queue.len(), "No replacement credential available");
                    report.halted = Some(HaltReason::CredentialUnavailable);
                    break;
                }
            }
        }

        report.remaining = queue.len();
        progress.finish_and_clear();
        info!(
            pending = report.pending,
            completed = report.completed,
            skipped = report.skipped,
            added = report.added,
            remaining = report.remaining,
            halted = ?report.halted,
            "Stage finished"
        );
        Ok(report)
    }

    /// Offer `queue` in order, up to `concurrency` at a time, until it is exhausted, shutdown
    /// is requested, or a unit reports an expired credential.
    fn run_pass<'a, S: Stage>(
        &'a self,
        stage: &'a S,
        queue: &'a [String],
        expired_seen: &'a AtomicBool,
    ) -> impl futures::Stream<Item = (usize, Result<UnitOutcome, HarvestError>)> + 'a {
        stream::iter(queue.iter().enumerate())
            .take_while(move |_| {
                future::ready(!expired_seen.load(Ordering::SeqCst) && !self.shutdown_requested())
            })
            .map(move |(index, unit)| async move {
                let outcome = stage.process(unit).await;
                if matches!(outcome, Ok(UnitOutcome::CredentialExpired)) {
                    expired_seen.store(true, Ordering::SeqCst);
                }
                (index, outcome)
            })
            .buffer_unordered(self.config.concurrency.max(1))
    }

    fn progress_bar(&self, stage: &str, len: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .map(|style| style.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(stage.to_string());
        bar
    }
}
