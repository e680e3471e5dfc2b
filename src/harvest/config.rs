//! Harvest configuration and defaults

use super::rate_limit::WindowLimit;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Requests allowed in the short window.
/// Matches the development-key quota of 20 requests per second.
pub const DEFAULT_SHORT_LIMIT: usize = 20;

/// Short window length
pub const DEFAULT_SHORT_WINDOW: Duration = Duration::from_secs(1);

/// Requests allowed in the long window.
/// Development keys allow 100 requests per 2 minutes.
pub const DEFAULT_LONG_LIMIT: usize = 100;

/// Long window length
pub const DEFAULT_LONG_WINDOW: Duration = Duration::from_secs(120);

/// Records per shard file before rotating to the next index
pub const DEFAULT_SHARD_CAPACITY: usize = 10_000;

/// Match ids requested per identifier
pub const DEFAULT_MATCH_COUNT: u32 = 20;

/// Queue id for ranked solo/duo games
pub const RANKED_SOLO_QUEUE: u32 = 420;

/// Consecutive credential replacements allowed for the same pending units before the run
/// gives up
pub const MAX_CREDENTIAL_REPLACEMENTS: u32 = 3;

/// Upper bound on units in flight at once
pub const MAX_CONCURRENCY: usize = 32;

/// Resource identifier map, relative to the data directory
pub const IDENTITY_FILE: &str = "puuids.json";

/// Global match-id set, relative to the data directory
pub const MATCH_IDS_FILE: &str = "match_ids.json";

/// Identifiers whose match listing has been persisted, relative to the data directory
pub const INDEXED_FILE: &str = "indexed_puuids.json";

/// Directory holding record shards, relative to the data directory
pub const MATCH_DETAILS_DIR: &str = "match_details";

/// Record shard file name prefix
pub const SHARD_PREFIX: &str = "all_match_details";

/// Both rate windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateConfig {
    /// Short window quota
    pub short: WindowLimit,
    /// Long window quota
    pub long: WindowLimit,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            short: WindowLimit::new(DEFAULT_SHORT_LIMIT, DEFAULT_SHORT_WINDOW),
            long: WindowLimit::new(DEFAULT_LONG_LIMIT, DEFAULT_LONG_WINDOW),
        }
    }
}

/// How resolved identifiers feed the match-index stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityDedup {
    /// One work item per resolved seed, even when two seeds share an identifier
    #[default]
    PerSeed,
    /// One work item per distinct identifier
    Global,
}

impl FromStr for IdentityDedup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "per-seed" | "per_seed" | "seed" => Ok(IdentityDedup::PerSeed),
            "global" => Ok(IdentityDedup::Global),
            _ => Err(format!(
                "Invalid identity dedup policy: {s}. Valid options: per-seed, global"
            )),
        }
    }
}

/// Everything a pipeline run needs besides the API client
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root directory for every persisted output
    pub data_dir: PathBuf,
    /// Seed identifier file
    pub seed_file: PathBuf,
    /// Rate windows
    pub rate: RateConfig,
    /// Records per shard
    pub shard_capacity: usize,
    /// Match ids requested per identifier
    pub match_count: u32,
    /// Queue filter for match listing
    pub queue: u32,
    /// Units in flight at once (1 = strictly sequential)
    pub concurrency: usize,
    /// Identifier dedup policy for the match-index stage
    pub identity_dedup: IdentityDedup,
    /// Re-list identifiers that were already indexed
    pub reindex: bool,
    /// Draw progress bars
    pub show_progress: bool,
}

impl HarvestConfig {
    /// Defaults rooted at `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>, seed_file: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            seed_file: seed_file.into(),
            rate: RateConfig::default(),
            shard_capacity: DEFAULT_SHARD_CAPACITY,
            match_count: DEFAULT_MATCH_COUNT,
            queue: RANKED_SOLO_QUEUE,
            concurrency: 1,
            identity_dedup: IdentityDedup::default(),
            reindex: false,
            show_progress: false,
        }
    }

    /// Set units in flight, clamped to `1..=MAX_CONCURRENCY`
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Set records per shard
    pub fn with_shard_capacity(mut self, capacity: usize) -> Self {
        self.shard_capacity = capacity.max(1);
        self
    }

    /// Set the identity dedup policy
    pub fn with_identity_dedup(mut self, policy: IdentityDedup) -> Self {
        self.identity_dedup = policy;
        self
    }

    /// Path of the identifier map
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(IDENTITY_FILE)
    }

    /// Path of the match-id set
    pub fn match_ids_path(&self) -> PathBuf {
        self.data_dir.join(MATCH_IDS_FILE)
    }

    /// Path of the indexed-identifier list
    pub fn indexed_path(&self) -> PathBuf {
        self.data_dir.join(INDEXED_FILE)
    }

    /// Directory of record shards
    pub fn match_details_dir(&self) -> PathBuf {
        self.data_dir.join(MATCH_DETAILS_DIR)
    }

    /// Data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
