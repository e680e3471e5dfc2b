//! # Match Harvester Library
//!
//! Harvests ranked match records from a rate-limited, paginated match API and persists them
//! incrementally, so that a multi-hour run survives restarts, credential rotation, and flaky
//! networks without losing or duplicating work.
//!
//! ## Pipeline
//!
//! Data flows strictly downstream through three resumable stages:
//!
//! 1. [`harvest::IdentityResolver`] - seed identifiers (summoner ids) → PUUIDs
//! 2. [`harvest::MatchIndexResolver`] - PUUIDs → global, deduplicated match-id set
//! 3. [`harvest::MatchDetailExtractor`] - match ids → one [`MatchRecord`] per participant
//!
//! Each stage persists its own output before the next stage reads it, and every stage
//! re-derives "what is already done" from disk on startup. Interrupting a run and starting it
//! again is equivalent to continuing it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use match_harvester::api::{ApiConfig, Credential, RiotHttpClient, StaticCredential};
//! use match_harvester::harvest::{HarvestConfig, PipelineDriver, RateGovernor};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarvestConfig::new("./data", "./data/summoner_ids.json");
//! let governor = Arc::new(RateGovernor::from_config(&config.rate));
//! let credential = Credential::new("RGAPI-...");
//! let api = Arc::new(RiotHttpClient::new(ApiConfig::default(), credential.clone(), governor)?);
//!
//! let driver = PipelineDriver::new(api, credential, Arc::new(StaticCredential), config);
//! let report = driver.run_all().await?;
//! println!("{} records appended", report.records_appended());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`api`] - upstream HTTP collaborator, response models, credentials
//! - [`harvest`] - rate governor, resolvers and the pipeline driver
//! - [`store`] - crash-safe JSON persistence: shards, identity map, match-id set
//! - [`output`] - CSV export of harvested records
//! - [`cli`] - command-line interface

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// Upstream match API client and credentials
pub mod api;

/// CLI command implementations
pub mod cli;

/// Rate governing, resolvers and pipeline orchestration
pub mod harvest;

/// Metrics collection
pub mod metrics;

/// Record export writers
pub mod output;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Durable, deduplicated persistence
pub mod store;

use store::ShardRecord;

/// Number of final item slots tracked per participant
pub const ITEM_SLOTS: usize = 6;

/// Sentinel written for an item slot whose purchase was never seen in the timeline
pub const UNKNOWN_PURCHASE_TIME: &str = "Unknown Time";

/// One participant's view of one finished match.
///
/// Immutable once written. Identified by `(match_id, participant_id)`; the record store never
/// holds two records with the same pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    /// Match identifier (e.g. "NA1_4812345678")
    pub match_id: String,
    /// Participant number within the match (1-10)
    pub participant_id: u32,
    /// Game duration in seconds
    pub game_duration: i64,
    /// Champion id
    pub champion_id: u32,
    /// Champion name
    pub champion_name: String,
    /// Team id (100 or 200)
    pub team_id: u32,
    /// Role label ("TOP", "JUNGLE", ...), "Unknown" when not reported
    pub individual_position: String,
    /// Kills
    pub kills: u32,
    /// Deaths
    pub deaths: u32,
    /// Assists
    pub assists: u32,
    /// Whether this participant's team won
    pub win: bool,
    /// Gold earned
    pub gold_earned: i64,
    /// Damage dealt to champions
    pub total_damage_dealt: i64,
    /// Damage taken
    pub total_damage_taken: i64,
    /// Healing done
    pub total_heal: i64,
    /// Champion played by the opposing participant in the same role
    pub matchup_champion: Option<String>,
    /// Primary (keystone) rune tree
    pub primary_rune: Option<RuneStyle>,
    /// Secondary rune tree
    pub secondary_rune: Option<RuneStyle>,
    /// Final inventory with inferred purchase times
    pub items: [ItemSlot; ITEM_SLOTS],
}

impl MatchRecord {
    /// Keystone perk id, the first selection of the primary tree
    pub fn keystone(&self) -> Option<u32> {
        self.primary_rune
            .as_ref()
            .and_then(|style| style.selections.first().copied())
    }
}

impl ShardRecord for MatchRecord {
    fn dedup_key(&self) -> String {
        format!("{}:{}", self.match_id, self.participant_id)
    }

    fn group_key(&self) -> &str {
        &self.match_id
    }
}

/// A rune tree as reported by the match summary, identifiers left unresolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuneStyle {
    /// Rune tree id (e.g. 8100 for Domination)
    pub style: u32,
    /// Selected perk ids, in reported order
    pub selections: Vec<u32>,
}

/// One final inventory slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSlot {
    /// Item id, 0 for an empty slot
    pub item_id: u32,
    /// Purchase time in seconds since game start; `None` when no purchase event matched
    #[serde(with = "purchase_time")]
    pub purchase_time: Option<u64>,
}

impl ItemSlot {
    /// Slot holding `item_id` with no correlated purchase yet
    pub fn unresolved(item_id: u32) -> Self {
        Self {
            item_id,
            purchase_time: None,
        }
    }
}

/// Purchase times are written as integer seconds or the [`UNKNOWN_PURCHASE_TIME`] sentinel.
mod purchase_time {
    use super::UNKNOWN_PURCHASE_TIME;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(seconds) => serializer.serialize_u64(*seconds),
            None => serializer.serialize_str(UNKNOWN_PURCHASE_TIME),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Label(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(seconds) => Ok(Some(seconds)),
            Raw::Label(label) if label == UNKNOWN_PURCHASE_TIME => Ok(None),
            Raw::Label(other) => Err(serde::de::Error::custom(format!(
                "unexpected purchase time {other:?}"
            ))),
        }
    }
}
