//! Stage 3: match id → per-participant records
//!
//! A match is pending until at least one of its records is in the shard store. Processing
//! fetches the summary and the timeline, derives one [`MatchRecord`] per participant and
//! appends them in a single shard write.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{HarvestError, Stage, UnitOutcome};
use crate::api::models::{ParticipantDto, PerkStyleDto};
use crate::api::{MatchDto, SharedApi, TimelineDto};
use crate::metrics;
use crate::store::{IdSet, ShardStore};
use crate::{ItemSlot, MatchRecord, RuneStyle, ITEM_SLOTS};

/// Role label written when the summary does not report one
pub const UNKNOWN_POSITION: &str = "Unknown";

/// Fetches, extracts and stores every match not yet in the record store.
pub struct MatchDetailExtractor {
    api: SharedApi,
    match_ids: Vec<String>,
    store: Mutex<ShardStore<MatchRecord>>,
}

impl MatchDetailExtractor {
    /// Extractor over every id in `match_ids`, resuming from `store`
    pub fn new(api: SharedApi, match_ids: &IdSet, store: ShardStore<MatchRecord>) -> Self {
        Self {
            api,
            match_ids: match_ids.ids().to_vec(),
            store: Mutex::new(store),
        }
    }
}

#[async_trait]
impl Stage for MatchDetailExtractor {
    fn name(&self) -> &'static str {
        "match_details"
    }

    async fn pending(&self) -> Vec<String> {
        let store = self.store.lock().await;
        let pending: Vec<String> = self
            .match_ids
            .iter()
            .filter(|id| !store.contains_group(id))
            .cloned()
            .collect();

        info!(
            match_ids = self.match_ids.len(),
            stored_matches = store.group_count(),
            pending = pending.len(),
            "Match detail stage planned"
        );
        pending
    }

    async fn process(&self, match_id: &str) -> Result<UnitOutcome, HarvestError> {
        let summary = match self.api.fetch_match(match_id).await {
            Ok(summary) => summary,
            Err(e) => return Ok(UnitOutcome::from_api_error(self.name(), match_id, &e)),
        };
        if summary.metadata.match_id != match_id {
            warn!(
                match_id,
                returned = %summary.metadata.match_id,
                "Summary belongs to a different match, skipping"
            );
            return Ok(UnitOutcome::Skipped {
                reason: format!("summary reported match {}", summary.metadata.match_id),
            });
        }

        let timeline = match self.api.fetch_timeline(match_id).await {
            Ok(timeline) => timeline,
            Err(e) => return Ok(UnitOutcome::from_api_error(self.name(), match_id, &e)),
        };

        let records = extract_records(&summary, &timeline);
        let extracted = records.len();
        let added = self.store.lock().await.append_all(records)?;
        metrics::record_records_appended(added);

        debug!(match_id, extracted, added, "Match stored");
        Ok(UnitOutcome::Completed { added })
    }
}

/// One record per participant of `summary`, in participant order.
pub fn extract_records(summary: &MatchDto, timeline: &TimelineDto) -> Vec<MatchRecord> {
    let participants = &summary.info.participants;
    participants
        .iter()
        .map(|participant| MatchRecord {
            match_id: summary.metadata.match_id.clone(),
            participant_id: participant.participant_id,
            game_duration: summary.info.game_duration,
            champion_id: participant.champion_id,
            champion_name: participant.champion_name.clone(),
            team_id: participant.team_id,
            individual_position: participant
                .individual_position
                .clone()
                .unwrap_or_else(|| UNKNOWN_POSITION.to_string()),
            kills: participant.kills,
            deaths: participant.deaths,
            assists: participant.assists,
            win: participant.win,
            gold_earned: participant.gold_earned,
            total_damage_dealt: participant.total_damage_dealt_to_champions,
            total_damage_taken: participant.total_damage_taken,
            total_heal: participant.total_heal,
            matchup_champion: find_matchup(participant, participants)
                .map(|opponent| opponent.champion_name.clone()),
            primary_rune: rune_style(participant.perks.styles.first()),
            secondary_rune: rune_style(participant.perks.styles.get(1)),
            items: correlate_purchase_times(participant.participant_id, participant.items(), timeline),
        })
        .collect()
}

/// First participant on another team with the same role label.
///
/// A participant without a role label has no matchup.
pub fn find_matchup<'a>(
    participant: &ParticipantDto,
    participants: &'a [ParticipantDto],
) -> Option<&'a ParticipantDto> {
    let position = participant.individual_position.as_deref()?;
    participants.iter().find(|other| {
        other.team_id != participant.team_id
            && other.individual_position.as_deref() == Some(position)
    })
}

/// Attach purchase times to the final inventory.
///
/// Purchase events are scanned in timeline order. Each one is assigned to the first slot
/// holding the same item id that has no time yet; later events for a slot that is already
/// timed are ignored. Slots no event reaches stay unresolved.
pub fn correlate_purchase_times(
    participant_id: u32,
    items: [u32; ITEM_SLOTS],
    timeline: &TimelineDto,
) -> [ItemSlot; ITEM_SLOTS] {
    let mut slots = items.map(ItemSlot::unresolved);

    let purchases = timeline
        .info
        .frames
        .iter()
        .flat_map(|frame| &frame.events)
        .filter_map(|event| Some((event.purchase_by(participant_id)?, event.timestamp)));

    for (item_id, timestamp_ms) in purchases {
        if let Some(slot) = slots
            .iter_mut()
            .find(|slot| slot.item_id == item_id && slot.purchase_time.is_none())
        {
            slot.purchase_time = Some(timestamp_ms.max(0) as u64 / 1000);
        }
    }
    slots
}

fn rune_style(style: Option<&PerkStyleDto>) -> Option<RuneStyle> {
    style.map(|style| RuneStyle {
        style: style.style,
        selections: style.selections.iter().map(|s| s.perk).collect(),
    })
}
