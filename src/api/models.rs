//! Upstream response shapes
//!
//! Only the fields the extractor reads are modelled; everything else in the payload is ignored.

use serde::{Deserialize, Serialize};

use crate::ITEM_SLOTS;

/// Timeline event type for an item purchase
pub const ITEM_PURCHASED: &str = "ITEM_PURCHASED";

/// Summoner lookup response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummonerDto {
    /// Resource identifier
    pub puuid: String,
}

/// Match summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDto {
    /// Match metadata
    pub metadata: MatchMetadataDto,
    /// Match info
    pub info: MatchInfoDto,
}

/// Match metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadataDto {
    /// Match identifier
    pub match_id: String,
}

/// Match info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfoDto {
    /// Game duration in seconds
    pub game_duration: i64,
    /// Every participant's end-of-game state
    pub participants: Vec<ParticipantDto>,
}

/// One participant's end-of-game state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ParticipantDto {
    pub participant_id: u32,
    pub champion_id: u32,
    pub champion_name: String,
    pub team_id: u32,
    #[serde(default)]
    pub individual_position: Option<String>,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub win: bool,
    pub gold_earned: i64,
    pub total_damage_dealt_to_champions: i64,
    pub total_damage_taken: i64,
    pub total_heal: i64,
    #[serde(default)]
    pub item0: u32,
    #[serde(default)]
    pub item1: u32,
    #[serde(default)]
    pub item2: u32,
    #[serde(default)]
    pub item3: u32,
    #[serde(default)]
    pub item4: u32,
    #[serde(default)]
    pub item5: u32,
    #[serde(default)]
    pub perks: PerksDto,
}

impl ParticipantDto {
    /// Final inventory, slot 0 through 5
    pub fn items(&self) -> [u32; ITEM_SLOTS] {
        [
            self.item0, self.item1, self.item2, self.item3, self.item4, self.item5,
        ]
    }
}

/// Rune page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerksDto {
    /// Rune trees; the first is primary, the second secondary
    #[serde(default)]
    pub styles: Vec<PerkStyleDto>,
}

/// One rune tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerkStyleDto {
    /// Tree id
    pub style: u32,
    /// Chosen perks
    #[serde(default)]
    pub selections: Vec<PerkSelectionDto>,
}

/// One chosen perk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerkSelectionDto {
    /// Perk id
    pub perk: u32,
}

/// Match timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineDto {
    /// Timeline info
    pub info: TimelineInfoDto,
}

/// Timeline info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineInfoDto {
    /// Frames in game-time order
    pub frames: Vec<FrameDto>,
}

/// One timeline frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDto {
    /// Events within the frame, in order
    #[serde(default)]
    pub events: Vec<EventDto>,
}

/// One timeline event; fields other than type and timestamp depend on the type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    /// Event type (e.g. "ITEM_PURCHASED")
    #[serde(rename = "type")]
    pub kind: String,
    /// Milliseconds since game start
    pub timestamp: i64,
    /// Acting participant
    #[serde(default)]
    pub participant_id: Option<u32>,
    /// Item involved
    #[serde(default)]
    pub item_id: Option<u32>,
}

impl EventDto {
    /// Purchased item id if this is a purchase by `participant_id`
    pub fn purchase_by(&self, participant_id: u32) -> Option<u32> {
        if self.kind == ITEM_PURCHASED && self.participant_id == Some(participant_id) {
            self.item_id
        } else {
            None
        }
    }
}
