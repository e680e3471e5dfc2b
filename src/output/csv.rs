//! CSV output writer for match records
//!
//! Nested fields are flattened: runes become style/keystone columns and the six item slots
//! become `item_N` / `item_purchase_time_N` column pairs.

use crate::{MatchRecord, UNKNOWN_PURCHASE_TIME};
use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info};

use super::{OutputError, OutputResult, OutputWriter, RecordsWriter};

const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Flattened CSV row
#[derive(Debug, Serialize)]
struct RecordRow<'a> {
    match_id: &'a str,
    participant_id: u32,
    game_duration: i64,
    champion_id: u32,
    champion_name: &'a str,
    team_id: u32,
    individual_position: &'a str,
    kills: u32,
    deaths: u32,
    assists: u32,
    win: bool,
    gold_earned: i64,
    total_damage_dealt: i64,
    total_damage_taken: i64,
    total_heal: i64,
    matchup_champion: Option<&'a str>,
    primary_style: Option<u32>,
    keystone: Option<u32>,
    secondary_style: Option<u32>,
    item_0: u32,
    item_purchase_time_0: String,
    item_1: u32,
    item_purchase_time_1: String,
    item_2: u32,
    item_purchase_time_2: String,
    item_3: u32,
    item_purchase_time_3: String,
    item_4: u32,
    item_purchase_time_4: String,
    item_5: u32,
    item_purchase_time_5: String,
}

fn purchase_time(seconds: Option<u64>) -> String {
    seconds.map_or_else(|| UNKNOWN_PURCHASE_TIME.to_string(), |s| s.to_string())
}

impl<'a> From<&'a MatchRecord> for RecordRow<'a> {
    fn from(record: &'a MatchRecord) -> Self {
        let [i0, i1, i2, i3, i4, i5] = record.items;
        Self {
            match_id: &record.match_id,
            participant_id: record.participant_id,
            game_duration: record.game_duration,
            champion_id: record.champion_id,
            champion_name: &record.champion_name,
            team_id: record.team_id,
            individual_position: &record.individual_position,
            kills: record.kills,
            deaths: record.deaths,
            assists: record.assists,
            win: record.win,
            gold_earned: record.gold_earned,
            total_damage_dealt: record.total_damage_dealt,
            total_damage_taken: record.total_damage_taken,
            total_heal: record.total_heal,
            matchup_champion: record.matchup_champion.as_deref(),
            primary_style: record.primary_rune.as_ref().map(|r| r.style),
            keystone: record.keystone(),
            secondary_style: record.secondary_rune.as_ref().map(|r| r.style),
            item_0: i0.item_id,
            item_purchase_time_0: purchase_time(i0.purchase_time),
            item_1: i1.item_id,
            item_purchase_time_1: purchase_time(i1.purchase_time),
            item_2: i2.item_id,
            item_purchase_time_2: purchase_time(i2.purchase_time),
            item_3: i3.item_id,
            item_purchase_time_3: purchase_time(i3.purchase_time),
            item_4: i4.item_id,
            item_purchase_time_4: purchase_time(i4.purchase_time),
            item_5: i5.item_id,
            item_purchase_time_5: purchase_time(i5.purchase_time),
        }
    }
}

/// CSV writer for match records
pub struct CsvRecordWriter {
    writer: Writer<BufWriter<File>>,
    records_written: u64,
}

impl CsvRecordWriter {
    /// Create a writer with the default buffer size
    pub fn new<P: AsRef<Path>>(path: P) -> OutputResult<Self> {
        Self::new_with_buffer_size(path, DEFAULT_BUFFER_SIZE)
    }

    /// Create a writer with a custom buffer size
    pub fn new_with_buffer_size<P: AsRef<Path>>(path: P, buffer_size: usize) -> OutputResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Creating CSV writer");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        }

        let file = File::create(path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;

        Ok(Self {
            writer: Writer::from_writer(BufWriter::with_capacity(buffer_size, file)),
            records_written: 0,
        })
    }

    /// Records written so far
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}

impl RecordsWriter for CsvRecordWriter {
    fn write_record(&mut self, record: &MatchRecord) -> OutputResult<()> {
        self.writer
            .serialize(RecordRow::from(record))
            .map_err(|e| OutputError::CsvError(format!("Failed to write record: {e}")))?;

        self.records_written += 1;
        if self.records_written % 1000 == 0 {
            self.flush()?;
            debug!(records = self.records_written, "CSV progress");
        }
        Ok(())
    }
}

impl OutputWriter for CsvRecordWriter {
    fn flush(&mut self) -> OutputResult<()> {
        self.writer
            .flush()
            .map_err(|e| OutputError::FlushError(format!("Failed to flush: {e}")))
    }

    fn close(mut self) -> OutputResult<()> {
        self.flush()?;
        info!(records = self.records_written, "CSV writer closed");
        Ok(())
    }
}
