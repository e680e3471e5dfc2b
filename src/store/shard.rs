//! Append-only, size-bounded record shards
//!
//! Records live in `{prefix}{NN}.json` files, each a JSON array of at most `capacity` records.
//! The dedup key set is not stored anywhere: it is rebuilt by replaying every shard in
//! ascending index order when the store is loaded.
//!
//! Every successful append rewrites the whole current shard atomically, so a crash loses at
//! most the append that was in flight.
//!
//! A batch may straddle a shard boundary: its head is committed with the full shard and its tail
//! with the next one. Sealing a shard at the end of a batch writes an empty successor, so a
//! missing successor on load means a tail may have been lost. The last group of the last sealed
//! shard is then reported as absent and gets fetched again; keys already stored are skipped.

use super::{atomic, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A record that can be stored in a [`ShardStore`]
pub trait ShardRecord: Serialize + DeserializeOwned {
    /// Key that identifies the record; a key is stored at most once
    fn dedup_key(&self) -> String;

    /// Coarser key used for presence checks (e.g. the match a record belongs to)
    fn group_key(&self) -> &str;
}

/// Sharded, dedup-aware record store
#[derive(Debug)]
pub struct ShardStore<T> {
    dir: PathBuf,
    prefix: String,
    capacity: usize,
    keys: HashSet<String>,
    groups: HashSet<String>,
    buffer: Vec<T>,
    current_index: u32,
    sealed_records: usize,
}

/// List `(index, path)` of every shard file for `prefix` in `dir`, ascending by index.
pub fn list_shards(dir: &Path, prefix: &str) -> Result<Vec<(u32, PathBuf)>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| StoreError::IoError(format!("Failed to read {}: {e}", dir.display())))?;

    let mut shards = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::IoError(e.to_string()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let index = name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|digits| digits.parse::<u32>().ok());
        if let Some(index) = index {
            shards.push((index, entry.path()));
        }
    }

    shards.sort_by_key(|(index, _)| *index);
    Ok(shards)
}

/// Read one shard file; a missing file reads as empty.
pub fn read_shard<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    Ok(atomic::read_json(path)?.unwrap_or_default())
}

/// Integrity summary of a shard directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShardScan {
    /// Shard files found
    pub shards: usize,
    /// Records across readable shards
    pub records: usize,
    /// Distinct group keys
    pub groups: usize,
    /// Keys stored more than once
    pub duplicate_keys: Vec<String>,
    /// Shards that failed to parse
    pub corrupt_shards: Vec<String>,
}

impl ShardScan {
    /// No duplicates and no unreadable shards
    pub fn is_clean(&self) -> bool {
        self.duplicate_keys.is_empty() && self.corrupt_shards.is_empty()
    }
}

/// Read every shard without modifying anything and report what was found.
///
/// Unlike [`ShardStore::load`], unreadable shards are collected rather than returned as errors.
pub fn scan_shards<T: ShardRecord>(dir: &Path, prefix: &str) -> Result<ShardScan, StoreError> {
    let mut scan = ShardScan::default();
    let mut keys = HashSet::new();
    let mut groups = HashSet::new();

    for (_, path) in list_shards(dir, prefix)? {
        scan.shards += 1;
        let records: Vec<T> = match read_shard(&path) {
            Ok(records) => records,
            Err(StoreError::DeserializationError { path, reason }) => {
                warn!(path = %path, reason = %reason, "Unreadable shard");
                scan.corrupt_shards.push(path);
                continue;
            }
            Err(e) => return Err(e),
        };

        scan.records += records.len();
        for record in &records {
            let key = record.dedup_key();
            if !keys.insert(key.clone()) {
                scan.duplicate_keys.push(key);
            }
            groups.insert(record.group_key().to_owned());
        }
    }

    scan.groups = groups.len();
    Ok(scan)
}

impl<T: ShardRecord> ShardStore<T> {
    /// Open the store, replaying every existing shard to rebuild the dedup key set.
    ///
    /// A final shard that is truncated or corrupt is treated as empty and will be overwritten
    /// by the next append; its records are expected to be fetched again. The same holds for the
    /// group that was being written when the last sealed shard filled up, unless a readable
    /// successor shows its tail was committed. A corrupt sealed shard is an error.
    pub fn load(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        capacity: usize,
    ) -> Result<Self, StoreError> {
        let dir = dir.into();
        let prefix = prefix.into();
        let capacity = capacity.max(1);

        std::fs::create_dir_all(&dir).map_err(|e| {
            StoreError::IoError(format!("Failed to create shard directory {}: {e}", dir.display()))
        })?;

        let shards = list_shards(&dir, &prefix)?;
        let mut store = Self {
            dir,
            prefix,
            capacity,
            keys: HashSet::new(),
            groups: HashSet::new(),
            buffer: Vec::new(),
            current_index: 1,
            sealed_records: 0,
        };

        let last_position = shards.len().checked_sub(1);
        let mut last_sealed_group: Option<String> = None;
        let mut tail_committed = true;
        for (position, (index, path)) in shards.iter().enumerate() {
            let is_last = Some(position) == last_position;
            let records: Vec<T> = match atomic::read_json(path) {
                Ok(records) => records.unwrap_or_default(),
                Err(StoreError::DeserializationError { reason, .. }) if is_last => {
                    warn!(
                        path = %path.display(),
                        reason = %reason,
                        "Final shard is unreadable, treating it as empty"
                    );
                    tail_committed = false;
                    Vec::new()
                }
                Err(StoreError::DeserializationError { path, reason }) => {
                    return Err(StoreError::CorruptShard { path, reason });
                }
                Err(e) => return Err(e),
            };

            for record in &records {
                store.keys.insert(record.dedup_key());
                store.groups.insert(record.group_key().to_owned());
            }

            if is_last && records.len() < capacity {
                store.current_index = *index;
                store.buffer = records;
            } else {
                if let Some(last) = records.last() {
                    last_sealed_group = Some(last.group_key().to_owned());
                }
                if is_last {
                    tail_committed = false;
                }
                store.sealed_records += records.len();
                store.current_index = index + 1;
            }
        }

        if !tail_committed {
            if let Some(group) = last_sealed_group {
                warn!(
                    group = %group,
                    shard = store.current_index - 1,
                    "Last sealed shard has no committed successor, group may be incomplete"
                );
                store.groups.remove(&group);
            }
        }

        info!(
            dir = %store.dir.display(),
            shards = shards.len(),
            records = store.len(),
            current_shard = store.current_index,
            "Shard store loaded"
        );
        Ok(store)
    }

    /// Append `record` under `key`. Returns `Ok(false)` without touching disk when the key was
    /// already stored.
    pub fn append(&mut self, record: T, key: String) -> Result<bool, StoreError> {
        if self.keys.contains(&key) {
            debug!(key = %key, "Duplicate record key, skipping append");
            return Ok(false);
        }

        let group = record.group_key().to_owned();
        self.buffer.push(record);
        if let Err(e) = self.flush() {
            self.buffer.pop();
            return Err(e);
        }
        self.keys.insert(key);
        self.groups.insert(group);

        if self.buffer.len() >= self.capacity {
            self.seal();
        }
        Ok(true)
    }

    /// Append a batch using each record's own dedup key, writing each touched shard once.
    ///
    /// Returns the number of records actually stored.
    /// Leaves the current shard on disk once the batch is committed, empty if the batch ended
    /// exactly at a shard boundary.
    pub fn append_all(&mut self, records: impl IntoIterator<Item = T>) -> Result<usize, StoreError> {
        let mut appended = 0;
        let mut pending: Vec<(String, String)> = Vec::new();

        for record in records {
            let key = record.dedup_key();
            if self.keys.contains(&key) || pending.iter().any(|(k, _)| *k == key) {
                continue;
            }
            pending.push((key, record.group_key().to_owned()));
            self.buffer.push(record);

            if self.buffer.len() >= self.capacity {
                self.commit_pending(&mut pending)?;
                appended += self.take_committed(&mut pending);
                self.seal();
            }
        }

        if !pending.is_empty() {
            self.commit_pending(&mut pending)?;
            appended += self.take_committed(&mut pending);
        } else if self.sealed_records > 0 && !self.shard_path(self.current_index).exists() {
            self.flush()?;
        }
        Ok(appended)
    }

    fn commit_pending(&mut self, pending: &mut Vec<(String, String)>) -> Result<(), StoreError> {
        if let Err(e) = self.flush() {
            let keep = self.buffer.len() - pending.len();
            self.buffer.truncate(keep);
            pending.clear();
            return Err(e);
        }
        Ok(())
    }

    fn take_committed(&mut self, pending: &mut Vec<(String, String)>) -> usize {
        let count = pending.len();
        for (key, group) in pending.drain(..) {
            self.keys.insert(key);
            self.groups.insert(group);
        }
        count
    }

    fn flush(&self) -> Result<(), StoreError> {
        atomic::write_json(&self.shard_path(self.current_index), &self.buffer)
    }

    fn seal(&mut self) {
        info!(
            shard = self.current_index,
            records = self.buffer.len(),
            "Shard reached capacity, sealing"
        );
        self.sealed_records += self.buffer.len();
        self.buffer.clear();
        self.current_index += 1;
    }

    /// Whether a record with `key` is stored
    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Whether any record with group key `group` is stored
    pub fn contains_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    /// Total number of stored records across all shards
    pub fn len(&self) -> usize {
        self.sealed_records + self.buffer.len()
    }

    /// Whether the store holds no records
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct group keys
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Index of the shard receiving the next append
    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    /// Path of the shard file with `index`
    pub fn shard_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{}{index:02}.json", self.prefix))
    }
}
