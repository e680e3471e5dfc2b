//! Seed → resource identifier map

use super::{atomic, StoreError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;

/// Resolved identities, keyed by the seed that produced them.
///
/// Persisted as a JSON object in resolution order. An entry is written once and never updated;
/// a seed without an entry has not been resolved yet.
#[derive(Debug)]
pub struct IdentityMap {
    path: PathBuf,
    entries: Vec<(String, String)>,
    by_seed: HashMap<String, usize>,
}

impl IdentityMap {
    /// Load the map from `path`, or start empty if the file does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let stored: Map<String, Value> = atomic::read_json(&path)?.unwrap_or_default();

        let mut entries = Vec::with_capacity(stored.len());
        let mut by_seed = HashMap::with_capacity(stored.len());
        for (seed, value) in stored {
            let Value::String(identifier) = value else {
                return Err(StoreError::DeserializationError {
                    path: path.display().to_string(),
                    reason: format!("identifier for seed {seed} is not a string"),
                });
            };
            by_seed.insert(seed.clone(), entries.len());
            entries.push((seed, identifier));
        }

        Ok(Self {
            path,
            entries,
            by_seed,
        })
    }

    /// Record `identifier` for `seed` and persist immediately.
    ///
    /// An already-resolved seed keeps its first identifier; returns `false` in that case.
    pub fn insert(&mut self, seed: &str, identifier: &str) -> Result<bool, StoreError> {
        if self.by_seed.contains_key(seed) {
            return Ok(false);
        }

        self.entries.push((seed.to_string(), identifier.to_string()));
        if let Err(e) = atomic::write_json(&self.path, &self.to_json()) {
            self.entries.pop();
            return Err(e);
        }
        self.by_seed.insert(seed.to_string(), self.entries.len() - 1);
        Ok(true)
    }

    fn to_json(&self) -> Map<String, Value> {
        self.entries
            .iter()
            .map(|(seed, id)| (seed.clone(), Value::String(id.clone())))
            .collect()
    }

    /// Identifier resolved for `seed`
    pub fn get(&self, seed: &str) -> Option<&str> {
        self.by_seed
            .get(seed)
            .map(|&index| self.entries[index].1.as_str())
    }

    /// Whether `seed` has been resolved
    pub fn contains_seed(&self, seed: &str) -> bool {
        self.by_seed.contains_key(seed)
    }

    /// First seed already mapped to `identifier`, if any
    pub fn seed_for(&self, identifier: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, id)| id == identifier)
            .map(|(seed, _)| seed.as_str())
    }

    /// Identifiers in resolution order, one per seed
    pub fn identifiers(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.entries.iter().map(|(_, id)| id.as_str())
    }

    /// Number of resolved seeds
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been resolved
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
