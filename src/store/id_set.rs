//! Ordered, duplicate-free id list persisted as a JSON array

use super::{atomic, StoreError};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::debug;

/// A set of ids that remembers discovery order and persists itself as a JSON array.
///
/// Used for the global match-id set and for the list of identifiers whose match listing has
/// already been persisted.
#[derive(Debug)]
pub struct IdSet {
    path: PathBuf,
    ids: Vec<String>,
    seen: HashSet<String>,
}

impl IdSet {
    /// Load the set from `path`, or start empty if the file does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let stored: Vec<String> = atomic::read_json(&path)?.unwrap_or_default();

        let mut set = Self {
            path,
            ids: Vec::with_capacity(stored.len()),
            seen: HashSet::with_capacity(stored.len()),
        };
        for id in stored {
            set.push(id);
        }
        Ok(set)
    }

    fn push(&mut self, id: String) -> bool {
        if self.seen.insert(id.clone()) {
            self.ids.push(id);
            true
        } else {
            false
        }
    }

    /// Union `ids` into the set and persist. Returns how many ids were new.
    pub fn extend<I, S>(&mut self, ids: I) -> Result<usize, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.ids.len();
        for id in ids {
            self.push(id.into());
        }
        let added = self.ids.len() - before;

        if added > 0 || !self.path.exists() {
            if let Err(e) = atomic::write_json(&self.path, &self.ids) {
                for id in self.ids.drain(before..) {
                    self.seen.remove(&id);
                }
                return Err(e);
            }
        }
        debug!(path = %self.path.display(), added, total = self.ids.len(), "Id set updated");
        Ok(added)
    }

    /// Insert one id and persist. Returns whether it was new.
    pub fn insert(&mut self, id: impl Into<String>) -> Result<bool, StoreError> {
        Ok(self.extend([id.into()])? == 1)
    }

    /// Remove every id and persist the empty set
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.ids.clear();
        self.seen.clear();
        atomic::write_json(&self.path, &self.ids)
    }

    /// Whether `id` is in the set
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Ids in discovery order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Number of ids
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
