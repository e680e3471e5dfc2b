//! Static seed input: category label → ordered seed identifiers

use super::{atomic, StoreError};
use serde_json::{Map, Value};
use std::path::Path;

/// Seed identifiers grouped by category (e.g. rank tier), in file order.
#[derive(Debug, Clone, Default)]
pub struct SeedFile {
    categories: Vec<(String, Vec<String>)>,
}

impl SeedFile {
    /// Load a seed file shaped like `{"GOLD": ["id1", "id2"], "PLATINUM": [...]}`.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw: Map<String, Value> = atomic::read_json(path)?.ok_or_else(|| {
            StoreError::IoError(format!("Seed file not found: {}", path.display()))
        })?;

        let mut categories = Vec::with_capacity(raw.len());
        for (category, seeds) in raw {
            let seeds: Vec<String> =
                serde_json::from_value(seeds).map_err(|e| StoreError::DeserializationError {
                    path: path.display().to_string(),
                    reason: format!("category {category}: {e}"),
                })?;
            categories.push((category, seeds));
        }
        Ok(Self { categories })
    }

    /// Every seed, category by category, in file order
    pub fn seeds(&self) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .flat_map(|(_, seeds)| seeds.iter().map(String::as_str))
    }

    /// Category labels in file order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|(label, _)| label.as_str())
    }

    /// Total number of seeds
    pub fn len(&self) -> usize {
        self.categories.iter().map(|(_, seeds)| seeds.len()).sum()
    }

    /// Whether there are no seeds
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
