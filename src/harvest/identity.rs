//! Stage 1: seed identifier → resource identifier

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{HarvestError, Stage, UnitOutcome};
use crate::api::SharedApi;
use crate::store::{IdentityMap, SeedFile};

/// Resolves every seed not yet present in the identity map, persisting each answer at once.
pub struct IdentityResolver {
    api: SharedApi,
    seeds: Vec<String>,
    map: Mutex<IdentityMap>,
}

impl IdentityResolver {
    /// Resolver over `seeds`, resuming from `map`
    pub fn new(api: SharedApi, seeds: &SeedFile, map: IdentityMap) -> Self {
        Self {
            api,
            seeds: seeds.seeds().map(str::to_owned).collect(),
            map: Mutex::new(map),
        }
    }
}

#[async_trait]
impl Stage for IdentityResolver {
    fn name(&self) -> &'static str {
        "identities"
    }

    async fn pending(&self) -> Vec<String> {
        let map = self.map.lock().await;
        let mut offered = std::collections::HashSet::new();
        let pending: Vec<String> = self
            .seeds
            .iter()
            .filter(|seed| !map.contains_seed(seed) && offered.insert(seed.as_str()))
            .cloned()
            .collect();

        info!(
            total = self.seeds.len(),
            resolved = map.len(),
            pending = pending.len(),
            "Identity stage planned"
        );
        pending
    }

    async fn process(&self, seed: &str) -> Result<UnitOutcome, HarvestError> {
        let identifier = match self.api.resolve_identity(seed).await {
            Ok(identifier) => identifier,
            Err(e) => return Ok(UnitOutcome::from_api_error(self.name(), seed, &e)),
        };

        let mut map = self.map.lock().await;
        if let Some(other) = map.seed_for(&identifier).filter(|other| *other != seed) {
            debug!(seed, other, "Identifier already resolved for another seed");
        }
        let added = map.insert(seed, &identifier)?;
        Ok(UnitOutcome::Completed {
            added: usize::from(added),
        })
    }
}
