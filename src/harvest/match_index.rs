//! Stage 2: resource identifier → match ids

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::config::{HarvestConfig, IdentityDedup};
use super::{HarvestError, Stage, UnitOutcome};
use crate::api::SharedApi;
use crate::store::{IdSet, IdentityMap};

/// Lists recent match ids per identifier and unions them into the global match-id set.
///
/// Identifiers are offered newest first (reverse of identity map order). An identifier is done
/// once its listing has been merged into the match-id set and it has been recorded in the
/// indexed set.
pub struct MatchIndexResolver {
    api: SharedApi,
    identifiers: Vec<String>,
    queue: u32,
    count: u32,
    match_ids: Mutex<IdSet>,
    indexed: Mutex<IdSet>,
}

impl MatchIndexResolver {
    /// Resolver over every identifier in `map`
    pub fn new(
        api: SharedApi,
        map: &IdentityMap,
        match_ids: IdSet,
        indexed: IdSet,
        config: &HarvestConfig,
    ) -> Self {
        let identifiers = work_list(map, config.identity_dedup);
        Self {
            api,
            identifiers,
            queue: config.queue,
            count: config.match_count,
            match_ids: Mutex::new(match_ids),
            indexed: Mutex::new(indexed),
        }
    }
}

/// Reverse identity-map order; `Global` keeps only the first occurrence of each identifier.
pub fn work_list(map: &IdentityMap, policy: IdentityDedup) -> Vec<String> {
    let ordered = map.identifiers().rev().map(str::to_owned);
    match policy {
        IdentityDedup::PerSeed => ordered.collect(),
        IdentityDedup::Global => {
            let mut seen = HashSet::new();
            ordered.filter(|id| seen.insert(id.clone())).collect()
        }
    }
}

#[async_trait]
impl Stage for MatchIndexResolver {
    fn name(&self) -> &'static str {
        "match_ids"
    }

    async fn pending(&self) -> Vec<String> {
        let indexed = self.indexed.lock().await;
        let pending: Vec<String> = self
            .identifiers
            .iter()
            .filter(|id| !indexed.contains(id))
            .cloned()
            .collect();

        info!(
            identifiers = self.identifiers.len(),
            indexed = indexed.len(),
            pending = pending.len(),
            "Match index stage planned"
        );
        pending
    }

    async fn process(&self, identifier: &str) -> Result<UnitOutcome, HarvestError> {
        let ids = match self
            .api
            .list_match_ids(identifier, self.queue, self.count)
            .await
        {
            Ok(ids) => ids,
            Err(e) => return Ok(UnitOutcome::from_api_error(self.name(), identifier, &e)),
        };

        let listed = ids.len();
        let added = self.match_ids.lock().await.extend(ids)?;
        self.indexed.lock().await.insert(identifier)?;

        debug!(identifier, listed, added, "Match ids merged");
        Ok(UnitOutcome::Completed { added })
    }
}
