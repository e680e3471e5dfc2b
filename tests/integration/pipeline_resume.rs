//! End-to-end pipeline runs against the scripted API: persistence, idempotence and resume

use super::support::{config_with_seeds, stored_records, FakeApi, Failure};
use match_harvester::api::{Credential, StaticCredential};
use match_harvester::harvest::{HaltReason, HarvestConfig, IdentityDedup, PipelineDriver, StageKind};
use match_harvester::shutdown::ShutdownCoordinator;
use match_harvester::store::shard::list_shards;
use match_harvester::store::{IdSet, IdentityMap};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn two_player_api(credential: &Credential) -> FakeApi {
    FakeApi::new(credential)
        .with_identity("alpha", "puuid-a")
        .with_identity("bravo", "puuid-b")
        .with_match_list("puuid-a", &["NA1_1", "NA1_2", "NA1_3"])
        .with_match_list("puuid-b", &["NA1_3", "NA1_4"])
}

fn seeded_config(dir: &TempDir) -> HarvestConfig {
    config_with_seeds(dir.path(), &[("challenger", &["alpha"]), ("master", &["bravo"])])
}

fn driver(api: &Arc<FakeApi>, credential: &Credential, config: HarvestConfig) -> PipelineDriver {
    PipelineDriver::new(
        api.clone(),
        credential.clone(),
        Arc::new(StaticCredential),
        config,
    )
}

fn shard_bytes(config: &HarvestConfig) -> Vec<Vec<u8>> {
    list_shards(&config.match_details_dir(), "all_match_details")
        .unwrap()
        .into_iter()
        .map(|(_, path)| std::fs::read(path).unwrap())
        .collect()
}

#[tokio::test]
async fn test_full_run_persists_every_stage() {
    let temp_dir = TempDir::new().unwrap();
    let config = seeded_config(&temp_dir);
    let credential = Credential::new("key-1");
    let api = two_player_api(&credential).shared();

    let report = driver(&api, &credential, config.clone())
        .run_all()
        .await
        .unwrap();

    assert!(report.halted().is_none());
    assert_eq!(report.stages.len(), 3);

    let identities = IdentityMap::load(config.identity_path()).unwrap();
    assert_eq!(identities.get("alpha"), Some("puuid-a"));
    assert_eq!(identities.get("bravo"), Some("puuid-b"));

    let match_ids = IdSet::load(config.match_ids_path()).unwrap();
    assert_eq!(match_ids.len(), 4, "NA1_3 is listed twice but stored once");

    let records = stored_records(&config);
    assert_eq!(records.len(), 40);
    assert_eq!(report.records_appended(), 40);

    let keys: HashSet<(String, u32)> = records
        .iter()
        .map(|r| (r.match_id.clone(), r.participant_id))
        .collect();
    assert_eq!(keys.len(), records.len());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let config = seeded_config(&temp_dir).with_shard_capacity(15);
    let credential = Credential::new("key-1");
    let api = two_player_api(&credential).shared();

    driver(&api, &credential, config.clone())
        .run_all()
        .await
        .unwrap();
    let first_shards = shard_bytes(&config);
    let first_ids = std::fs::read(config.match_ids_path()).unwrap();
    assert_eq!(first_shards.len(), 3);

    api.clear_calls();
    let report = driver(&api, &credential, config.clone())
        .run_all()
        .await
        .unwrap();

    assert!(api.calls().is_empty(), "nothing left to fetch: {:?}", api.calls());
    for stage in &report.stages {
        assert_eq!(stage.pending, 0, "{:?} still had pending units", stage.stage);
    }
    assert_eq!(shard_bytes(&config), first_shards);
    assert_eq!(std::fs::read(config.match_ids_path()).unwrap(), first_ids);
}

#[tokio::test]
async fn test_shutdown_then_resume_matches_uninterrupted_run() {
    let interrupted_dir = TempDir::new().unwrap();
    let interrupted = seeded_config(&interrupted_dir);
    let credential = Credential::new("key-1");
    let api = two_player_api(&credential).shared();

    driver(&api, &credential, interrupted.clone())
        .run(&[StageKind::Identities, StageKind::MatchIds])
        .await
        .unwrap();

    // Identifiers are listed newest first, so details run NA1_3, NA1_4, NA1_1, NA1_2.
    // Request shutdown while the second one is in flight.
    let shutdown = ShutdownCoordinator::shared();
    let trigger = shutdown.clone();
    api.on_call("match", 2, move || trigger.request_shutdown());

    let report = driver(&api, &credential, interrupted.clone())
        .with_shutdown(shutdown)
        .run(&[StageKind::MatchDetails])
        .await
        .unwrap();

    let details = report.stage(StageKind::MatchDetails).unwrap();
    assert_eq!(details.halted, Some(HaltReason::Shutdown));
    assert_eq!(details.completed, 2);
    assert_eq!(details.remaining, 2);
    assert_eq!(stored_records(&interrupted).len(), 20);

    api.clear_calls();
    let resumed = driver(&api, &credential, interrupted.clone())
        .run(&[StageKind::MatchDetails])
        .await
        .unwrap();
    assert_eq!(resumed.stage(StageKind::MatchDetails).unwrap().pending, 2);
    assert_eq!(api.calls_for("match"), vec!["NA1_1", "NA1_2"]);

    let clean_dir = TempDir::new().unwrap();
    let clean = seeded_config(&clean_dir);
    let clean_api = two_player_api(&credential).shared();
    driver(&clean_api, &credential, clean.clone())
        .run_all()
        .await
        .unwrap();

    assert_eq!(stored_records(&interrupted), stored_records(&clean));
}

#[tokio::test]
async fn test_failed_unit_is_retried_on_next_run() {
    let temp_dir = TempDir::new().unwrap();
    let config = seeded_config(&temp_dir);
    let credential = Credential::new("key-1");
    let api = two_player_api(&credential).shared();
    api.fail_once("NA1_2", Failure::Transient);
    api.fail_once("bravo", Failure::NotFound);

    let first = driver(&api, &credential, config.clone())
        .run_all()
        .await
        .unwrap();
    assert_eq!(first.stage(StageKind::Identities).unwrap().skipped, 1);
    assert_eq!(first.stage(StageKind::MatchDetails).unwrap().skipped, 1);
    assert_eq!(stored_records(&config).len(), 20);

    api.clear_calls();
    driver(&api, &credential, config.clone())
        .run_all()
        .await
        .unwrap();

    assert_eq!(api.calls_for("identity"), vec!["bravo"]);
    assert_eq!(api.calls_for("match_ids"), vec!["puuid-b"]);
    let refetched: HashSet<String> = api.calls_for("match").into_iter().collect();
    assert_eq!(
        refetched,
        HashSet::from(["NA1_2".to_string(), "NA1_4".to_string()])
    );
    assert_eq!(stored_records(&config).len(), 40);
}

#[tokio::test]
async fn test_reindex_picks_up_new_matches() {
    let temp_dir = TempDir::new().unwrap();
    let config = seeded_config(&temp_dir);
    let credential = Credential::new("key-1");
    let api = two_player_api(&credential).with_match("NA1_5").shared();

    driver(&api, &credential, config.clone())
        .run_all()
        .await
        .unwrap();
    api.set_match_list("puuid-b", &["NA1_5", "NA1_3", "NA1_4"]);

    driver(&api, &credential, config.clone())
        .run(&[StageKind::MatchIds])
        .await
        .unwrap();
    assert_eq!(IdSet::load(config.match_ids_path()).unwrap().len(), 4);

    let mut reindex = config.clone();
    reindex.reindex = true;
    driver(&api, &credential, reindex).run_all().await.unwrap();

    let match_ids = IdSet::load(config.match_ids_path()).unwrap();
    assert_eq!(match_ids.len(), 5);
    assert_eq!(match_ids.ids().last().map(String::as_str), Some("NA1_5"));
    assert_eq!(stored_records(&config).len(), 50);
}

#[tokio::test]
async fn test_shared_identifier_listed_per_seed_or_once() {
    for (policy, expected_listings) in [(IdentityDedup::PerSeed, 2), (IdentityDedup::Global, 1)] {
        let temp_dir = TempDir::new().unwrap();
        let config = config_with_seeds(temp_dir.path(), &[("smurfs", &["main", "alt"])])
            .with_identity_dedup(policy);
        let credential = Credential::new("key-1");
        let api = FakeApi::new(&credential)
            .with_identity("main", "puuid-same")
            .with_identity("alt", "puuid-same")
            .with_match_list("puuid-same", &["EUW1_9"])
            .shared();

        driver(&api, &credential, config.clone())
            .run(&[StageKind::Identities, StageKind::MatchIds])
            .await
            .unwrap();

        assert_eq!(
            api.calls_for("match_ids").len(),
            expected_listings,
            "policy {policy:?}"
        );
        assert_eq!(IdSet::load(config.match_ids_path()).unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_concurrent_run_stores_same_records() {
    let sequential_dir = TempDir::new().unwrap();
    let concurrent_dir = TempDir::new().unwrap();
    let sequential = seeded_config(&sequential_dir);
    let concurrent = seeded_config(&concurrent_dir).with_concurrency(4);
    let credential = Credential::new("key-1");

    for config in [&sequential, &concurrent] {
        let api = two_player_api(&credential).shared();
        driver(&api, &credential, config.clone())
            .run_all()
            .await
            .unwrap();
    }

    let key_set = |config: &HarvestConfig| -> HashSet<(String, u32)> {
        stored_records(config)
            .into_iter()
            .map(|r| (r.match_id, r.participant_id))
            .collect()
    };
    assert_eq!(key_set(&sequential), key_set(&concurrent));
    assert_eq!(stored_records(&concurrent).len(), 40);
}
