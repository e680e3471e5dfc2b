//! Record store behavior across runs: cross-shard dedup, torn final shards and matches cut at
//! a shard boundary

use super::support::{
    config_with_seeds, stored_records, synthetic_match, synthetic_timeline, FakeApi,
};
use match_harvester::api::{Credential, StaticCredential};
use match_harvester::harvest::match_detail::extract_records;
use match_harvester::harvest::{HarvestConfig, PipelineDriver, StageKind};
use match_harvester::store::shard::scan_shards;
use match_harvester::store::ShardStore;
use match_harvester::MatchRecord;
use std::sync::Arc;
use tempfile::TempDir;

fn records_for(match_id: &str) -> Vec<MatchRecord> {
    extract_records(&synthetic_match(match_id), &synthetic_timeline())
}

#[test]
fn test_duplicates_rejected_across_sealed_shards() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut store = ShardStore::load(temp_dir.path(), "all_match_details", 10).unwrap();
        assert_eq!(store.append_all(records_for("EUW1_1")).unwrap(), 10);
        assert_eq!(store.append_all(records_for("EUW1_2")).unwrap(), 10);
        assert_eq!(store.current_index(), 3);
    }

    let mut reopened = ShardStore::<MatchRecord>::load(temp_dir.path(), "all_match_details", 10)
        .unwrap();
    assert_eq!(reopened.len(), 20);
    assert!(reopened.contains_group("EUW1_1"));
    assert!(reopened.contains_key("EUW1_2:10"));

    assert_eq!(reopened.append_all(records_for("EUW1_1")).unwrap(), 0);
    assert_eq!(reopened.append_all(records_for("EUW1_3")).unwrap(), 10);

    let scan = scan_shards::<MatchRecord>(temp_dir.path(), "all_match_details").unwrap();
    assert!(scan.is_clean());
    // Three full shards and the empty successor of the last one
    assert_eq!(scan.shards, 4);
    assert_eq!(scan.records, 30);
    assert_eq!(scan.groups, 3);
}

#[test]
fn test_one_record_over_capacity_opens_second_shard() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = ShardStore::load(temp_dir.path(), "all_match_details", 9).unwrap();

    assert_eq!(store.append_all(records_for("EUW1_1")).unwrap(), 10);

    let first = std::fs::read_to_string(store.shard_path(1)).unwrap();
    let second = std::fs::read_to_string(store.shard_path(2)).unwrap();
    let first: Vec<MatchRecord> = serde_json::from_str(&first).unwrap();
    let second: Vec<MatchRecord> = serde_json::from_str(&second).unwrap();
    assert_eq!(first.len(), 9);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].participant_id, 10);
}

fn harvest_driver(
    api: &Arc<FakeApi>,
    credential: &Credential,
    config: &HarvestConfig,
) -> PipelineDriver {
    PipelineDriver::new(
        api.clone(),
        credential.clone(),
        Arc::new(StaticCredential),
        config.clone(),
    )
}

#[tokio::test]
async fn test_torn_final_shard_is_refetched() {
    let temp_dir = TempDir::new().unwrap();
    let config =
        config_with_seeds(temp_dir.path(), &[("gold", &["alpha"])]).with_shard_capacity(25);
    let credential = Credential::new("key-1");
    let api = FakeApi::new(&credential)
        .with_identity("alpha", "puuid-a")
        .with_match_list("puuid-a", &["BR1_1", "BR1_2", "BR1_3"])
        .shared();

    harvest_driver(&api, &credential, &config).run_all().await.unwrap();
    assert_eq!(stored_records(&config).len(), 30);

    // Shard 01 holds BR1_1, BR1_2 and the head of BR1_3; shard 02 the last five of BR1_3
    let torn = config.match_details_dir().join("all_match_details02.json");
    let contents = std::fs::read_to_string(&torn).unwrap();
    std::fs::write(&torn, &contents[..contents.len() / 2]).unwrap();

    api.clear_calls();
    let report = harvest_driver(&api, &credential, &config)
        .run(&[StageKind::MatchDetails])
        .await
        .unwrap();

    assert_eq!(api.calls_for("match"), vec!["BR1_3"]);
    assert_eq!(report.records_appended(), 5);

    let scan = scan_shards::<MatchRecord>(&config.match_details_dir(), "all_match_details")
        .unwrap();
    assert!(scan.is_clean(), "{scan:?}");
    assert_eq!(scan.records, 30);
    assert_eq!(scan.groups, 3);
}

#[tokio::test]
async fn test_match_cut_at_rotation_is_completed_on_resume() {
    let temp_dir = TempDir::new().unwrap();
    let config =
        config_with_seeds(temp_dir.path(), &[("gold", &["alpha"])]).with_shard_capacity(15);
    let credential = Credential::new("key-1");
    let api = FakeApi::new(&credential)
        .with_identity("alpha", "puuid-a")
        .with_match_list("puuid-a", &["BR1_1", "BR1_2"])
        .shared();

    harvest_driver(&api, &credential, &config).run_all().await.unwrap();
    assert_eq!(stored_records(&config).len(), 20);

    // Crash right after shard 01 was sealed: the last five records of BR1_2 never landed
    std::fs::remove_file(config.match_details_dir().join("all_match_details02.json")).unwrap();
    assert_eq!(stored_records(&config).len(), 15);

    api.clear_calls();
    let report = harvest_driver(&api, &credential, &config)
        .run(&[StageKind::MatchDetails])
        .await
        .unwrap();

    assert_eq!(api.calls_for("match"), vec!["BR1_2"]);
    assert_eq!(report.records_appended(), 5);
    assert_eq!(stored_records(&config).len(), 20);

    let scan = scan_shards::<MatchRecord>(&config.match_details_dir(), "all_match_details")
        .unwrap();
    assert!(scan.is_clean(), "{scan:?}");
    assert_eq!(scan.groups, 2);

    // Completed matches are not fetched again
    api.clear_calls();
    harvest_driver(&api, &credential, &config)
        .run(&[StageKind::MatchDetails])
        .await
        .unwrap();
    assert!(api.calls_for("match").is_empty());
}
