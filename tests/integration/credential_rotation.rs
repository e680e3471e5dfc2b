//! Credential expiry mid-run: replacement, retry of the rejected unit, and clean halts

use super::support::{config_with_seeds, stored_records, FakeApi};
use match_harvester::api::{
    ChainedCredentialSource, Credential, CredentialSource, FileCredentialSource,
    FnCredentialSource, StaticCredential,
};
use match_harvester::harvest::{HaltReason, HarvestConfig, HarvestError, PipelineDriver, StageKind};
use std::collections::HashSet;
use std::sync::Arc;
use tempfile::TempDir;

fn api(credential: &Credential) -> Arc<FakeApi> {
    FakeApi::new(credential)
        .with_identity("alpha", "puuid-a")
        .with_identity("bravo", "puuid-b")
        .with_match_list("puuid-a", &["KR_1", "KR_2", "KR_3"])
        .with_match_list("puuid-b", &["KR_3", "KR_4"])
        .shared()
}

fn config(dir: &TempDir) -> HarvestConfig {
    config_with_seeds(dir.path(), &[("diamond", &["alpha", "bravo"])])
}

fn rotate_to(next: &'static str) -> Arc<dyn CredentialSource> {
    Arc::new(FnCredentialSource::new(move |expired: &str| {
        (expired != next).then(|| next.to_string())
    }))
}

#[tokio::test]
async fn test_expired_key_is_replaced_and_unit_retried() {
    let temp_dir = TempDir::new().unwrap();
    let credential = Credential::new("key-1");
    let api = api(&credential);
    // identity x2, then the first listing succeeds and the second is rejected
    api.rotate_key_after(3, "key-2");

    let report = PipelineDriver::new(
        api.clone(),
        credential.clone(),
        rotate_to("key-2"),
        config(&temp_dir),
    )
    .run_all()
    .await
    .unwrap();

    assert!(report.halted().is_none());
    assert_eq!(credential.current(), "key-2");

    let listing = report.stage(StageKind::MatchIds).unwrap();
    assert_eq!(listing.credential_replacements, 1);
    assert_eq!(listing.completed, 2);
    assert_eq!(listing.skipped, 0);
    assert_eq!(api.calls_for("match_ids"), vec!["puuid-b", "puuid-a", "puuid-a"]);

    assert_eq!(stored_records(&config(&temp_dir)).len(), 40);
}

#[tokio::test]
async fn test_missing_replacement_halts_and_next_run_resumes() {
    let temp_dir = TempDir::new().unwrap();
    let credential = Credential::new("key-1");
    let api = api(&credential);
    api.rotate_key_after(3, "key-2");

    let report = PipelineDriver::new(
        api.clone(),
        credential.clone(),
        Arc::new(StaticCredential),
        config(&temp_dir),
    )
    .run_all()
    .await
    .unwrap();

    assert_eq!(report.halted(), Some(HaltReason::CredentialUnavailable));
    assert_eq!(report.stages.len(), 2, "match details never started");
    let listing = report.stage(StageKind::MatchIds).unwrap();
    assert_eq!(listing.completed, 1);
    assert_eq!(listing.remaining, 1);
    assert!(stored_records(&config(&temp_dir)).is_empty());

    api.clear_calls();
    credential.replace("key-2");
    let resumed = PipelineDriver::new(
        api.clone(),
        credential.clone(),
        Arc::new(StaticCredential),
        config(&temp_dir),
    )
    .run_all()
    .await
    .unwrap();

    assert!(resumed.halted().is_none());
    assert!(api.calls_for("identity").is_empty());
    assert_eq!(api.calls_for("match_ids"), vec!["puuid-a"]);
    assert_eq!(stored_records(&config(&temp_dir)).len(), 40);
}

#[tokio::test]
async fn test_repeatedly_rejected_replacement_aborts() {
    let temp_dir = TempDir::new().unwrap();
    let credential = Credential::new("key-1");
    let api = api(&credential);
    api.rotate_key_after(0, "never-issued");

    let source: Arc<dyn CredentialSource> = Arc::new(FnCredentialSource::new(|expired: &str| {
        Some(format!("{expired}-next"))
    }));
    let result = PipelineDriver::new(api.clone(), credential.clone(), source, config(&temp_dir))
        .run_all()
        .await;

    match result {
        Err(HarvestError::CredentialRejected { stage, attempts }) => {
            assert_eq!(stage, "identities");
            assert_eq!(attempts, 3);
        }
        other => panic!("expected CredentialRejected, got {other:?}"),
    }
    assert_eq!(api.calls_for("identity"), vec!["alpha"; 4]);
}

#[tokio::test]
async fn test_concurrent_expiry_requeues_without_duplicates() {
    let temp_dir = TempDir::new().unwrap();
    let credential = Credential::new("key-1");
    let api = api(&credential);
    let config = config(&temp_dir).with_concurrency(4);

    PipelineDriver::new(
        api.clone(),
        credential.clone(),
        rotate_to("key-2"),
        config.clone(),
    )
    .run(&[StageKind::Identities, StageKind::MatchIds])
    .await
    .unwrap();

    api.clear_calls();
    api.rotate_key_after(3, "key-2");
    let report = PipelineDriver::new(
        api.clone(),
        credential.clone(),
        rotate_to("key-2"),
        config.clone(),
    )
    .run(&[StageKind::MatchDetails])
    .await
    .unwrap();

    let details = report.stage(StageKind::MatchDetails).unwrap();
    assert_eq!(details.credential_replacements, 1);
    assert_eq!(details.completed, 4);
    assert_eq!(details.skipped, 0);
    assert_eq!(details.remaining, 0);

    let records = stored_records(&config);
    let keys: HashSet<(String, u32)> = records
        .iter()
        .map(|r| (r.match_id.clone(), r.participant_id))
        .collect();
    assert_eq!(records.len(), 40);
    assert_eq!(keys.len(), 40);
}

#[tokio::test]
async fn test_credentials_file_supplies_replacement() {
    let temp_dir = TempDir::new().unwrap();
    let credentials_path = temp_dir.path().join("credentials.json");
    std::fs::write(&credentials_path, r#"{"riot_api_key": "key-2"}"#).unwrap();

    let credential = Credential::new("key-1");
    let api = api(&credential);
    api.rotate_key_after(1, "key-2");

    let chain: Vec<Box<dyn CredentialSource>> = vec![
        Box::new(FileCredentialSource::new(credentials_path.clone())),
        Box::new(StaticCredential),
    ];
    let source: Arc<dyn CredentialSource> = Arc::new(ChainedCredentialSource::new(chain));
    let report = PipelineDriver::new(api.clone(), credential.clone(), source, config(&temp_dir))
        .run_all()
        .await
        .unwrap();

    assert!(report.halted().is_none());
    assert_eq!(credential.current(), "key-2");
    assert_eq!(
        report.stage(StageKind::Identities).unwrap().credential_replacements,
        1
    );
    assert_eq!(stored_records(&config(&temp_dir)).len(), 40);
}
