//! Argument parsing and the configuration derived from it

use clap::Parser;
use match_harvester::cli::{Cli, Commands, OutputFormat};
use match_harvester::harvest::config::{
    DEFAULT_MATCH_COUNT, DEFAULT_SHARD_CAPACITY, RANKED_SOLO_QUEUE,
};
use match_harvester::harvest::IdentityDedup;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn test_defaults() {
    let cli = Cli::try_parse_from(["match-harvester", "--api-key", "k", "run"]).unwrap();

    assert!(matches!(cli.command, Commands::Run { reindex: false }));
    assert_eq!(cli.output_format, OutputFormat::Human);
    assert_eq!(cli.concurrency, 1);

    let config = cli.harvest_config(false);
    assert_eq!(config.queue, RANKED_SOLO_QUEUE);
    assert_eq!(config.match_count, DEFAULT_MATCH_COUNT);
    assert_eq!(config.shard_capacity, DEFAULT_SHARD_CAPACITY);
    assert_eq!(config.identity_dedup, IdentityDedup::PerSeed);
    assert_eq!(config.rate.short.window, Duration::from_secs(1));
    assert_eq!(config.rate.long.window, Duration::from_secs(120));
}

#[test]
fn test_rate_windows_from_flags() {
    let cli = Cli::try_parse_from([
        "match-harvester",
        "--short-limit",
        "500",
        "--short-window-secs",
        "10",
        "--long-limit",
        "30000",
        "--long-window-secs",
        "600",
        "identities",
    ])
    .unwrap();

    let rate = cli.rate_config();
    assert_eq!(rate.short.max_requests, 500);
    assert_eq!(rate.short.window, Duration::from_secs(10));
    assert_eq!(rate.long.max_requests, 30_000);
    assert_eq!(rate.long.window, Duration::from_secs(600));
}

#[test]
fn test_explicit_seed_file_wins() {
    let cli = Cli::try_parse_from([
        "match-harvester",
        "--data-dir",
        "/srv/harvest",
        "--seeds",
        "/etc/seeds.json",
        "match-details",
    ])
    .unwrap();
    assert_eq!(cli.seed_file(), PathBuf::from("/etc/seeds.json"));
    assert!(matches!(cli.command, Commands::MatchDetails));
}

#[test]
fn test_routing_builds_hosts() {
    let cli = Cli::try_parse_from([
        "match-harvester",
        "--platform",
        "EUW1",
        "--region",
        "europe",
        "identities",
    ])
    .unwrap();

    let api = cli.api_config();
    assert_eq!(api.platform_url, "https://euw1.api.riotgames.com");
    assert_eq!(api.regional_url, "https://europe.api.riotgames.com");
}

#[test]
fn test_initial_key_from_credentials_file() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("credentials.json");
    std::fs::write(&path, r#"{"riot_api_key": "RGAPI-from-file"}"#).unwrap();

    let cli = Cli::try_parse_from([
        "match-harvester",
        "--credentials-file",
        path.to_str().unwrap(),
        "identities",
    ])
    .unwrap();
    // RIOT_API_KEY in the environment would take precedence
    if cli.api_key.is_none() {
        assert_eq!(cli.initial_key().unwrap(), "RGAPI-from-file");
    }
}

#[test]
fn test_invalid_values_rejected() {
    for args in [
        vec!["match-harvester", "--concurrency", "0", "run"],
        vec!["match-harvester", "--match-count", "0", "run"],
        vec!["match-harvester", "--short-window-secs", "0", "run"],
        vec!["match-harvester", "--long-window-secs", "0", "run"],
        vec!["match-harvester", "--identity-dedup", "sometimes", "run"],
        vec!["match-harvester", "--output-format", "yaml", "run"],
        vec!["match-harvester", "--metrics-addr", "not-an-addr", "run"],
    ] {
        assert!(Cli::try_parse_from(args.clone()).is_err(), "{args:?} should be rejected");
    }
}

#[test]
fn test_export_requires_output() {
    assert!(Cli::try_parse_from(["match-harvester", "export"]).is_err());

    let cli = Cli::try_parse_from(["match-harvester", "export", "-o", "out.csv"]).unwrap();
    match cli.command {
        Commands::Export(export) => assert_eq!(export.output, PathBuf::from("out.csv")),
        other => panic!("unexpected command {other:?}"),
    }
}
