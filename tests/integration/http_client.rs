//! HTTP client against a local stub server: credential header, query, status mapping

use super::support::spawn_stub;
use match_harvester::api::{
    ApiConfig, ApiError, Credential, ErrorKind, MatchApi, RiotHttpClient,
};
use match_harvester::harvest::{RateGovernor, WindowLimit};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn client(base_url: &str, credential: &Credential) -> (RiotHttpClient, Arc<RateGovernor>) {
    let governor = Arc::new(RateGovernor::new(
        WindowLimit::new(100, Duration::from_secs(1)),
        WindowLimit::new(1000, Duration::from_secs(120)),
    ));
    let mut config = ApiConfig::with_base_url(base_url);
    config.request_timeout = Duration::from_secs(5);
    let client = RiotHttpClient::new(config, credential.clone(), governor.clone()).unwrap();
    (client, governor)
}

#[tokio::test]
async fn test_resolve_identity_sends_current_key() {
    let (base_url, log) = spawn_stub(|_| {
        (200, r#"{"id":"enc-1","puuid":"puuid-1","summonerLevel":312}"#.to_string())
    })
    .await;
    let credential = Credential::new("key-1");
    let (client, governor) = client(&base_url, &credential);

    let puuid = client.resolve_identity("enc-1").await.unwrap();
    assert_eq!(puuid, "puuid-1");

    credential.replace("key-2");
    client.resolve_identity("enc-1").await.unwrap();

    let seen = log.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            "/lol/summoner/v4/summoners/enc-1 key-1",
            "/lol/summoner/v4/summoners/enc-1 key-2",
        ]
    );
    assert_eq!(governor.admitted().await, 2);
}

#[tokio::test]
async fn test_list_match_ids_sends_queue_and_count() {
    let (base_url, log) = spawn_stub(|_| (200, r#"["NA1_2","NA1_1"]"#.to_string())).await;
    let (client, _) = client(&base_url, &Credential::new("key-1"));

    let ids = client.list_match_ids("puuid-1", 420, 5).await.unwrap();
    assert_eq!(ids, vec!["NA1_2", "NA1_1"]);

    let seen = log.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec!["/lol/match/v5/matches/by-puuid/puuid-1/ids?queue=420&start=0&count=5 key-1"]
    );
}

#[tokio::test]
async fn test_error_statuses_are_classified() {
    let (base_url, _) = spawn_stub(|target| {
        let status = match target.rsplit('/').next().unwrap_or_default() {
            "expired" => 403,
            "unauthorized" => 401,
            "missing" => 404,
            "throttled" => 429,
            "broken" => 503,
            _ => 400,
        };
        (status, r#"{"status":{"message":"stub"}}"#.to_string())
    })
    .await;
    let (client, _) = client(&base_url, &Credential::new("key-1"));

    assert!(matches!(
        client.fetch_match("expired").await,
        Err(ApiError::CredentialExpired { status: 403 })
    ));
    assert!(matches!(
        client.fetch_match("unauthorized").await,
        Err(ApiError::CredentialExpired { status: 401 })
    ));
    assert!(matches!(
        client.fetch_match("missing").await,
        Err(ApiError::NotFound(_))
    ));
    assert!(matches!(
        client.fetch_match("throttled").await,
        Err(ApiError::RateLimitExceeded {
            retry_after: Some(3)
        })
    ));
    assert!(matches!(
        client.fetch_match("broken").await,
        Err(ApiError::ServerError { status: 503 })
    ));
    assert!(matches!(
        client.fetch_match("other").await,
        Err(ApiError::HttpError { status: 400, .. })
    ));
}

#[tokio::test]
async fn test_unexpected_body_is_parse_error() {
    let (base_url, _) = spawn_stub(|_| (200, r#"{"metadata":{}}"#.to_string())).await;
    let (client, _) = client(&base_url, &Credential::new("key-1"));

    let result = client.fetch_timeline("NA1_1").await;
    assert!(matches!(result, Err(ApiError::ParseError(_))), "{result:?}");
}

#[tokio::test]
async fn test_unreachable_host_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let (client, governor) = client(&base_url, &Credential::new("key-1"));
    let result = client.fetch_match("NA1_1").await;

    assert!(matches!(result, Err(ApiError::NetworkError(_))), "{result:?}");
    assert_eq!(governor.admitted().await, 1);
}

#[tokio::test]
async fn test_truncated_body_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 16 * 1024];
        let _ = socket.read(&mut buf).await;
        // Promise more bytes than are sent, then hang up
        let _ = socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 500\r\n\r\n{\"metadata\":",
            )
            .await;
        let _ = socket.shutdown().await;
    });

    let (client, _) = client(&base_url, &Credential::new("key-1"));
    let result = client.fetch_match("NA1_1").await;

    match result {
        Err(error @ ApiError::NetworkError(_)) => {
            assert_eq!(error.kind(), ErrorKind::Transient);
        }
        other => panic!("expected NetworkError, got {other:?}"),
    }
}
