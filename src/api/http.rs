//! HTTP implementation of [`MatchApi`]
//!
//! Every request passes through the shared [`RateGovernor`] first and carries the current
//! credential in a header. Failures are not retried here: the status is classified into an
//! [`ApiError`] and the pipeline decides what to do with the unit.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

use super::config::ApiConfig;
use super::credential::Credential;
use super::models::{MatchDto, SummonerDto, TimelineDto};
use super::{ApiError, ApiResult, MatchApi};
use crate::harvest::RateGovernor;
use crate::metrics::HttpRequestMetrics;

/// HTTP client for the summoner and match endpoints
pub struct RiotHttpClient {
    client: Client,
    config: ApiConfig,
    credential: Credential,
    governor: Arc<RateGovernor>,
}

impl RiotHttpClient {
    /// Create a client sharing `credential` and `governor` with the rest of the run
    pub fn new(
        config: ApiConfig,
        credential: Credential,
        governor: Arc<RateGovernor>,
    ) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::NetworkError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            credential,
            governor,
        })
    }

    /// Endpoint configuration
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// GET `url` with query `params`, classify the status and decode the body.
    ///
    /// `endpoint` is a low-cardinality label for metrics and logs.
    async fn get<T>(&self, endpoint: &'static str, url: &str, params: &[(&str, String)]) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        self.governor.acquire().await;

        let request_metrics = HttpRequestMetrics::start(endpoint);
        debug!(endpoint, url, "Sending request");

        let response = match self
            .client
            .get(url)
            .header(self.config.credential_header.as_str(), self.credential.current())
            .query(params)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                request_metrics.record_network_error();
                return Err(ApiError::NetworkError(e.to_string()));
            }
        };

        let status = response.status();
        request_metrics.record_complete(status.as_u16());

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        if let Some(error) = classify_status(status, retry_after, url) {
            if let ApiError::RateLimitExceeded { retry_after } = &error {
                warn!(endpoint, ?retry_after, "Upstream rate limit hit despite governor");
            }
            return Err(error);
        }

        response
            .json::<T>()
            .await
            .map_err(|e| body_error(endpoint, e))
    }
}

/// A body that arrived but did not decode is malformed; a body that could not be read
/// (timeout, reset, truncation) is a network failure.
fn body_error(endpoint: &str, error: reqwest::Error) -> ApiError {
    if error.is_decode() {
        ApiError::ParseError(format!("Failed to decode {endpoint} response: {error}"))
    } else {
        warn!(endpoint, error = %error, "Response body could not be read");
        ApiError::NetworkError(format!("Failed to read {endpoint} response: {error}"))
    }
}

/// Map a non-success status to the error the pipeline reacts to; `None` for success.
pub fn classify_status(
    status: StatusCode,
    retry_after: Option<u64>,
    context: &str,
) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }

    let code = status.as_u16();
    let error = match code {
        401 | 403 => ApiError::CredentialExpired { status: code },
        404 => ApiError::NotFound(context.to_string()),
        429 => ApiError::RateLimitExceeded { retry_after },
        _ if status.is_server_error() => ApiError::ServerError { status: code },
        _ => ApiError::HttpError {
            status: code,
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        },
    };
    Some(error)
}

#[async_trait]
impl MatchApi for RiotHttpClient {
    async fn resolve_identity(&self, seed: &str) -> ApiResult<String> {
        let url = self.config.summoner_url(seed);
        let summoner: SummonerDto = self.get("summoner", &url, &[]).await?;
        Ok(summoner.puuid)
    }

    async fn list_match_ids(
        &self,
        identifier: &str,
        queue: u32,
        count: u32,
    ) -> ApiResult<Vec<String>> {
        let url = self.config.match_ids_url(identifier);
        let params = [
            ("queue", queue.to_string()),
            ("start", "0".to_string()),
            ("count", count.to_string()),
        ];
        self.get("match_ids", &url, &params).await
    }

    async fn fetch_match(&self, match_id: &str) -> ApiResult<MatchDto> {
        let url = self.config.match_url(match_id);
        self.get("match", &url, &[]).await
    }

    async fn fetch_timeline(&self, match_id: &str) -> ApiResult<TimelineDto> {
        let url = self.config.timeline_url(match_id);
        self.get("timeline", &url, &[]).await
    }
}
