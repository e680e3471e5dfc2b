//! Endpoint configuration
//!
//! Summoner lookups go to a platform host (e.g. `na1`), match data to a regional routing host
//! (e.g. `americas`). Paths are fixed per API version; hosts and the credential header are
//! configurable.

use reqwest::Url;
use std::time::Duration;

/// Path segments of the summoner lookup by encrypted summoner id
pub const SUMMONER_ENDPOINT: &[&str] = &["lol", "summoner", "v4", "summoners"];

/// Path segments of match listing and match data
pub const MATCHES_ENDPOINT: &[&str] = &["lol", "match", "v5", "matches"];

/// Header carrying the API key
pub const DEFAULT_CREDENTIAL_HEADER: &str = "X-Riot-Token";

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Upstream host configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Platform host base URL (e.g. <https://na1.api.riotgames.com>)
    pub platform_url: String,
    /// Regional routing base URL (e.g. <https://americas.api.riotgames.com>)
    pub regional_url: String,
    /// Header name carrying the credential
    pub credential_header: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl ApiConfig {
    /// Configuration for a platform (`na1`, `euw1`, ...) and routing region (`americas`, ...)
    pub fn for_routing(platform: &str, region: &str) -> Self {
        Self {
            platform_url: format!("https://{}.api.riotgames.com", platform.to_lowercase()),
            regional_url: format!("https://{}.api.riotgames.com", region.to_lowercase()),
            credential_header: DEFAULT_CREDENTIAL_HEADER.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Point both hosts at one base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            platform_url: base_url.clone(),
            regional_url: base_url,
            ..Self::default()
        }
    }

    /// URL resolving a seed identifier
    pub fn summoner_url(&self, seed: &str) -> String {
        endpoint_url(&self.platform_url, SUMMONER_ENDPOINT, &[seed])
    }

    /// URL listing match ids for an identifier
    pub fn match_ids_url(&self, identifier: &str) -> String {
        endpoint_url(&self.regional_url, MATCHES_ENDPOINT, &["by-puuid", identifier, "ids"])
    }

    /// URL of a match summary
    pub fn match_url(&self, match_id: &str) -> String {
        endpoint_url(&self.regional_url, MATCHES_ENDPOINT, &[match_id])
    }

    /// URL of a match timeline
    pub fn timeline_url(&self, match_id: &str) -> String {
        endpoint_url(&self.regional_url, MATCHES_ENDPOINT, &[match_id, "timeline"])
    }
}

/// Append `endpoint` and `segments` to `base`, percent-encoding each segment.
///
/// An unparsable base is joined verbatim; the request then fails as a network error.
fn endpoint_url(base: &str, endpoint: &[&str], segments: &[&str]) -> String {
    let parts = endpoint.iter().chain(segments);
    match Url::parse(base) {
        Ok(mut url) => {
            if let Ok(mut path) = url.path_segments_mut() {
                path.pop_if_empty().extend(parts);
            }
            url.into()
        }
        Err(_) => {
            let path: Vec<&str> = parts.copied().collect();
            format!("{}/{}", base.trim_end_matches('/'), path.join("/"))
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::for_routing("na1", "americas")
    }
}
