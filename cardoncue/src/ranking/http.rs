//! HTTP ranking client.
//!
//! Posts the current position and interest tags to the backend's region
//! refresh endpoint and decodes the ranked region list.
//!
//! # Wire Format
//!
//! ```text
//! POST {endpoint}
//! { "latitude": 37.77, "longitude": -122.41,
//!   "interest_tags": ["costco", "shell"], "max_results": 20 }
//!
//! 200 OK
//! { "regions": [ { "id": "...", "latitude": ..., "longitude": ...,
//!                  "radius_meters": 150.0, "priority": 0.93 } ] }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{BoxFuture, RankedRegion, RankingError, RegionRankingClient};
use crate::geo::GeoPoint;

/// Default HTTP timeout for ranking requests.
pub const DEFAULT_RANKING_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum bytes of an error body kept in [`RankingError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Request body sent to the ranking endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub interest_tags: Vec<String>,
    pub max_results: usize,
}

/// Response body returned by the ranking endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResponse {
    #[serde(default)]
    pub regions: Vec<RankedRegion>,
}

impl RankingResponse {
    /// Decode a response body.
    pub fn parse(body: &[u8]) -> Result<Self, RankingError> {
        serde_json::from_slice(body).map_err(|e| RankingError::Decode(e.to_string()))
    }
}

/// Ranking client backed by an HTTP endpoint.
pub struct HttpRankingClient {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpRankingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRankingClient")
            .field("endpoint", &self.endpoint)
            .field("has_token", &self.api_token.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpRankingClient {
    /// Create a client for `endpoint` with the default timeout.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, RankingError> {
        Self::with_timeout(endpoint, DEFAULT_RANKING_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RankingError> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(RankingError::Unavailable(
                "ranking endpoint is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                RankingError::Unavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            endpoint,
            api_token: None,
            timeout,
        })
    }

    /// Attach a bearer token sent with every request.
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// The configured endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, request: RankingRequest) -> Result<Vec<RankedRegion>, RankingError> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(ref token) = self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;

        if !status.is_success() {
            let mut text = String::from_utf8_lossy(&body).into_owned();
            if text.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(RankingError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let mut regions = RankingResponse::parse(&body)?.regions;
        regions.truncate(request.max_results);
        Ok(regions)
    }

    fn map_error(&self, e: reqwest::Error) -> RankingError {
        if e.is_timeout() {
            RankingError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            RankingError::Http(e.to_string())
        }
    }
}

impl RegionRankingClient for HttpRankingClient {
    fn rank<'a>(
        &'a self,
        position: GeoPoint,
        interest_tags: &'a [String],
        max_results: usize,
    ) -> BoxFuture<'a, Result<Vec<RankedRegion>, RankingError>> {
        let request = RankingRequest {
            latitude: position.latitude,
            longitude: position.longitude,
            interest_tags: interest_tags.to_vec(),
            max_results,
        };
        Box::pin(self.post(request))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response() {
        let body = br#"{"regions": [
            {"id": "a", "latitude": 1.0, "longitude": 2.0, "radius_meters": 150.0, "priority": 0.9},
            {"id": "b", "latitude": 3.0, "longitude": 4.0}
        ]}"#;
        let response = RankingResponse::parse(body).unwrap();
        assert_eq!(response.regions.len(), 2);
        assert_eq!(response.regions[0].radius_meters, Some(150.0));
        assert_eq!(response.regions[1].priority, 0.0);
    }

    #[test]
    fn test_parse_empty_object() {
        let response = RankingResponse::parse(b"{}").unwrap();
        assert!(response.regions.is_empty());
    }

    #[test]
    fn test_parse_invalid_body() {
        let err = RankingResponse::parse(b"<html>").unwrap_err();
        assert!(matches!(err, RankingError::Decode(_)));
    }

    #[test]
    fn test_request_serialization() {
        let request = RankingRequest {
            latitude: 1.5,
            longitude: -2.5,
            interest_tags: vec!["costco".into()],
            max_results: 20,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["max_results"], 20);
        assert_eq!(json["interest_tags"][0], "costco");
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let err = HttpRankingClient::new("  ").unwrap_err();
        assert!(matches!(err, RankingError::Unavailable(_)));
    }

    #[test]
    fn test_client_debug_hides_token() {
        let client = HttpRankingClient::new("https://example.com/api/regions/refresh")
            .unwrap()
            .with_api_token("secret");
        let debug = format!("{:?}", client);
        assert!(debug.contains("has_token: true"));
        assert!(!debug.contains("secret"));
    }
}
