//! Overpass API query construction and resilient fetching across
//! redundant mirrors.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::geometry::BoundingBox;
use crate::poi::PoiCategory;

/// Endpoint list and retry policy for the fetch client. Endpoints are
/// tried in priority order; each gets `max_retries + 1` attempts before
/// the next one is considered.
#[derive(Debug, Clone)]
pub struct OverpassConfig {
    /// Mirror addresses in priority order.
    pub endpoints: Vec<String>,
    /// Timeout for a single request attempt.
    pub request_timeout: Duration,
    /// Retries per endpoint after the first attempt.
    pub max_retries: u32,
    /// Base wait after a 429 or 504, scaled by the attempt number.
    pub rate_limit_backoff: Duration,
    /// Base wait after any other failure, scaled by the attempt number.
    pub retry_backoff: Duration,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "https://overpass-api.de/api/interpreter".to_string(),
                "https://overpass.kumi.systems/api/interpreter".to_string(),
                "https://maps.mail.ru/osm/tools/overpass/api/interpreter".to_string(),
            ],
            request_timeout: Duration::from_secs(60),
            max_retries: 2,
            rate_limit_backoff: Duration::from_secs(2),
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Every configured endpoint exhausted its retries. Carries the last
/// observed underlying error; no partial results are returned.
#[derive(Debug, Error)]
#[error("all {attempted} Overpass endpoints failed")]
pub struct FetchError {
    pub attempted: usize,
    #[source]
    pub last_error: anyhow::Error,
}

#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<OverpassElement>,
}

/// One element of an Overpass JSON response. Only nodes are used; other
/// element types are ignored by the distance filter.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub id: u64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// Builds a single Overpass QL query: one node clause per requested
/// category, each scoped to the same bounding box, combined as
/// alternatives in one union.
pub fn build_query(bbox: &BoundingBox, categories: &[PoiCategory], timeout_secs: u64) -> String {
    let bbox_str = format!("{},{},{},{}", bbox.south, bbox.west, bbox.north, bbox.east);

    let clauses: Vec<String> = categories
        .iter()
        .filter_map(|category| category.overpass_clause())
        .map(|clause| format!("  {}({});", clause, bbox_str))
        .collect();

    format!(
        "[out:json][timeout:{}];\n(\n{}\n);\nout body;",
        timeout_secs,
        clauses.join("\n")
    )
}

/// Raw HTTP outcome of one endpoint attempt, before status handling.
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Transport seam for the fetch client, so tests can inject a fake
/// instead of a live HTTP stack.
#[async_trait]
pub trait OverpassTransport: Send + Sync {
    async fn execute(&self, endpoint: &str, query: &str, timeout: Duration) -> Result<RawResponse>;
}

/// reqwest-backed transport posting the query as the form-encoded `data`
/// field.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OverpassTransport for HttpTransport {
    async fn execute(&self, endpoint: &str, query: &str, timeout: Duration) -> Result<RawResponse> {
        let response = self
            .client
            .post(endpoint)
            .form(&[("data", query)])
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("request to {} failed", endpoint))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .with_context(|| format!("reading response body from {} failed", endpoint))?;

        Ok(RawResponse { status, body })
    }
}

enum AttemptError {
    /// HTTP 429 or 504; retried on the longer backoff.
    RateLimited(anyhow::Error),
    /// Timeout, connection failure, other non-2xx status or undecodable
    /// body; retried on the shorter backoff.
    Other(anyhow::Error),
}

impl AttemptError {
    fn inner(&self) -> &anyhow::Error {
        match self {
            AttemptError::RateLimited(e) | AttemptError::Other(e) => e,
        }
    }

    fn into_inner(self) -> anyhow::Error {
        match self {
            AttemptError::RateLimited(e) | AttemptError::Other(e) => e,
        }
    }
}

/// Fetch client that spreads availability across unreliable mirrors: the
/// first successful endpoint wins, and a failure is only surfaced once
/// every endpoint has exhausted its retries.
pub struct OverpassClient {
    config: OverpassConfig,
    transport: Box<dyn OverpassTransport>,
}

impl OverpassClient {
    pub fn new(config: OverpassConfig) -> Self {
        Self {
            config,
            transport: Box::new(HttpTransport::new()),
        }
    }

    pub fn with_transport(config: OverpassConfig, transport: Box<dyn OverpassTransport>) -> Self {
        Self { config, transport }
    }

    /// Runs the query against each endpoint in priority order and returns
    /// the elements from the first success. Retries and endpoint
    /// fallbacks are strictly sequential; at most one request is in
    /// flight at a time.
    pub async fn fetch(&self, query: &str) -> Result<Vec<OverpassElement>, FetchError> {
        let mut last_error = anyhow!("no endpoints configured");

        for endpoint in &self.config.endpoints {
            debug!("Trying Overpass endpoint {}", endpoint);
            match self.fetch_from_endpoint(endpoint, query).await {
                Ok(elements) => return Ok(elements),
                Err(e) => {
                    warn!("Endpoint {} failed: {:#}", endpoint, e);
                    last_error = e;
                }
            }
        }

        Err(FetchError {
            attempted: self.config.endpoints.len(),
            last_error,
        })
    }

    async fn fetch_from_endpoint(&self, endpoint: &str, query: &str) -> Result<Vec<OverpassElement>> {
        let mut attempt: u32 = 0;
        loop {
            let error = match self.attempt(endpoint, query).await {
                Ok(elements) => return Ok(elements),
                Err(e) => e,
            };

            if attempt >= self.config.max_retries {
                return Err(error.into_inner());
            }

            let backoff = match &error {
                AttemptError::RateLimited(_) => self.config.rate_limit_backoff * (attempt + 1),
                AttemptError::Other(_) => self.config.retry_backoff * (attempt + 1),
            };
            debug!(
                "Attempt {} on {} failed ({:#}), retrying in {:?}",
                attempt + 1,
                endpoint,
                error.inner(),
                backoff
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, endpoint: &str, query: &str) -> Result<Vec<OverpassElement>, AttemptError> {
        let response = self
            .transport
            .execute(endpoint, query, self.config.request_timeout)
            .await
            .map_err(AttemptError::Other)?;

        match response.status {
            429 | 504 => {
                return Err(AttemptError::RateLimited(anyhow!(
                    "HTTP {} from {}",
                    response.status,
                    endpoint
                )));
            }
            s if !(200..300).contains(&s) => {
                return Err(AttemptError::Other(anyhow!("HTTP {} from {}", s, endpoint)));
            }
            _ => {}
        }

        let parsed: OverpassResponse = serde_json::from_str(&response.body).map_err(|e| {
            AttemptError::Other(anyhow!("invalid Overpass response from {}: {}", endpoint, e))
        })?;

        Ok(parsed.elements)
    }
}
