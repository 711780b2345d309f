pub mod error;

pub use error::{RapidApiError, Result};

use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

/// Known endpoint path shapes for the post-info operation. The provider's
/// schema drifts, so each shape is tried in order against the same host.
const ENDPOINT_SHAPES: &[&str] = &["/v1/post_info", "/post/info", "/v1/info", "/ig/info_2/"];

/// Per-attempt network bound. Exceeding it advances to the next shape.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Base backoff when a shape answers 429. Actual delay is base * 2^attempt
/// plus random jitter (0-500ms).
const RATE_LIMIT_BACKOFF_BASE: Duration = Duration::from_secs(2);

/// Retries per shape after a rate-limit response.
const RATE_LIMIT_MAX_ATTEMPTS: u32 = 2;

pub struct RapidApiClient {
    client: reqwest::Client,
    key: String,
    host: String,
}

impl RapidApiClient {
    pub fn new(key: String, host: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self { client, key, host }
    }

    /// Fetch raw post info for a shortcode, trying every known endpoint shape
    /// in sequence and accepting the first body that carries a recognized
    /// top-level marker. Exhausting all shapes is a hard failure.
    pub async fn post_info(&self, shortcode: &str) -> Result<serde_json::Value> {
        info!(shortcode, host = %self.host, "Querying data API");

        let mut rate_limited = false;

        for shape in ENDPOINT_SHAPES {
            let url = format!("https://{}{}", self.host, shape);
            match self.try_endpoint(&url, shortcode).await {
                Ok(Some(body)) => {
                    info!(shortcode, endpoint = %url, "Data API returned a usable body");
                    return Ok(body);
                }
                Ok(None) => {
                    warn!(shortcode, endpoint = %url, "Response body carries no known marker");
                }
                Err(RapidApiError::RateLimited) => {
                    rate_limited = true;
                    warn!(shortcode, endpoint = %url, "Endpoint rate limited after backoff");
                }
                Err(e) => {
                    warn!(shortcode, endpoint = %url, error = %e, "Endpoint failed");
                }
            }
        }

        if rate_limited {
            Err(RapidApiError::RateLimited)
        } else {
            Err(RapidApiError::Exhausted)
        }
    }

    /// One endpoint shape, with a bounded exponential backoff retry when the
    /// provider answers 429. Returns `Ok(None)` for well-formed bodies that
    /// carry none of the recognized markers.
    async fn try_endpoint(&self, url: &str, shortcode: &str) -> Result<Option<serde_json::Value>> {
        for attempt in 0..RATE_LIMIT_MAX_ATTEMPTS {
            let resp = self
                .client
                .get(url)
                .query(&[("shortcode", shortcode)])
                .header("x-rapidapi-key", &self.key)
                .header("x-rapidapi-host", &self.host)
                .send()
                .await?;

            let status = resp.status();
            if status.as_u16() == 429 {
                if attempt + 1 < RATE_LIMIT_MAX_ATTEMPTS {
                    let backoff = RATE_LIMIT_BACKOFF_BASE * 2u32.pow(attempt);
                    let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                    warn!(
                        endpoint = %url,
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs(),
                        "Data API rate limited, retrying after backoff"
                    );
                    tokio::time::sleep(backoff + jitter).await;
                    continue;
                }
                return Err(RapidApiError::RateLimited);
            }

            if !status.is_success() {
                let message = resp.text().await.unwrap_or_default();
                return Err(RapidApiError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let body: serde_json::Value = resp.json().await?;
            return Ok(if has_known_marker(&body) {
                Some(body)
            } else {
                None
            });
        }

        Err(RapidApiError::RateLimited)
    }
}

/// A response is usable when its top level carries any of the markers the
/// provider has been observed to use across schema revisions.
fn has_known_marker(body: &serde_json::Value) -> bool {
    body.get("items").is_some() || body.get("data").is_some() || body.get("shortcode").is_some()
}
