//! Tier 2: the paid third-party data API.

use async_trait::async_trait;
use gramgrab_common::{FetchError, MediaDescriptor, SourceStrategy};
use rapidapi_client::{RapidApiClient, RapidApiError};

use crate::normalize;
use crate::strategy::MediaStrategy;

pub struct ThirdPartyApiStrategy {
    client: RapidApiClient,
}

impl ThirdPartyApiStrategy {
    pub fn new(client: RapidApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaStrategy for ThirdPartyApiStrategy {
    fn name(&self) -> &'static str {
        "third-party-api"
    }

    fn source(&self) -> SourceStrategy {
        SourceStrategy::ThirdPartyApi
    }

    async fn resolve(&self, shortcode: &str) -> Result<MediaDescriptor, FetchError> {
        let raw = self
            .client
            .post_info(shortcode)
            .await
            .map_err(map_api_error)?;
        normalize::from_api(&raw, shortcode)
    }
}

/// API-tier failures are never terminal: a 404 from one endpoint shape says
/// more about the provider's schema drift than about the post.
fn map_api_error(err: RapidApiError) -> FetchError {
    match err {
        RapidApiError::RateLimited => FetchError::RateLimited,
        other => FetchError::DownloadFailed(other.to_string()),
    }
}
