//! Tier 1: the external metadata-extraction tool.

use std::sync::Arc;

use async_trait::async_trait;
use gramgrab_common::{canonical_post_url, FetchError, MediaDescriptor, SourceStrategy};

use crate::normalize;
use crate::strategy::MediaStrategy;
use crate::ytdlp::YtDlp;

pub struct StructuredExtractorStrategy {
    tool: Arc<YtDlp>,
}

impl StructuredExtractorStrategy {
    pub fn new(tool: Arc<YtDlp>) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl MediaStrategy for StructuredExtractorStrategy {
    fn name(&self) -> &'static str {
        "structured-extractor"
    }

    fn source(&self) -> SourceStrategy {
        SourceStrategy::StructuredExtractor
    }

    async fn resolve(&self, shortcode: &str) -> Result<MediaDescriptor, FetchError> {
        let url = canonical_post_url(shortcode);
        let raw = self.tool.dump_json(&url).await?;
        normalize::from_ytdlp(&raw, shortcode)
    }
}
