//! Extraction strategies, ranked by cost.
//!
//! Each strategy is an independent capability; failure of one never prevents
//! invocation of the next. The orchestrator owns the ordering.

use async_trait::async_trait;
use gramgrab_common::{FetchError, MediaDescriptor, SourceStrategy};

pub mod api;
pub mod browser;
pub mod structured;

pub use api::ThirdPartyApiStrategy;
pub use browser::BrowserRenderStrategy;
pub use structured::StructuredExtractorStrategy;

#[async_trait]
pub trait MediaStrategy: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    fn source(&self) -> SourceStrategy;

    async fn resolve(&self, shortcode: &str) -> Result<MediaDescriptor, FetchError>;
}
