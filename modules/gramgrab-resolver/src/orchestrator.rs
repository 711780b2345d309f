//! Sequential fallback over the strategy chain.
//!
//! `START → TRY_STRUCTURED → TRY_API → TRY_BROWSER → {SUCCESS | EXHAUSTED}`.
//! Strategies run strictly in cost order, never in parallel: spawning a
//! process or launching a browser is expensive enough that speculative racing
//! would be waste. A global watchdog bounds the whole chain; terminal signals
//! short-circuit it.

use std::sync::Arc;
use std::time::Duration;

use gramgrab_common::{Config, FetchError, MediaDescriptor};
use rapidapi_client::RapidApiClient;
use tracing::{info, warn};

use crate::strategy::{
    BrowserRenderStrategy, MediaStrategy, StructuredExtractorStrategy, ThirdPartyApiStrategy,
};
use crate::ytdlp::YtDlp;

pub struct Resolver {
    strategies: Vec<Arc<dyn MediaStrategy>>,
    browser: Option<Arc<BrowserRenderStrategy>>,
    deadline: Duration,
}

impl Resolver {
    /// Build the production chain. The API tier is only registered when a
    /// credential is configured; without one the chain skips straight from
    /// the extractor to the browser.
    pub fn from_config(cfg: &Config) -> Self {
        let tool = Arc::new(YtDlp::from_config(cfg));
        let browser = Arc::new(BrowserRenderStrategy::new(
            cfg.chrome_bin.clone(),
            cfg.debug_dir.clone(),
        ));

        let mut strategies: Vec<Arc<dyn MediaStrategy>> = Vec::new();
        strategies.push(Arc::new(StructuredExtractorStrategy::new(tool)));
        match &cfg.rapidapi_key {
            Some(key) => {
                strategies.push(Arc::new(ThirdPartyApiStrategy::new(RapidApiClient::new(
                    key.clone(),
                    cfg.rapidapi_host.clone(),
                ))));
            }
            None => info!("No data API key configured, skipping the API tier"),
        }
        strategies.push(browser.clone());

        Self {
            strategies,
            browser: Some(browser),
            deadline: Duration::from_secs(cfg.resolve_timeout_secs),
        }
    }

    /// Custom chain, primarily a test seam. Story resolution is unavailable
    /// without a browser tier.
    pub fn with_strategies(strategies: Vec<Arc<dyn MediaStrategy>>, deadline: Duration) -> Self {
        Self {
            strategies,
            browser: None,
            deadline,
        }
    }

    /// Resolve a post shortcode into one descriptor.
    pub async fn resolve_media(&self, shortcode: &str) -> Result<MediaDescriptor, FetchError> {
        match tokio::time::timeout(self.deadline, self.run_chain(shortcode)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(shortcode, deadline_secs = self.deadline.as_secs(), "Resolution watchdog expired");
                Err(FetchError::Timeout)
            }
        }
    }

    /// Stories never reach the structured tiers; they resolve through the
    /// browser alone, under the same watchdog.
    pub async fn resolve_story(&self, story_url: &str) -> Result<MediaDescriptor, FetchError> {
        let browser = self.browser.as_ref().ok_or_else(|| {
            FetchError::DownloadFailed("no browser tier configured".to_string())
        })?;

        let id = story_url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("story");

        match tokio::time::timeout(self.deadline, browser.resolve_url(story_url, id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(story_url, "Story resolution watchdog expired");
                Err(FetchError::Timeout)
            }
        }
    }

    async fn run_chain(&self, shortcode: &str) -> Result<MediaDescriptor, FetchError> {
        let mut last: Option<FetchError> = None;

        for strategy in &self.strategies {
            info!(shortcode, strategy = strategy.name(), "Trying strategy");
            match strategy.resolve(shortcode).await {
                Ok(descriptor) => {
                    info!(shortcode, strategy = strategy.name(), "Strategy succeeded");
                    return Ok(descriptor);
                }
                Err(e) if e.is_terminal() => {
                    // A confirmed-dead post cannot be recovered by any
                    // remaining strategy; stop scraping.
                    warn!(shortcode, strategy = strategy.name(), error = %e, "Terminal failure, short-circuiting");
                    return Err(e);
                }
                Err(e) => {
                    warn!(shortcode, strategy = strategy.name(), error = %e, "Strategy failed, falling back");
                    last = Some(match last {
                        Some(prev) => FetchError::more_specific(prev, e),
                        None => e,
                    });
                }
            }
        }

        Err(last.unwrap_or_else(|| {
            FetchError::DownloadFailed("no extraction strategies available".to_string())
        }))
    }
}
