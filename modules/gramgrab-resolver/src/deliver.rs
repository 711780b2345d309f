//! Streams resolved assets back to the client.
//!
//! Routing rule: video goes through the extractor tool's own format
//! negotiation (the CDN rejects naive fetches of video URLs with 403), images
//! go out as direct authenticated CDN fetches. A failed direct fetch falls
//! over to the tool-mediated path when the original page URL is known.
//!
//! A `Delivery` is only handed out once the upstream source is producing
//! bytes; from that point failures can only truncate the stream, never turn
//! into structured error bodies. Dropping the body (client disconnect) tears
//! down any in-flight subprocess via kill-on-drop.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use gramgrab_common::{
    AssetKind, FetchError, ResolvedAsset, BROWSER_USER_AGENT, PLATFORM_REFERER,
};
use tracing::{info, warn};

pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// A ready-to-send download: headers decided, body flowing.
pub struct Delivery {
    pub filename: String,
    pub content_type: &'static str,
    pub body: ByteStream,
}

/// Fetches one CDN asset as a byte stream.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ByteStream, FetchError>;
}

/// Streams an asset by re-resolving its page through the extractor tool.
#[async_trait]
pub trait ToolStreamer: Send + Sync {
    async fn stream(&self, page_url: &str) -> Result<ByteStream, FetchError>;
}

// --- Direct CDN fetch ---

/// Direct fetch with a spoofed browser user agent and the platform referer.
/// CDN images are less aggressively protected than video, but still reject
/// anonymous clients.
pub struct CdnFetcher {
    client: reqwest::Client,
}

const CDN_TIMEOUT: Duration = Duration::from_secs(20);

impl CdnFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(CDN_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }
}

impl Default for CdnFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for CdnFetcher {
    async fn fetch(&self, url: &str) -> Result<ByteStream, FetchError> {
        let resp = self
            .client
            .get(url)
            .header("User-Agent", BROWSER_USER_AGENT)
            .header("Referer", PLATFORM_REFERER)
            .header("Accept", "*/*")
            .send()
            .await
            .map_err(|e| FetchError::DownloadFailed(format!("CDN request failed: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::DownloadFailed(format!(
                "CDN answered {status} for {url}"
            )));
        }

        let stream = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other));
        Ok(Box::pin(stream))
    }
}

// --- Streamer ---

pub struct Streamer {
    fetcher: Arc<dyn AssetFetcher>,
    tool: Arc<dyn ToolStreamer>,
}

impl Streamer {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, tool: Arc<dyn ToolStreamer>) -> Self {
        Self { fetcher, tool }
    }

    /// Resolve an asset into a flowing download with a deterministic filename.
    pub async fn stream(
        &self,
        asset: &ResolvedAsset,
        filename: &str,
    ) -> Result<Delivery, FetchError> {
        let content_type = content_type_for(filename);

        // Video is tool-mediated for codec/container consistency — unless the
        // URL was mined from rendered HTML, which the tool cannot re-resolve.
        if asset.kind == AssetKind::Video && !asset.direct {
            let page = asset
                .page_url
                .as_deref()
                .ok_or_else(|| {
                    FetchError::DownloadFailed("video asset without a page url".to_string())
                })?;
            info!(page, filename, "Routing video through the extractor tool");
            let body = self.tool.stream(page).await?;
            return Ok(Delivery {
                filename: filename.to_string(),
                content_type,
                body,
            });
        }

        info!(url = %asset.url, filename, "Routing asset to direct stream");
        match self.fetcher.fetch(&asset.url).await {
            Ok(body) => Ok(Delivery {
                filename: filename.to_string(),
                content_type,
                body,
            }),
            Err(e) => {
                // Expired or blocked CDN link; the original page may still be
                // servable through the tool.
                if let Some(page) = asset.page_url.as_deref() {
                    warn!(url = %asset.url, error = %e, "Direct stream failed, failing over to tool");
                    let body = self.tool.stream(page).await?;
                    Ok(Delivery {
                        filename: filename.to_string(),
                        content_type,
                        body,
                    })
                } else {
                    Err(e)
                }
            }
        }
    }
}

/// Best-effort content type from the download filename.
pub fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".mp4") {
        "video/mp4"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else if lower.ends_with(".zip") {
        "application/zip"
    } else {
        "image/jpeg"
    }
}

/// Image extension from the asset URL (the CDN serves webp alongside jpeg).
pub fn image_extension(url: &str) -> &'static str {
    if url.contains(".webp") {
        "webp"
    } else {
        "jpg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_match_asset_kinds() {
        assert_eq!(content_type_for("reel.mp4"), "video/mp4");
        assert_eq!(content_type_for("post_image.jpg"), "image/jpeg");
        assert_eq!(content_type_for("post_image.webp"), "image/webp");
        assert_eq!(content_type_for("carousel.zip"), "application/zip");
    }

    #[test]
    fn image_extension_detects_webp() {
        assert_eq!(image_extension("https://cdn/a.webp?x=1"), "webp");
        assert_eq!(image_extension("https://cdn/a.jpg"), "jpg");
    }
}
