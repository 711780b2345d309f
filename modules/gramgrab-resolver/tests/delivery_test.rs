//! Delivery routing and fail-over with mock backends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use gramgrab_common::{AssetKind, FetchError, ResolvedAsset};
use gramgrab_resolver::{AssetFetcher, ByteStream, Streamer, ToolStreamer};

// ---------------------------------------------------------------------------
// Mock backends
// ---------------------------------------------------------------------------

fn body_of(payload: &'static [u8]) -> ByteStream {
    Box::pin(futures::stream::once(async move {
        Ok(Bytes::from_static(payload))
    }))
}

struct MockFetcher {
    payload: Option<&'static [u8]>,
    calls: Arc<AtomicUsize>,
}

impl MockFetcher {
    fn serving(payload: &'static [u8]) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                payload: Some(payload),
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn blocked() -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                payload: None,
                calls: calls.clone(),
            }),
            calls,
        )
    }
}

#[async_trait]
impl AssetFetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<ByteStream, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.payload {
            Some(payload) => Ok(body_of(payload)),
            None => Err(FetchError::DownloadFailed(format!(
                "CDN answered 403 Forbidden for {url}"
            ))),
        }
    }
}

struct MockTool {
    payload: &'static [u8],
    calls: Arc<AtomicUsize>,
}

impl MockTool {
    fn serving(payload: &'static [u8]) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                payload,
                calls: calls.clone(),
            }),
            calls,
        )
    }
}

#[async_trait]
impl ToolStreamer for MockTool {
    async fn stream(&self, _page_url: &str) -> Result<ByteStream, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(body_of(self.payload))
    }
}

async fn collect(mut body: ByteStream) -> Vec<u8> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        buf.extend_from_slice(&chunk.unwrap());
    }
    buf
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn video_always_routes_through_the_tool() {
    let (fetcher, direct_calls) = MockFetcher::serving(b"direct");
    let (tool, tool_calls) = MockTool::serving(b"tool bytes");
    let streamer = Streamer::new(fetcher, tool);

    let asset = ResolvedAsset::new(
        "https://cdn/video.mp4",
        AssetKind::Video,
        Some("https://www.instagram.com/p/ABC123/".to_string()),
    );
    let delivery = streamer.stream(&asset, "post_video.mp4").await.unwrap();

    assert_eq!(delivery.filename, "post_video.mp4");
    assert_eq!(delivery.content_type, "video/mp4");
    assert_eq!(collect(delivery.body).await, b"tool bytes");
    assert_eq!(direct_calls.load(Ordering::SeqCst), 0);
    assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn html_mined_video_is_fetched_directly() {
    let (fetcher, direct_calls) = MockFetcher::serving(b"story bytes");
    let (tool, tool_calls) = MockTool::serving(b"tool bytes");
    let streamer = Streamer::new(fetcher, tool);

    let asset = ResolvedAsset::new(
        "https://cdn/story.mp4",
        AssetKind::Video,
        Some("https://www.instagram.com/stories/user/1/".to_string()),
    )
    .direct();
    let delivery = streamer.stream(&asset, "story_video.mp4").await.unwrap();

    assert_eq!(collect(delivery.body).await, b"story bytes");
    assert_eq!(direct_calls.load(Ordering::SeqCst), 1);
    assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn image_goes_out_as_a_direct_fetch() {
    let (fetcher, direct_calls) = MockFetcher::serving(b"jpeg bytes");
    let (tool, tool_calls) = MockTool::serving(b"tool bytes");
    let streamer = Streamer::new(fetcher, tool);

    let asset = ResolvedAsset::new("https://cdn/post.jpg", AssetKind::Image, None);
    let delivery = streamer.stream(&asset, "post_image.jpg").await.unwrap();

    assert_eq!(delivery.content_type, "image/jpeg");
    assert_eq!(collect(delivery.body).await, b"jpeg bytes");
    assert_eq!(direct_calls.load(Ordering::SeqCst), 1);
    assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
}

// ---------------------------------------------------------------------------
// Fail-over
// ---------------------------------------------------------------------------

#[tokio::test]
async fn blocked_image_fails_over_to_the_tool_path() {
    let (fetcher, direct_calls) = MockFetcher::blocked();
    let (tool, tool_calls) = MockTool::serving(b"rescued bytes");
    let streamer = Streamer::new(fetcher, tool);

    let asset = ResolvedAsset::new(
        "https://cdn/expired.jpg",
        AssetKind::Image,
        Some("https://www.instagram.com/p/ABC123/".to_string()),
    );
    let delivery = streamer.stream(&asset, "post_image.jpg").await.unwrap();

    assert_eq!(collect(delivery.body).await, b"rescued bytes");
    assert_eq!(direct_calls.load(Ordering::SeqCst), 1);
    assert_eq!(tool_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blocked_image_without_a_page_url_surfaces_the_error() {
    let (fetcher, _) = MockFetcher::blocked();
    let (tool, tool_calls) = MockTool::serving(b"never");
    let streamer = Streamer::new(fetcher, tool);

    let asset = ResolvedAsset::new("https://cdn/expired.jpg", AssetKind::Image, None);
    let result = streamer.stream(&asset, "post_image.jpg").await;

    assert!(matches!(result, Err(FetchError::DownloadFailed(_))));
    assert_eq!(tool_calls.load(Ordering::SeqCst), 0);
}
