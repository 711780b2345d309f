use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gramgrab_common::{
    canonical_post_url, AssetKind, Config, FetchError, MediaDescriptor, MediaKind, ResolvedAsset,
};
use gramgrab_resolver::archive::{pack_carousel, ARCHIVE_FILENAME};
use gramgrab_resolver::deliver::{content_type_for, image_extension};
use gramgrab_resolver::{CdnFetcher, Delivery, Resolver, Streamer, YtDlp};

// --- App State ---

struct AppState {
    resolver: Resolver,
    streamer: Streamer,
    fetcher: Arc<CdnFetcher>,
}

// --- Main ---

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gramgrab=info".parse()?))
        .init();

    let config = Config::from_env();

    let fetcher = Arc::new(CdnFetcher::new());
    let tool = Arc::new(YtDlp::from_config(&config));
    let state = Arc::new(AppState {
        resolver: Resolver::from_config(&config),
        streamer: Streamer::new(fetcher.clone(), tool),
        fetcher,
    });

    let app = Router::new()
        .route("/api/preview", post(preview))
        .route("/resolve", post(resolve))
        .route("/api/download", post(download))
        .route("/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
        // Logging layer: method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Gramgrab server starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- URL classification ---

/// What an inbound platform URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum UrlTarget {
    Post(String),
    Reel(String),
    Igtv(String),
    /// Stories keep the full URL; they resolve by page, not by shortcode.
    Story(String),
}

impl UrlTarget {
    fn shortcode(&self) -> Option<&str> {
        match self {
            UrlTarget::Post(c) | UrlTarget::Reel(c) | UrlTarget::Igtv(c) => Some(c),
            UrlTarget::Story(_) => None,
        }
    }
}

fn classify_url(url: &str) -> Option<UrlTarget> {
    if url.contains("/stories/") {
        return Some(UrlTarget::Story(url.to_string()));
    }

    let re = regex::Regex::new(r"/(reels?|p|tv)/([^/?#]+)").expect("valid regex");
    let caps = re.captures(url)?;
    let code = caps[2].to_string();
    match &caps[1] {
        "p" => Some(UrlTarget::Post(code)),
        "reel" | "reels" => Some(UrlTarget::Reel(code)),
        "tv" => Some(UrlTarget::Igtv(code)),
        _ => None,
    }
}

// --- Handlers ---

#[derive(Debug, Deserialize)]
struct UrlRequest {
    url: Option<String>,
    #[serde(rename = "itemIndex")]
    item_index: Option<usize>,
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn preview(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UrlRequest>,
) -> Response {
    let Some(url) = req.url.as_deref() else {
        return bad_request("URL is required");
    };
    let Some(target) = classify_url(url) else {
        return bad_request("Invalid Instagram URL format");
    };

    let resolved = match &target {
        UrlTarget::Story(story_url) => state.resolver.resolve_story(story_url).await,
        other => {
            let shortcode = other.shortcode().expect("non-story target has a shortcode");
            info!(shortcode, "Fetching preview");
            state.resolver.resolve_media(shortcode).await
        }
    };

    match resolved {
        Ok(descriptor) => Json(preview_json(&descriptor)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Preview JSON consumed by the frontend: one item per downloadable asset.
fn preview_json(descriptor: &MediaDescriptor) -> serde_json::Value {
    let shortcode = &descriptor.shortcode;
    match descriptor.kind {
        MediaKind::Carousel => {
            let items: Vec<serde_json::Value> = descriptor
                .children
                .iter()
                .enumerate()
                .map(|(idx, child)| {
                    let media_url = child
                        .video
                        .as_ref()
                        .or(child.image.as_ref())
                        .map(|c| c.url.as_str());
                    json!({
                        "id": idx,
                        "type": match child.kind() {
                            MediaKind::Video => "video",
                            _ => "image",
                        },
                        "thumbnail": child.image.as_ref().map(|c| c.url.as_str()).or(media_url),
                        "mediaUrl": media_url,
                        "shortcode": shortcode,
                    })
                })
                .collect();
            json!({"type": "carousel", "items": items, "shortcode": shortcode})
        }
        MediaKind::Video => {
            let url = descriptor.video.as_ref().map(|c| c.url.as_str());
            json!({
                "type": "video",
                "items": [{"id": 0, "type": "video", "thumbnail": url, "mediaUrl": url, "shortcode": shortcode}],
                "shortcode": shortcode,
            })
        }
        MediaKind::Image => {
            let url = descriptor.image.as_ref().map(|c| c.url.as_str());
            json!({
                "type": "image",
                "items": [{"id": 0, "type": "image", "thumbnail": url, "mediaUrl": url, "shortcode": shortcode}],
                "shortcode": shortcode,
            })
        }
    }
}

async fn resolve(State(state): State<Arc<AppState>>, Json(req): Json<UrlRequest>) -> Response {
    let Some(url) = req.url.as_deref() else {
        return bad_request("URL is required");
    };
    let Some(target) = classify_url(url) else {
        return bad_request("Unsupported URL type");
    };

    dispatch(&state, &target).await
}

async fn download(State(state): State<Arc<AppState>>, Json(req): Json<UrlRequest>) -> Response {
    let Some(url) = req.url.as_deref() else {
        return bad_request("URL is required");
    };
    let Some(target) = classify_url(url) else {
        return bad_request("Unsupported URL type");
    };

    // A carousel item picked in the frontend downloads as a single asset.
    if let (Some(index), Some(shortcode)) = (req.item_index, target.shortcode()) {
        let descriptor = match state.resolver.resolve_media(shortcode).await {
            Ok(d) => d,
            Err(e) => return error_response(&e),
        };
        if let Some(child) = descriptor.children.get(index) {
            let page_url = canonical_post_url(shortcode);
            let (asset, filename) = match (&child.video, &child.image) {
                (Some(v), _) => (
                    ResolvedAsset::new(v.url.clone(), AssetKind::Video, Some(page_url)).direct(),
                    format!("media_{index}.mp4"),
                ),
                (None, Some(i)) => (
                    ResolvedAsset::new(i.url.clone(), AssetKind::Image, Some(page_url)),
                    format!("media_{index}.{}", image_extension(&i.url)),
                ),
                (None, None) => return error_response(&FetchError::NotFound),
            };
            return stream_response(&state, &asset, &filename).await;
        }
        warn!(shortcode, index, "Requested carousel index out of range, serving full post");
    }

    dispatch(&state, &target).await
}

/// Resolve a classified target and stream the matching download.
async fn dispatch(state: &AppState, target: &UrlTarget) -> Response {
    match target {
        UrlTarget::Story(story_url) => {
            let descriptor = match state.resolver.resolve_story(story_url).await {
                Ok(d) => d,
                Err(e) => return error_response(&e),
            };
            let (asset, filename) = match (&descriptor.video, &descriptor.image) {
                (Some(v), _) => (
                    ResolvedAsset::new(v.url.clone(), AssetKind::Video, Some(story_url.clone()))
                        .direct(),
                    "story_video.mp4".to_string(),
                ),
                (None, Some(i)) => (
                    ResolvedAsset::new(i.url.clone(), AssetKind::Image, Some(story_url.clone())),
                    "story_image.jpg".to_string(),
                ),
                (None, None) => return error_response(&FetchError::NotFound),
            };
            stream_response(state, &asset, &filename).await
        }
        UrlTarget::Reel(code) => forced_video_media(state, code, "reel.mp4").await,
        UrlTarget::Igtv(code) => forced_video_media(state, code, "igtv.mp4").await,
        UrlTarget::Post(code) => post_media(state, code).await,
    }
}

/// Reels and IGTV are video by definition; force video handling even when
/// detection disagreed.
async fn forced_video_media(state: &AppState, shortcode: &str, filename: &str) -> Response {
    let descriptor = match state.resolver.resolve_media(shortcode).await {
        Ok(d) => d,
        Err(e) => return error_response(&e),
    };
    let page_url = canonical_post_url(shortcode);

    let url = descriptor
        .primary_url()
        .map(str::to_string)
        .unwrap_or_else(|| page_url.clone());
    let mut asset = ResolvedAsset::new(url, AssetKind::Video, Some(page_url));
    if descriptor.requires_direct_fetch {
        asset = asset.direct();
    }
    stream_response(state, &asset, filename).await
}

async fn post_media(state: &AppState, shortcode: &str) -> Response {
    let descriptor = match state.resolver.resolve_media(shortcode).await {
        Ok(d) => d,
        Err(e) => return error_response(&e),
    };
    let page_url = canonical_post_url(shortcode);

    match descriptor.kind {
        MediaKind::Carousel => {
            match pack_carousel(&descriptor.children, state.fetcher.as_ref()).await {
                Ok(bytes) => archive_response(bytes),
                Err(e) => error_response(&e),
            }
        }
        MediaKind::Video => {
            let url = descriptor
                .primary_url()
                .map(str::to_string)
                .unwrap_or_else(|| page_url.clone());
            let mut asset = ResolvedAsset::new(url, AssetKind::Video, Some(page_url));
            if descriptor.requires_direct_fetch {
                asset = asset.direct();
            }
            stream_response(state, &asset, "post_video.mp4").await
        }
        MediaKind::Image => image_or_fallback(state, &descriptor, &page_url).await,
    }
}

async fn image_or_fallback(
    state: &AppState,
    descriptor: &MediaDescriptor,
    page_url: &str,
) -> Response {
    let Some(image) = &descriptor.image else {
        return error_response(&FetchError::UnparsableResponse(
            "descriptor carries no image".to_string(),
        ));
    };
    let filename = format!("post_image.{}", image_extension(&image.url));
    let asset = ResolvedAsset::new(
        image.url.clone(),
        AssetKind::Image,
        Some(page_url.to_string()),
    );
    stream_response(state, &asset, &filename).await
}

// --- Response building ---

async fn stream_response(state: &AppState, asset: &ResolvedAsset, filename: &str) -> Response {
    match state.streamer.stream(asset, filename).await {
        Ok(delivery) => delivery_response(delivery),
        Err(e) => error_response(&e),
    }
}

fn delivery_response(delivery: Delivery) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, delivery.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", delivery.filename),
        )
        .body(Body::from_stream(delivery.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn archive_response(bytes: Vec<u8>) -> Response {
    Response::builder()
        .header(header::CONTENT_TYPE, content_type_for(ARCHIVE_FILENAME))
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{ARCHIVE_FILENAME}\""),
        )
        .body(Body::from(bytes))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Every error kind maps to one fixed status + message pair, delivered as a
/// JSON body. Streaming responses bypass this entirely: once bytes flow, a
/// failure can only terminate the connection.
fn error_response(err: &FetchError) -> Response {
    let status = match err {
        FetchError::NotFound => StatusCode::NOT_FOUND,
        FetchError::AuthRequired => StatusCode::UNAUTHORIZED,
        FetchError::AccountChallenged => StatusCode::FORBIDDEN,
        FetchError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        FetchError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FetchError::UnparsableResponse(_) => StatusCode::BAD_GATEWAY,
        FetchError::NoCandidates | FetchError::DownloadFailed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    warn!(code = err.code(), error = %err, "Request failed");

    (
        status,
        Json(json!({
            "error": err.to_string(),
            "code": err.code(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": message,
            "code": "INVALID_URL",
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gramgrab_common::{Candidate, SourceStrategy};

    #[test]
    fn classifies_the_supported_url_shapes() {
        assert_eq!(
            classify_url("https://www.instagram.com/p/ABC123/"),
            Some(UrlTarget::Post("ABC123".to_string()))
        );
        assert_eq!(
            classify_url("https://www.instagram.com/reel/XYZ/?igsh=1"),
            Some(UrlTarget::Reel("XYZ".to_string()))
        );
        assert_eq!(
            classify_url("https://www.instagram.com/reels/XYZ"),
            Some(UrlTarget::Reel("XYZ".to_string()))
        );
        assert_eq!(
            classify_url("https://www.instagram.com/tv/TV1/"),
            Some(UrlTarget::Igtv("TV1".to_string()))
        );
        assert!(matches!(
            classify_url("https://www.instagram.com/stories/user/123/"),
            Some(UrlTarget::Story(_))
        ));
        assert_eq!(classify_url("https://www.instagram.com/someuser/"), None);
    }

    #[test]
    fn preview_json_mirrors_descriptor_shape() {
        let descriptor = MediaDescriptor::single_video(
            "ABC123",
            Candidate::bare("https://cdn/v.mp4"),
            SourceStrategy::StructuredExtractor,
        );
        let preview = preview_json(&descriptor);
        assert_eq!(preview["type"], "video");
        assert_eq!(preview["items"][0]["mediaUrl"], "https://cdn/v.mp4");
        assert_eq!(preview["shortcode"], "ABC123");
    }

    #[test]
    fn preview_json_keeps_carousel_order() {
        let children = vec![
            gramgrab_common::ChildMedia {
                image: Some(Candidate::bare("https://cdn/1.jpg")),
                video: None,
            },
            gramgrab_common::ChildMedia {
                image: Some(Candidate::bare("https://cdn/2.jpg")),
                video: Some(Candidate::bare("https://cdn/2.mp4")),
            },
        ];
        let descriptor =
            MediaDescriptor::carousel("SC", children, SourceStrategy::ThirdPartyApi);
        let preview = preview_json(&descriptor);
        assert_eq!(preview["type"], "carousel");
        assert_eq!(preview["items"][0]["type"], "image");
        assert_eq!(preview["items"][1]["type"], "video");
        assert_eq!(preview["items"][1]["mediaUrl"], "https://cdn/2.mp4");
        assert_eq!(preview["items"][1]["thumbnail"], "https://cdn/2.jpg");
    }
}
