//! Maps each strategy's raw output into the canonical `MediaDescriptor`.
//!
//! Every image-bearing node pools all the size variants the strategy exposed
//! (explicit candidate lists, responsive display resources, the bare display
//! URL) into one list and lets the scorer pick. Missing optional fields yield
//! absent assets, never a panic; a response with nothing usable at all fails
//! with `UnparsableResponse`.

use gramgrab_common::{Candidate, ChildMedia, FetchError, MediaDescriptor, SourceStrategy};
use serde_json::Value;

use crate::pagedata::PageExtraction;
use crate::score::select_best;

const VIDEO_EXTS: &[&str] = &["mp4", "webm", "mkv", "mov"];

// --- Structured extractor (yt-dlp JSON dump) ---

pub fn from_ytdlp(raw: &Value, shortcode: &str) -> Result<MediaDescriptor, FetchError> {
    // A sidecar post dumps as a playlist of entries.
    if raw["_type"].as_str() == Some("playlist") {
        if let Some(entries) = raw["entries"].as_array() {
            if !entries.is_empty() {
                let children = entries.iter().map(ytdlp_entry_to_child).collect();
                return Ok(MediaDescriptor::carousel(
                    shortcode,
                    children,
                    SourceStrategy::StructuredExtractor,
                ));
            }
        }
    }

    let is_video = raw["_type"].as_str() == Some("video")
        || raw["ext"]
            .as_str()
            .map_or(false, |e| VIDEO_EXTS.contains(&e))
        || raw["formats"].as_array().map_or(false, |fs| {
            fs.iter().any(|f| {
                f["vcodec"]
                    .as_str()
                    .map_or(false, |v| !v.is_empty() && v != "none")
            })
        });

    if is_video {
        if let Some(url) = ytdlp_video_url(raw) {
            let video = Candidate {
                url: url.to_string(),
                width: u32_of(&raw["width"]),
                height: u32_of(&raw["height"]),
            };
            return Ok(MediaDescriptor::single_video(
                shortcode,
                video,
                SourceStrategy::StructuredExtractor,
            ));
        }
    }

    let candidates = ytdlp_image_candidates(raw, !is_video);
    let reference = ratio_of(u32_of(&raw["width"]), u32_of(&raw["height"]));
    match select_best(&candidates, reference) {
        Ok(best) => Ok(MediaDescriptor::single_image(
            shortcode,
            best.clone(),
            SourceStrategy::StructuredExtractor,
        )),
        Err(_) => Err(FetchError::UnparsableResponse(
            "extractor dump carries no media url".to_string(),
        )),
    }
}

fn ytdlp_entry_to_child(entry: &Value) -> ChildMedia {
    let is_video = entry["ext"]
        .as_str()
        .map_or(false, |e| VIDEO_EXTS.contains(&e))
        || entry["vcodec"]
            .as_str()
            .map_or(false, |v| !v.is_empty() && v != "none");

    let video = if is_video {
        ytdlp_video_url(entry).map(|url| Candidate {
            url: url.to_string(),
            width: u32_of(&entry["width"]),
            height: u32_of(&entry["height"]),
        })
    } else {
        None
    };

    let candidates = ytdlp_image_candidates(entry, !is_video);
    let reference = ratio_of(u32_of(&entry["width"]), u32_of(&entry["height"]));
    let image = select_best(&candidates, reference).ok().cloned();

    ChildMedia { image, video }
}

fn ytdlp_video_url(item: &Value) -> Option<&str> {
    item["url"].as_str().filter(|u| !u.is_empty()).or_else(|| {
        // No merged URL: fall back to the last (best) video-carrying format.
        item["formats"].as_array().and_then(|fs| {
            fs.iter().rev().find_map(|f| {
                let has_video = f["vcodec"]
                    .as_str()
                    .map_or(false, |v| !v.is_empty() && v != "none");
                if has_video {
                    f["url"].as_str().filter(|u| !u.is_empty())
                } else {
                    None
                }
            })
        })
    })
}

fn ytdlp_image_candidates(item: &Value, include_main_url: bool) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    if let Some(thumbs) = item["thumbnails"].as_array() {
        for t in thumbs {
            if let Some(url) = t["url"].as_str().filter(|u| !u.is_empty()) {
                candidates.push(Candidate {
                    url: url.to_string(),
                    width: u32_of(&t["width"]),
                    height: u32_of(&t["height"]),
                });
            }
        }
    }
    if let Some(url) = item["thumbnail"].as_str().filter(|u| !u.is_empty()) {
        candidates.push(Candidate::bare(url));
    }
    if include_main_url {
        if let Some(url) = item["url"].as_str().filter(|u| !u.is_empty()) {
            candidates.push(Candidate::bare(url));
        }
    }
    candidates
}

// --- Third-party data API ---

pub fn from_api(raw: &Value, shortcode: &str) -> Result<MediaDescriptor, FetchError> {
    let item = dig_api_item(raw).ok_or_else(|| {
        FetchError::UnparsableResponse(format!("no media item in API body: {}", snippet(raw)))
    })?;

    descriptor_from_node(item, shortcode, SourceStrategy::ThirdPartyApi, false)
}

/// The provider wraps the media item differently across schema revisions;
/// dig through the known nestings in order.
fn dig_api_item(raw: &Value) -> Option<&Value> {
    if let Some(item) = raw.get("item") {
        return Some(item);
    }
    if let Some(first) = raw.get("items").and_then(|v| v.as_array()).and_then(|a| a.first()) {
        return Some(first);
    }
    match raw.get("data") {
        Some(Value::Array(arr)) => arr.first(),
        Some(data @ Value::Object(_)) => Some(data),
        _ => {
            if looks_like_media_node(raw) {
                Some(raw)
            } else {
                None
            }
        }
    }
}

fn looks_like_media_node(v: &Value) -> bool {
    v.get("image_versions2").is_some()
        || v.get("video_versions").is_some()
        || v.get("display_url").is_some()
        || v.get("carousel_media").is_some()
        || v.get("edge_sidecar_to_children").is_some()
}

// --- Shared media-node normalization (API and in-page structured data) ---

pub fn descriptor_from_node(
    node: &Value,
    shortcode: &str,
    source: SourceStrategy,
    requires_direct_fetch: bool,
) -> Result<MediaDescriptor, FetchError> {
    if let Some(children) = child_nodes(node) {
        if !children.is_empty() {
            let children = children.iter().map(|n| node_to_child(n)).collect();
            let mut descriptor = MediaDescriptor::carousel(shortcode, children, source);
            descriptor.requires_direct_fetch = requires_direct_fetch;
            return Ok(descriptor);
        }
    }

    let vids = video_candidates(node);
    let imgs = image_candidates(node);
    if vids.is_empty() && imgs.is_empty() {
        return Err(FetchError::UnparsableResponse(format!(
            "media node carries no assets: {}",
            snippet(node)
        )));
    }

    let reference = node_ratio(node);
    let mut descriptor = if is_video_node(node) && !vids.is_empty() {
        let best = select_best(&vids, reference)?;
        MediaDescriptor::single_video(shortcode, best.clone(), source)
    } else {
        let best = select_best(&imgs, reference)?;
        MediaDescriptor::single_image(shortcode, best.clone(), source)
    };
    descriptor.requires_direct_fetch = requires_direct_fetch;
    Ok(descriptor)
}

/// Carousel children live under `carousel_media` or (GraphQL shape) under
/// `edge_sidecar_to_children.edges[].node`.
fn child_nodes(node: &Value) -> Option<Vec<&Value>> {
    if let Some(arr) = node.get("carousel_media").and_then(|v| v.as_array()) {
        return Some(arr.iter().map(unwrap_edge).collect());
    }
    node.get("edge_sidecar_to_children")
        .and_then(|v| v.get("edges"))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().map(unwrap_edge).collect())
}

fn unwrap_edge(v: &Value) -> &Value {
    v.get("node").unwrap_or(v)
}

fn node_to_child(node: &Value) -> ChildMedia {
    let reference = node_ratio(node);

    let video = if is_video_node(node) {
        let vids = video_candidates(node);
        select_best(&vids, reference).ok().cloned()
    } else {
        None
    };

    let imgs = image_candidates(node);
    let image = select_best(&imgs, reference).ok().cloned();

    ChildMedia { image, video }
}

fn is_video_node(node: &Value) -> bool {
    node["is_video"].as_bool() == Some(true)
        || node["media_type"].as_u64() == Some(2)
        || node["video_url"].as_str().map_or(false, |u| !u.is_empty())
        || node
            .get("video_versions")
            .and_then(|v| v.as_array())
            .map_or(false, |a| !a.is_empty())
}

fn image_candidates(node: &Value) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    if let Some(list) = node
        .get("image_versions2")
        .and_then(|v| v.get("candidates"))
        .and_then(|v| v.as_array())
    {
        for c in list {
            if let Some(url) = url_of(c) {
                candidates.push(Candidate {
                    url: url.to_string(),
                    width: u32_of(&c["width"]),
                    height: u32_of(&c["height"]),
                });
            }
        }
    }

    if let Some(list) = node.get("display_resources").and_then(|v| v.as_array()) {
        for r in list {
            if let Some(url) = url_of(r) {
                candidates.push(Candidate {
                    url: url.to_string(),
                    width: u32_of(&r["config_width"]).or_else(|| u32_of(&r["width"])),
                    height: u32_of(&r["config_height"]).or_else(|| u32_of(&r["height"])),
                });
            }
        }
    }

    if let Some(url) = node["display_url"].as_str().filter(|u| !u.is_empty()) {
        candidates.push(Candidate {
            url: url.to_string(),
            width: dim_of(node, "width"),
            height: dim_of(node, "height"),
        });
    }

    candidates
}

fn video_candidates(node: &Value) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    if let Some(list) = node.get("video_versions").and_then(|v| v.as_array()) {
        for v in list {
            if let Some(url) = url_of(v) {
                candidates.push(Candidate {
                    url: url.to_string(),
                    width: u32_of(&v["width"]),
                    height: u32_of(&v["height"]),
                });
            }
        }
    }

    if let Some(url) = node["video_url"].as_str().filter(|u| !u.is_empty()) {
        candidates.push(Candidate {
            url: url.to_string(),
            width: dim_of(node, "width"),
            height: dim_of(node, "height"),
        });
    }

    candidates
}

fn node_ratio(node: &Value) -> Option<f64> {
    ratio_of(dim_of(node, "width"), dim_of(node, "height"))
}

fn dim_of(node: &Value, axis: &str) -> Option<u32> {
    node.get("dimensions").and_then(|d| u32_of(&d[axis]))
}

// --- Browser-rendered page ---

pub fn from_page(extraction: &PageExtraction, shortcode: &str) -> Result<MediaDescriptor, FetchError> {
    match extraction {
        PageExtraction::Structured(node) => {
            descriptor_from_node(node, shortcode, SourceStrategy::BrowserRender, true)
        }
        PageExtraction::OpenGraph { image, video } => {
            let mut descriptor = if let Some(url) = video {
                MediaDescriptor::single_video(
                    shortcode,
                    Candidate::bare(url.clone()),
                    SourceStrategy::BrowserRender,
                )
            } else if let Some(url) = image {
                MediaDescriptor::single_image(
                    shortcode,
                    Candidate::bare(url.clone()),
                    SourceStrategy::BrowserRender,
                )
            } else {
                return Err(FetchError::UnparsableResponse(
                    "page exposes no OpenGraph media".to_string(),
                ));
            };
            descriptor.requires_direct_fetch = true;
            Ok(descriptor)
        }
        PageExtraction::Dom { images, videos } => {
            let mut descriptor = if let Some(url) = videos.first() {
                MediaDescriptor::single_video(
                    shortcode,
                    Candidate::bare(url.clone()),
                    SourceStrategy::BrowserRender,
                )
            } else if !images.is_empty() {
                let candidates: Vec<Candidate> =
                    images.iter().map(|u| Candidate::bare(u.clone())).collect();
                let best = select_best(&candidates, None)?;
                MediaDescriptor::single_image(shortcode, best.clone(), SourceStrategy::BrowserRender)
            } else {
                return Err(FetchError::UnparsableResponse(
                    "rendered DOM carries no media elements".to_string(),
                ));
            };
            descriptor.requires_direct_fetch = true;
            Ok(descriptor)
        }
    }
}

// --- Small field helpers ---

fn url_of(v: &Value) -> Option<&str> {
    v["url"]
        .as_str()
        .or_else(|| v["src"].as_str())
        .filter(|u| !u.is_empty())
}

fn u32_of(v: &Value) -> Option<u32> {
    v.as_u64().map(|n| n as u32)
}

fn ratio_of(width: Option<u32>, height: Option<u32>) -> Option<f64> {
    match (width, height) {
        (Some(w), Some(h)) if h > 0 => Some(f64::from(w) / f64::from(h)),
        _ => None,
    }
}

fn snippet(v: &Value) -> String {
    let mut s = v.to_string();
    s.truncate(200);
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use gramgrab_common::MediaKind;
    use serde_json::json;

    #[test]
    fn ytdlp_single_video_dump() {
        let raw = json!({
            "_type": "video",
            "url": "https://cdn/video.mp4",
            "width": 1080,
            "height": 1920,
        });
        let d = from_ytdlp(&raw, "ABC123").unwrap();
        assert_eq!(d.kind, MediaKind::Video);
        assert_eq!(d.shortcode, "ABC123");
        assert_eq!(d.video.as_ref().unwrap().url, "https://cdn/video.mp4");
        assert!(d.image.is_none());
        assert_eq!(d.source, SourceStrategy::StructuredExtractor);
        assert!(!d.requires_direct_fetch);
    }

    #[test]
    fn ytdlp_playlist_becomes_carousel_in_order() {
        let raw = json!({
            "_type": "playlist",
            "entries": [
                {"ext": "mp4", "url": "https://cdn/1.mp4", "thumbnails": [{"url": "https://cdn/1.jpg", "width": 1080, "height": 1350}]},
                {"ext": "jpg", "url": "https://cdn/2.jpg"},
                {"ext": "mp4", "url": "https://cdn/3.mp4"},
            ],
        });
        let d = from_ytdlp(&raw, "SC").unwrap();
        assert_eq!(d.kind, MediaKind::Carousel);
        assert!(d.image.is_none() && d.video.is_none());
        assert_eq!(d.children.len(), 3);
        assert_eq!(d.children[0].video.as_ref().unwrap().url, "https://cdn/1.mp4");
        assert_eq!(d.children[1].image.as_ref().unwrap().url, "https://cdn/2.jpg");
        assert_eq!(d.children[2].video.as_ref().unwrap().url, "https://cdn/3.mp4");
    }

    #[test]
    fn ytdlp_image_post_scores_thumbnails() {
        let raw = json!({
            "ext": "jpg",
            "url": "https://cdn/full.jpg",
            "width": 1080,
            "height": 1350,
            "thumbnails": [
                {"url": "https://cdn/s640x640/t.jpg", "width": 640, "height": 640},
                {"url": "https://cdn/big.jpg", "width": 1080, "height": 1350},
            ],
        });
        let d = from_ytdlp(&raw, "SC").unwrap();
        assert_eq!(d.kind, MediaKind::Image);
        assert_eq!(d.image.as_ref().unwrap().url, "https://cdn/big.jpg");
    }

    #[test]
    fn ytdlp_dump_without_media_is_unparsable() {
        let raw = json!({"id": "x", "title": "nothing here"});
        assert!(matches!(
            from_ytdlp(&raw, "SC"),
            Err(FetchError::UnparsableResponse(_))
        ));
    }

    #[test]
    fn api_item_dug_out_of_items_wrapper() {
        let raw = json!({
            "items": [{
                "media_type": 2,
                "video_versions": [{"url": "https://cdn/v.mp4", "width": 720, "height": 1280}],
                "image_versions2": {"candidates": [{"url": "https://cdn/poster.jpg", "width": 720, "height": 1280}]},
            }],
        });
        let d = from_api(&raw, "SC").unwrap();
        assert_eq!(d.kind, MediaKind::Video);
        assert_eq!(d.video.as_ref().unwrap().url, "https://cdn/v.mp4");
    }

    #[test]
    fn api_image_pools_all_variant_lists() {
        let raw = json!({
            "data": {
                "display_url": "https://cdn/display.jpg",
                "dimensions": {"width": 1080, "height": 1350},
                "display_resources": [
                    {"src": "https://cdn/640.jpg", "config_width": 640, "config_height": 800},
                    {"src": "https://cdn/1080.jpg", "config_width": 1080, "config_height": 1350},
                ],
            },
        });
        let d = from_api(&raw, "SC").unwrap();
        assert_eq!(d.kind, MediaKind::Image);
        // display_url defaults to the reference framing and carries the
        // declared top-level dimensions; 1080 variant and display tie on
        // area, earlier candidate order breaks the tie deterministically.
        let url = &d.image.as_ref().unwrap().url;
        assert!(url == "https://cdn/1080.jpg" || url == "https://cdn/display.jpg");
    }

    #[test]
    fn api_carousel_preserves_child_order() {
        let raw = json!({
            "item": {
                "edge_sidecar_to_children": {"edges": [
                    {"node": {"is_video": false, "display_url": "https://cdn/1.jpg"}},
                    {"node": {"is_video": true, "video_url": "https://cdn/2.mp4", "display_url": "https://cdn/2.jpg"}},
                    {"node": {"is_video": false, "display_url": "https://cdn/3.jpg"}},
                ]},
            },
        });
        let d = from_api(&raw, "SC").unwrap();
        assert_eq!(d.kind, MediaKind::Carousel);
        assert_eq!(d.children.len(), 3);
        assert_eq!(d.children[0].kind(), MediaKind::Image);
        assert_eq!(d.children[1].kind(), MediaKind::Video);
        assert_eq!(d.children[1].video.as_ref().unwrap().url, "https://cdn/2.mp4");
        assert_eq!(d.children[2].image.as_ref().unwrap().url, "https://cdn/3.jpg");
    }

    #[test]
    fn api_error_body_is_unparsable() {
        let raw = json!({"message": "no such endpoint"});
        assert!(matches!(
            from_api(&raw, "SC"),
            Err(FetchError::UnparsableResponse(_))
        ));
    }

    #[test]
    fn page_open_graph_image_requires_direct_fetch() {
        let extraction = PageExtraction::OpenGraph {
            image: Some("https://cdn/og.jpg".to_string()),
            video: None,
        };
        let d = from_page(&extraction, "SC").unwrap();
        assert_eq!(d.kind, MediaKind::Image);
        assert_eq!(d.image.as_ref().unwrap().url, "https://cdn/og.jpg");
        assert!(d.requires_direct_fetch);
        assert_eq!(d.source, SourceStrategy::BrowserRender);
    }

    #[test]
    fn page_structured_node_flows_through_shared_normalizer() {
        let node = json!({
            "is_video": true,
            "video_url": "https://cdn/reel.mp4",
            "display_url": "https://cdn/poster.jpg",
            "dimensions": {"width": 720, "height": 1280},
        });
        let d = from_page(&PageExtraction::Structured(node), "SC").unwrap();
        assert_eq!(d.kind, MediaKind::Video);
        assert_eq!(d.video.as_ref().unwrap().url, "https://cdn/reel.mp4");
        assert!(d.requires_direct_fetch);
    }

    #[test]
    fn page_dom_prefers_video_over_image() {
        let extraction = PageExtraction::Dom {
            images: vec!["https://cdn/story.jpg".to_string()],
            videos: vec!["https://cdn/story.mp4".to_string()],
        };
        let d = from_page(&extraction, "SC").unwrap();
        assert_eq!(d.kind, MediaKind::Video);
        assert_eq!(d.video.as_ref().unwrap().url, "https://cdn/story.mp4");
    }
}
