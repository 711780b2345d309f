//! Best-effort locator for the platform's in-page structured data.
//!
//! Works over a rendered-DOM snapshot, not a live page: each layer is an
//! independent parse attempt over the HTML string, tried in priority order —
//! the data-cache payloads, the legacy shared-data blob, then a generic scan
//! of script text for JSON blocks with known key signatures. When no
//! structured data exists the page still usually exposes OpenGraph meta tags,
//! and stories-style ephemeral content only ever shows up as raw `<video>` /
//! `<img>` elements.

use std::collections::HashSet;

use gramgrab_common::FetchError;
use regex::Regex;
use serde_json::Value;

/// What a rendered page yielded, in decreasing order of fidelity.
#[derive(Debug)]
pub enum PageExtraction {
    /// A structured media node in the platform's API shape.
    Structured(Value),
    OpenGraph {
        image: Option<String>,
        video: Option<String>,
    },
    Dom {
        images: Vec<String>,
        videos: Vec<String>,
    },
}

/// Layered search over a rendered page. `None` means the page exposed no
/// media at all — the caller decides whether that is a wall or a dead post.
pub fn extract(html: &str) -> Option<PageExtraction> {
    if let Some(node) = locate_structured(html) {
        return Some(PageExtraction::Structured(node));
    }

    let (image, video) = extract_og_tags(html);
    if image.is_some() || video.is_some() {
        return Some(PageExtraction::OpenGraph { image, video });
    }

    let (images, videos) = extract_dom_media(html);
    if !images.is_empty() || !videos.is_empty() {
        return Some(PageExtraction::Dom { images, videos });
    }

    None
}

/// Distinguishes the three non-media terminal page states. Each implies a
/// different operator remedy, so each maps to its own error kind.
pub fn detect_wall(html: &str) -> Option<FetchError> {
    if html.contains("Login \u{2022} Instagram")
        || html.contains("Welcome back to Instagram")
        || html.contains("/accounts/login")
    {
        return Some(FetchError::AuthRequired);
    }
    if html.contains("Suspicious activity")
        || html.contains("Verify your account")
        || html.contains("challenge_required")
    {
        return Some(FetchError::AccountChallenged);
    }
    if html.contains("Wait a few minutes before you try again")
        || html.contains("Too Many Requests")
    {
        return Some(FetchError::RateLimited);
    }
    None
}

// --- Structured-data layers ---

fn locate_structured(html: &str) -> Option<Value> {
    from_additional_data(html)
        .or_else(|| from_shared_data(html))
        .or_else(|| from_script_blocks(html))
}

/// Layer 1: `window.__additionalDataLoaded('...', {...})` call sites left in
/// script text by the page's own data loader.
fn from_additional_data(html: &str) -> Option<Value> {
    for (idx, _) in html.match_indices("__additionalDataLoaded(") {
        let rest = &html[idx..];
        // Payload is the second argument; skip past the route string.
        let comma = match rest.find(',') {
            Some(c) => c,
            None => continue,
        };
        let open = match rest[comma..].find('{') {
            Some(o) => comma + o,
            None => continue,
        };
        if let Some(block) = balanced_block(rest, open) {
            if let Ok(parsed) = serde_json::from_str::<Value>(block) {
                if let Some(node) = media_node_from(&parsed) {
                    return Some(node);
                }
            }
        }
    }
    None
}

/// Layer 2: the legacy `window._sharedData = {...};` blob.
fn from_shared_data(html: &str) -> Option<Value> {
    let idx = html.find("window._sharedData")?;
    let rest = &html[idx..];
    let open = rest.find('{')?;
    let block = balanced_block(rest, open)?;
    let parsed: Value = serde_json::from_str(block).ok()?;

    parsed
        .get("entry_data")
        .and_then(|v| v.get("PostPage"))
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .and_then(|v| v.get("graphql"))
        .and_then(|v| v.get("shortcode_media"))
        .filter(|v| is_media_node(v))
        .cloned()
}

/// Layer 3: scan embedded script text for JSON blocks keyed by the known
/// signatures, newest schema first.
fn from_script_blocks(html: &str) -> Option<Value> {
    const SIGNATURES: &[&str] = &[
        "\"xdt_api__v1__media__shortcode__web_info\"",
        "\"xdt_shortcode_media\"",
        "\"shortcode_media\"",
        "\"reels_media\"",
    ];

    for needle in SIGNATURES {
        for (idx, _) in html.match_indices(needle) {
            let after = idx + needle.len();
            let rest = &html[after..];
            let colon = match rest.find(':') {
                Some(c) => c,
                None => continue,
            };
            let open = match rest[colon..].find(|ch| ch == '{' || ch == '[') {
                Some(o) => colon + o,
                None => continue,
            };
            let block = match balanced_block(rest, open) {
                Some(b) => b,
                None => continue,
            };
            let parsed: Value = match serde_json::from_str(block) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if let Some(node) = media_node_from(&parsed) {
                return Some(node);
            }
        }
    }
    None
}

/// Digs a media node out of any of the wrapper shapes the platform has used.
fn media_node_from(parsed: &Value) -> Option<Value> {
    let candidates = [
        parsed
            .get("xdt_api__v1__media__shortcode__web_info")
            .and_then(|v| v.get("items"))
            .and_then(|v| v.as_array())
            .and_then(|a| a.first()),
        parsed.get("graphql").and_then(|v| v.get("shortcode_media")),
        parsed.get("shortcode_media"),
        parsed.get("xdt_shortcode_media"),
        parsed.get("items").and_then(|v| v.as_array()).and_then(|a| a.first()),
        parsed
            .get("reels_media")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|v| v.get("items"))
            .and_then(|v| v.as_array())
            .and_then(|a| a.first()),
        // The block itself may already be the node (layer-3 direct hits) or
        // the reels array.
        Some(parsed),
        parsed
            .as_array()
            .and_then(|a| a.first())
            .and_then(|v| v.get("items"))
            .and_then(|v| v.as_array())
            .and_then(|a| a.first()),
    ];

    candidates
        .into_iter()
        .flatten()
        .find(|v| is_media_node(v))
        .cloned()
}

fn is_media_node(v: &Value) -> bool {
    v.is_object()
        && (v.get("display_url").is_some()
            || v.get("video_url").is_some()
            || v.get("image_versions2").is_some()
            || v.get("video_versions").is_some()
            || v.get("carousel_media").is_some()
            || v.get("edge_sidecar_to_children").is_some())
}

/// Extracts the balanced `{...}` or `[...]` block starting at `open`,
/// tracking string literals and escapes so braces inside values don't
/// terminate early.
fn balanced_block(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let (open_ch, close_ch) = match *bytes.get(open)? {
        b'{' => (b'{', b'}'),
        b'[' => (b'[', b']'),
        _ => return None,
    };

    let mut depth: u32 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &b) in bytes[open..].iter().enumerate() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match b {
                b'\\' => escape_next = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b if b == open_ch => depth += 1,
            b if b == close_ch => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open..open + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

// --- OpenGraph fallback ---

fn extract_og_tags(html: &str) -> (Option<String>, Option<String>) {
    (meta_content(html, "og:image"), meta_content(html, "og:video"))
}

fn meta_content(html: &str, property: &str) -> Option<String> {
    let prop = regex::escape(property);
    let before = Regex::new(&format!(
        r#"<meta[^>]*property="{prop}"[^>]*content="([^"]+)""#
    ))
    .expect("valid regex");
    if let Some(c) = before.captures(html) {
        return Some(unescape_html_entities(&c[1]));
    }
    let after = Regex::new(&format!(
        r#"<meta[^>]*content="([^"]+)"[^>]*property="{prop}""#
    ))
    .expect("valid regex");
    after
        .captures(html)
        .map(|c| unescape_html_entities(&c[1]))
}

// --- Raw DOM fallback (stories never populate structured data) ---

fn extract_dom_media(html: &str) -> (Vec<String>, Vec<String>) {
    let video_re = Regex::new(r#"<video[^>]*\bsrc="([^"]+)""#).expect("valid regex");
    let source_re = Regex::new(r#"<source[^>]*\bsrc="([^"]+)""#).expect("valid regex");
    let img_re = Regex::new(r#"<img[^>]*\bsrc="([^"]+)""#).expect("valid regex");

    let mut seen = HashSet::new();
    let mut videos = Vec::new();
    for cap in video_re.captures_iter(html).chain(source_re.captures_iter(html)) {
        let url = unescape_html_entities(&cap[1]);
        if url.starts_with("http") && seen.insert(url.clone()) {
            videos.push(url);
        }
    }

    let mut images = Vec::new();
    for cap in img_re.captures_iter(html) {
        let url = unescape_html_entities(&cap[1]);
        if url.starts_with("http") && seen.insert(url.clone()) {
            images.push(url);
        }
    }

    (images, videos)
}

fn unescape_html_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_data_layer_finds_the_post_node() {
        let html = r#"<script>window._sharedData = {"entry_data":{"PostPage":[{"graphql":{"shortcode_media":{"display_url":"https://cdn/p.jpg","is_video":false}}}]}};</script>"#;
        let node = locate_structured(html).unwrap();
        assert_eq!(node["display_url"].as_str(), Some("https://cdn/p.jpg"));
    }

    #[test]
    fn additional_data_layer_wins_over_script_scan() {
        let html = r#"<script>window.__additionalDataLoaded('/p/x/', {"graphql":{"shortcode_media":{"video_url":"https://cdn/v.mp4","is_video":true}}});</script>"#;
        let node = locate_structured(html).unwrap();
        assert_eq!(node["video_url"].as_str(), Some("https://cdn/v.mp4"));
    }

    #[test]
    fn script_block_scan_handles_web_info_shape() {
        let html = r#"<script type="application/json">{"data":{"xdt_api__v1__media__shortcode__web_info":{"items":[{"image_versions2":{"candidates":[{"url":"https://cdn/a.jpg","width":1080,"height":1350}]}}]}}}</script>"#;
        let node = locate_structured(html).unwrap();
        assert!(node.get("image_versions2").is_some());
    }

    #[test]
    fn braces_inside_string_values_do_not_truncate_blocks() {
        let html = r#"<script>{"shortcode_media":{"display_url":"https://cdn/p.jpg","caption":"curly {braces} and a \" quote"}}</script>"#;
        let node = locate_structured(html).unwrap();
        assert_eq!(node["display_url"].as_str(), Some("https://cdn/p.jpg"));
    }

    #[test]
    fn og_tags_are_the_fallback_when_no_structured_data() {
        let html = r#"<html><head><meta property="og:image" content="https://cdn/og.jpg?a=1&amp;b=2"/></head><body></body></html>"#;
        match extract(html).unwrap() {
            PageExtraction::OpenGraph { image, video } => {
                assert_eq!(image.as_deref(), Some("https://cdn/og.jpg?a=1&b=2"));
                assert!(video.is_none());
            }
            other => panic!("expected OpenGraph, got {other:?}"),
        }
    }

    #[test]
    fn dom_scan_is_the_last_resort() {
        let html = r#"<body><img src="data:image/gif;base64,x"/><video src="https://cdn/story.mp4"></video><img src="https://cdn/story.jpg"/></body>"#;
        match extract(html).unwrap() {
            PageExtraction::Dom { images, videos } => {
                assert_eq!(videos, vec!["https://cdn/story.mp4"]);
                assert_eq!(images, vec!["https://cdn/story.jpg"]);
            }
            other => panic!("expected Dom, got {other:?}"),
        }
    }

    #[test]
    fn empty_page_extracts_nothing() {
        assert!(extract("<html><body>nothing here</body></html>").is_none());
    }

    #[test]
    fn wall_detection_distinguishes_the_three_states() {
        assert!(matches!(
            detect_wall("<title>Login \u{2022} Instagram</title>"),
            Some(FetchError::AuthRequired)
        ));
        assert!(matches!(
            detect_wall("We detected Suspicious activity on your account"),
            Some(FetchError::AccountChallenged)
        ));
        assert!(matches!(
            detect_wall("Wait a few minutes before you try again"),
            Some(FetchError::RateLimited)
        ));
        assert!(detect_wall("a normal page").is_none());
    }
}
