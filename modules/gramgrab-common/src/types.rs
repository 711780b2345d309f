use serde::{Deserialize, Serialize};

/// What a resolved post contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Carousel,
}

/// Which extraction tier produced a descriptor. Recorded for diagnostics;
/// downstream consumers never branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceStrategy {
    StructuredExtractor,
    ThirdPartyApi,
    BrowserRender,
}

/// One URL + optional size metadata representing a possible rendition of the
/// same logical asset. Dimensions are metadata, not guarantees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl Candidate {
    pub fn bare(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
        }
    }

    pub fn sized(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width: Some(width),
            height: Some(height),
        }
    }

    /// True when both dimensions were declared by the source.
    pub fn has_dimensions(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }
}

/// One entry of a carousel post, in platform display order.
#[derive(Debug, Clone, Serialize)]
pub struct ChildMedia {
    pub image: Option<Candidate>,
    pub video: Option<Candidate>,
}

impl ChildMedia {
    pub fn kind(&self) -> MediaKind {
        if self.video.is_some() {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

/// The canonical unit passed between every pipeline component. Built fresh per
/// request by exactly one normalizer call, consumed once, never cached.
#[derive(Debug, Clone, Serialize)]
pub struct MediaDescriptor {
    pub shortcode: String,
    pub kind: MediaKind,
    pub image: Option<Candidate>,
    pub video: Option<Candidate>,
    /// Present only for carousels; order is the platform's display order and
    /// controls archive filename ordinals end-to-end.
    pub children: Vec<ChildMedia>,
    pub source: SourceStrategy,
    /// The asset URL was mined from rendered HTML. It must be fetched directly
    /// rather than re-resolved through the extractor tool.
    pub requires_direct_fetch: bool,
}

impl MediaDescriptor {
    pub fn single_image(shortcode: impl Into<String>, image: Candidate, source: SourceStrategy) -> Self {
        Self {
            shortcode: shortcode.into(),
            kind: MediaKind::Image,
            image: Some(image),
            video: None,
            children: Vec::new(),
            source,
            requires_direct_fetch: false,
        }
    }

    pub fn single_video(shortcode: impl Into<String>, video: Candidate, source: SourceStrategy) -> Self {
        Self {
            shortcode: shortcode.into(),
            kind: MediaKind::Video,
            image: None,
            video: Some(video),
            children: Vec::new(),
            source,
            requires_direct_fetch: false,
        }
    }

    pub fn carousel(
        shortcode: impl Into<String>,
        children: Vec<ChildMedia>,
        source: SourceStrategy,
    ) -> Self {
        Self {
            shortcode: shortcode.into(),
            kind: MediaKind::Carousel,
            image: None,
            video: None,
            children,
            source,
            requires_direct_fetch: false,
        }
    }

    /// The single asset URL for non-carousel descriptors.
    pub fn primary_url(&self) -> Option<&str> {
        self.video
            .as_ref()
            .or(self.image.as_ref())
            .map(|c| c.url.as_str())
    }
}

/// Whether a concrete asset is delivered as an image or a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
}

/// Delivery input: one concrete asset URL plus the page it was resolved from.
#[derive(Debug, Clone)]
pub struct ResolvedAsset {
    pub url: String,
    pub kind: AssetKind,
    /// The original post page. Enables the tool-mediated fail-over path when a
    /// direct CDN fetch is blocked.
    pub page_url: Option<String>,
    /// Skip the tool-mediated path and fetch the URL directly first (set for
    /// assets mined from rendered HTML, which the tool cannot re-resolve).
    pub direct: bool,
}

impl ResolvedAsset {
    pub fn new(url: impl Into<String>, kind: AssetKind, page_url: Option<String>) -> Self {
        Self {
            url: url.into(),
            kind,
            page_url,
            direct: false,
        }
    }

    pub fn direct(mut self) -> Self {
        self.direct = true;
        self
    }
}
