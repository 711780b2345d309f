pub mod config;
pub mod cookies;
pub mod error;
pub mod types;

pub use config::Config;
pub use cookies::CookieJar;
pub use error::FetchError;
pub use types::{
    AssetKind, Candidate, ChildMedia, MediaDescriptor, MediaKind, ResolvedAsset, SourceStrategy,
};

/// Browser user agent sent on every outbound request that touches the platform
/// or its CDN. The CDN rejects unadorned clients.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Referer header expected by the platform's CDN for direct asset fetches.
pub const PLATFORM_REFERER: &str = "https://www.instagram.com/";

/// Canonical page URL for a post shortcode.
pub fn canonical_post_url(shortcode: &str) -> String {
    format!("https://www.instagram.com/p/{shortcode}/")
}
