use std::env;
use std::path::PathBuf;

/// Application configuration loaded from environment variables.
///
/// Everything is optional with a sensible default: the resolver degrades
/// gracefully when a tier's credentials are absent (the API tier is simply
/// skipped).
#[derive(Debug, Clone)]
pub struct Config {
    // Third-party data API
    pub rapidapi_key: Option<String>,
    pub rapidapi_host: String,

    // Extractor tool + session state
    pub ytdlp_bin: String,
    pub cookies_path: PathBuf,
    pub ig_username: Option<String>,
    pub ig_password: Option<String>,

    // Headless browser
    pub chrome_bin: String,
    pub debug_dir: PathBuf,

    // Resolution
    pub resolve_timeout_secs: u64,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            rapidapi_key: optional_env("RAPIDAPI_KEY"),
            rapidapi_host: env::var("RAPIDAPI_HOST")
                .unwrap_or_else(|_| "instagram-scraper-20251.p.rapidapi.com".to_string()),
            ytdlp_bin: env::var("YTDLP_BIN").unwrap_or_else(|_| "yt-dlp".to_string()),
            cookies_path: env::var("COOKIES_PATH")
                .unwrap_or_else(|_| "cookies.txt".to_string())
                .into(),
            ig_username: optional_env("IG_USERNAME"),
            ig_password: optional_env("IG_PASSWORD"),
            chrome_bin: env::var("CHROME_BIN").unwrap_or_else(|_| "chromium".to_string()),
            debug_dir: env::var("DEBUG_DIR")
                .unwrap_or_else(|_| "debug".to_string())
                .into(),
            resolve_timeout_secs: env::var("RESOLVE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(90),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: env::var("WEB_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .expect("WEB_PORT must be a number"),
        }
    }
}

/// Treats unset, empty, and never-replaced placeholder values as absent.
fn optional_env(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(v) if !v.is_empty() && v != "PASTE_YOUR_KEY_HERE" => Some(v),
        _ => None,
    }
}
