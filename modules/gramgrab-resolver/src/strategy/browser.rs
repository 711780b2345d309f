//! Tier 3: headless-browser rendering.
//!
//! One chromium instance per resolution attempt, never shared or pooled. The
//! process is the resource scope: spawned with kill-on-drop and bounded by a
//! timeout, it is released on every exit path. Sandboxing is disabled (the
//! usual constrained-container requirement) and the automation-controlled
//! blink feature is switched off to dodge trivial bot detection.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use gramgrab_common::{canonical_post_url, FetchError, MediaDescriptor, SourceStrategy};
use tokio::process::Command;
use tracing::{info, warn};

use crate::normalize;
use crate::pagedata;
use crate::strategy::MediaStrategy;

/// Outer bound on one render; the process is killed on expiry.
const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Virtual-time budget given to the page's own client-side data loading.
/// There is no reliable "loaded" signal, so this is a fixed settle delay.
const SETTLE_BUDGET_MS: u32 = 4000;

pub struct BrowserRenderStrategy {
    chrome_bin: String,
    debug_dir: PathBuf,
}

impl BrowserRenderStrategy {
    pub fn new(chrome_bin: String, debug_dir: PathBuf) -> Self {
        Self {
            chrome_bin,
            debug_dir,
        }
    }

    /// Resolve an arbitrary page URL. Stories resolve through here directly,
    /// since their content never reaches the structured tiers.
    pub async fn resolve_url(
        &self,
        page_url: &str,
        shortcode: &str,
    ) -> Result<MediaDescriptor, FetchError> {
        let html = self.render(page_url).await?;

        if let Some(extraction) = pagedata::extract(&html) {
            return normalize::from_page(&extraction, shortcode);
        }

        // No media at all: a wall page, or a genuinely dead post.
        if let Some(wall) = pagedata::detect_wall(&html) {
            warn!(page_url, kind = wall.code(), "Render hit a wall page");
            return Err(wall);
        }

        self.persist_diagnostics(page_url, &html).await;
        Err(FetchError::NotFound)
    }

    /// Launch chromium against the URL and return the rendered DOM.
    async fn render(&self, url: &str) -> Result<String, FetchError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| FetchError::DownloadFailed(format!("invalid page url: {e}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::DownloadFailed(format!(
                "only http/https pages can be rendered, got {}",
                parsed.scheme()
            )));
        }

        // Fresh profile per attempt; the tempdir is removed on drop.
        let profile = tempfile::tempdir().map_err(|e| {
            FetchError::DownloadFailed(format!("failed to create browser profile: {e}"))
        })?;

        info!(url, "Rendering page in headless browser");

        let result = tokio::time::timeout(
            RENDER_TIMEOUT,
            Command::new(&self.chrome_bin)
                .args([
                    "--headless",
                    "--no-sandbox",
                    "--disable-gpu",
                    "--disable-dev-shm-usage",
                    "--disable-blink-features=AutomationControlled",
                    "--window-size=1280,800",
                    &format!("--user-data-dir={}", profile.path().display()),
                    &format!("--virtual-time-budget={SETTLE_BUDGET_MS}"),
                    "--dump-dom",
                    url,
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    warn!(url, stderr = %stderr.lines().next().unwrap_or(""), "Browser exited with error");
                    return Err(FetchError::DownloadFailed(
                        "browser render failed".to_string(),
                    ));
                }
                if output.stdout.is_empty() {
                    return Err(FetchError::DownloadFailed(
                        "browser returned an empty DOM".to_string(),
                    ));
                }
                Ok(String::from_utf8_lossy(&output.stdout).into_owned())
            }
            Ok(Err(e)) => Err(FetchError::DownloadFailed(format!(
                "failed to launch browser: {e}"
            ))),
            Err(_) => {
                warn!(url, timeout_secs = RENDER_TIMEOUT.as_secs(), "Browser render timed out");
                Err(FetchError::DownloadFailed(
                    "browser render timed out".to_string(),
                ))
            }
        }
    }

    /// Keep the failing page around for offline debugging: raw markup plus a
    /// screenshot from a second, short-lived browser run. Both are
    /// best-effort — diagnostics never turn a failure into a different one.
    async fn persist_diagnostics(&self, url: &str, html: &str) {
        if let Err(e) = tokio::fs::create_dir_all(&self.debug_dir).await {
            warn!(error = %e, "Failed to create debug dir");
            return;
        }

        let html_path = self.debug_dir.join("last_fail.html");
        if let Err(e) = tokio::fs::write(&html_path, html).await {
            warn!(error = %e, "Failed to persist debug markup");
        }

        let shot_path = self.debug_dir.join("last_fail.png");
        let profile = match tempfile::tempdir() {
            Ok(p) => p,
            Err(_) => return,
        };
        let shot = tokio::time::timeout(
            RENDER_TIMEOUT,
            Command::new(&self.chrome_bin)
                .args([
                    "--headless",
                    "--no-sandbox",
                    "--disable-gpu",
                    "--disable-dev-shm-usage",
                    "--window-size=1280,800",
                    &format!("--user-data-dir={}", profile.path().display()),
                    &format!("--screenshot={}", shot_path.display()),
                    url,
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match shot {
            Ok(Ok(_)) => {
                info!(
                    html = %html_path.display(),
                    screenshot = %shot_path.display(),
                    "Persisted failure diagnostics"
                );
            }
            _ => warn!(url, "Failed to capture debug screenshot"),
        }
    }
}

#[async_trait]
impl MediaStrategy for BrowserRenderStrategy {
    fn name(&self) -> &'static str {
        "browser-render"
    }

    fn source(&self) -> SourceStrategy {
        SourceStrategy::BrowserRender
    }

    async fn resolve(&self, shortcode: &str) -> Result<MediaDescriptor, FetchError> {
        let url = canonical_post_url(shortcode);
        self.resolve_url(&url, shortcode).await
    }
}
