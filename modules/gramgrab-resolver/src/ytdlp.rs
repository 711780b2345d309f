//! Extractor-tool subprocess wrapper.
//!
//! Three invocation shapes: a structured metadata dump, a quick direct-URL
//! resolution, and a raw stdout pipe. All of them are bounded by explicit
//! timeouts and spawn with kill-on-drop, so cancelling the calling future
//! (watchdog expiry, client disconnect) also terminates the process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use gramgrab_common::{
    Config, CookieJar, FetchError, BROWSER_USER_AGENT, PLATFORM_REFERER,
};
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::deliver::{AssetFetcher, ByteStream, CdnFetcher};

/// Hard bound on a metadata dump; the watchdog kills the process on expiry.
const DUMP_TIMEOUT: Duration = Duration::from_secs(60);

/// Bound on the quick `--get-url` resolution.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(30);

/// Favors MP4 containers with H.264 for widest playback compatibility.
const FORMAT_PREFERENCE: &str = "best[ext=mp4]/bestvideo[ext=mp4]+bestaudio[ext=m4a]/best";

pub struct YtDlp {
    bin: String,
    cookies: Option<PathBuf>,
    username: Option<String>,
    password: Option<String>,
    cdn: CdnFetcher,
}

impl YtDlp {
    pub fn from_config(cfg: &Config) -> Self {
        // Only hand the jar to the tool when it actually holds a live session.
        let cookies = CookieJar::load(&cfg.cookies_path)
            .filter(|jar| jar.has_active_session())
            .map(|jar| jar.path);

        Self {
            bin: cfg.ytdlp_bin.clone(),
            cookies,
            username: cfg.ig_username.clone(),
            password: cfg.ig_password.clone(),
            cdn: CdnFetcher::new(),
        }
    }

    fn auth_args(&self) -> (Vec<String>, &'static str) {
        if let Some(jar) = &self.cookies {
            (
                vec!["--cookies".to_string(), jar.display().to_string()],
                "cookies",
            )
        } else if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            (
                vec![
                    "-u".to_string(),
                    user.clone(),
                    "-p".to_string(),
                    pass.clone(),
                ],
                "credentials",
            )
        } else {
            (Vec::new(), "anonymous")
        }
    }

    /// Dump structured metadata for a post page.
    pub async fn dump_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let (auth, mode) = self.auth_args();
        info!(url, auth = mode, "Starting extractor dump");

        let mut cmd = Command::new(&self.bin);
        cmd.args(["--dump-json", "--no-warnings", "--no-playlist"])
            .args(&auth)
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(DUMP_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(FetchError::DownloadFailed(format!(
                    "failed to spawn extractor: {e}"
                )))
            }
            Err(_) => {
                warn!(url, timeout_secs = DUMP_TIMEOUT.as_secs(), "Extractor dump timed out");
                return Err(FetchError::DownloadFailed(
                    "extractor dump timed out".to_string(),
                ));
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            warn!(url, stderr = %first_line(&stderr), "Extractor exited with error");
            return Err(classify_stderr(&stderr));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            warn!(url, error = %e, "Extractor produced malformed output");
            FetchError::DownloadFailed(format!("malformed extractor output: {e}"))
        })
    }

    /// Resolve a page to a direct CDN URL via the tool's format negotiation.
    pub async fn resolve_direct_url(&self, page_url: &str) -> Result<String, FetchError> {
        let (auth, _) = self.auth_args();

        let mut cmd = Command::new(&self.bin);
        cmd.args([
            "--no-playlist",
            "--get-url",
            "-f",
            FORMAT_PREFERENCE,
            "--user-agent",
            BROWSER_USER_AGENT,
            "--referer",
            PLATFORM_REFERER,
        ])
        .args(&auth)
        .arg(page_url)
        .stdin(Stdio::null())
        .kill_on_drop(true);

        let output = match tokio::time::timeout(RESOLVE_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(FetchError::DownloadFailed(format!(
                    "failed to spawn extractor: {e}"
                )))
            }
            Err(_) => {
                return Err(FetchError::DownloadFailed(
                    "stream resolution timed out".to_string(),
                ))
            }
        };

        if !output.status.success() {
            return Err(classify_stderr(&String::from_utf8_lossy(&output.stderr)));
        }

        // Several lines come back for split audio/video; the first is the
        // primary stream.
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .ok_or_else(|| FetchError::DownloadFailed("extractor returned no url".to_string()))
    }

    /// Pipe the tool's own download of a page straight through as bytes.
    pub fn stream_pipe(&self, page_url: &str) -> Result<ByteStream, FetchError> {
        let (auth, _) = self.auth_args();
        info!(page_url, "Starting extractor pipe stream");

        let mut child = Command::new(&self.bin)
            .args([
                "-o",
                "-",
                "--no-playlist",
                "-f",
                FORMAT_PREFERENCE,
                "--user-agent",
                BROWSER_USER_AGENT,
                "--referer",
                PLATFORM_REFERER,
            ])
            .args(&auth)
            .arg(page_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FetchError::DownloadFailed(format!("failed to spawn extractor: {e}")))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            FetchError::DownloadFailed("extractor stdout unavailable".to_string())
        })?;

        // The child rides inside the stream: dropping the stream (client
        // disconnect) drops the child, which kills the process.
        let stream = async_stream::stream! {
            let _child = child;
            let mut chunks = ReaderStream::new(stdout);
            while let Some(chunk) = chunks.next().await {
                yield chunk;
            }
        };

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl crate::deliver::ToolStreamer for YtDlp {
    /// Quick URL resolution first, then a direct fetch of the negotiated
    /// link; any failure falls back to the raw stdout pipe.
    async fn stream(&self, page_url: &str) -> Result<ByteStream, FetchError> {
        match self.resolve_direct_url(page_url).await {
            Ok(direct) => match self.cdn.fetch(&direct).await {
                Ok(body) => {
                    info!(page_url, "Streaming tool-negotiated direct link");
                    return Ok(body);
                }
                Err(e) => {
                    warn!(page_url, error = %e, "Negotiated link rejected, falling back to pipe");
                }
            },
            Err(e) => {
                warn!(page_url, error = %e, "Quick resolution failed, falling back to pipe");
            }
        }
        self.stream_pipe(page_url)
    }
}

/// Maps the tool's diagnostic stream to a failure kind. The kind is preserved
/// for the final error but never changes fallback behavior by itself.
fn classify_stderr(stderr: &str) -> FetchError {
    let s = stderr.to_lowercase();

    if s.contains("429") || s.contains("rate-limit") || s.contains("rate limit") {
        return FetchError::RateLimited;
    }
    if s.contains("login required")
        || s.contains("login_required")
        || s.contains("use --cookies")
        || s.contains("registered users")
    {
        return FetchError::AuthRequired;
    }
    if s.contains("404")
        || s.contains("not found")
        || s.contains("unavailable")
        || s.contains("does not exist")
        || s.contains("private")
    {
        return FetchError::NotFound;
    }

    FetchError::DownloadFailed(first_line(stderr).to_string())
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_classification_covers_known_phrases() {
        assert!(matches!(
            classify_stderr("ERROR: [Instagram] HTTP Error 404: Not Found"),
            FetchError::NotFound
        ));
        assert!(matches!(
            classify_stderr("ERROR: This post is private"),
            FetchError::NotFound
        ));
        assert!(matches!(
            classify_stderr("ERROR: HTTP Error 429: Too Many Requests"),
            FetchError::RateLimited
        ));
        assert!(matches!(
            classify_stderr("ERROR: login required. Use --cookies to pass a session"),
            FetchError::AuthRequired
        ));
        assert!(matches!(
            classify_stderr("ERROR: something novel broke"),
            FetchError::DownloadFailed(_)
        ));
    }
}
