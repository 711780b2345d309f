use thiserror::Error;

/// Failure kinds surfaced by the resolution and delivery pipeline.
///
/// Strategy-local failures are caught and converted into advancing the
/// fallback chain; only the orchestrator's final exhaustion failure or a
/// terminal signal reaches the caller.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Post deleted or private. Terminal: no strategy can recover it.
    #[error("post not found - it might be deleted or private")]
    NotFound,

    /// The platform served a login wall. Refresh credentials.
    #[error("platform requires login")]
    AuthRequired,

    /// The platform served a verification / suspicious-activity challenge.
    #[error("account flagged - verification required")]
    AccountChallenged,

    /// IP- or key-level throttling. Wait or rotate egress.
    #[error("platform is rate limiting requests - try again in a few minutes")]
    RateLimited,

    /// The global resolution deadline expired.
    #[error("resolution timed out")]
    Timeout,

    /// A strategy returned data the normalizer could not map.
    #[error("unparsable strategy response: {0}")]
    UnparsableResponse(String),

    /// The scorer was handed an empty candidate list. Programmer error.
    #[error("no candidates to score")]
    NoCandidates,

    /// Generic catch-all when no more specific kind applies.
    #[error("media download failed: {0}")]
    DownloadFailed(String),
}

impl FetchError {
    /// Terminal failures short-circuit the fallback chain: a confirmed-deleted
    /// post cannot be recovered by scraping harder.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FetchError::NotFound)
    }

    /// Stable code string for JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::NotFound => "NOT_FOUND",
            FetchError::AuthRequired => "LOGIN_REQUIRED",
            FetchError::AccountChallenged => "ACCOUNT_CHALLENGED",
            FetchError::RateLimited => "RATE_LIMITED",
            FetchError::Timeout => "TIMEOUT",
            FetchError::UnparsableResponse(_) => "UNPARSABLE_RESPONSE",
            FetchError::NoCandidates => "NO_CANDIDATES",
            FetchError::DownloadFailed(_) => "DOWNLOAD_FAILED",
        }
    }

    fn specificity(&self) -> u8 {
        match self {
            FetchError::DownloadFailed(_) => 0,
            FetchError::UnparsableResponse(_) | FetchError::NoCandidates => 1,
            FetchError::Timeout => 2,
            FetchError::RateLimited | FetchError::AuthRequired | FetchError::AccountChallenged => 3,
            FetchError::NotFound => 4,
        }
    }

    /// Keeps the more diagnostic of two chain failures. Ties keep the earlier
    /// one, so exhaustion reporting is deterministic.
    pub fn more_specific(earlier: FetchError, later: FetchError) -> FetchError {
        if later.specificity() > earlier.specificity() {
            later
        } else {
            earlier
        }
    }
}
