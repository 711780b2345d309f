use thiserror::Error;

pub type Result<T> = std::result::Result<T, RapidApiError>;

#[derive(Debug, Error)]
pub enum RapidApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited by the API provider")]
    RateLimited,

    #[error("all known endpoint shapes failed")]
    Exhausted,
}

impl From<reqwest::Error> for RapidApiError {
    fn from(err: reqwest::Error) -> Self {
        RapidApiError::Network(err.to_string())
    }
}
