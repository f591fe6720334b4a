use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("invalid Maps URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("browser session failed: {0}")]
    Session(String),

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("DOM query failed for selector \"{selector}\": {reason}")]
    Dom { selector: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("run cancelled")]
    Cancelled,
}

impl ScraperError {
    /// `true` for errors that end the run instead of skipping one listing.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScraperError::InvalidUrl { .. } | ScraperError::Session(_)
        )
    }
}
