use std::path::PathBuf;

/// How the email discoverer loads a business website.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailFetchMode {
    /// A fresh page in the running browser. Sees JavaScript-rendered content.
    Browser,
    /// A plain HTTP GET. No JavaScript, but much cheaper.
    Http,
}

impl std::fmt::Display for EmailFetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailFetchMode::Browser => write!(f, "browser"),
            EmailFetchMode::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub chromium_path: Option<PathBuf>,
    pub user_agent: String,
    pub navigation_timeout_ms: u64,
    pub selector_timeout_ms: u64,
    pub scroll_delta_px: u32,
    pub scroll_settle_ms: u64,
    pub max_stale_scrolls: u32,
    pub max_scroll_attempts: u32,
    pub listing_delay_min_ms: u64,
    pub listing_delay_max_ms: u64,
    pub nav_max_retries: u32,
    pub nav_backoff_base_ms: u64,
    pub email_timeout_ms: u64,
    pub email_concurrency: usize,
    pub email_fetch: EmailFetchMode,
    pub selectors_path: Option<PathBuf>,
}
