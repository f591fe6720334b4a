use std::time::Duration;

use mapscrape_core::AppConfig;

use crate::collector::CollectorSettings;

/// Timing and pacing knobs for one extraction run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub navigation_timeout: Duration,
    /// Bound on opening and closing pages and on shutting the browser down.
    pub session_timeout: Duration,
    /// Bound on waits for a single element (detail heading, consent button).
    pub selector_timeout: Duration,
    pub listing_delay_min_ms: u64,
    pub listing_delay_max_ms: u64,
    pub nav_max_retries: u32,
    pub nav_backoff_base_ms: u64,
    /// Email lookups in flight at once.
    pub email_concurrency: usize,
    pub collector: CollectorSettings,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            session_timeout: Duration::from_millis(config.navigation_timeout_ms),
            selector_timeout: Duration::from_millis(config.selector_timeout_ms),
            listing_delay_min_ms: config.listing_delay_min_ms,
            listing_delay_max_ms: config.listing_delay_max_ms,
            nav_max_retries: config.nav_max_retries,
            nav_backoff_base_ms: config.nav_backoff_base_ms,
            email_concurrency: config.email_concurrency.max(1),
            collector: CollectorSettings::from_config(config),
        }
    }
}
