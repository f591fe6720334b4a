//! Browser capability abstraction.
//!
//! The extraction engine only talks to these traits. `chromium` backs them
//! with a real Chromium instance; `crate::testing` backs them with an
//! in-memory DOM.

pub mod chromium;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScraperError;

/// Awaits a session operation such as opening a page or shutting the
/// browser down for at most `limit`.
///
/// # Errors
///
/// Returns [`ScraperError::Timeout`] naming `operation` once `limit`
/// passes, otherwise whatever `op` returns.
pub(crate) async fn with_timeout<T, F>(
    operation: &str,
    limit: Duration,
    op: F,
) -> Result<T, ScraperError>
where
    F: Future<Output = Result<T, ScraperError>>,
{
    tokio::time::timeout(limit, op).await.unwrap_or_else(|_| {
        Err(ScraperError::Timeout {
            operation: operation.to_owned(),
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })
    })
}

/// Starts browser instances.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser. `headless = false` shows the window.
    async fn launch(&self, headless: bool) -> Result<Box<dyn Browser>, ScraperError>;
}

/// A running browser that hands out pages.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open a new blank page (tab).
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScraperError>;
    /// Shut the browser down. Open pages die with it.
    async fn close(self: Box<Self>) -> Result<(), ScraperError>;
}

/// One page (tab).
///
/// Read methods return `Ok(None)` when nothing matches; `Err` is reserved for
/// failures of the page itself.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Load `url`, bounded by `timeout`.
    ///
    /// A load that exceeds the timeout returns [`ScraperError::Timeout`];
    /// the page keeps whatever had rendered by then.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScraperError>;

    /// Wait until `selector` matches, polling up to `timeout`. Returns
    /// `false` if it never appeared.
    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScraperError>;

    /// Rendered text of the first match.
    async fn read_text(&self, selector: &str) -> Result<Option<String>, ScraperError>;

    /// Attribute `attr` of the first match.
    async fn read_attribute(
        &self,
        selector: &str,
        attr: &str,
    ) -> Result<Option<String>, ScraperError>;

    /// Attribute `attr` of every match, in document order.
    async fn read_attribute_all(
        &self,
        selector: &str,
        attr: &str,
    ) -> Result<Vec<Option<String>>, ScraperError>;

    /// Scroll the first match vertically by `delta_px`. Returns `false` if
    /// nothing matched.
    async fn scroll(&self, selector: &str, delta_px: i64) -> Result<bool, ScraperError>;

    /// Click the first match. Returns `false` if nothing matched.
    async fn click(&self, selector: &str) -> Result<bool, ScraperError>;

    /// The URL currently loaded, after redirects.
    async fn current_url(&self) -> Result<Option<String>, ScraperError>;

    /// Serialized markup of the whole document.
    async fn content(&self) -> Result<String, ScraperError>;

    async fn close(self: Box<Self>) -> Result<(), ScraperError>;
}
