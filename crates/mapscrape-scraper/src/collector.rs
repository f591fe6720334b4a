//! Progressive loading of a search-results panel.
//!
//! Maps renders roughly twenty listings at a time and appends more as the
//! results panel is scrolled. The collector keeps scrolling until it has
//! enough distinct listings or the panel stops producing new ones.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mapscrape_core::{AppConfig, SelectorConfig};
use tokio_util::sync::CancellationToken;

use crate::browser::BrowserPage;
use crate::error::ScraperError;

const SETTLE_POLL: Duration = Duration::from_millis(250);

/// A discovered listing, identified by its map-link href.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRef {
    /// Zero-based discovery position.
    pub position: usize,
    /// `None` when the listing element carried no readable link. Such a
    /// listing still counts as attempted but cannot be visited.
    pub href: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `max_results` distinct listings were collected.
    MaxResults,
    /// The panel is exhausted: end marker shown, repeated empty scrolls, or
    /// no panel at all.
    EndOfResults,
    /// `max_scroll_attempts` scrolls were spent.
    ScrollCeiling,
    Cancelled,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::MaxResults => "max_results",
            StopReason::EndOfResults => "end_of_results",
            StopReason::ScrollCeiling => "scroll_ceiling",
            StopReason::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub refs: Vec<ListingRef>,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub scroll_delta_px: u32,
    /// Upper bound on waiting for new listings after one scroll.
    pub scroll_settle: Duration,
    /// Consecutive scrolls without a new listing before giving up.
    pub max_stale_scrolls: u32,
    pub max_scroll_attempts: u32,
    /// How long to wait for the results panel to appear.
    pub panel_timeout: Duration,
}

impl CollectorSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            scroll_delta_px: config.scroll_delta_px,
            scroll_settle: Duration::from_millis(config.scroll_settle_ms),
            max_stale_scrolls: config.max_stale_scrolls,
            max_scroll_attempts: config.max_scroll_attempts,
            panel_timeout: Duration::from_millis(config.selector_timeout_ms),
        }
    }
}

pub struct ListingCollector {
    selectors: Arc<SelectorConfig>,
    settings: CollectorSettings,
}

impl ListingCollector {
    #[must_use]
    pub fn new(selectors: Arc<SelectorConfig>, settings: CollectorSettings) -> Self {
        Self {
            selectors,
            settings,
        }
    }

    /// Collects up to `max_results` distinct listings from the results page
    /// loaded in `page`.
    ///
    /// Zero listings is a normal outcome. Cancellation is observed between
    /// scroll rounds and during the settle wait; whatever was collected so
    /// far is returned with [`StopReason::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Session`] if the page dies. Other read
    /// failures end collection early with what was gathered.
    pub async fn collect(
        &self,
        page: &dyn BrowserPage,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Collection, ScraperError> {
        let panel = self.locate_panel(page).await?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut unreadable: HashSet<usize> = HashSet::new();
        let mut refs: Vec<ListingRef> = Vec::new();
        let mut stale = 0u32;
        let mut scrolls = 0u32;

        let stop_reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let added = match self
                .absorb(page, &mut seen, &mut unreadable, &mut refs, max_results).await {
                Ok(added) => added,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, collected = refs.len(), "listing read failed, ending collection");
                    break StopReason::EndOfResults;
                }
            };

            if refs.len() >= max_results {
                break StopReason::MaxResults;
            }

            if scrolls > 0 {
                if added == 0 {
                    stale += 1;
                    if stale >= self.settings.max_stale_scrolls {
                        tracing::debug!(stale, "no new listings after repeated scrolls");
                        break StopReason::EndOfResults;
                    }
                } else {
                    stale = 0;
                }
            }

            let Some(panel) = panel else {
                break StopReason::EndOfResults;
            };

            match self.end_marker_visible(page, panel).await {
                Ok(true) => {
                    tracing::debug!(collected = refs.len(), "end of list marker shown");
                    break StopReason::EndOfResults;
                }
                Ok(false) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::debug!(error = %e, "end marker check failed"),
            }

            if scrolls >= self.settings.max_scroll_attempts {
                tracing::warn!(scrolls, collected = refs.len(), "scroll ceiling reached");
                break StopReason::ScrollCeiling;
            }

            match page
                .scroll(panel, i64::from(self.settings.scroll_delta_px))
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(panel, "results panel vanished");
                    break StopReason::EndOfResults;
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "scrolling failed, ending collection");
                    break StopReason::EndOfResults;
                }
            }
            scrolls += 1;

            if self.settle(page, &seen, cancel).await {
                break StopReason::Cancelled;
            }
        };

        tracing::info!(
            collected = refs.len(),
            scrolls,
            stop_reason = %stop_reason,
            "listing collection finished"
        );
        Ok(Collection { refs, stop_reason })
    }

    /// Finds the scrollable results panel, trying the fallback selector
    /// when the primary one never appears.
    async fn locate_panel<'a>(
        &'a self,
        page: &dyn BrowserPage,
    ) -> Result<Option<&'a str>, ScraperError> {
        let s = &self.selectors;
        if page
            .wait_for_selector(&s.feed, self.settings.panel_timeout)
            .await?
        {
            return Ok(Some(&s.feed));
        }
        if page
            .wait_for_selector(&s.feed_fallback, Duration::ZERO)
            .await?
        {
            tracing::debug!(selector = %s.feed_fallback, "using fallback results panel");
            return Ok(Some(&s.feed_fallback));
        }
        tracing::warn!("results panel not found, collecting visible listings only");
        Ok(None)
    }

    /// Appends listings not seen before, stopping at `max_results`. Returns
    /// how many were added.
    ///
    /// Linked listings are deduplicated by href. A listing element without
    /// a readable href is keyed by its slot in the panel, which only grows
    /// as Maps appends results, so it is collected once however many rounds
    /// read it.
    async fn absorb(
        &self,
        page: &dyn BrowserPage,
        seen: &mut HashSet<String>,
        unreadable: &mut HashSet<usize>,
        refs: &mut Vec<ListingRef>,
        max_results: usize,
    ) -> Result<usize, ScraperError> {
        let hrefs = page
            .read_attribute_all(&self.selectors.listing_link, "href")
            .await?;
        let before = refs.len();
        for (slot, href) in hrefs.into_iter().enumerate() {
            if refs.len() >= max_results {
                break;
            }
            match href.map(|h| h.trim().to_owned()).filter(|h| !h.is_empty()) {
                Some(href) => {
                    if seen.insert(href.clone()) {
                        refs.push(ListingRef {
                            position: refs.len(),
                            href: Some(href),
                        });
                    }
                }
                None => {
                    if unreadable.insert(slot) {
                        tracing::debug!(slot, position = refs.len(), "listing element without a map link");
                        refs.push(ListingRef {
                            position: refs.len(),
                            href: None,
                        });
                    }
                }
            }
        }
        Ok(refs.len() - before)
    }

    async fn end_marker_visible(
        &self,
        page: &dyn BrowserPage,
        panel: &str,
    ) -> Result<bool, ScraperError> {
        Ok(page
            .read_text(panel)
            .await?
            .is_some_and(|text| text.contains(&self.selectors.end_of_list_text)))
    }

    /// Waits up to `scroll_settle` for a listing href outside `seen` to
    /// render. Returns `true` if cancelled while waiting.
    async fn settle(
        &self,
        page: &dyn BrowserPage,
        seen: &HashSet<String>,
        cancel: &CancellationToken,
    ) -> bool {
        let deadline = tokio::time::Instant::now() + self.settings.scroll_settle;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return true,
                () = tokio::time::sleep(SETTLE_POLL.min(deadline - now)) => {}
            }
            match page
                .read_attribute_all(&self.selectors.listing_link, "href")
                .await
            {
                Ok(hrefs) if has_unseen(&hrefs, seen) => return false,
                Ok(_) => {}
                // Surfaced by the next absorb.
                Err(_) => return false,
            }
        }
    }
}

/// `true` if any readable href in `hrefs` is missing from `seen`. Elements
/// without a link and repeats of known listings are not new content.
fn has_unseen(hrefs: &[Option<String>], seen: &HashSet<String>) -> bool {
    hrefs
        .iter()
        .flatten()
        .map(|h| h.trim())
        .any(|h| !h.is_empty() && !seen.contains(h))
}
