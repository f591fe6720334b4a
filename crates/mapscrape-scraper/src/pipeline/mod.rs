//! Extraction run orchestration.
//!
//! `ExtractionPipeline::run` walks `Init → Dispatched → Collecting (search
//! only) → Parsing → Enriching (optional) → Done`, or ends in `Failed` on a
//! fatal error. It owns the browser for the run and closes the session page
//! and the browser on every exit path.

mod settings;
mod state;

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use mapscrape_core::{
    AppConfig, BusinessRecord, ExtractionMode, ExtractionRequest, RunPhase, RunResult,
    SelectorConfig, SkipReason,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::browser::{with_timeout, Browser, BrowserLauncher, BrowserPage};
use crate::collector::{ListingCollector, StopReason};
use crate::dispatch::classify;
use crate::email::EmailDiscoverer;
use crate::error::ScraperError;
use crate::parse::FieldParser;
use crate::rate_limit::{jittered_delay, retry_with_backoff};

pub use settings::PipelineSettings;

/// A run that ended on a fatal error, with everything completed before it.
#[derive(Debug, Error)]
#[error("extraction run failed: {error}")]
pub struct RunFailure {
    #[source]
    pub error: ScraperError,
    pub partial: Box<RunResult>,
}

pub struct ExtractionPipeline {
    launcher: Arc<dyn BrowserLauncher>,
    selectors: Arc<SelectorConfig>,
    settings: PipelineSettings,
    parser: FieldParser,
    collector: ListingCollector,
    emails: EmailDiscoverer,
}

impl ExtractionPipeline {
    #[must_use]
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        selectors: Arc<SelectorConfig>,
        settings: PipelineSettings,
        emails: EmailDiscoverer,
    ) -> Self {
        Self {
            launcher,
            parser: FieldParser::new(Arc::clone(&selectors)),
            collector: ListingCollector::new(Arc::clone(&selectors), settings.collector.clone()),
            selectors,
            settings,
            emails,
        }
    }

    /// Builds a pipeline from application configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the email HTTP client cannot be built.
    pub fn from_config(
        launcher: Arc<dyn BrowserLauncher>,
        selectors: Arc<SelectorConfig>,
        config: &AppConfig,
    ) -> Result<Self, ScraperError> {
        Ok(Self::new(
            launcher,
            selectors,
            PipelineSettings::from_config(config),
            EmailDiscoverer::from_config(config)?,
        ))
    }

    /// Runs one extraction.
    ///
    /// Cancellation is not an error: the run ends `Done` with
    /// `cancelled = true` and the records gathered so far.
    ///
    /// # Errors
    ///
    /// Returns [`RunFailure`] for an unclassifiable URL (before any browser
    /// is launched), a browser that cannot start or dies mid-run, or a
    /// target page that cannot be loaded. `partial` holds every record
    /// completed before the failure.
    pub async fn run(
        &self,
        request: &ExtractionRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, RunFailure> {
        let mut result = RunResult::new();
        tracing::info!(run_id = %result.run_id, url = request.url(), "extraction run started");

        let mode = match classify(request.url()) {
            Ok(mode) => mode,
            Err(e) => return Err(fail(result, e)),
        };
        result.mode = Some(mode);
        state::enter(&mut result, RunPhase::Dispatched);
        tracing::info!(run_id = %result.run_id, %mode, "url classified");

        let browser = match self.launcher.launch(request.headless()).await {
            Ok(browser) => browser,
            Err(e) => return Err(fail(result, e)),
        };

        let outcome = self
            .drive(browser.as_ref(), request, mode, &mut result, cancel)
            .await;

        let limit = self.settings.session_timeout;
        if let Err(e) = with_timeout("closing the browser", limit, browser.close()).await {
            tracing::warn!(run_id = %result.run_id, error = %e, "browser close failed");
        }

        match outcome {
            Ok(()) => {
                state::finish(&mut result, RunPhase::Done);
                tracing::info!(
                    run_id = %result.run_id,
                    attempted = result.attempted,
                    succeeded = result.succeeded,
                    skipped = result.skipped.len(),
                    emails_missing = result.emails_missing,
                    cancelled = result.cancelled,
                    "extraction run finished"
                );
                Ok(result)
            }
            Err(e) => Err(fail(result, e)),
        }
    }

    async fn drive(
        &self,
        browser: &dyn Browser,
        request: &ExtractionRequest,
        mode: ExtractionMode,
        result: &mut RunResult,
        cancel: &CancellationToken,
    ) -> Result<(), ScraperError> {
        let limit = self.settings.session_timeout;
        let page = with_timeout("opening the session page", limit, browser.new_page()).await?;
        let outcome = self
            .extract(page.as_ref(), request, mode, result, cancel)
            .await;
        if let Err(e) = with_timeout("closing the session page", limit, page.close()).await {
            tracing::debug!(error = %e, "session page close failed");
        }

        match outcome {
            Ok(()) => {}
            Err(ScraperError::Cancelled) => result.cancelled = true,
            Err(e) => return Err(e),
        }

        if request.extract_emails() && !result.cancelled {
            self.enrich(browser, result, cancel).await;
        }
        Ok(())
    }

    /// Collection and parsing on the session page.
    async fn extract(
        &self,
        page: &dyn BrowserPage,
        request: &ExtractionRequest,
        mode: ExtractionMode,
        result: &mut RunResult,
        cancel: &CancellationToken,
    ) -> Result<(), ScraperError> {
        match self.navigate(page, request.url(), cancel).await {
            Ok(()) => {}
            Err(ScraperError::Timeout { .. }) => {
                tracing::warn!(url = request.url(), "target page load timed out, continuing with what rendered");
            }
            Err(e) => return Err(e),
        }
        self.accept_cookies(page).await?;

        let mut seen: HashSet<String> = HashSet::new();
        match mode {
            ExtractionMode::SinglePlace => {
                state::enter(result, RunPhase::Parsing);
                self.wait_for_heading(page).await?;
                self.parse_into(page, 0, None, &mut seen, result).await;
            }
            ExtractionMode::Search => {
                state::enter(result, RunPhase::Collecting);
                let collection = self
                    .collector
                    .collect(page, request.max_results(), cancel)
                    .await?;
                if collection.stop_reason == StopReason::Cancelled {
                    return Err(ScraperError::Cancelled);
                }

                state::enter(result, RunPhase::Parsing);
                let total = collection.refs.len();
                for listing in &collection.refs {
                    if cancel.is_cancelled() {
                        return Err(ScraperError::Cancelled);
                    }
                    let Some(href) = listing.href.as_deref() else {
                        tracing::warn!(position = listing.position + 1, total, "listing has no map link, skipped");
                        result.push_skipped(listing.position, None, SkipReason::MissingMapsUrl);
                        continue;
                    };
                    tracing::info!(
                        position = listing.position + 1,
                        total,
                        url = href,
                        "processing listing"
                    );
                    self.visit_listing(page, listing.position, href, &mut seen, result, cancel)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Navigates to one listing and parses it. Recoverable failures are
    /// recorded as skips; only fatal errors and cancellation propagate.
    async fn visit_listing(
        &self,
        page: &dyn BrowserPage,
        position: usize,
        href: &str,
        seen: &mut HashSet<String>,
        result: &mut RunResult,
        cancel: &CancellationToken,
    ) -> Result<(), ScraperError> {
        match self.navigate(page, href, cancel).await {
            Ok(()) => {}
            Err(ScraperError::Timeout { .. }) => {
                tracing::warn!(
                    position,
                    url = href,
                    "listing load timed out, extracting what is available"
                );
            }
            Err(e) if e.is_fatal() || matches!(e, ScraperError::Cancelled) => return Err(e),
            Err(e) => {
                tracing::warn!(position, url = href, error = %e, "listing skipped");
                result.push_skipped(
                    position,
                    Some(href.to_owned()),
                    SkipReason::Navigation {
                        message: e.to_string(),
                    },
                );
                return Ok(());
            }
        }

        self.wait_for_heading(page).await?;
        self.pause(cancel).await?;
        self.parse_into(page, position, Some(href), seen, result)
            .await;
        Ok(())
    }

    async fn parse_into(
        &self,
        page: &dyn BrowserPage,
        position: usize,
        href: Option<&str>,
        seen: &mut HashSet<String>,
        result: &mut RunResult,
    ) {
        match self.parser.parse(page).await {
            Ok(record) => {
                if seen.insert(record.maps_url.clone()) {
                    result.push_record(record);
                } else {
                    tracing::debug!(position, maps_url = %record.maps_url, "duplicate place skipped");
                    result.push_skipped(position, href.map(str::to_owned), SkipReason::Duplicate);
                }
            }
            Err(failure) => {
                tracing::warn!(position, url = href.unwrap_or(""), error = %failure, "listing discarded");
                result.push_skipped(position, href.map(str::to_owned), SkipReason::MissingMapsUrl);
            }
        }
    }

    /// Adds emails to records with a website, preserving record order.
    async fn enrich(&self, browser: &dyn Browser, result: &mut RunResult, cancel: &CancellationToken) {
        state::enter(result, RunPhase::Enriching);
        let records = std::mem::take(&mut result.records);
        let lookups = records.iter().filter(|r| r.website.is_some()).count();
        tracing::info!(lookups, concurrency = self.settings.email_concurrency, "email enrichment started");

        let enriched: Vec<(BusinessRecord, bool)> = futures::stream::iter(records)
            .map(|record| async move {
                let Some(website) = record.website.clone() else {
                    return (record, false);
                };
                let email = self.emails.find_email(browser, &website, cancel).await;
                (record.with_email(email), true)
            })
            .buffered(self.settings.email_concurrency)
            .collect()
            .await;

        for (record, looked_up) in enriched {
            if looked_up && record.email.is_none() {
                result.emails_missing += 1;
            }
            result.records.push(record);
        }
        if cancel.is_cancelled() {
            result.cancelled = true;
        }
    }

    async fn navigate(
        &self,
        page: &dyn BrowserPage,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ScraperError> {
        let timeout = self.settings.navigation_timeout;
        let attempt = retry_with_backoff(
            self.settings.nav_max_retries,
            self.settings.nav_backoff_base_ms,
            || page.navigate(url, timeout),
        );
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ScraperError::Cancelled),
            res = attempt => res,
        }
    }

    /// Dismisses the cookie consent dialog shown to some regions.
    async fn accept_cookies(&self, page: &dyn BrowserPage) -> Result<(), ScraperError> {
        let selector = &self.selectors.accept_cookies;
        let wait = self.settings.selector_timeout.min(std::time::Duration::from_secs(3));
        match page.wait_for_selector(selector, wait).await {
            Ok(true) => {
                let clicked = page.click(selector).await?;
                tracing::debug!(clicked, "cookie consent dismissed");
                self.pause_after_consent().await;
            }
            Ok(false) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => tracing::debug!(error = %e, "cookie consent check failed"),
        }
        Ok(())
    }

    async fn wait_for_heading(&self, page: &dyn BrowserPage) -> Result<(), ScraperError> {
        match page
            .wait_for_selector(&self.selectors.name, self.settings.selector_timeout)
            .await
        {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::debug!("detail heading did not appear");
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "waiting for detail heading failed");
                Ok(())
            }
        }
    }

    /// Human-like pause between listings.
    async fn pause(&self, cancel: &CancellationToken) -> Result<(), ScraperError> {
        let delay = jittered_delay(
            self.settings.listing_delay_min_ms,
            self.settings.listing_delay_max_ms,
        );
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ScraperError::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }

    async fn pause_after_consent(&self) {
        let delay = jittered_delay(
            self.settings.listing_delay_min_ms / 2,
            self.settings.listing_delay_max_ms / 2,
        );
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn fail(mut result: RunResult, error: ScraperError) -> RunFailure {
    state::finish(&mut result, RunPhase::Failed);
    tracing::error!(
        run_id = %result.run_id,
        error = %error,
        records = result.records.len(),
        "extraction run failed"
    );
    RunFailure {
        error,
        partial: Box::new(result),
    }
}
