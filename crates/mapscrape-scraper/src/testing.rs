//! Testing utilities including an in-memory browser.
//!
//! [`MockBrowser`] serves scripted documents keyed by URL and records every
//! call, so the extraction engine can be exercised without Chromium.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mapscrape_core::SelectorConfig;
use tokio_util::sync::CancellationToken;

use crate::browser::{Browser, BrowserLauncher, BrowserPage};
use crate::collector::CollectorSettings;
use crate::error::ScraperError;
use crate::pipeline::PipelineSettings;

/// Pipeline settings with pacing, backoff, and settle waits zeroed.
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        navigation_timeout: Duration::from_secs(5),
        session_timeout: Duration::from_secs(5),
        selector_timeout: Duration::ZERO,
        listing_delay_min_ms: 0,
        listing_delay_max_ms: 0,
        nav_max_retries: 1,
        nav_backoff_base_ms: 0,
        email_concurrency: 1,
        collector: CollectorSettings {
            scroll_delta_px: 800,
            scroll_settle: Duration::ZERO,
            max_stale_scrolls: 2,
            max_scroll_attempts: 100,
            panel_timeout: Duration::ZERO,
        },
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One element matched by a selector.
///
/// Elements can be tied to the page's scroll count so that a results panel
/// reveals more listings as it is scrolled.
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    text: Option<String>,
    attrs: HashMap<String, String>,
    shown_from_scroll: u32,
    hidden_from_scroll: Option<u32>,
}

impl MockElement {
    /// An element with rendered text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// An anchor with an `href` and no text.
    pub fn link(href: impl Into<String>) -> Self {
        Self::default().with_attr("href", href)
    }

    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Element only exists once the page has been scrolled `n` times.
    #[must_use]
    pub fn shown_after_scrolls(mut self, n: u32) -> Self {
        self.shown_from_scroll = n;
        self
    }

    /// Element disappears once the page has been scrolled `n` times.
    #[must_use]
    pub fn hidden_after_scrolls(mut self, n: u32) -> Self {
        self.hidden_from_scroll = Some(n);
        self
    }

    fn visible_at(&self, scrolls: u32) -> bool {
        scrolls >= self.shown_from_scroll && self.hidden_from_scroll.is_none_or(|h| scrolls < h)
    }
}

/// How navigating to a document behaves.
#[derive(Debug, Clone, Default)]
pub enum MockNavigation {
    #[default]
    Ok,
    /// The load times out; the document is still shown.
    Timeout,
    /// The load fails this many times before succeeding.
    FailTimes(u32),
    /// The load always fails.
    Fail(String),
}

/// A scripted page.
#[derive(Debug, Clone, Default)]
pub struct MockDocument {
    elements: HashMap<String, Vec<MockElement>>,
    markup: String,
    final_url: Option<Option<String>>,
    navigation: MockNavigation,
}

impl MockDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element matched by `selector`. Repeated calls append.
    #[must_use]
    pub fn with(mut self, selector: impl Into<String>, element: MockElement) -> Self {
        self.elements.entry(selector.into()).or_default().push(element);
        self
    }

    /// Shorthand for a text element.
    #[must_use]
    pub fn with_text(self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.with(selector, MockElement::text(text))
    }

    /// Raw markup returned by `content()`.
    #[must_use]
    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = markup.into();
        self
    }

    /// The URL the page reports after loading, e.g. a redirect target.
    #[must_use]
    pub fn redirects_to(mut self, url: impl Into<String>) -> Self {
        self.final_url = Some(Some(url.into()));
        self
    }

    /// The page reports no URL at all.
    #[must_use]
    pub fn without_url(mut self) -> Self {
        self.final_url = Some(None);
        self
    }

    #[must_use]
    pub fn with_navigation(mut self, navigation: MockNavigation) -> Self {
        self.navigation = navigation;
        self
    }

    /// A results page whose panel reveals `per_scroll` listings per scroll.
    ///
    /// With `end_marker`, the end-of-list text appears once the last batch
    /// is visible.
    pub fn search_results(
        selectors: &SelectorConfig,
        hrefs: &[String],
        per_scroll: usize,
        end_marker: bool,
    ) -> Self {
        let per_scroll = per_scroll.max(1);
        let batches = u32::try_from(hrefs.len().div_ceil(per_scroll)).unwrap_or(u32::MAX);
        let last_batch = batches.saturating_sub(1);

        let mut doc = Self::new();
        for (i, href) in hrefs.iter().enumerate() {
            let batch = u32::try_from(i / per_scroll).unwrap_or(u32::MAX);
            doc = doc.with(
                selectors.listing_link.clone(),
                MockElement::link(href.clone()).shown_after_scrolls(batch),
            );
        }

        if end_marker {
            doc.with(
                selectors.feed.clone(),
                MockElement::text("Results").hidden_after_scrolls(last_batch),
            )
            .with(
                selectors.feed.clone(),
                MockElement::text(format!("Results\n{}", selectors.end_of_list_text))
                    .shown_after_scrolls(last_batch),
            )
        } else {
            doc.with_text(selectors.feed.clone(), "Results")
        }
    }

    fn visible(&self, selector: &str, scrolls: u32) -> impl Iterator<Item = &MockElement> {
        self.elements
            .get(selector)
            .into_iter()
            .flatten()
            .filter(move |e| e.visible_at(scrolls))
    }
}

/// Record of a call made to the mock browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Launch { headless: bool },
    NewPage,
    Navigate { url: String },
    Scroll { selector: String },
    Click { selector: String },
    ClosePage,
    CloseBrowser,
}

#[derive(Default)]
struct Shared {
    documents: Mutex<HashMap<String, MockDocument>>,
    nav_failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<MockCall>>,
    navigations: AtomicU32,
    session_lost_after: Mutex<Option<u32>>,
    cancel_after: Mutex<Option<(u32, CancellationToken)>>,
    fail_launch: Mutex<Option<String>>,
    stall_new_page: AtomicBool,
    stall_close: AtomicBool,
}

/// An in-memory browser. Acts as its own launcher.
#[derive(Clone, Default)]
pub struct MockBrowser {
    shared: Arc<Shared>,
}

impl MockBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `document` at `url`.
    #[must_use]
    pub fn with_document(self, url: impl Into<String>, document: MockDocument) -> Self {
        lock(&self.shared.documents).insert(url.into(), document);
        self
    }

    /// Every navigation after the first `n` fails with a session error.
    #[must_use]
    pub fn with_session_lost_after(self, n: u32) -> Self {
        *lock(&self.shared.session_lost_after) = Some(n);
        self
    }

    /// Cancel `token` once `n` navigations have completed.
    #[must_use]
    pub fn with_cancel_after(self, n: u32, token: CancellationToken) -> Self {
        *lock(&self.shared.cancel_after) = Some((n, token));
        self
    }

    /// `launch` fails with a session error.
    #[must_use]
    pub fn with_launch_failure(self, reason: impl Into<String>) -> Self {
        *lock(&self.shared.fail_launch) = Some(reason.into());
        self
    }

    /// `new_page` is recorded and then never completes.
    #[must_use]
    pub fn with_stalled_new_page(self) -> Self {
        self.shared.stall_new_page.store(true, Ordering::SeqCst);
        self
    }

    /// Browser `close` is recorded and then never completes.
    #[must_use]
    pub fn with_stalled_close(self) -> Self {
        self.shared.stall_close.store(true, Ordering::SeqCst);
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.shared.calls).clone()
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Navigate { url } => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn pages_opened(&self) -> usize {
        self.count(|c| matches!(c, MockCall::NewPage))
    }

    pub fn pages_closed(&self) -> usize {
        self.count(|c| matches!(c, MockCall::ClosePage))
    }

    pub fn browser_closed(&self) -> bool {
        self.count(|c| matches!(c, MockCall::CloseBrowser)) > 0
    }

    pub fn launched(&self) -> bool {
        self.count(|c| matches!(c, MockCall::Launch { .. })) > 0
    }

    fn count(&self, pred: impl Fn(&MockCall) -> bool) -> usize {
        lock(&self.shared.calls).iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: MockCall) {
        lock(&self.shared.calls).push(call);
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowser {
    async fn launch(&self, headless: bool) -> Result<Box<dyn Browser>, ScraperError> {
        self.record(MockCall::Launch { headless });
        if let Some(reason) = lock(&self.shared.fail_launch).clone() {
            return Err(ScraperError::Session(reason));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Browser for MockBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScraperError> {
        self.record(MockCall::NewPage);
        if self.shared.stall_new_page.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(Box::new(MockPage {
            browser: self.clone(),
            state: Mutex::new(PageState::default()),
        }))
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        self.record(MockCall::CloseBrowser);
        if self.shared.stall_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

#[derive(Default)]
struct PageState {
    url: Option<String>,
    document: Option<MockDocument>,
    scrolls: u32,
}

pub struct MockPage {
    browser: MockBrowser,
    state: Mutex<PageState>,
}

impl MockPage {
    fn with_document<T>(&self, f: impl FnOnce(&MockDocument, u32) -> T) -> Option<T> {
        let state = lock(&self.state);
        state.document.as_ref().map(|doc| f(doc, state.scrolls))
    }

    fn after_navigation(&self) {
        let shared = &self.browser.shared;
        let done = shared.navigations.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((n, token)) = lock(&shared.cancel_after).as_ref() {
            if done >= *n {
                token.cancel();
            }
        }
    }
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScraperError> {
        let shared = &self.browser.shared;
        self.browser.record(MockCall::Navigate {
            url: url.to_owned(),
        });

        if let Some(limit) = *lock(&shared.session_lost_after) {
            if shared.navigations.load(Ordering::SeqCst) >= limit {
                return Err(ScraperError::Session("target crashed".to_owned()));
            }
        }

        let Some(document) = lock(&shared.documents).get(url).cloned() else {
            self.after_navigation();
            return Err(ScraperError::Navigation {
                url: url.to_owned(),
                reason: "net::ERR_NAME_NOT_RESOLVED".to_owned(),
            });
        };

        let failure = match &document.navigation {
            MockNavigation::Ok | MockNavigation::Timeout => None,
            MockNavigation::Fail(reason) => Some(reason.clone()),
            MockNavigation::FailTimes(times) => {
                let mut failures = lock(&shared.nav_failures);
                let seen = failures.entry(url.to_owned()).or_default();
                if *seen < *times {
                    *seen += 1;
                    Some("net::ERR_ABORTED".to_owned())
                } else {
                    None
                }
            }
        };
        if let Some(reason) = failure {
            self.after_navigation();
            return Err(ScraperError::Navigation {
                url: url.to_owned(),
                reason,
            });
        }

        let timed_out = matches!(document.navigation, MockNavigation::Timeout);
        {
            let mut state = lock(&self.state);
            state.url = match &document.final_url {
                Some(reported) => reported.clone(),
                None => Some(url.to_owned()),
            };
            state.document = Some(document);
            state.scrolls = 0;
        }
        self.after_navigation();

        if timed_out {
            return Err(ScraperError::Timeout {
                operation: format!("navigation to {url}"),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        _timeout: Duration,
    ) -> Result<bool, ScraperError> {
        Ok(self
            .with_document(|doc, scrolls| doc.visible(selector, scrolls).next().is_some())
            .unwrap_or(false))
    }

    async fn read_text(&self, selector: &str) -> Result<Option<String>, ScraperError> {
        Ok(self
            .with_document(|doc, scrolls| {
                doc.visible(selector, scrolls)
                    .next()
                    .and_then(|e| e.text.clone())
            })
            .flatten())
    }

    async fn read_attribute(
        &self,
        selector: &str,
        attr: &str,
    ) -> Result<Option<String>, ScraperError> {
        Ok(self
            .with_document(|doc, scrolls| {
                doc.visible(selector, scrolls)
                    .next()
                    .and_then(|e| e.attrs.get(attr).cloned())
            })
            .flatten())
    }

    async fn read_attribute_all(
        &self,
        selector: &str,
        attr: &str,
    ) -> Result<Vec<Option<String>>, ScraperError> {
        Ok(self
            .with_document(|doc, scrolls| {
                doc.visible(selector, scrolls)
                    .map(|e| e.attrs.get(attr).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn scroll(&self, selector: &str, _delta_px: i64) -> Result<bool, ScraperError> {
        self.browser.record(MockCall::Scroll {
            selector: selector.to_owned(),
        });
        let mut state = lock(&self.state);
        let scrolls = state.scrolls;
        let found = state
            .document
            .as_ref()
            .is_some_and(|doc| doc.visible(selector, scrolls).next().is_some());
        if found {
            state.scrolls += 1;
        }
        Ok(found)
    }

    async fn click(&self, selector: &str) -> Result<bool, ScraperError> {
        let found = self
            .with_document(|doc, scrolls| doc.visible(selector, scrolls).next().is_some())
            .unwrap_or(false);
        if found {
            self.browser.record(MockCall::Click {
                selector: selector.to_owned(),
            });
        }
        Ok(found)
    }

    async fn current_url(&self) -> Result<Option<String>, ScraperError> {
        Ok(lock(&self.state).url.clone())
    }

    async fn content(&self) -> Result<String, ScraperError> {
        Ok(self
            .with_document(|doc, _| doc.markup.clone())
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        self.browser.record(MockCall::ClosePage);
        Ok(())
    }
}
