//! Contact email discovery on business websites.
//!
//! A lookup never fails the run: navigation errors, timeouts, bad statuses
//! and pages without an address all come back as `None`.

use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use mapscrape_core::{AppConfig, EmailFetchMode};
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::browser::{with_timeout, Browser, BrowserPage};
use crate::error::ScraperError;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+").expect("valid email regex")
});

static MAILTO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)mailto:([^"'<>\s?]+)"#).expect("valid mailto regex")
});

/// Asset names such as `logo@2x.png` look like addresses.
const IMAGE_SUFFIXES: [&str; 6] = [".png", ".jpg", ".jpeg", ".gif", ".webp", ".svg"];

/// Mailboxes preferred over whatever else a page mentions.
const GENERIC_MAILBOXES: [&str; 4] = ["info@", "contact@", "hello@", "support@"];

/// Picks the best contact address out of `texts`, scanned in order.
///
/// `mailto:` targets are percent-decoded and scanned too. Image-looking
/// matches are dropped, trailing punctuation is trimmed, and a generic
/// mailbox such as `info@` wins over the first match.
#[must_use]
pub fn extract_email(texts: &[&str]) -> Option<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates: Vec<String> = Vec::new();

    let mut push = |raw: &str| {
        let trimmed = raw.trim_end_matches(['.', '-']);
        let lower = trimmed.to_ascii_lowercase();
        let Some((_, domain)) = lower.split_once('@') else {
            return;
        };
        if !domain.contains('.') || IMAGE_SUFFIXES.iter().any(|s| lower.ends_with(s)) {
            return;
        }
        if seen.insert(lower) {
            candidates.push(trimmed.to_owned());
        }
    };

    for text in texts {
        for m in MAILTO_RE.captures_iter(text) {
            let decoded = percent_decode_str(&m[1]).decode_utf8_lossy();
            for e in EMAIL_RE.find_iter(&decoded) {
                push(e.as_str());
            }
        }
        for e in EMAIL_RE.find_iter(text) {
            push(e.as_str());
        }
    }

    candidates
        .iter()
        .find(|c| {
            let lower = c.to_ascii_lowercase();
            GENERIC_MAILBOXES.iter().any(|g| lower.starts_with(g))
        })
        .or_else(|| candidates.first())
        .cloned()
}

/// Looks up contact emails on business websites.
pub struct EmailDiscoverer {
    fetch: EmailFetchMode,
    timeout: Duration,
    http: Client,
}

impl EmailDiscoverer {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn new(
        fetch: EmailFetchMode,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, ScraperError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            fetch,
            timeout,
            http,
        })
    }

    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ScraperError> {
        Self::new(
            config.email_fetch,
            Duration::from_millis(config.email_timeout_ms),
            &config.user_agent,
        )
    }

    /// Finds a contact email on `website_url`.
    ///
    /// In browser mode the site is loaded in a fresh page of `browser`,
    /// which is closed on every path. Non-http(s) URLs are skipped without
    /// a fetch.
    pub async fn find_email(
        &self,
        browser: &dyn Browser,
        website_url: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let scheme_ok = url::Url::parse(website_url)
            .is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
        if !scheme_ok {
            tracing::debug!(url = website_url, "email lookup skipped for non-http website");
            return None;
        }

        let outcome = match self.fetch {
            EmailFetchMode::Browser => self.lookup_in_browser(browser, website_url, cancel).await,
            EmailFetchMode::Http => self.bounded(cancel, self.lookup_http(website_url)).await,
        };

        match outcome {
            Ok(Some(email)) => {
                tracing::debug!(url = website_url, email = %email, "email found");
                Some(email)
            }
            Ok(None) => {
                tracing::debug!(url = website_url, "no email on website");
                None
            }
            Err(e) => {
                tracing::debug!(url = website_url, error = %e, "email lookup failed");
                None
            }
        }
    }

    /// Runs `fut` under the lookup timeout, abandoning it on cancellation.
    async fn bounded<T, F>(&self, cancel: &CancellationToken, fut: F) -> Result<T, ScraperError>
    where
        F: std::future::Future<Output = Result<T, ScraperError>>,
    {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ScraperError::Cancelled),
            res = with_timeout("email lookup", self.timeout, fut) => res,
        }
    }

    async fn lookup_in_browser(
        &self,
        browser: &dyn Browser,
        website_url: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ScraperError> {
        let page = self.bounded(cancel, browser.new_page()).await?;
        let outcome = self
            .bounded(cancel, scan_page(page.as_ref(), website_url, self.timeout))
            .await;
        if let Err(e) = with_timeout("closing the email page", self.timeout, page.close()).await {
            tracing::debug!(url = website_url, error = %e, "closing email page failed");
        }
        outcome
    }

    async fn lookup_http(&self, website_url: &str) -> Result<Option<String>, ScraperError> {
        let response = self
            .http
            .get(website_url)
            .header(
                reqwest::header::ACCEPT,
                "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
            )
            .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: website_url.to_owned(),
            });
        }
        let body = response.text().await?;
        Ok(extract_email(&[&body]))
    }
}

async fn scan_page(
    page: &dyn BrowserPage,
    website_url: &str,
    timeout: Duration,
) -> Result<Option<String>, ScraperError> {
    match page.navigate(website_url, timeout).await {
        Ok(()) | Err(ScraperError::Timeout { .. }) => {}
        Err(e) => return Err(e),
    }
    let text = page.read_text("body").await?.unwrap_or_default();
    let markup = page.content().await?;
    Ok(extract_email(&[&text, &markup]))
}
