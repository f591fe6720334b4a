//! Field extraction from a rendered place page.
//!
//! Every field is read through its own selector and is independently
//! optional. Only `maps_url` is mandatory; see [`FieldParser::parse`].

use std::sync::Arc;

use mapscrape_core::{BusinessRecord, SelectorConfig};
use thiserror::Error;

use crate::browser::BrowserPage;
use crate::dispatch::is_place_url;
use crate::parse_helpers::{accept_website, normalize_text, parse_rating, parse_review_count};

/// A listing that cannot become a record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ListingParseFailure {
    #[error("page URL could not be read")]
    MissingMapsUrl,

    #[error("page URL {0} is not a place URL")]
    NotAPlace(String),
}

/// Reads a [`BusinessRecord`] from the page currently loaded in a
/// [`BrowserPage`].
#[derive(Debug, Clone)]
pub struct FieldParser {
    selectors: Arc<SelectorConfig>,
}

impl FieldParser {
    #[must_use]
    pub fn new(selectors: Arc<SelectorConfig>) -> Self {
        Self { selectors }
    }

    /// Parses the loaded place page.
    ///
    /// `maps_url` comes from the page's current URL and must be a place
    /// URL; consent interstitials, "sorry" pages, and crashed tabs fail
    /// here. Every other field is read independently and a failed read
    /// leaves only that field absent.
    ///
    /// # Errors
    ///
    /// Returns [`ListingParseFailure`] when `maps_url` is unusable.
    pub async fn parse(&self, page: &dyn BrowserPage) -> Result<BusinessRecord, ListingParseFailure> {
        let maps_url = match page.current_url().await {
            Ok(Some(url)) if is_place_url(&url) => url,
            Ok(Some(url)) => return Err(ListingParseFailure::NotAPlace(url)),
            Ok(None) => return Err(ListingParseFailure::MissingMapsUrl),
            Err(e) => {
                tracing::debug!(error = %e, "current URL read failed");
                return Err(ListingParseFailure::MissingMapsUrl);
            }
        };

        let s = &self.selectors;
        let mut record = BusinessRecord::new(maps_url);

        record.name = read_text(page, "name", &s.name).await;
        record.category = read_text(page, "category", &s.category).await;
        record.address = read_text(page, "address", &s.address).await;
        record.phone = read_text(page, "phone", &s.phone).await;

        record.rating = match read_text(page, "rating", &s.rating)
            .await
            .and_then(|t| parse_rating(&t))
        {
            Some(r) => Some(r),
            None => read_attr(page, "rating", &s.rating_label, "aria-label")
                .await
                .and_then(|t| parse_rating(&t)),
        };

        record.review_count = match read_text(page, "review_count", &s.review_count)
            .await
            .and_then(|t| parse_review_count(&t))
        {
            Some(n) => Some(n),
            None => read_attr(page, "review_count", &s.review_count, "aria-label")
                .await
                .and_then(|t| parse_review_count(&t)),
        };

        record.website = read_attr(page, "website", &s.website, "href")
            .await
            .and_then(|href| accept_website(&href));

        tracing::debug!(
            maps_url = %record.maps_url,
            name = record.name.as_deref().unwrap_or(""),
            has_website = record.website.is_some(),
            "parsed listing"
        );
        Ok(record)
    }
}

async fn read_text(page: &dyn BrowserPage, field: &str, selector: &str) -> Option<String> {
    match page.read_text(selector).await {
        Ok(text) => text.and_then(|t| normalize_text(&t)),
        Err(e) => {
            tracing::debug!(field, selector, error = %e, "field read failed");
            None
        }
    }
}

async fn read_attr(
    page: &dyn BrowserPage,
    field: &str,
    selector: &str,
    attr: &str,
) -> Option<String> {
    match page.read_attribute(selector, attr).await {
        Ok(value) => value.and_then(|v| normalize_text(&v)),
        Err(e) => {
            tracing::debug!(field, selector, attr, error = %e, "field read failed");
            None
        }
    }
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
