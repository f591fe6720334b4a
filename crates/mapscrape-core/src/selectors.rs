//! CSS selectors used to read Google Maps pages.
//!
//! Maps class names change without notice, so every selector can be
//! overridden from a YAML file. Keys left out of the file keep their
//! built-in default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorConfig {
    /// Scrollable results panel.
    pub feed: String,
    /// Tried when `feed` matches nothing.
    pub feed_fallback: String,
    /// One anchor per listing; its `href` is the listing identity.
    pub listing_link: String,
    /// Text shown at the bottom of an exhausted results panel.
    pub end_of_list_text: String,
    /// Cookie consent button shown to some regions.
    pub accept_cookies: String,
    pub name: String,
    pub rating: String,
    /// Element whose `aria-label` carries the rating, e.g. `"4.7 stars"`.
    pub rating_label: String,
    pub review_count: String,
    pub category: String,
    pub address: String,
    pub phone: String,
    /// Anchor whose `href` is the business website.
    pub website: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            feed: "div[role='feed']".to_string(),
            feed_fallback: "div.m6QErb[aria-label*='Results']".to_string(),
            listing_link: "a.hfpxzc".to_string(),
            end_of_list_text: "You've reached the end of the list".to_string(),
            accept_cookies: "button[aria-label='Accept all']".to_string(),
            name: "h1.DUwDvf".to_string(),
            rating: "div.F7nice > span > span[aria-hidden='true']".to_string(),
            rating_label: "div.F7nice span[role='img'][aria-label]".to_string(),
            review_count: "div.F7nice span[aria-label*='reviews']".to_string(),
            category: "button.DkEaL".to_string(),
            address: "button[data-item-id='address'] div.Io6YTe".to_string(),
            phone: "button[data-item-id^='phone:tel:'] div.Io6YTe".to_string(),
            website: "a[data-item-id='authority']".to_string(),
        }
    }
}

impl SelectorConfig {
    fn entries(&self) -> [(&'static str, &str); 13] {
        [
            ("feed", &self.feed),
            ("feed_fallback", &self.feed_fallback),
            ("listing_link", &self.listing_link),
            ("end_of_list_text", &self.end_of_list_text),
            ("accept_cookies", &self.accept_cookies),
            ("name", &self.name),
            ("rating", &self.rating),
            ("rating_label", &self.rating_label),
            ("review_count", &self.review_count),
            ("category", &self.category),
            ("address", &self.address),
            ("phone", &self.phone),
            ("website", &self.website),
        ]
    }
}

/// Load selector overrides from a YAML file, falling back to defaults for
/// missing keys.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_selectors(path: &Path) -> Result<SelectorConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::SelectorsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_selectors(&content)
}

/// Parse selector overrides from YAML text.
///
/// An empty document yields the defaults.
///
/// # Errors
///
/// Returns `ConfigError` if the YAML is malformed, names an unknown key, or
/// sets any selector to an empty string.
pub fn parse_selectors(content: &str) -> Result<SelectorConfig, ConfigError> {
    let selectors: SelectorConfig = if content.trim().is_empty() {
        SelectorConfig::default()
    } else {
        serde_yaml::from_str(content)?
    };
    validate_selectors(&selectors)?;
    Ok(selectors)
}

fn validate_selectors(selectors: &SelectorConfig) -> Result<(), ConfigError> {
    for (key, value) in selectors.entries() {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "selector '{key}' must be non-empty"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "selectors_test.rs"]
mod tests;
