//! URL mode detection.

use mapscrape_core::ExtractionMode;
use url::Url;

use crate::error::ScraperError;

/// Classifies a Maps URL as a search listing or a single place.
///
/// - `/maps/place/...` is a single place.
/// - `/maps/search/...`, or any `/maps` path carrying a `q` or `query`
///   parameter, is a search.
///
/// # Errors
///
/// Returns [`ScraperError::InvalidUrl`] for malformed URLs, non-http(s)
/// schemes, and paths outside `/maps`.
pub fn classify(raw: &str) -> Result<ExtractionMode, ScraperError> {
    let invalid = |reason: &str| ScraperError::InvalidUrl {
        url: raw.to_owned(),
        reason: reason.to_owned(),
    };

    let url = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host"));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let Some(maps_idx) = segments.iter().position(|seg| *seg == "maps") else {
        return Err(invalid("not a Google Maps path"));
    };

    match segments.get(maps_idx + 1).copied() {
        Some("place") if segments.len() > maps_idx + 2 => Ok(ExtractionMode::SinglePlace),
        Some("place") => Err(invalid("place path has no place identifier")),
        Some("search") => Ok(ExtractionMode::Search),
        _ if has_query_param(&url) => Ok(ExtractionMode::Search),
        _ => Err(invalid("neither a place nor a search URL")),
    }
}

/// `true` when `raw` classifies as a single place.
#[must_use]
pub fn is_place_url(raw: &str) -> bool {
    matches!(classify(raw), Ok(ExtractionMode::SinglePlace))
}

fn has_query_param(url: &Url) -> bool {
    url.query_pairs()
        .any(|(k, v)| (k == "q" || k == "query") && !v.trim().is_empty())
}
