//! Text cleanup primitives shared by the field parser.
//!
//! Maps renders numbers for the visitor's locale and decorates text with
//! icon glyphs from a private-use font, so raw `innerText` is never used
//! as-is.

use url::Url;

/// Thousands separators Maps emits across locales: comma, dot, space,
/// no-break space, narrow no-break space.
const GROUP_SEPARATORS: [char; 5] = [',', '.', ' ', '\u{a0}', '\u{202f}'];

fn is_icon_glyph(c: char) -> bool {
    ('\u{e000}'..='\u{f8ff}').contains(&c)
}

/// Collapses runs of whitespace, drops icon glyphs, and maps empty results
/// to `None`.
pub(crate) fn normalize_text(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !is_icon_glyph(*c)).collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// `true` when the first digit of `s` at byte offset `idx` is preceded by a
/// minus sign, ignoring whitespace.
fn is_negated(s: &str, idx: usize) -> bool {
    s[..idx]
        .chars()
        .rev()
        .find(|c| !c.is_whitespace())
        .is_some_and(|c| c == '-' || c == '\u{2212}')
}

/// Parses a star rating such as `"4.7"`, `"4,7"`, or `"4.7 stars"`.
///
/// Returns `None` for non-numeric text, negative values, and anything
/// outside `[0.0, 5.0]`.
pub(crate) fn parse_rating(raw: &str) -> Option<f64> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    if is_negated(raw, start) {
        return None;
    }
    let rest = &raw[start..];
    let mut end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());

    // A single decimal separator followed by more digits.
    if let Some(sep) = rest[end..].chars().next().filter(|c| *c == '.' || *c == ',') {
        let frac_start = end + sep.len_utf8();
        let frac_len = rest[frac_start..]
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len() - frac_start);
        if frac_len > 0 {
            end = frac_start + frac_len;
        }
    }

    let value: f64 = rest[..end].replace(',', ".").parse().ok()?;
    if (0.0..=5.0).contains(&value) {
        Some(value)
    } else {
        None
    }
}

/// Parses a review count such as `"(1,234)"`, `"1.234 Rezensionen"`,
/// `"1 234"`, or `"1.2K reviews"`.
///
/// Group separators are stripped; a trailing `K`/`M` multiplies. Negative
/// or non-numeric text yields `None`.
pub(crate) fn parse_review_count(raw: &str) -> Option<u64> {
    let start = raw.find(|c: char| c.is_ascii_digit())?;
    if is_negated(raw, start) {
        return None;
    }
    let rest = &raw[start..];
    let run_len = rest
        .find(|c: char| !(c.is_ascii_digit() || GROUP_SEPARATORS.contains(&c)))
        .unwrap_or(rest.len());
    let run = rest[..run_len].trim_end_matches(|c: char| GROUP_SEPARATORS.contains(&c));

    let after = rest[run.len()..].trim_start_matches(|c: char| GROUP_SEPARATORS.contains(&c));
    let mut after_chars = after.chars();
    let multiplier = match after_chars.next() {
        Some('K' | 'k') => Some(1_000.0),
        Some('M' | 'm') => Some(1_000_000.0),
        _ => None,
    }
    .filter(|_| !after_chars.next().is_some_and(char::is_alphabetic));

    if let Some(multiplier) = multiplier {
        let compact: String = run
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == ',' { '.' } else { c })
            .collect();
        let value: f64 = compact.parse().ok()?;
        // Counts top out far below 2^53, so the cast is exact.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = (value * multiplier).round() as u64;
        return Some(count);
    }

    let digits: String = run.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Accepts a website href when it is an absolute http(s) URL.
///
/// Maps sometimes routes outbound links through `google.com/url?q=<target>`;
/// the target is unwrapped.
pub(crate) fn accept_website(raw: &str) -> Option<String> {
    let trimmed = normalize_text(raw)?;
    let url = Url::parse(&trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let is_redirect = url
        .host_str()
        .is_some_and(|h| h == "google.com" || h.ends_with(".google.com"))
        && url.path() == "/url";
    if is_redirect {
        let target = url
            .query_pairs()
            .find(|(k, _)| k == "q" || k == "url")
            .map(|(_, v)| v.into_owned())?;
        return accept_website(&target);
    }

    Some(trimmed)
}
