use crate::app_config::{AppConfig, EmailFetchMode};
use crate::ConfigError;

/// Desktop Chrome user agent; Maps serves a degraded page to unknown agents.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files. Useful for testing
/// or when the caller manages env setup.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Every setting has a default, so an empty environment yields a usable
/// config. Parsing is decoupled from the real environment so it can be
/// tested with a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional_path = |var: &str| -> Option<PathBuf> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    };

    let non_zero = |var: &str, value: u64| -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    };

    let log_level = or_default("MAPSCRAPE_LOG_LEVEL", "info");
    let chromium_path = optional_path("MAPSCRAPE_CHROMIUM_PATH");
    let user_agent = or_default("MAPSCRAPE_USER_AGENT", DEFAULT_USER_AGENT);

    let navigation_timeout_ms = setting(&lookup, "MAPSCRAPE_NAVIGATION_TIMEOUT_MS", 30_000_u64)?;
    let selector_timeout_ms = setting(&lookup, "MAPSCRAPE_SELECTOR_TIMEOUT_MS", 5_000_u64)?;

    let scroll_delta_px = setting(&lookup, "MAPSCRAPE_SCROLL_DELTA_PX", 800_u32)?;
    non_zero("MAPSCRAPE_SCROLL_DELTA_PX", u64::from(scroll_delta_px))?;
    let scroll_settle_ms = setting(&lookup, "MAPSCRAPE_SCROLL_SETTLE_MS", 2_000_u64)?;
    let max_stale_scrolls = setting(&lookup, "MAPSCRAPE_MAX_STALE_SCROLLS", 2_u32)?;
    non_zero("MAPSCRAPE_MAX_STALE_SCROLLS", u64::from(max_stale_scrolls))?;
    let max_scroll_attempts = setting(&lookup, "MAPSCRAPE_MAX_SCROLL_ATTEMPTS", 100_u32)?;
    non_zero("MAPSCRAPE_MAX_SCROLL_ATTEMPTS", u64::from(max_scroll_attempts))?;

    let listing_delay_min_ms = setting(&lookup, "MAPSCRAPE_LISTING_DELAY_MIN_MS", 2_000_u64)?;
    let listing_delay_max_ms = setting(&lookup, "MAPSCRAPE_LISTING_DELAY_MAX_MS", 4_000_u64)?;
    if listing_delay_min_ms > listing_delay_max_ms {
        return Err(ConfigError::InvalidEnvVar {
            var: "MAPSCRAPE_LISTING_DELAY_MIN_MS".to_string(),
            reason: format!(
                "MAPSCRAPE_LISTING_DELAY_MIN_MS ({listing_delay_min_ms}) must not exceed \
                 MAPSCRAPE_LISTING_DELAY_MAX_MS ({listing_delay_max_ms})"
            ),
        });
    }

    let nav_max_retries = setting(&lookup, "MAPSCRAPE_NAV_MAX_RETRIES", 1_u32)?;
    let nav_backoff_base_ms = setting(&lookup, "MAPSCRAPE_NAV_BACKOFF_BASE_MS", 500_u64)?;

    let email_timeout_ms = setting(&lookup, "MAPSCRAPE_EMAIL_TIMEOUT_MS", 15_000_u64)?;
    let email_concurrency = setting(&lookup, "MAPSCRAPE_EMAIL_CONCURRENCY", 1_usize)?;
    non_zero(
        "MAPSCRAPE_EMAIL_CONCURRENCY",
        u64::try_from(email_concurrency).unwrap_or(u64::MAX),
    )?;
    let email_fetch = parse_email_fetch(&or_default("MAPSCRAPE_EMAIL_FETCH", "browser"))?;

    let selectors_path = optional_path("MAPSCRAPE_SELECTORS_PATH");

    Ok(AppConfig {
        log_level,
        chromium_path,
        user_agent,
        navigation_timeout_ms,
        selector_timeout_ms,
        scroll_delta_px,
        scroll_settle_ms,
        max_stale_scrolls,
        max_scroll_attempts,
        listing_delay_min_ms,
        listing_delay_max_ms,
        nav_max_retries,
        nav_backoff_base_ms,
        email_timeout_ms,
        email_concurrency,
        email_fetch,
        selectors_path,
    })
}

/// Reads a numeric setting, falling back to `default` when `var` is unset.
fn setting<T, F>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let Ok(raw) = lookup(var) else {
        return Ok(default);
    };
    let raw = raw.trim();
    raw.parse::<T>().map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: format!("'{raw}': {e}"),
    })
}

/// Parse a string into an `EmailFetchMode` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for values other than `browser` or `http`.
fn parse_email_fetch(s: &str) -> Result<EmailFetchMode, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "browser" => Ok(EmailFetchMode::Browser),
        "http" => Ok(EmailFetchMode::Http),
        other => Err(ConfigError::InvalidEnvVar {
            var: "MAPSCRAPE_EMAIL_FETCH".to_string(),
            reason: format!("unrecognized email fetch mode '{other}'; expected browser or http"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
