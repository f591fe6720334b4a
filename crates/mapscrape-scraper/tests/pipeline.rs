//! End-to-end runs of `ExtractionPipeline` against the in-memory browser.
//!
//! Each test scripts a small Maps site in `MockBrowser`, runs the pipeline,
//! and checks the records, counters, phases, and browser cleanup.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use mapscrape_core::{
    EmailFetchMode, ExtractionMode, ExtractionRequest, RunPhase, SelectorConfig, SkipReason,
};
use mapscrape_scraper::testing::{
    fast_settings, MockBrowser, MockCall, MockDocument, MockElement, MockNavigation,
};
use mapscrape_scraper::{EmailDiscoverer, ExtractionPipeline, PipelineSettings, ScraperError};
use tokio_util::sync::CancellationToken;

const SEARCH_URL: &str = "https://www.google.com/maps/search/coffee+in+austin";

fn place_url(i: usize) -> String {
    format!("https://www.google.com/maps/place/Cafe+{i}/data=!4m2!3m1!1s0x{i:04x}")
}

fn website(i: usize) -> String {
    format!("https://cafe{i}.example/")
}

fn place_document(s: &SelectorConfig, i: usize, with_website: bool) -> MockDocument {
    let doc = MockDocument::new()
        .with_text(&s.name, format!("Cafe {i}"))
        .with_text(&s.rating, "4.5")
        .with_text(&s.review_count, format!("({})", 100 + i))
        .with_text(&s.category, "Coffee shop")
        .with_text(&s.phone, format!("(512) 555-{i:04}"));
    if with_website {
        doc.with(&s.website, MockElement::link(website(i)))
    } else {
        doc
    }
}

/// A search page with `n` listings revealed 7 per scroll, plus their detail
/// pages.
fn site(n: usize, with_websites: bool) -> MockBrowser {
    let s = SelectorConfig::default();
    let hrefs: Vec<String> = (0..n).map(place_url).collect();
    let mut browser = MockBrowser::new().with_document(
        SEARCH_URL,
        MockDocument::search_results(&s, &hrefs, 7, true),
    );
    for (i, href) in hrefs.iter().enumerate() {
        browser = browser.with_document(href.clone(), place_document(&s, i, with_websites));
    }
    browser
}

fn pipeline_with(browser: &MockBrowser, settings: PipelineSettings) -> ExtractionPipeline {
    let emails = EmailDiscoverer::new(
        EmailFetchMode::Browser,
        Duration::from_secs(5),
        "mapscrape-test/0.1",
    )
    .expect("failed to build test EmailDiscoverer");
    ExtractionPipeline::new(
        Arc::new(browser.clone()),
        Arc::new(SelectorConfig::default()),
        settings,
        emails,
    )
}

fn pipeline(browser: &MockBrowser) -> ExtractionPipeline {
    pipeline_with(browser, fast_settings())
}

fn request(url: &str, max_results: usize, extract_emails: bool) -> ExtractionRequest {
    ExtractionRequest::new(url, max_results, extract_emails, true).expect("valid request")
}

// ---------------------------------------------------------------------------
// Search mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn search_with_no_results_yields_empty_run() {
    let browser = site(0, false);
    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert!(result.records.is_empty());
    assert_eq!(result.attempted, 0);
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.mode, Some(ExtractionMode::Search));
    assert_eq!(
        result.phases,
        vec![
            RunPhase::Init,
            RunPhase::Dispatched,
            RunPhase::Collecting,
            RunPhase::Parsing,
            RunPhase::Done
        ]
    );
    assert!(browser.browser_closed());
}

#[tokio::test]
async fn search_caps_at_max_results_in_discovery_order() {
    let browser = site(25, false);
    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.records.len(), 10);
    assert_eq!(result.attempted, 10);
    assert_eq!(result.succeeded, 10);
    for (i, record) in result.records.iter().enumerate() {
        assert_eq!(record.maps_url, place_url(i));
        assert_eq!(record.name.as_deref(), Some(format!("Cafe {i}").as_str()));
        assert_eq!(record.review_count, Some(100 + i as u64));
    }
    let distinct: HashSet<&str> = result.records.iter().map(|r| r.maps_url.as_str()).collect();
    assert_eq!(distinct.len(), result.records.len());
    assert!(result.finished_at.is_some());
}

#[tokio::test]
async fn search_returns_fewer_when_list_ends() {
    let browser = site(4, false);
    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 20, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.records.len(), 4);
}

#[tokio::test]
async fn unreadable_maps_url_is_skipped_and_counted() {
    let s = SelectorConfig::default();
    let hrefs: Vec<String> = (0..3).map(place_url).collect();
    let browser = MockBrowser::new()
        .with_document(SEARCH_URL, MockDocument::search_results(&s, &hrefs, 7, true))
        .with_document(hrefs[0].clone(), place_document(&s, 0, false))
        .with_document(
            hrefs[1].clone(),
            place_document(&s, 1, false).redirects_to("https://www.google.com/sorry/index"),
        )
        .with_document(hrefs[2].clone(), place_document(&s, 2, false));

    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.attempted, 3);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed(), 1);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].position, 1);
    assert_eq!(result.skipped[0].reason, SkipReason::MissingMapsUrl);
}

#[tokio::test]
async fn listing_without_map_link_counts_as_attempted_only() {
    let s = SelectorConfig::default();
    let hrefs: Vec<String> = (0..2).map(place_url).collect();
    let search = MockDocument::new()
        .with_text(&s.feed, format!("Results\n{}", s.end_of_list_text))
        .with(&s.listing_link, MockElement::link(hrefs[0].clone()))
        .with(&s.listing_link, MockElement::default())
        .with(&s.listing_link, MockElement::link(hrefs[1].clone()));
    let browser = MockBrowser::new()
        .with_document(SEARCH_URL, search)
        .with_document(hrefs[0].clone(), place_document(&s, 0, false))
        .with_document(hrefs[1].clone(), place_document(&s, 1, false));

    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.attempted, 3);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.skipped.len(), 1);
    assert_eq!(result.skipped[0].position, 1);
    assert_eq!(result.skipped[0].url, None);
    assert_eq!(result.skipped[0].reason, SkipReason::MissingMapsUrl);
    assert_eq!(
        browser.navigations(),
        vec![SEARCH_URL.to_string(), hrefs[0].clone(), hrefs[1].clone()],
        "nothing is loaded for the listing without a link"
    );
}

#[tokio::test]
async fn listing_without_heading_keeps_record_with_no_name() {
    let s = SelectorConfig::default();
    let hrefs = vec![place_url(0)];
    let headless_place = MockDocument::new()
        .with_text(&s.phone, "(512) 555-0000")
        .with_text(&s.category, "Coffee shop");
    let browser = MockBrowser::new()
        .with_document(SEARCH_URL, MockDocument::search_results(&s, &hrefs, 7, true))
        .with_document(hrefs[0].clone(), headless_place);

    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.succeeded, 1);
    let record = &result.records[0];
    assert_eq!(record.name, None);
    assert_eq!(record.maps_url, hrefs[0]);
    assert_eq!(record.phone.as_deref(), Some("(512) 555-0000"));
}

#[tokio::test]
async fn listings_resolving_to_the_same_place_are_deduplicated() {
    let s = SelectorConfig::default();
    let hrefs: Vec<String> = (0..2).map(place_url).collect();
    let browser = MockBrowser::new()
        .with_document(SEARCH_URL, MockDocument::search_results(&s, &hrefs, 7, true))
        .with_document(hrefs[0].clone(), place_document(&s, 0, false))
        .with_document(
            hrefs[1].clone(),
            place_document(&s, 0, false).redirects_to(hrefs[0].clone()),
        );

    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.attempted, 2);
    assert_eq!(result.skipped[0].reason, SkipReason::Duplicate);
}

#[tokio::test]
async fn failed_listing_navigation_is_skipped() {
    let s = SelectorConfig::default();
    let hrefs: Vec<String> = (0..2).map(place_url).collect();
    let browser = MockBrowser::new()
        .with_document(SEARCH_URL, MockDocument::search_results(&s, &hrefs, 7, true))
        .with_document(
            hrefs[0].clone(),
            place_document(&s, 0, false)
                .with_navigation(MockNavigation::Fail("net::ERR_CONNECTION_RESET".into())),
        )
        .with_document(hrefs[1].clone(), place_document(&s, 1, false));

    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].maps_url, hrefs[1]);
    assert_eq!(result.attempted, 2);
    assert!(matches!(
        result.skipped[0].reason,
        SkipReason::Navigation { ref message } if message.contains("ERR_CONNECTION_RESET")
    ));
    assert_eq!(result.phase(), RunPhase::Done);
}

#[tokio::test]
async fn transient_navigation_failure_is_retried() {
    let s = SelectorConfig::default();
    let hrefs = vec![place_url(0)];
    let browser = MockBrowser::new()
        .with_document(SEARCH_URL, MockDocument::search_results(&s, &hrefs, 7, true))
        .with_document(
            hrefs[0].clone(),
            place_document(&s, 0, false).with_navigation(MockNavigation::FailTimes(1)),
        );

    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.records.len(), 1);
    let attempts = browser
        .navigations()
        .iter()
        .filter(|u| **u == hrefs[0])
        .count();
    assert_eq!(attempts, 2);
}

#[tokio::test]
async fn listing_load_timeout_still_parses() {
    let s = SelectorConfig::default();
    let hrefs = vec![place_url(0)];
    let browser = MockBrowser::new()
        .with_document(SEARCH_URL, MockDocument::search_results(&s, &hrefs, 7, true))
        .with_document(
            hrefs[0].clone(),
            place_document(&s, 0, false).with_navigation(MockNavigation::Timeout),
        );

    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].name.as_deref(), Some("Cafe 0"));
}

#[tokio::test]
async fn cookie_consent_is_accepted() {
    let s = SelectorConfig::default();
    let hrefs = vec![place_url(0)];
    let browser = MockBrowser::new()
        .with_document(
            SEARCH_URL,
            MockDocument::search_results(&s, &hrefs, 7, true)
                .with(&s.accept_cookies, MockElement::text("Accept all")),
        )
        .with_document(hrefs[0].clone(), place_document(&s, 0, false));

    pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert!(browser.calls().contains(&MockCall::Click {
        selector: s.accept_cookies.clone()
    }));
}

// ---------------------------------------------------------------------------
// Single-place mode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_place_yields_one_record_without_collection() {
    let s = SelectorConfig::default();
    let url = place_url(7);
    let browser = MockBrowser::new().with_document(url.clone(), place_document(&s, 7, true));

    let result = pipeline(&browser)
        .run(&request(&url, 50, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].maps_url, url);
    assert_eq!(result.records[0].website.as_deref(), Some(website(7).as_str()));
    assert_eq!(result.mode, Some(ExtractionMode::SinglePlace));
    assert!(!result.visited(RunPhase::Collecting));
    assert!(!browser
        .calls()
        .iter()
        .any(|c| matches!(c, MockCall::Scroll { .. })));
}

// ---------------------------------------------------------------------------
// Email enrichment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn emails_disabled_never_invokes_discoverer() {
    let browser = site(3, true);
    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect("run should succeed");

    assert_eq!(result.records.len(), 3);
    assert!(result.records.iter().all(|r| r.email.is_none()));
    assert!(!result.visited(RunPhase::Enriching));
    assert_eq!(browser.pages_opened(), 1, "only the session page");
    assert!(!browser
        .navigations()
        .iter()
        .any(|u| u.contains(".example/")));
}

#[tokio::test]
async fn emails_enabled_enriches_in_order_and_keeps_failed_lookups() {
    let s = SelectorConfig::default();
    let hrefs: Vec<String> = (0..4).map(place_url).collect();
    let mut browser = MockBrowser::new()
        .with_document(SEARCH_URL, MockDocument::search_results(&s, &hrefs, 7, true));
    for (i, href) in hrefs.iter().enumerate() {
        // Listing 3 has no website at all.
        browser = browser.with_document(href.clone(), place_document(&s, i, i != 3));
    }
    // cafe0 and cafe2 publish an address; cafe1's site never loads.
    browser = browser
        .with_document(
            website(0),
            MockDocument::new().with_text("body", "Say hi: info@cafe0.example"),
        )
        .with_document(
            website(2),
            MockDocument::new()
                .with_text("body", "Contact form")
                .with_markup(r#"<a href="mailto:owner@cafe2.example">mail</a>"#),
        );

    let settings = PipelineSettings {
        email_concurrency: 3,
        ..fast_settings()
    };
    let result = pipeline_with(&browser, settings)
        .run(&request(SEARCH_URL, 10, true), &CancellationToken::new())
        .await
        .expect("run should succeed");

    let emails: Vec<Option<&str>> = result.records.iter().map(|r| r.email.as_deref()).collect();
    assert_eq!(
        emails,
        vec![
            Some("info@cafe0.example"),
            None,
            Some("owner@cafe2.example"),
            None
        ]
    );
    let order: Vec<&str> = result.records.iter().map(|r| r.maps_url.as_str()).collect();
    assert_eq!(order, hrefs.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(result.emails_missing, 1, "only the failed lookup counts");
    assert!(result.visited(RunPhase::Enriching));
    assert_eq!(browser.pages_opened(), 4, "session page plus three lookups");
    assert_eq!(browser.pages_closed(), 4);
}

// ---------------------------------------------------------------------------
// Fatal errors and cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_url_fails_before_launching() {
    let browser = site(3, false);
    let failure = pipeline(&browser)
        .run(
            &request("https://example.com/not-maps", 10, false),
            &CancellationToken::new(),
        )
        .await
        .expect_err("run should fail");

    assert!(matches!(failure.error, ScraperError::InvalidUrl { .. }));
    assert!(failure.partial.records.is_empty());
    assert_eq!(failure.partial.phase(), RunPhase::Failed);
    assert!(!browser.launched());
}

#[tokio::test]
async fn launch_failure_is_fatal() {
    let browser = site(3, false).with_launch_failure("chrome not found");
    let failure = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect_err("run should fail");

    assert!(matches!(failure.error, ScraperError::Session(_)));
    assert_eq!(
        failure.partial.phases,
        vec![RunPhase::Init, RunPhase::Dispatched, RunPhase::Failed]
    );
}

#[tokio::test]
async fn session_loss_mid_run_returns_partial_records() {
    // Navigation 1 loads the search page, 2 and 3 load listings; the
    // session dies on the fourth.
    let browser = site(6, false).with_session_lost_after(3);
    let failure = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &CancellationToken::new())
        .await
        .expect_err("run should fail");

    assert!(matches!(failure.error, ScraperError::Session(_)));
    let partial = &failure.partial;
    assert_eq!(partial.records.len(), 2);
    assert_eq!(partial.records[0].maps_url, place_url(0));
    assert_eq!(partial.records[1].maps_url, place_url(1));
    assert_eq!(partial.phase(), RunPhase::Failed);
    assert!(partial.finished_at.is_some());
    assert!(browser.browser_closed());
    assert_eq!(browser.pages_closed(), browser.pages_opened());
}

#[tokio::test]
async fn stalled_session_page_fails_the_run_within_the_session_timeout() {
    let browser = site(3, false).with_stalled_new_page();
    let settings = PipelineSettings {
        session_timeout: Duration::from_millis(200),
        ..fast_settings()
    };
    let pipeline = pipeline_with(&browser, settings);
    let req = request(SEARCH_URL, 10, false);
    let cancel = CancellationToken::new();
    let run = pipeline.run(&req, &cancel);
    let failure = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run must not hang on a stalled page")
        .expect_err("run should fail");

    assert!(matches!(failure.error, ScraperError::Timeout { .. }));
    assert_eq!(failure.partial.phase(), RunPhase::Failed);
    assert!(browser.browser_closed());
}

#[tokio::test]
async fn stalled_browser_close_does_not_hang_the_run() {
    let browser = site(2, false).with_stalled_close();
    let settings = PipelineSettings {
        session_timeout: Duration::from_millis(200),
        ..fast_settings()
    };
    let pipeline = pipeline_with(&browser, settings);
    let req = request(SEARCH_URL, 10, false);
    let cancel = CancellationToken::new();
    let run = pipeline.run(&req, &cancel);
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run must not hang on browser shutdown")
        .expect("a slow shutdown is not a failed run");

    assert_eq!(result.records.len(), 2);
    assert_eq!(result.phase(), RunPhase::Done);
    assert!(browser.browser_closed());
}

#[tokio::test]
async fn cancellation_returns_partial_records_and_closes_browser() {
    let cancel = CancellationToken::new();
    let browser = site(6, true).with_cancel_after(3, cancel.clone());
    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, true), &cancel)
        .await
        .expect("cancellation is not a failure");

    assert!(result.cancelled);
    assert_eq!(result.records.len(), 2);
    assert_eq!(result.phase(), RunPhase::Done);
    assert!(!result.visited(RunPhase::Enriching));
    assert!(browser.browser_closed());
    assert_eq!(browser.pages_closed(), browser.pages_opened());
}

#[tokio::test]
async fn cancelled_before_start_collects_nothing() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let browser = site(6, false);
    let result = pipeline(&browser)
        .run(&request(SEARCH_URL, 10, false), &cancel)
        .await
        .expect("cancellation is not a failure");

    assert!(result.cancelled);
    assert!(result.records.is_empty());
    assert!(browser.browser_closed());
}
