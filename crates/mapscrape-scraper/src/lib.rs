pub mod browser;
pub mod collector;
pub mod dispatch;
pub mod email;
pub mod error;
pub mod parse;
pub(crate) mod parse_helpers;
pub mod pipeline;
pub(crate) mod rate_limit;
pub mod testing;

pub use browser::chromium::ChromiumLauncher;
pub use browser::{Browser, BrowserLauncher, BrowserPage};
pub use collector::{Collection, CollectorSettings, ListingCollector, ListingRef, StopReason};
pub use dispatch::{classify, is_place_url};
pub use email::{extract_email, EmailDiscoverer};
pub use error::ScraperError;
pub use parse::{FieldParser, ListingParseFailure};
pub use pipeline::{ExtractionPipeline, PipelineSettings, RunFailure};
