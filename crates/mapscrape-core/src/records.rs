//! Records, requests, and run results exchanged between the extraction
//! engine and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

/// One business extracted from a Maps listing.
///
/// `maps_url` is the identity key: the pipeline never emits two records
/// with the same value in one run. Every other field is independently
/// optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRecord {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    /// Star rating in `[0.0, 5.0]`.
    pub rating: Option<f64>,
    pub review_count: Option<u64>,
    pub category: Option<String>,
    pub address: Option<String>,
    pub maps_url: String,
}

impl BusinessRecord {
    /// Creates a record carrying only its identity.
    #[must_use]
    pub fn new(maps_url: impl Into<String>) -> Self {
        Self {
            name: None,
            phone: None,
            email: None,
            website: None,
            rating: None,
            review_count: None,
            category: None,
            address: None,
            maps_url: maps_url.into(),
        }
    }

    /// Returns a copy of this record with `email` set. Enrichment never
    /// touches any other field.
    #[must_use]
    pub fn with_email(self, email: Option<String>) -> Self {
        Self { email, ..self }
    }
}

/// How the input URL is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// A results list that must be scrolled and collected.
    Search,
    /// A single business detail page.
    SinglePlace,
}

impl std::fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractionMode::Search => write!(f, "search"),
            ExtractionMode::SinglePlace => write!(f, "single_place"),
        }
    }
}

/// Input contract for one extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    url: String,
    max_results: usize,
    extract_emails: bool,
    headless: bool,
}

impl ExtractionRequest {
    /// Builds a request.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRequest`] if `url` is blank or
    /// `max_results` is zero.
    pub fn new(
        url: impl Into<String>,
        max_results: usize,
        extract_emails: bool,
        headless: bool,
    ) -> Result<Self, CoreError> {
        let url = url.into().trim().to_owned();
        if url.is_empty() {
            return Err(CoreError::InvalidRequest("url must be non-empty".into()));
        }
        if max_results == 0 {
            return Err(CoreError::InvalidRequest(
                "max_results must be at least 1".into(),
            ));
        }
        Ok(Self {
            url,
            max_results,
            extract_emails,
            headless,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Upper bound on collected listings. Ignored for single-place URLs.
    #[must_use]
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    #[must_use]
    pub fn extract_emails(&self) -> bool {
        self.extract_emails
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }
}

/// Pipeline state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Dispatched,
    Collecting,
    Parsing,
    Enriching,
    Done,
    Failed,
}

impl RunPhase {
    /// `true` for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Done | RunPhase::Failed)
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunPhase::Init => "init",
            RunPhase::Dispatched => "dispatched",
            RunPhase::Collecting => "collecting",
            RunPhase::Parsing => "parsing",
            RunPhase::Enriching => "enriching",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a listing produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// The loaded page exposed no readable place URL.
    MissingMapsUrl,
    /// Navigating to the listing failed.
    Navigation { message: String },
    /// The listing resolved to a place already emitted in this run.
    Duplicate,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingMapsUrl => write!(f, "maps url unreadable"),
            SkipReason::Navigation { message } => write!(f, "navigation failed: {message}"),
            SkipReason::Duplicate => write!(f, "duplicate place"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedListing {
    /// Zero-based discovery position.
    pub position: usize,
    /// The listing href, when one was known.
    pub url: Option<String>,
    pub reason: SkipReason,
}

/// Output of one extraction run.
///
/// `records` are in discovery order. `attempted` counts every listing the
/// parser was pointed at; `succeeded` counts those that produced a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub mode: Option<ExtractionMode>,
    pub records: Vec<BusinessRecord>,
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: Vec<SkippedListing>,
    /// Enrichment lookups that ended without an email.
    pub emails_missing: usize,
    pub phases: Vec<RunPhase>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunResult {
    #[must_use]
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode: None,
            records: Vec::new(),
            attempted: 0,
            succeeded: 0,
            skipped: Vec::new(),
            emails_missing: 0,
            phases: vec![RunPhase::Init],
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Counts a parsed listing and appends its record.
    pub fn push_record(&mut self, record: BusinessRecord) {
        self.attempted += 1;
        self.succeeded += 1;
        self.records.push(record);
    }

    /// Counts a listing that was attempted but produced no record.
    pub fn push_skipped(&mut self, position: usize, url: Option<String>, reason: SkipReason) {
        self.attempted += 1;
        self.skipped.push(SkippedListing {
            position,
            url,
            reason,
        });
    }

    /// Number of attempted listings that produced no record.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.attempted.saturating_sub(self.succeeded)
    }

    /// The phase most recently entered.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phases.last().copied().unwrap_or(RunPhase::Init)
    }

    #[must_use]
    pub fn visited(&self, phase: RunPhase) -> bool {
        self.phases.contains(&phase)
    }
}

impl Default for RunResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Destination file format understood by the export sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Json,
    Xlsx,
}

impl OutputFormat {
    /// File extension without the leading dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
            OutputFormat::Xlsx => "xlsx",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            "xlsx" => Ok(OutputFormat::Xlsx),
            other => Err(CoreError::UnknownFormat(other.to_owned())),
        }
    }
}
