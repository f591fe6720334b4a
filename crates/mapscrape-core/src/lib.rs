pub mod app_config;
pub mod config;
pub mod records;
pub mod selectors;

use thiserror::Error;

pub use app_config::{AppConfig, EmailFetchMode};
pub use config::{load_app_config, load_app_config_from_env};
pub use records::{
    BusinessRecord, ExtractionMode, ExtractionRequest, OutputFormat, RunPhase, RunResult,
    SkipReason, SkippedListing,
};
pub use selectors::{load_selectors, parse_selectors, SelectorConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read selectors file {path}: {source}")]
    SelectorsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse selectors file: {0}")]
    SelectorsFileParse(#[from] serde_yaml::Error),

    #[error("selector validation failed: {0}")]
    Validation(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid extraction request: {0}")]
    InvalidRequest(String),

    #[error("unknown output format: {0}")]
    UnknownFormat(String),
}
