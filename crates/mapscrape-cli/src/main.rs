mod export;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mapscrape_core::{BusinessRecord, ExtractionRequest, OutputFormat, SelectorConfig};
use mapscrape_scraper::{ChromiumLauncher, ExtractionPipeline};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mapscrape-cli")]
#[command(about = "Extract business listings from Google Maps search and place URLs")]
struct Cli {
    /// Google Maps search or place URL
    #[arg(long)]
    url: String,

    /// Output file; the format's extension is added when missing
    #[arg(long)]
    output: PathBuf,

    /// Output format: csv, json, or xlsx
    #[arg(long, default_value = "csv")]
    format: OutputFormat,

    /// Maximum listings to extract in search mode
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u64).range(1..))]
    max: u64,

    /// Visit each business website and look for a contact email
    #[arg(long)]
    emails: bool,

    /// Show the browser window
    #[arg(long)]
    visible: bool,

    /// YAML file overriding the built-in DOM selectors; takes precedence
    /// over `MAPSCRAPE_SELECTORS_PATH`
    #[arg(long)]
    selectors: Option<PathBuf>,
}

/// Gives `output` the extension of `format`, replacing any other one.
fn fix_extension(output: &Path, format: OutputFormat) -> PathBuf {
    let wanted = format.extension();
    if output.extension().is_some_and(|ext| ext == wanted) {
        output.to_path_buf()
    } else {
        output.with_extension(wanted)
    }
}

fn load_selector_config(path: Option<&Path>) -> anyhow::Result<SelectorConfig> {
    match path {
        Some(path) => {
            let selectors = mapscrape_core::load_selectors(path)
                .with_context(|| format!("loading selectors from {}", path.display()))?;
            tracing::info!(path = %path.display(), "selector overrides loaded");
            Ok(selectors)
        }
        None => Ok(SelectorConfig::default()),
    }
}

fn save(records: &[BusinessRecord], output: &Path, format: OutputFormat) -> anyhow::Result<()> {
    if records.is_empty() {
        tracing::warn!("no data to save");
        return Ok(());
    }
    export::write_records(records, output, format)
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(())
}

/// Cancels `token` on Ctrl-C so the run stops and keeps what it has.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupt received, stopping after the current listing");
                token.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "failed to listen for ctrl-c"),
        }
    });
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = mapscrape_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let output = fix_extension(&cli.output, cli.format);
    let max_results = usize::try_from(cli.max).unwrap_or(usize::MAX);
    let request = ExtractionRequest::new(cli.url, max_results, cli.emails, !cli.visible)?;

    let selectors_path = cli.selectors.or_else(|| config.selectors_path.clone());
    let selectors = Arc::new(load_selector_config(selectors_path.as_deref())?);
    let launcher = Arc::new(ChromiumLauncher::from_config(&config));
    let pipeline = ExtractionPipeline::from_config(launcher, selectors, &config)?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    tracing::info!(url = request.url(), output = %output.display(), format = %cli.format, "starting extraction");
    match pipeline.run(&request, &cancel).await {
        Ok(result) => {
            if result.cancelled {
                tracing::warn!(records = result.records.len(), "run interrupted, saving partial results");
            }
            save(&result.records, &output, cli.format)
        }
        Err(failure) => {
            if !failure.partial.records.is_empty() {
                tracing::warn!(
                    records = failure.partial.records.len(),
                    "saving records extracted before the failure"
                );
            }
            save(&failure.partial.records, &output, cli.format)?;
            Err(anyhow::Error::new(failure.error).context("extraction failed"))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    run(cli).await
}
