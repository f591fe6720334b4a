//! File sinks for extracted records.
//!
//! CSV and XLSX share one column layout with human-readable headers; JSON
//! is the serde form of `BusinessRecord`, so missing fields are `null`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use mapscrape_core::{BusinessRecord, OutputFormat};
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XLSX export failed: {0}")]
    Xlsx(#[from] XlsxError),
}

pub(crate) const COLUMNS: [&str; 9] = [
    "Company Name",
    "Phone Number",
    "Email",
    "Website",
    "Rating",
    "Review Count",
    "Category",
    "Address",
    "Google Maps URL",
];

/// A spreadsheet cell. Numbers stay numeric in XLSX.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Cell<'a> {
    Text(&'a str),
    Rating(f64),
    Count(u64),
    Empty,
}

impl Cell<'_> {
    fn csv_field(self) -> String {
        match self {
            Cell::Text(s) => s.to_owned(),
            Cell::Rating(r) => format!("{r:.1}"),
            Cell::Count(n) => n.to_string(),
            Cell::Empty => String::new(),
        }
    }
}

fn text(value: Option<&str>) -> Cell<'_> {
    value.map_or(Cell::Empty, Cell::Text)
}

/// One record laid out in [`COLUMNS`] order.
pub(crate) fn row(record: &BusinessRecord) -> [Cell<'_>; 9] {
    [
        text(record.name.as_deref()),
        text(record.phone.as_deref()),
        text(record.email.as_deref()),
        text(record.website.as_deref()),
        record.rating.map_or(Cell::Empty, Cell::Rating),
        record.review_count.map_or(Cell::Empty, Cell::Count),
        text(record.category.as_deref()),
        text(record.address.as_deref()),
        Cell::Text(&record.maps_url),
    ]
}

/// Writes `records` to `destination` in `format`, replacing any existing
/// file.
///
/// # Errors
///
/// Returns [`ExportError`] if the file cannot be created or written, or if
/// serialization fails.
pub fn write_records(
    records: &[BusinessRecord],
    destination: &Path,
    format: OutputFormat,
) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: destination.to_path_buf(),
        source,
    };

    match format {
        OutputFormat::Xlsx => {
            let mut workbook = build_workbook(records)?;
            workbook.save(destination)?;
        }
        OutputFormat::Csv | OutputFormat::Json => {
            let file = File::create(destination).map_err(io_err)?;
            let mut out = BufWriter::new(file);
            if format == OutputFormat::Csv {
                write_csv(records, &mut out)?;
            } else {
                write_json(records, &mut out)?;
            }
            out.flush().map_err(io_err)?;
        }
    }

    tracing::info!(
        records = records.len(),
        path = %destination.display(),
        %format,
        "records exported"
    );
    Ok(())
}

pub(crate) fn write_csv<W: Write>(records: &[BusinessRecord], out: W) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(COLUMNS)?;
    for record in records {
        writer.write_record(row(record).map(Cell::csv_field))?;
    }
    writer.flush()?;
    Ok(())
}

pub(crate) fn write_json<W: Write>(
    records: &[BusinessRecord],
    out: &mut W,
) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(&mut *out, records)?;
    out.write_all(b"\n").map_err(serde_json::Error::io)?;
    Ok(())
}

pub(crate) fn build_workbook(records: &[BusinessRecord]) -> Result<Workbook, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Businesses")?;

    for (col, title) in (0u16..).zip(COLUMNS) {
        sheet.write_string_with_format(0, col, title, &header)?;
    }
    for (row_idx, record) in (1u32..).zip(records) {
        for (col, cell) in (0u16..).zip(row(record)) {
            match cell {
                Cell::Text(s) => {
                    sheet.write_string(row_idx, col, s)?;
                }
                Cell::Rating(r) => {
                    sheet.write_number(row_idx, col, r)?;
                }
                Cell::Count(n) => {
                    // Review counts fit an f64 mantissa.
                    #[allow(clippy::cast_precision_loss)]
                    let n = n as f64;
                    sheet.write_number(row_idx, col, n)?;
                }
                Cell::Empty => {}
            }
        }
    }
    sheet.autofit();
    Ok(workbook)
}

#[cfg(test)]
#[path = "export_test.rs"]
mod tests;
