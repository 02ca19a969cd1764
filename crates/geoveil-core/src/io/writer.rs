//! CSV writers for obfuscated samples and extraction rows.

use std::fs::File;
use std::io::Write as IoWrite;
use std::path::Path;

use crate::error::{IoErrorExt, Result};
use crate::types::{ExtractionRow, SamplePoint};

use super::table::ID_COLUMN;

/// Options for CSV writing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvWriterOptions {
    /// Column delimiter (default: b',')
    pub delimiter: u8,
    /// Whether to write header row (default: true)
    pub has_header: bool,
    /// Missing value representation (default: empty string)
    pub null_value: String,
    /// Name of the identifier column (default: `plot_ID`)
    pub id_column: String,
}

impl Default for CsvWriterOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            null_value: String::new(),
            id_column: ID_COLUMN.to_string(),
        }
    }
}

impl CsvWriterOptions {
    /// Create new writer options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set column delimiter
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set whether to write header row
    #[must_use]
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Set missing value representation
    #[must_use]
    pub fn with_null_value(mut self, null_value: impl Into<String>) -> Self {
        self.null_value = null_value.into();
        self
    }

    /// Set identifier column name
    #[must_use]
    pub fn with_id_column(mut self, id_column: impl Into<String>) -> Self {
        self.id_column = id_column.into();
        self
    }

    fn builder(&self) -> csv::WriterBuilder {
        let mut builder = csv::WriterBuilder::new();
        builder.delimiter(self.delimiter).has_headers(false);
        builder
    }
}

/// Write obfuscated samples as `plot_ID,lat,lon`.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn write_samples<W: IoWrite>(
    writer: W,
    samples: &[SamplePoint],
    options: &CsvWriterOptions,
) -> Result<()> {
    let mut csv = options.builder().from_writer(writer);
    if options.has_header {
        csv.write_record([options.id_column.as_str(), "lat", "lon"])?;
    }
    for sample in samples {
        csv.write_record([
            sample.id.clone(),
            sample.coordinate.lat.to_string(),
            sample.coordinate.lon.to_string(),
        ])?;
    }
    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write extraction rows: identifier, one column per band, `dataset`,
/// `extraction_date`, and `error` when any row carries a failure.
///
/// Band columns follow the first row; nothing is written for no rows.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn write_rows<W: IoWrite>(
    writer: W,
    rows: &[ExtractionRow],
    options: &CsvWriterOptions,
) -> Result<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let bands: Vec<&str> = first.values.iter().map(|(band, _)| band.as_str()).collect();
    let with_errors = rows.iter().any(|r| r.failure.is_some());

    let mut csv = options.builder().from_writer(writer);
    if options.has_header {
        let mut header = Vec::with_capacity(bands.len() + 4);
        header.push(options.id_column.as_str());
        header.extend(&bands);
        header.extend(["dataset", "extraction_date"]);
        if with_errors {
            header.push("error");
        }
        csv.write_record(&header)?;
    }

    for row in rows {
        let mut record = Vec::with_capacity(bands.len() + 4);
        record.push(row.geometry_id.clone());
        record.extend(bands.iter().map(|band| {
            row.value(band)
                .map_or_else(|| options.null_value.clone(), |v| v.to_string())
        }));
        record.push(row.dataset_id.clone());
        record.push(row.extraction_date.format("%Y-%m-%d").to_string());
        if with_errors {
            record.push(row.failure.clone().unwrap_or_default());
        }
        csv.write_record(&record)?;
    }
    csv.flush().map_err(csv::Error::from)?;
    Ok(())
}

/// Write extraction rows to a file, creating or truncating it.
///
/// # Errors
///
/// Returns [`IoError::Write`](crate::error::IoError::Write) if the file
/// cannot be created or written.
pub fn write_rows_file(
    path: impl AsRef<Path>,
    rows: &[ExtractionRow],
    options: &CsvWriterOptions,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_write_context("CSV", path)?;
    write_rows(file, rows, options)
}

/// Write obfuscated samples to a file, creating or truncating it.
///
/// # Errors
///
/// Returns [`IoError::Write`](crate::error::IoError::Write) if the file
/// cannot be created or written.
pub fn write_samples_file(
    path: impl AsRef<Path>,
    samples: &[SamplePoint],
    options: &CsvWriterOptions,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_write_context("CSV", path)?;
    write_samples(file, samples, options)
}
