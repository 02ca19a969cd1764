//! Display utilities for formatting CLI output.
//!
//! This module provides table row structures and formatting functions
//! for presenting catalog entries, samples and extraction results.

use tabled::builder::Builder;
use tabled::{Table, Tabled};

use geoveil_core::types::{DatasetDescriptor, ExtractionRow, SamplePoint};

/// Table row representation for displaying catalog entries.
#[derive(Tabled)]
pub struct DatasetRow {
    /// Dataset identifier, e.g. `USGS/SRTMGL1_003`.
    #[tabled(rename = "Dataset")]
    pub id: String,
    /// Declared type, or `N/A` when the catalog has none.
    #[tabled(rename = "Type")]
    pub kind: String,
    #[tabled(rename = "Title")]
    pub title: String,
}

impl From<&DatasetDescriptor> for DatasetRow {
    fn from(descriptor: &DatasetDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            kind: descriptor
                .kind
                .map_or_else(|| "N/A".to_string(), |k| k.to_string()),
            title: descriptor.title.clone().unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

/// Table row representation for obfuscated samples.
#[derive(Tabled)]
pub struct SampleRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Lat")]
    pub lat: String,
    #[tabled(rename = "Lon")]
    pub lon: String,
}

impl From<&SamplePoint> for SampleRow {
    fn from(sample: &SamplePoint) -> Self {
        Self {
            id: sample.id.clone(),
            lat: format!("{:.6}", sample.coordinate.lat),
            lon: format!("{:.6}", sample.coordinate.lon),
        }
    }
}

/// Display catalog entries in a formatted table.
pub fn display_datasets(datasets: &[DatasetDescriptor]) {
    let rows: Vec<DatasetRow> = datasets.iter().map(DatasetRow::from).collect();
    println!("{}", Table::new(rows));
}

/// Display up to `limit` samples, followed by a count of the rest.
pub fn display_samples(samples: &[SamplePoint], limit: usize) {
    let rows: Vec<SampleRow> = samples.iter().take(limit).map(SampleRow::from).collect();
    println!("{}", Table::new(rows));
    print_remainder(samples.len(), limit);
}

/// Display up to `limit` extraction rows.
///
/// Band columns are taken from the first row; an `Error` column is added
/// only when some row failed.
pub fn display_rows(rows: &[ExtractionRow], limit: usize) {
    println!("{}", rows_table(rows, limit));
    print_remainder(rows.len(), limit);
}

fn rows_table(rows: &[ExtractionRow], limit: usize) -> String {
    let Some(first) = rows.first() else {
        return "(no rows)".to_string();
    };
    let bands: Vec<&str> = first.values.iter().map(|(band, _)| band.as_str()).collect();
    let with_errors = rows.iter().any(|r| r.failure.is_some());

    let mut builder = Builder::default();
    let mut header = vec!["ID".to_string()];
    header.extend(bands.iter().map(ToString::to_string));
    if with_errors {
        header.push("Error".to_string());
    }
    builder.push_record(header);

    for row in rows.iter().take(limit) {
        let mut record = vec![row.geometry_id.clone()];
        record.extend(bands.iter().map(|band| format_value(row.value(band))));
        if with_errors {
            record.push(row.failure.clone().unwrap_or_default());
        }
        builder.push_record(record);
    }
    builder.build().to_string()
}

/// Format a band value for display; missing values show as `N/A`.
#[must_use]
pub fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.4}"))
}

fn print_remainder(total: usize, limit: usize) {
    if total > limit {
        println!("... and {} more", total - limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use geoveil_core::types::{Coordinate, DatasetType};

    fn row(id: &str, value: Option<f64>, failure: Option<&str>) -> ExtractionRow {
        ExtractionRow {
            geometry_id: id.to_string(),
            values: vec![("elevation".to_string(), value)],
            dataset_id: "USGS/SRTMGL1_003".to_string(),
            extraction_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
            failure: failure.map(str::to_string),
        }
    }

    #[test]
    fn test_dataset_row_from_descriptor() {
        let descriptor = DatasetDescriptor {
            id: "USGS/SRTMGL1_003".to_string(),
            title: None,
            kind: Some(DatasetType::Image),
            url: None,
        };
        let row = DatasetRow::from(&descriptor);
        assert_eq!(row.kind, "image");
        assert_eq!(row.title, "N/A");
    }

    #[test]
    fn test_sample_row_rounds() {
        let sample = SamplePoint::new("A1", Coordinate::new(44.058_212_345, -121.3).unwrap());
        let row = SampleRow::from(&sample);
        assert_eq!(row.lat, "44.058212");
        assert_eq!(row.lon, "-121.300000");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(1203.5)), "1203.5000");
        assert_eq!(format_value(None), "N/A");
    }

    #[test]
    fn test_rows_table_columns() {
        let table = rows_table(&[row("A1", Some(1.0), None), row("A2", None, None)], 10);
        assert!(table.contains("elevation"));
        assert!(table.contains("N/A"));
        assert!(!table.contains("Error"));

        let table = rows_table(&[row("A1", None, Some("timed out"))], 10);
        assert!(table.contains("Error"));
        assert!(table.contains("timed out"));
    }

    #[test]
    fn test_rows_table_limit_and_empty() {
        let rows: Vec<ExtractionRow> = (0..5).map(|i| row(&format!("P{i}"), None, None)).collect();
        let table = rows_table(&rows, 2);
        assert!(table.contains("P1"));
        assert!(!table.contains("P2"));
        assert_eq!(rows_table(&[], 2), "(no rows)");
    }
}
