//! Tabular and `GeoJSON` input/output.

use std::path::Path;

use crate::error::{IoError, Result};

pub mod geojson;
pub mod table;
pub mod writer;

pub use self::geojson::{buffers_to_geojson, parse_areas, read_areas_file, write_buffers_file};
pub use table::{ColumnMap, ID_COLUMN, LAT_COLUMN, LON_COLUMN, read_points, read_points_file};
pub use writer::{
    CsvWriterOptions, write_rows, write_rows_file, write_samples, write_samples_file,
};

/// Default extraction output file for a dataset: its id with `/` replaced
/// by `_`, plus `.csv`.
///
/// ```
/// assert_eq!(
///     geoveil_core::io::default_output_name("USGS/SRTMGL1_003"),
///     "USGS_SRTMGL1_003.csv"
/// );
/// ```
#[must_use]
pub fn default_output_name(dataset_id: &str) -> String {
    format!("{}.csv", dataset_id.replace('/', "_"))
}

/// Kind of geometry file accepted as extraction input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// CSV table of identified points
    Csv,
    /// `GeoJSON` polygons
    GeoJson,
}

impl InputFormat {
    const EXTENSIONS: &'static [(&'static str, Self)] = &[
        ("csv", Self::Csv),
        ("txt", Self::Csv),
        ("geojson", Self::GeoJson),
        ("json", Self::GeoJson),
    ];

    /// Detects the format from the file extension, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::UnknownFormat`] for a missing or unsupported
    /// extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return Err(IoError::UnknownFormat {
                path: path.to_path_buf(),
                reason: "no file extension".to_string(),
            }
            .into());
        };
        Self::EXTENSIONS
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(extension))
            .map(|(_, format)| *format)
            .ok_or_else(|| {
                IoError::UnknownFormat {
                    path: path.to_path_buf(),
                    reason: format!(
                        "unsupported extension '.{extension}' (expected .csv or .geojson)"
                    ),
                }
                .into()
            })
    }
}
