//! Input tables of identified coordinates.
//!
//! Latitude, longitude and identifier columns are located through alias
//! lists and renamed to `LAT`, `LON` and `plot_ID`. Each list is tried
//! exactly, in order, before a second case-insensitive pass; the first hit
//! wins.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use log::debug;

use crate::error::{IoErrorExt, Result, TableError};
use crate::types::{Coordinate, SamplePoint};

pub const LAT_COLUMN: &str = "LAT";
pub const LON_COLUMN: &str = "LON";
pub const ID_COLUMN: &str = "plot_ID";

pub const LAT_ALIASES: &[&str] = &["lat", "latitude", "y", "LAT", "Latitude", "Lat", "Y"];
pub const LON_ALIASES: &[&str] = &[
    "lon",
    "long",
    "longitude",
    "x",
    "LON",
    "Longitude",
    "Long",
    "X",
];
pub const ID_ALIASES: &[&str] = &["id", "ID", "plot_ID", "plot_id", "plotID", "plotId"];

/// Positions of the three required columns in a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub lat: usize,
    pub lon: usize,
    pub id: usize,
}

impl ColumnMap {
    /// Locates the required columns.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::MissingColumn`] for the first column with no
    /// matching alias.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> std::result::Result<Self, TableError> {
        Ok(Self {
            lat: find_column(headers, LAT_COLUMN, LAT_ALIASES)?,
            lon: find_column(headers, LON_COLUMN, LON_ALIASES)?,
            id: find_column(headers, ID_COLUMN, ID_ALIASES)?,
        })
    }

    /// `headers` with the matched columns renamed to their canonical names.
    #[must_use]
    pub fn normalize<S: AsRef<str>>(&self, headers: &[S]) -> Vec<String> {
        headers
            .iter()
            .enumerate()
            .map(|(i, h)| match i {
                _ if i == self.lat => LAT_COLUMN.to_string(),
                _ if i == self.lon => LON_COLUMN.to_string(),
                _ if i == self.id => ID_COLUMN.to_string(),
                _ => h.as_ref().to_string(),
            })
            .collect()
    }
}

/// Index of the first header matching `aliases`.
///
/// # Errors
///
/// Returns [`TableError::MissingColumn`] when nothing matches.
pub fn find_column<S: AsRef<str>>(
    headers: &[S],
    canonical: &'static str,
    aliases: &[&'static str],
) -> std::result::Result<usize, TableError> {
    let position = |ignore_case: bool| {
        aliases.iter().find_map(|alias| {
            headers.iter().position(|h| {
                let h = h.as_ref().trim();
                if ignore_case {
                    h.eq_ignore_ascii_case(alias)
                } else {
                    h == *alias
                }
            })
        })
    };

    position(false)
        .or_else(|| position(true))
        .ok_or_else(|| TableError::MissingColumn {
            canonical,
            aliases: aliases.to_vec(),
            found: headers.iter().map(|h| h.as_ref().to_string()).collect(),
        })
}

/// Reads identified points from CSV.
///
/// # Errors
///
/// Returns [`TableError`] for missing columns or unparsable cells, and
/// [`ParameterError`](crate::error::ParameterError) for coordinates outside
/// WGS84 bounds.
pub fn read_points<R: Read>(reader: R) -> Result<Vec<SamplePoint>> {
    let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers: Vec<String> = csv.headers()?.iter().map(str::to_string).collect();
    let columns = ColumnMap::resolve(headers.as_slice())?;
    debug!("Columns normalised to {:?}", columns.normalize(headers.as_slice()));

    let mut points = Vec::new();
    for (index, record) in csv.records().enumerate() {
        let record = record?;
        let row = index + 1;
        let cell = |column: usize| record.get(column).unwrap_or_default();
        let number = |column: usize| -> std::result::Result<f64, TableError> {
            let raw = cell(column);
            raw.parse::<f64>().map_err(|_| TableError::InvalidValue {
                row,
                column: headers[column].clone(),
                value: raw.to_string(),
            })
        };

        let coordinate = Coordinate::new(number(columns.lat)?, number(columns.lon)?)?;
        points.push(SamplePoint::new(cell(columns.id), coordinate));
    }
    Ok(points)
}

/// Reads identified points from a CSV file.
///
/// # Errors
///
/// See [`read_points`]; open failures become [`IoError::Read`](crate::error::IoError::Read).
pub fn read_points_file(path: impl AsRef<Path>) -> Result<Vec<SamplePoint>> {
    let path = path.as_ref();
    let file = File::open(path).with_read_context("CSV", path)?;
    read_points(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GeoveilError, ParameterError};

    #[test]
    fn test_normalizes_common_spellings() {
        let headers = ["Latitude", "Longitude", "plot_id"];
        let columns = ColumnMap::resolve(&headers).unwrap();
        assert_eq!(columns.normalize(&headers), vec!["LAT", "LON", "plot_ID"]);
    }

    #[test]
    fn test_exact_match_beats_case_insensitive() {
        // "LAT" is an exact alias; "lat" only matches "LAT" ignoring case
        let headers = ["site", "LAT", "LONGITUDE", "Id"];
        let columns = ColumnMap::resolve(&headers).unwrap();
        assert_eq!(columns.lat, 1);
        assert_eq!(columns.lon, 2);
        assert_eq!(columns.id, 3);
    }

    #[test]
    fn test_alias_order_decides() {
        // Both "lat" and "y" present: "lat" comes first in the alias list
        let headers = ["y", "lat", "x", "id"];
        let columns = ColumnMap::resolve(&headers).unwrap();
        assert_eq!(columns.lat, 1);
        assert_eq!(columns.lon, 2);
    }

    #[test]
    fn test_missing_latitude() {
        let err = ColumnMap::resolve(&["Longitude", "plot_id", "elev"]).unwrap_err();
        match err {
            TableError::MissingColumn {
                canonical, found, ..
            } => {
                assert_eq!(canonical, "LAT");
                assert_eq!(found, vec!["Longitude", "plot_id", "elev"]);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_id_column() {
        assert!(matches!(
            ColumnMap::resolve(&["lat", "lon"]),
            Err(TableError::MissingColumn {
                canonical: "plot_ID",
                ..
            })
        ));
    }

    #[test]
    fn test_read_points() {
        let data = "plot_id,Latitude,Longitude,notes\nA1,44.0582,-121.3153,bend\nA2, 45.5 ,-122.6,\n";
        let points = read_points(data.as_bytes()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].id, "A1");
        assert_eq!(points[1].coordinate.lat, 45.5);
    }

    #[test]
    fn test_bad_cell_reports_row() {
        let data = "id,lat,lon\n1,44.0,-121.0\n2,north,-121.0\n";
        match read_points(data.as_bytes()).unwrap_err() {
            GeoveilError::Table(TableError::InvalidValue { row, column, value }) => {
                assert_eq!(row, 2);
                assert_eq!(column, "lat");
                assert_eq!(value, "north");
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_coordinate() {
        let data = "id,lat,lon\n1,95.0,-121.0\n";
        assert!(matches!(
            read_points(data.as_bytes()).unwrap_err(),
            GeoveilError::InvalidParameter(ParameterError::CoordinateOutOfRange { .. })
        ));
    }
}
