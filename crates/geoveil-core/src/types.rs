//! Data types shared across the obfuscation, loading, and extraction stages.
//!
//! All coordinates are WGS84 degrees. Constructors validate their invariants
//! and return [`ParameterError`] when they do not hold.

use std::fmt;

use chrono::NaiveDate;
use geo_types::{MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::ParameterError;

/// Feet to meters.
pub const METERS_PER_FOOT: f64 = 0.3048;

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in `[-90, 90]`
    pub lat: f64,
    /// Longitude in `[-180, 180]`
    pub lon: f64,
}

impl Coordinate {
    /// Creates a coordinate, rejecting values outside WGS84 bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::CoordinateOutOfRange`] for non-finite or
    /// out-of-range values.
    pub fn new(lat: f64, lon: f64) -> Result<Self, ParameterError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(ParameterError::CoordinateOutOfRange { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    /// The coordinate as an x/y point (`x` = longitude).
    #[must_use]
    pub fn to_point(self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.lat, self.lon)
    }
}

/// One identified location from an input table.
///
/// Identifiers need not be unique: obfuscation emits several samples per
/// source point, all carrying the source id.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePoint {
    /// Caller-provided identifier
    pub id: String,
    /// Location
    pub coordinate: Coordinate,
}

impl SamplePoint {
    #[must_use]
    pub fn new(id: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            id: id.into(),
            coordinate,
        }
    }
}

/// An identified polygonal area for zonal reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    /// Caller-provided identifier
    pub id: String,
    /// Footprint; single polygons are stored as one-element multipolygons
    pub geometry: MultiPolygon<f64>,
}

impl Area {
    #[must_use]
    pub fn new(id: impl Into<String>, geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            id: id.into(),
            geometry: geometry.into(),
        }
    }

    /// Convenience constructor for a single polygon.
    #[must_use]
    pub fn from_polygon(id: impl Into<String>, polygon: Polygon<f64>) -> Self {
        Self::new(id, MultiPolygon::new(vec![polygon]))
    }
}

/// Geometries handed to the extraction orchestrator. The variant selects the
/// extraction mode.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometrySet {
    /// Pixel sampling, one row per point
    Points(Vec<SamplePoint>),
    /// Zonal reduction, one row per area
    Areas(Vec<Area>),
}

impl GeometrySet {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Points(points) => points.len(),
            Self::Areas(areas) => areas.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers in input order.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        match self {
            Self::Points(points) => points.iter().map(|p| p.id.as_str()).collect(),
            Self::Areas(areas) => areas.iter().map(|a| a.id.as_str()).collect(),
        }
    }
}

/// Buffer radius and draw count for obfuscation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSpec {
    radius_feet: f64,
    sample_count: usize,
}

impl BufferSpec {
    /// # Errors
    ///
    /// Returns [`ParameterError`] if `radius_feet` is not a positive finite
    /// number or `sample_count` is zero.
    pub fn new(radius_feet: f64, sample_count: usize) -> Result<Self, ParameterError> {
        if !radius_feet.is_finite() || radius_feet <= 0.0 {
            return Err(ParameterError::NonPositiveRadius { radius_feet });
        }
        if sample_count == 0 {
            return Err(ParameterError::ZeroSampleCount { sample_count });
        }
        Ok(Self {
            radius_feet,
            sample_count,
        })
    }

    #[must_use]
    pub fn radius_feet(&self) -> f64 {
        self.radius_feet
    }

    #[must_use]
    pub fn radius_meters(&self) -> f64 {
        self.radius_feet * METERS_PER_FOOT
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }
}

/// An inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// # Errors
    ///
    /// Returns [`ParameterError::ReversedDateRange`] if `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ParameterError> {
        if start > end {
            return Err(ParameterError::ReversedDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Builds an optional range from optional bounds: both or neither.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] when only one bound is present or the
    /// bounds are reversed.
    pub fn from_bounds(
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Option<Self>, ParameterError> {
        match (start, end) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(ParameterError::OneSidedDateRange { which: "start" }),
            (None, Some(_)) => Err(ParameterError::OneSidedDateRange { which: "end" }),
            (Some(start), Some(end)) => Self::new(start, end).map(Some),
        }
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Structural type of a remote dataset as declared by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    Image,
    ImageCollection,
    /// Vector data; the public catalog calls these `table`
    #[serde(alias = "table")]
    FeatureCollection,
    /// Any type string this crate does not know how to load
    #[serde(other)]
    Unknown,
}

impl DatasetType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::ImageCollection => "image_collection",
            Self::FeatureCollection => "feature_collection",
            Self::Unknown => "unknown",
        }
    }

    /// Returns `true` for types with a direct loading path.
    #[must_use]
    pub fn is_loadable(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for DatasetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog metadata for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// `None` when the catalog entry carries no type
    #[serde(rename = "type", default)]
    pub kind: Option<DatasetType>,
    #[serde(default)]
    pub url: Option<String>,
}

impl DatasetDescriptor {
    /// The declared type if it has a direct loading path.
    #[must_use]
    pub fn loadable_kind(&self) -> Option<DatasetType> {
        self.kind.filter(DatasetType::is_loadable)
    }
}

/// One output row: a geometry id with its band values.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRow {
    /// Identifier of the source geometry
    pub geometry_id: String,
    /// `(band, value)` in composite band order; `None` is a missing value
    pub values: Vec<(String, Option<f64>)>,
    /// Dataset the composite was built from
    pub dataset_id: String,
    /// Date the extraction ran
    pub extraction_date: NaiveDate,
    /// Per-row failure message when the row was isolated and failed
    pub failure: Option<String>,
}

impl ExtractionRow {
    /// Value of a band, flattening missing and absent alike.
    #[must_use]
    pub fn value(&self, band: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|(name, _)| name == band)
            .and_then(|(_, value)| *value)
    }

    /// Returns `true` if every band value is missing.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.values.iter().all(|(_, value)| value.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_coordinate_bounds() {
        assert!(Coordinate::new(44.0582, -121.3153).is_ok());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, -181.0).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_buffer_spec_validation() {
        assert!(BufferSpec::new(10.0, 1).is_ok());
        assert!(matches!(
            BufferSpec::new(0.0, 5),
            Err(ParameterError::NonPositiveRadius { .. })
        ));
        assert!(matches!(
            BufferSpec::new(-3.0, 5),
            Err(ParameterError::NonPositiveRadius { .. })
        ));
        assert!(matches!(
            BufferSpec::new(10.0, 0),
            Err(ParameterError::ZeroSampleCount { .. })
        ));
        let spec = BufferSpec::new(1000.0, 5).unwrap();
        assert!((spec.radius_meters() - 304.8).abs() < 1e-9);
    }

    #[test]
    fn test_date_range_both_or_neither() {
        assert_eq!(DateRange::from_bounds(None, None).unwrap(), None);
        assert!(matches!(
            DateRange::from_bounds(Some(date(2024, 1, 1)), None),
            Err(ParameterError::OneSidedDateRange { which: "start" })
        ));
        assert!(matches!(
            DateRange::from_bounds(None, Some(date(2024, 1, 1))),
            Err(ParameterError::OneSidedDateRange { which: "end" })
        ));
        assert!(matches!(
            DateRange::from_bounds(Some(date(2024, 6, 1)), Some(date(2024, 1, 1))),
            Err(ParameterError::ReversedDateRange { .. })
        ));
        let same_day = DateRange::from_bounds(Some(date(2024, 6, 1)), Some(date(2024, 6, 1)))
            .unwrap()
            .unwrap();
        assert!(same_day.contains(date(2024, 6, 1)));
        assert!(!same_day.contains(date(2024, 6, 2)));
    }

    #[test]
    fn test_descriptor_parses_catalog_entry() {
        let json = r#"{"id": "USGS/SRTMGL1_003", "title": "SRTM", "type": "image",
                        "url": "https://example.com/srtm", "provider": "NASA"}"#;
        let descriptor: DatasetDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.kind, Some(DatasetType::Image));
        assert_eq!(descriptor.loadable_kind(), Some(DatasetType::Image));
    }

    #[test]
    fn test_descriptor_unknown_type_is_not_loadable() {
        let json = r#"{"id": "X/Y", "type": "table_collection"}"#;
        let descriptor: DatasetDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.kind, Some(DatasetType::Unknown));
        assert_eq!(descriptor.loadable_kind(), None);
        assert_eq!(descriptor.title, None);
    }

    #[test]
    fn test_geometry_set_ids_keep_order() {
        let c = Coordinate::new(1.0, 2.0).unwrap();
        let set = GeometrySet::Points(vec![
            SamplePoint::new("b", c),
            SamplePoint::new("a", c),
            SamplePoint::new("b", c),
        ]);
        assert_eq!(set.ids(), vec!["b", "a", "b"]);
        assert_eq!(set.len(), 3);
    }
}
