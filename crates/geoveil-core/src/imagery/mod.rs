//! The remote imagery service seam.
//!
//! Images are described lazily with [`ImageExpr`] and evaluated by an
//! [`ImageryService`]: [`HttpImagery`] talks to a JSON gateway,
//! [`MemoryImagery`] evaluates local grids.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ParameterError, ServiceError};
use crate::types::{Area, DatasetType, DateRange, SamplePoint};

pub mod http;
pub mod memory;

pub use http::HttpImagery;
pub use memory::{GridRaster, GridSpec, MemoryImagery, Scene, VectorFeature};

/// Band name → value for one geometry; `None` marks missing data.
pub type BandValues = HashMap<String, Option<f64>>;

/// Aggregation used for zonal statistics and feature burning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    #[default]
    Median,
    Mean,
    Min,
    Max,
}

impl Reducer {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
        }
    }

    /// Reduces `values`, skipping NaN. Returns `None` when nothing is left.
    #[must_use]
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        let mut valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if valid.is_empty() {
            return None;
        }
        let n = valid.len();
        Some(match self {
            Self::Mean => valid.iter().sum::<f64>() / n as f64,
            Self::Min => valid.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => valid.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Median => {
                valid.sort_by(f64::total_cmp);
                if n % 2 == 1 {
                    valid[n / 2]
                } else {
                    (valid[n / 2 - 1] + valid[n / 2]) / 2.0
                }
            },
        })
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reducer {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "median" => Ok(Self::Median),
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => Err(ParameterError::InvalidOption {
                option: "reducer".to_string(),
                message: format!("unknown reducer '{other}' (expected median, mean, min or max)"),
            }),
        }
    }
}

/// Value burned into pixels when a feature collection is rasterized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureBurn {
    /// Every covered pixel gets `value`
    Constant { value: f64 },
    /// Numeric property of the covering features, reduced per pixel
    Property { name: String, reducer: Reducer },
}

impl Default for FeatureBurn {
    fn default() -> Self {
        Self::Constant { value: 1.0 }
    }
}

impl FeatureBurn {
    /// Name of the single band the rasterized image carries.
    #[must_use]
    pub fn band_name(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::Property { reducer, .. } => reducer.as_str(),
        }
    }
}

/// A lazily evaluated single-raster image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageExpr {
    /// A single stored raster
    Image { id: String },
    /// Per-pixel median of a collection, optionally date-filtered
    CollectionMedian {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dates: Option<DateRange>,
    },
    /// A feature collection burned into a raster
    RasterizedFeatures { id: String, burn: FeatureBurn },
}

impl ImageExpr {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Image { id }
            | Self::CollectionMedian { id, .. }
            | Self::RasterizedFeatures { id, .. } => id,
        }
    }

    /// The dataset type this expression reads.
    #[must_use]
    pub fn dataset_type(&self) -> DatasetType {
        match self {
            Self::Image { .. } => DatasetType::Image,
            Self::CollectionMedian { .. } => DatasetType::ImageCollection,
            Self::RasterizedFeatures { .. } => DatasetType::FeatureCollection,
        }
    }
}

/// What the service knows about an evaluated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Band names in image order
    pub bands: Vec<String>,
    /// Nominal pixel size in meters, when the service reports one
    #[serde(default)]
    pub native_scale: Option<f64>,
}

/// The three operations consumed from the remote imagery service.
///
/// `sample_points` and `reduce_regions` return exactly one [`BandValues`]
/// per input geometry, in input order, restricted to `bands` when it is not
/// empty.
#[async_trait]
pub trait ImageryService: Send + Sync {
    /// Evaluate `expr` far enough to know it exists and what bands it has.
    async fn describe(&self, expr: &ImageExpr) -> Result<ImageInfo, ServiceError>;

    /// Pixel values under each point.
    async fn sample_points(
        &self,
        expr: &ImageExpr,
        points: &[SamplePoint],
        scale: Option<f64>,
        bands: &[String],
    ) -> Result<Vec<BandValues>, ServiceError>;

    /// Zonal statistic of each band over each area.
    async fn reduce_regions(
        &self,
        expr: &ImageExpr,
        areas: &[Area],
        reducer: Reducer,
        scale: Option<f64>,
        bands: &[String],
    ) -> Result<Vec<BandValues>, ServiceError>;
}

#[async_trait]
impl<S: ImageryService + ?Sized> ImageryService for Arc<S> {
    async fn describe(&self, expr: &ImageExpr) -> Result<ImageInfo, ServiceError> {
        (**self).describe(expr).await
    }

    async fn sample_points(
        &self,
        expr: &ImageExpr,
        points: &[SamplePoint],
        scale: Option<f64>,
        bands: &[String],
    ) -> Result<Vec<BandValues>, ServiceError> {
        (**self).sample_points(expr, points, scale, bands).await
    }

    async fn reduce_regions(
        &self,
        expr: &ImageExpr,
        areas: &[Area],
        reducer: Reducer,
        scale: Option<f64>,
        bands: &[String],
    ) -> Result<Vec<BandValues>, ServiceError> {
        (**self)
            .reduce_regions(expr, areas, reducer, scale, bands)
            .await
    }
}
