//! In-process imagery service over geographic grids.
//!
//! Rasters are north-up grids in WGS84 degrees with NaN as nodata.
//! Collections are lists of dated scenes sharing one grid; feature
//! collections are polygons with numeric properties, rasterized onto a grid
//! when evaluated. The requested `scale` is ignored: values are always read
//! at the stored resolution.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use geo::{BoundingRect, Centroid, Contains};
use geo_types::{MultiPolygon, Point};
use log::debug;

use super::{BandValues, FeatureBurn, ImageExpr, ImageInfo, ImageryService, Reducer};
use crate::error::{ParameterError, ServiceError};
use crate::types::{Area, DateRange, SamplePoint};

/// Meters per degree of latitude, used to report a nominal pixel size.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Placement of a north-up grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    /// Longitude of the western edge
    pub west: f64,
    /// Latitude of the northern edge
    pub north: f64,
    /// Pixel size in degrees (square pixels)
    pub pixel_deg: f64,
    pub width: usize,
    pub height: usize,
}

impl GridSpec {
    #[must_use]
    pub fn new(west: f64, north: f64, pixel_deg: f64, width: usize, height: usize) -> Self {
        Self {
            west,
            north,
            pixel_deg,
            width,
            height,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nominal pixel size in meters.
    #[must_use]
    pub fn native_scale(&self) -> f64 {
        self.pixel_deg * METERS_PER_DEGREE
    }

    /// Row-major index of the pixel containing `(lon, lat)`.
    #[must_use]
    pub fn index_of(&self, lon: f64, lat: f64) -> Option<usize> {
        let col = ((lon - self.west) / self.pixel_deg).floor();
        let row = ((self.north - lat) / self.pixel_deg).floor();
        if col < 0.0 || row < 0.0 || col >= self.width as f64 || row >= self.height as f64 {
            return None;
        }
        Some(row as usize * self.width + col as usize)
    }

    #[must_use]
    pub fn pixel_center(&self, index: usize) -> Point<f64> {
        let col = (index % self.width) as f64;
        let row = (index / self.width) as f64;
        Point::new(
            self.west + (col + 0.5) * self.pixel_deg,
            self.north - (row + 0.5) * self.pixel_deg,
        )
    }

    /// Indices of pixels whose centers fall inside `geometry`.
    fn pixels_within(&self, geometry: &MultiPolygon<f64>) -> Vec<usize> {
        if self.is_empty() {
            return Vec::new();
        }
        let Some(rect) = geometry.bounding_rect() else {
            return Vec::new();
        };
        let clamp_col = |x: f64| {
            (((x - self.west) / self.pixel_deg).floor() as i64).clamp(0, self.width as i64 - 1)
        };
        let clamp_row = |y: f64| {
            (((self.north - y) / self.pixel_deg).floor() as i64).clamp(0, self.height as i64 - 1)
        };
        let (col_min, col_max) = (clamp_col(rect.min().x), clamp_col(rect.max().x));
        let (row_min, row_max) = (clamp_row(rect.max().y), clamp_row(rect.min().y));

        let mut inside = Vec::new();
        for row in row_min..=row_max {
            for col in col_min..=col_max {
                let index = row as usize * self.width + col as usize;
                if geometry.contains(&self.pixel_center(index)) {
                    inside.push(index);
                }
            }
        }
        inside
    }
}

/// A multi-band grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridRaster {
    grid: GridSpec,
    bands: Vec<(String, Vec<f64>)>,
}

impl GridRaster {
    #[must_use]
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            bands: Vec::new(),
        }
    }

    /// Adds a band given in row-major order.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvalidOption`] if `values` does not match
    /// the grid size.
    pub fn with_band(
        mut self,
        name: impl Into<String>,
        values: Vec<f64>,
    ) -> Result<Self, ParameterError> {
        let name = name.into();
        if values.len() != self.grid.len() {
            return Err(ParameterError::InvalidOption {
                option: format!("band {name}"),
                message: format!(
                    "expected {} values for a {}x{} grid, got {}",
                    self.grid.len(),
                    self.grid.width,
                    self.grid.height,
                    values.len()
                ),
            });
        }
        self.bands.push((name, values));
        Ok(self)
    }

    #[must_use]
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    #[must_use]
    pub fn band_names(&self) -> Vec<String> {
        self.bands.iter().map(|(name, _)| name.clone()).collect()
    }

    fn selected<'a>(
        &'a self,
        bands: &[String],
    ) -> Result<Vec<&'a (String, Vec<f64>)>, ServiceError> {
        if bands.is_empty() {
            return Ok(self.bands.iter().collect());
        }
        bands
            .iter()
            .map(|wanted| {
                self.bands
                    .iter()
                    .find(|(name, _)| name == wanted)
                    .ok_or_else(|| ServiceError::Rejected {
                        message: format!("image has no band '{wanted}'"),
                    })
            })
            .collect()
    }
}

/// One dated image of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub date: NaiveDate,
    pub raster: GridRaster,
}

impl Scene {
    #[must_use]
    pub fn new(date: NaiveDate, raster: GridRaster) -> Self {
        Self { date, raster }
    }
}

/// A polygon feature with numeric properties.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFeature {
    pub geometry: MultiPolygon<f64>,
    pub properties: HashMap<String, f64>,
}

impl VectorFeature {
    #[must_use]
    pub fn new(geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            properties: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone)]
struct FeatureLayer {
    grid: GridSpec,
    features: Vec<VectorFeature>,
}

#[derive(Debug, Default)]
struct CallCounters {
    describe: AtomicUsize,
    sample: AtomicUsize,
    reduce: AtomicUsize,
}

/// Imagery service evaluating [`ImageExpr`]s against in-memory data.
///
/// # Examples
///
/// ```
/// use geoveil_core::imagery::{GridRaster, GridSpec, ImageExpr, ImageryService, MemoryImagery};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> anyhow::Result<()> {
/// let grid = GridSpec::new(-122.0, 45.0, 1.0, 2, 2);
/// let dem = GridRaster::new(grid).with_band("elevation", vec![1.0, 2.0, 3.0, 4.0])?;
/// let service = MemoryImagery::new().with_image("DEM", dem);
///
/// let info = service.describe(&ImageExpr::Image { id: "DEM".into() }).await?;
/// assert_eq!(info.bands, vec!["elevation".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryImagery {
    images: HashMap<String, GridRaster>,
    collections: HashMap<String, Vec<Scene>>,
    features: HashMap<String, FeatureLayer>,
    latency: Option<Duration>,
    failing: HashSet<String>,
    calls: CallCounters,
}

impl MemoryImagery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_image(mut self, id: impl Into<String>, raster: GridRaster) -> Self {
        self.images.insert(id.into(), raster);
        self
    }

    /// Registers a collection.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError::InvalidOption`] unless all scenes share one
    /// grid and one band list.
    pub fn with_collection(
        mut self,
        id: impl Into<String>,
        scenes: Vec<Scene>,
    ) -> Result<Self, ParameterError> {
        let id = id.into();
        if let Some(first) = scenes.first() {
            let consistent = scenes.iter().all(|s| {
                s.raster.grid == first.raster.grid
                    && s.raster.band_names() == first.raster.band_names()
            });
            if !consistent {
                return Err(ParameterError::InvalidOption {
                    option: format!("collection {id}"),
                    message: "scenes must share grid and bands".to_string(),
                });
            }
        }
        self.collections.insert(id, scenes);
        Ok(self)
    }

    /// Registers a feature collection, rasterized onto `grid` on use.
    #[must_use]
    pub fn with_features(
        mut self,
        id: impl Into<String>,
        grid: GridSpec,
        features: Vec<VectorFeature>,
    ) -> Self {
        self.features
            .insert(id.into(), FeatureLayer { grid, features });
        self
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Rejects any sample/reduce request that includes geometry `id`.
    #[must_use]
    pub fn fail_on_geometry(mut self, id: impl Into<String>) -> Self {
        self.failing.insert(id.into());
        self
    }

    #[must_use]
    pub fn describe_calls(&self) -> usize {
        self.calls.describe.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sample_calls(&self) -> usize {
        self.calls.sample.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn reduce_calls(&self) -> usize {
        self.calls.reduce.load(Ordering::SeqCst)
    }

    /// Total remote-style calls served.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.describe_calls() + self.sample_calls() + self.reduce_calls()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_failing<'a>(&self, mut ids: impl Iterator<Item = &'a str>) -> Result<(), ServiceError> {
        match ids.find(|id| self.failing.contains(*id)) {
            Some(id) => Err(ServiceError::Rejected {
                message: format!("geometry '{id}' could not be processed"),
            }),
            None => Ok(()),
        }
    }

    fn evaluate(&self, expr: &ImageExpr) -> Result<GridRaster, ServiceError> {
        let not_found = || ServiceError::NotFound {
            id: expr.id().to_string(),
            expected: expr.dataset_type().to_string(),
        };
        match expr {
            ImageExpr::Image { id } => self.images.get(id).cloned().ok_or_else(not_found),
            ImageExpr::CollectionMedian { id, dates } => {
                let scenes = self.collections.get(id).ok_or_else(not_found)?;
                median_composite(id, scenes, dates.as_ref())
            },
            ImageExpr::RasterizedFeatures { id, burn } => {
                let layer = self.features.get(id).ok_or_else(not_found)?;
                Ok(rasterize(layer, burn))
            },
        }
    }
}

fn median_composite(
    id: &str,
    scenes: &[Scene],
    dates: Option<&DateRange>,
) -> Result<GridRaster, ServiceError> {
    let selected: Vec<&Scene> = scenes
        .iter()
        .filter(|s| dates.is_none_or(|range| range.contains(s.date)))
        .collect();
    let Some(first) = selected.first() else {
        return Err(ServiceError::Rejected {
            message: format!("collection '{id}' has no scenes in the requested date range"),
        });
    };
    debug!("Median of {} scenes from '{id}'", selected.len());

    let grid = first.raster.grid;
    let mut composite = GridRaster::new(grid);
    for (band, (name, _)) in first.raster.bands.iter().enumerate() {
        let values = (0..grid.len())
            .map(|pixel| {
                let stack: Vec<f64> = selected
                    .iter()
                    .map(|s| s.raster.bands[band].1[pixel])
                    .collect();
                Reducer::Median.apply(&stack).unwrap_or(f64::NAN)
            })
            .collect();
        composite.bands.push((name.clone(), values));
    }
    Ok(composite)
}

fn rasterize(layer: &FeatureLayer, burn: &FeatureBurn) -> GridRaster {
    let grid = layer.grid;
    let values = (0..grid.len())
        .map(|pixel| {
            let center = grid.pixel_center(pixel);
            let mut covering = layer
                .features
                .iter()
                .filter(|f| f.geometry.contains(&center));
            match burn {
                FeatureBurn::Constant { value } => {
                    if covering.next().is_some() {
                        *value
                    } else {
                        f64::NAN
                    }
                },
                FeatureBurn::Property { name, reducer } => {
                    let found: Vec<f64> = covering
                        .filter_map(|f| f.properties.get(name).copied())
                        .collect();
                    reducer.apply(&found).unwrap_or(f64::NAN)
                },
            }
        })
        .collect();
    GridRaster {
        grid,
        bands: vec![(burn.band_name().to_string(), values)],
    }
}

fn values_at(bands: &[&(String, Vec<f64>)], pixel: Option<usize>) -> BandValues {
    bands
        .iter()
        .map(|(name, values)| {
            let value = pixel.map(|i| values[i]).filter(|v| !v.is_nan());
            (name.clone(), value)
        })
        .collect()
}

#[async_trait]
impl ImageryService for MemoryImagery {
    async fn describe(&self, expr: &ImageExpr) -> Result<ImageInfo, ServiceError> {
        self.calls.describe.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let raster = self.evaluate(expr)?;
        Ok(ImageInfo {
            bands: raster.band_names(),
            native_scale: Some(raster.grid.native_scale()),
        })
    }

    async fn sample_points(
        &self,
        expr: &ImageExpr,
        points: &[SamplePoint],
        _scale: Option<f64>,
        bands: &[String],
    ) -> Result<Vec<BandValues>, ServiceError> {
        self.calls.sample.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check_failing(points.iter().map(|p| p.id.as_str()))?;

        let raster = self.evaluate(expr)?;
        let selected = raster.selected(bands)?;
        Ok(points
            .iter()
            .map(|p| {
                let pixel = raster.grid.index_of(p.coordinate.lon, p.coordinate.lat);
                values_at(&selected, pixel)
            })
            .collect())
    }

    async fn reduce_regions(
        &self,
        expr: &ImageExpr,
        areas: &[Area],
        reducer: Reducer,
        _scale: Option<f64>,
        bands: &[String],
    ) -> Result<Vec<BandValues>, ServiceError> {
        self.calls.reduce.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.check_failing(areas.iter().map(|a| a.id.as_str()))?;

        let raster = self.evaluate(expr)?;
        let selected = raster.selected(bands)?;
        Ok(areas
            .iter()
            .map(|area| {
                let mut pixels = raster.grid.pixels_within(&area.geometry);
                // Areas smaller than a pixel read the pixel under their centroid
                if pixels.is_empty() {
                    pixels.extend(
                        area.geometry
                            .centroid()
                            .and_then(|c| raster.grid.index_of(c.x(), c.y())),
                    );
                }
                selected
                    .iter()
                    .map(|(name, values)| {
                        let stack: Vec<f64> = pixels.iter().map(|&i| values[i]).collect();
                        (name.clone(), reducer.apply(&stack))
                    })
                    .collect()
            })
            .collect())
    }
}
