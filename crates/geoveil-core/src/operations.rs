//! End-to-end pipelines over identified points and areas.
//!
//! These functions tie the geometry engine, the image loader and the
//! extraction orchestrator together the way the command line uses them:
//! points are optionally obfuscated, the dataset is loaded once, and every
//! geometry yields one [`ExtractionRow`].

use chrono::NaiveDate;
use geo_types::Polygon;
use log::info;
use tokio_util::sync::CancellationToken;

use crate::catalog::CatalogResolver;
use crate::config::{BufferMode, ExtractionOptions, PrivacyOptions};
use crate::error::Result;
use crate::extraction::ExtractionOrchestrator;
use crate::geometry::{ObfuscationEngine, build_circle};
use crate::imagery::{FeatureBurn, ImageryService};
use crate::loader::{CompositeImage, ImageLoader};
use crate::types::{Area, ExtractionRow, GeometrySet, SamplePoint};

/// The dataset to extract from and how to load it.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetQuery {
    /// Catalog identifier, e.g. `USGS/SRTMGL1_003`
    pub dataset_id: String,
    /// Inclusive start of the collection filter
    pub start_date: Option<NaiveDate>,
    /// Inclusive end of the collection filter
    pub end_date: Option<NaiveDate>,
    /// Value burned when the dataset is a feature collection
    pub burn: FeatureBurn,
}

impl DatasetQuery {
    #[must_use]
    pub fn new(dataset_id: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            start_date: None,
            end_date: None,
            burn: FeatureBurn::default(),
        }
    }

    #[must_use]
    pub fn with_dates(
        mut self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }

    #[must_use]
    pub fn with_feature_burn(mut self, burn: FeatureBurn) -> Self {
        self.burn = burn;
        self
    }
}

/// Replaces every point with `sample_count` randomized samples that keep the
/// source identifier.
///
/// # Errors
///
/// Returns [`GeoveilError::InvalidParameter`](crate::error::GeoveilError::InvalidParameter)
/// if the privacy options are invalid.
pub fn obfuscate_points(
    points: &[SamplePoint],
    options: &PrivacyOptions,
) -> Result<Vec<SamplePoint>> {
    options.validate()?;
    let spec = options.buffer_spec()?;
    let mut engine = ObfuscationEngine::with_seed(options.seed);

    info!(
        "Obfuscating {} points: {} samples each within {} ft",
        points.len(),
        spec.sample_count(),
        spec.radius_feet()
    );
    Ok(points
        .iter()
        .flat_map(|point| {
            engine
                .obfuscate_with(point.coordinate, &spec)
                .into_iter()
                .map(|coordinate| SamplePoint::new(point.id.clone(), coordinate))
                .collect::<Vec<_>>()
        })
        .collect())
}

/// One circular buffer per point, tagged with the point identifier.
///
/// With [`BufferMode::HiddenCenter`] the circle center is randomized so that
/// the point lies inside the buffer but not at its center.
///
/// # Errors
///
/// Returns [`GeoveilError::InvalidParameter`](crate::error::GeoveilError::InvalidParameter)
/// if the privacy options are invalid.
pub fn buffer_points(
    points: &[SamplePoint],
    options: &PrivacyOptions,
) -> Result<Vec<(String, Polygon<f64>)>> {
    options.validate()?;
    info!(
        "Buffering {} points by {} ft ({:?})",
        points.len(),
        options.radius_feet,
        options.buffer_mode
    );

    let mut engine = ObfuscationEngine::with_seed(options.seed);
    let mut buffers = Vec::with_capacity(points.len());
    for point in points {
        let polygon = match options.buffer_mode {
            BufferMode::Centered => {
                build_circle(point.coordinate, options.radius_feet, options.resolution)?
            },
            BufferMode::HiddenCenter => engine.obfuscated_circle(
                point.coordinate,
                options.radius_feet,
                options.resolution,
            )?,
        };
        buffers.push((point.id.clone(), polygon));
    }
    Ok(buffers)
}

/// Loads `query` and samples it at every point.
///
/// When `privacy` is given each point is first replaced by its obfuscated
/// samples, so the output has `sample_count` rows per input point.
///
/// # Errors
///
/// Fails on invalid options or dates, an unresolvable dataset, or a failed
/// batch extraction. With [`ExtractionOptions::isolate_failures`] set,
/// individual geometry failures become rows instead.
pub async fn extract_points(
    service: &dyn ImageryService,
    catalog: &CatalogResolver,
    query: &DatasetQuery,
    points: &[SamplePoint],
    privacy: Option<&PrivacyOptions>,
    options: ExtractionOptions,
) -> Result<Vec<ExtractionRow>> {
    options.validate()?;
    let points = match privacy {
        Some(privacy) => obfuscate_points(points, privacy)?,
        None => points.to_vec(),
    };
    let composite = load(service, catalog, query, &options).await?;
    run(service, options, None, &GeometrySet::Points(points), &composite).await
}

/// Loads `query` and reduces it over every area.
///
/// # Errors
///
/// See [`extract_points`].
pub async fn extract_areas(
    service: &dyn ImageryService,
    catalog: &CatalogResolver,
    query: &DatasetQuery,
    areas: &[Area],
    options: ExtractionOptions,
) -> Result<Vec<ExtractionRow>> {
    options.validate()?;
    let composite = load(service, catalog, query, &options).await?;
    run(
        service,
        options,
        None,
        &GeometrySet::Areas(areas.to_vec()),
        &composite,
    )
    .await
}

/// Like [`extract_points`] without obfuscation, stopping early when `cancel`
/// fires.
///
/// # Errors
///
/// See [`extract_points`]; cancellation surfaces as
/// [`ExtractionError::Cancelled`](crate::error::ExtractionError::Cancelled).
pub async fn extract_cancellable(
    service: &dyn ImageryService,
    catalog: &CatalogResolver,
    query: &DatasetQuery,
    geometries: &GeometrySet,
    options: ExtractionOptions,
    cancel: CancellationToken,
) -> Result<Vec<ExtractionRow>> {
    options.validate()?;
    let composite = load(service, catalog, query, &options).await?;
    run(service, options, Some(cancel), geometries, &composite).await
}

async fn load(
    service: &dyn ImageryService,
    catalog: &CatalogResolver,
    query: &DatasetQuery,
    options: &ExtractionOptions,
) -> Result<CompositeImage> {
    ImageLoader::new(service, catalog)
        .with_feature_burn(query.burn.clone())
        .with_request_timeout(options.request_timeout)
        .load(&query.dataset_id, query.start_date, query.end_date)
        .await
}

async fn run(
    service: &dyn ImageryService,
    options: ExtractionOptions,
    cancel: Option<CancellationToken>,
    geometries: &GeometrySet,
    composite: &CompositeImage,
) -> Result<Vec<ExtractionRow>> {
    let isolate = options.isolate_failures;
    let mut orchestrator = ExtractionOrchestrator::new(service, options);
    if let Some(token) = cancel {
        orchestrator = orchestrator.with_cancellation(token);
    }

    let rows = if isolate {
        orchestrator.extract_each(geometries, composite).await?
    } else {
        orchestrator.extract(geometries, composite).await?
    };
    info!("Extracted {} rows from '{}'", rows.len(), composite.dataset_id);
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalogSource;
    use crate::error::{ExtractionError, GeoveilError, ParameterError};
    use crate::geometry::LocalFrame;
    use crate::imagery::{GridRaster, GridSpec, MemoryImagery, Scene};
    use crate::types::{Coordinate, DatasetDescriptor, DatasetType};
    use geo::{Centroid, Contains};
    use geo_types::polygon;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bend() -> Vec<SamplePoint> {
        vec![
            SamplePoint::new("A1", Coordinate::new(44.0582, -121.3153).unwrap()),
            SamplePoint::new("A2", Coordinate::new(44.1, -121.2).unwrap()),
        ]
    }

    /// A 0.01-degree grid over Bend with the pixel index as its value.
    fn service() -> MemoryImagery {
        let grid = GridSpec::new(-121.5, 44.3, 0.01, 50, 50);
        let values: Vec<f64> = (0..grid.len()).map(|i| i as f64).collect();
        let raster = || GridRaster::new(grid).with_band("elevation", values.clone()).unwrap();
        MemoryImagery::new()
            .with_image("USGS/SRTMGL1_003", raster())
            .with_collection(
                "MODIS/LST",
                vec![
                    Scene::new(date(2024, 6, 1), raster()),
                    Scene::new(date(2024, 7, 1), raster()),
                ],
            )
            .unwrap()
    }

    fn catalog() -> CatalogResolver {
        CatalogResolver::new(StaticCatalogSource::new(vec![DatasetDescriptor {
            id: "USGS/SRTMGL1_003".to_string(),
            title: Some("SRTM".to_string()),
            kind: Some(DatasetType::Image),
            url: None,
        }]))
    }

    fn options() -> ExtractionOptions {
        ExtractionOptions::new().with_extraction_date(date(2025, 5, 1))
    }

    #[test]
    fn test_obfuscated_samples_keep_ids() {
        let options = PrivacyOptions::new()
            .with_radius_feet(1000.0)
            .with_sample_count(5)
            .with_seed(Some(42));
        let samples = obfuscate_points(&bend(), &options).unwrap();

        assert_eq!(samples.len(), 10);
        assert!(samples[..5].iter().all(|s| s.id == "A1"));
        assert!(samples[5..].iter().all(|s| s.id == "A2"));

        let source = bend()[0].coordinate;
        let frame = LocalFrame::for_coordinate(source);
        let origin = frame.forward(source);
        for sample in &samples[..5] {
            let distance = frame.forward(sample.coordinate).distance(&origin);
            assert!(distance <= 304.8 + 1e-6, "sample {distance} m away");
        }
        assert_eq!(samples, obfuscate_points(&bend(), &options).unwrap());
    }

    #[test]
    fn test_obfuscate_rejects_zero_samples() {
        let options = PrivacyOptions::new().with_sample_count(0);
        assert!(matches!(
            obfuscate_points(&bend(), &options),
            Err(GeoveilError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_buffer_modes_contain_points() {
        for mode in [BufferMode::Centered, BufferMode::HiddenCenter] {
            let options = PrivacyOptions::new()
                .with_resolution(8)
                .with_buffer_mode(mode)
                .with_seed(Some(7));
            let buffers = buffer_points(&bend(), &options).unwrap();
            assert_eq!(buffers.len(), 2);
            for ((id, polygon), point) in buffers.iter().zip(bend()) {
                assert_eq!(id, &point.id);
                assert!(polygon.contains(&point.coordinate.to_point()));
                assert_eq!(polygon.exterior().0.len(), 33);
            }
        }
    }

    #[test]
    fn test_hidden_center_moves_the_center() {
        let options = PrivacyOptions::new()
            .with_buffer_mode(BufferMode::HiddenCenter)
            .with_seed(Some(3));
        let buffers = buffer_points(&bend(), &options).unwrap();
        let centroid = buffers[0].1.centroid().unwrap();
        let source = bend()[0].coordinate.to_point();
        assert!((centroid.x() - source.x()).abs() + (centroid.y() - source.y()).abs() > 0.0);
    }

    #[test]
    fn test_buffer_rejects_zero_resolution() {
        let options = PrivacyOptions::new().with_resolution(0);
        assert!(matches!(
            buffer_points(&bend(), &options),
            Err(GeoveilError::InvalidParameter(
                ParameterError::InvalidResolution { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_extract_points_plain() {
        let service = service();
        let rows = extract_points(
            &service,
            &catalog(),
            &DatasetQuery::new("USGS/SRTMGL1_003"),
            &bend(),
            None,
            options(),
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].geometry_id, "A1");
        assert_eq!(rows[1].geometry_id, "A2");
        assert!(rows.iter().all(|r| r.value("elevation").is_some()));
        assert_eq!(rows[0].dataset_id, "USGS/SRTMGL1_003");
        // One declared-type probe, one sampling request
        assert_eq!(service.describe_calls(), 1);
        assert_eq!(service.sample_calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_points_with_obfuscation() {
        let service = service();
        let privacy = PrivacyOptions::new().with_sample_count(3).with_seed(Some(1));
        let rows = extract_points(
            &service,
            &catalog(),
            &DatasetQuery::new("USGS/SRTMGL1_003"),
            &bend(),
            Some(&privacy),
            options(),
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 6);
        assert_eq!(rows.iter().filter(|r| r.geometry_id == "A1").count(), 3);
        assert_eq!(service.sample_calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_collection_with_dates() {
        let service = service();
        let query = DatasetQuery::new("MODIS/LST")
            .with_dates(Some(date(2024, 6, 1)), Some(date(2024, 6, 30)));
        let rows = extract_points(&service, &catalog(), &query, &bend(), None, options())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.is_missing()));
    }

    #[tokio::test]
    async fn test_extract_areas_one_row_per_area() {
        let service = service();
        let areas = vec![
            Area::from_polygon(
                "north",
                polygon![
                    (x: -121.4, y: 44.2),
                    (x: -121.3, y: 44.2),
                    (x: -121.3, y: 44.25),
                    (x: -121.4, y: 44.25),
                ],
            ),
            Area::from_polygon(
                "offshore",
                polygon![(x: -130.0, y: 40.0), (x: -129.9, y: 40.0), (x: -129.9, y: 40.1)],
            ),
        ];
        let rows = extract_areas(
            &service,
            &catalog(),
            &DatasetQuery::new("USGS/SRTMGL1_003"),
            &areas,
            options(),
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].value("elevation").is_some());
        assert!(rows[1].is_missing());
        assert_eq!(service.reduce_calls(), 1);
    }

    #[tokio::test]
    async fn test_isolated_failures_become_rows() {
        let service = service().fail_on_geometry("A2");
        let rows = extract_points(
            &service,
            &catalog(),
            &DatasetQuery::new("USGS/SRTMGL1_003"),
            &bend(),
            None,
            options().with_isolated_failures(true),
        )
        .await
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].failure.is_none());
        assert!(rows[1].is_missing());
        assert!(rows[1].failure.is_some());
        assert_eq!(service.sample_calls(), 2);
    }

    #[tokio::test]
    async fn test_unknown_dataset() {
        let service = service();
        let result = extract_points(
            &service,
            &catalog(),
            &DatasetQuery::new("NOPE/NOTHING"),
            &bend(),
            None,
            options(),
        )
        .await;
        assert!(matches!(result, Err(GeoveilError::DatasetResolution(_))));
        assert_eq!(service.sample_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let service = service();
        let token = CancellationToken::new();
        token.cancel();
        let result = extract_cancellable(
            &service,
            &catalog(),
            &DatasetQuery::new("USGS/SRTMGL1_003"),
            &GeometrySet::Points(bend()),
            options(),
            token,
        )
        .await;
        assert!(matches!(
            result,
            Err(GeoveilError::Extraction(ExtractionError::Cancelled))
        ));
    }
}
