//! Sampling and zonal reduction of a composite over geometries.
//!
//! Points are sampled at their pixel; areas are reduced over their footprint
//! with the configured [`Reducer`](crate::imagery::Reducer). Either way the
//! whole set goes to the imagery service in a single request, and the output
//! has exactly one row per input geometry, in input order. Geometries without
//! valid data come back as rows of missing values.
//!
//! [`ExtractionOrchestrator::extract_each`] trades the single request for one
//! request per geometry so that a failing geometry only costs its own row.

use std::future::Future;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::ExtractionOptions;
use crate::error::{ExtractionError, GeoveilError, NetworkError, Result, ServiceError};
use crate::imagery::{BandValues, ImageryService};
use crate::loader::CompositeImage;
use crate::types::{Area, ExtractionRow, GeometrySet, SamplePoint};

/// A slice of one geometry kind, sent in one request.
#[derive(Debug, Clone, Copy)]
enum Batch<'g> {
    Points(&'g [SamplePoint]),
    Areas(&'g [Area]),
}

impl<'g> Batch<'g> {
    fn of(geometries: &'g GeometrySet) -> Self {
        match geometries {
            GeometrySet::Points(points) => Self::Points(points),
            GeometrySet::Areas(areas) => Self::Areas(areas),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Points(points) => points.len(),
            Self::Areas(areas) => areas.len(),
        }
    }

    /// One single-geometry batch per element, with its id.
    fn singles(&self) -> Vec<(&'g str, Batch<'g>)> {
        match *self {
            Self::Points(points) => points
                .iter()
                .enumerate()
                .map(|(i, p)| (p.id.as_str(), Self::Points(&points[i..=i])))
                .collect(),
            Self::Areas(areas) => areas
                .iter()
                .enumerate()
                .map(|(i, a)| (a.id.as_str(), Self::Areas(&areas[i..=i])))
                .collect(),
        }
    }

    fn ids(&self) -> Vec<&'g str> {
        match *self {
            Self::Points(points) => points.iter().map(|p| p.id.as_str()).collect(),
            Self::Areas(areas) => areas.iter().map(|a| a.id.as_str()).collect(),
        }
    }
}

/// Runs sampling requests against an [`ImageryService`].
pub struct ExtractionOrchestrator<'a> {
    service: &'a dyn ImageryService,
    options: ExtractionOptions,
    cancel: Option<CancellationToken>,
}

impl<'a> ExtractionOrchestrator<'a> {
    #[must_use]
    pub fn new(service: &'a dyn ImageryService, options: ExtractionOptions) -> Self {
        Self {
            service,
            options,
            cancel: None,
        }
    }

    /// Abort in-flight requests when `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    /// Extracts every geometry in one request.
    ///
    /// # Errors
    ///
    /// The batch fails as a whole if the options are invalid, the composite
    /// has no bands or lacks a requested band, the service rejects the
    /// request or answers with the wrong number of results, the request
    /// times out, or the extraction is cancelled.
    pub async fn extract(
        &self,
        geometries: &GeometrySet,
        composite: &CompositeImage,
    ) -> Result<Vec<ExtractionRow>> {
        self.options.validate()?;
        let bands = self.required_bands(composite)?;
        let batch = Batch::of(geometries);
        if batch.len() == 0 {
            return Ok(Vec::new());
        }

        info!(
            "Extracting {} {} from '{}' ({} bands)",
            batch.len(),
            mode_name(batch),
            composite.dataset_id,
            bands.len()
        );
        let results = self.request(batch, composite, &bands).await?;

        let date = self.extraction_date();
        Ok(batch
            .ids()
            .into_iter()
            .zip(&results)
            .map(|(id, values)| build_row(id, Some(values), &bands, composite, date, None))
            .collect())
    }

    /// Extracts each geometry in its own request, at most
    /// `options.concurrency` at a time.
    ///
    /// A failing geometry yields a row of missing values carrying the
    /// failure message instead of failing the batch.
    ///
    /// # Errors
    ///
    /// Fails as a whole only for invalid options, an unusable composite, or
    /// cancellation.
    pub async fn extract_each(
        &self,
        geometries: &GeometrySet,
        composite: &CompositeImage,
    ) -> Result<Vec<ExtractionRow>> {
        self.options.validate()?;
        let bands = self.required_bands(composite)?;
        let singles = Batch::of(geometries).singles();
        info!(
            "Extracting {} geometries from '{}' one by one ({} in flight)",
            singles.len(),
            composite.dataset_id,
            self.options.concurrency
        );

        let bands_ref = &bands;
        let outcomes: Vec<(&str, Result<Vec<BandValues>>)> = stream::iter(singles)
            .map(|(id, batch)| async move { (id, self.request(batch, composite, bands_ref).await) })
            .buffered(self.options.concurrency)
            .collect()
            .await;

        let date = self.extraction_date();
        let mut rows = Vec::with_capacity(outcomes.len());
        for (id, outcome) in outcomes {
            let row = match outcome {
                Ok(results) => build_row(id, results.first(), &bands, composite, date, None),
                Err(GeoveilError::Extraction(ExtractionError::Cancelled)) => {
                    return Err(ExtractionError::Cancelled.into());
                },
                Err(e) => {
                    warn!("Extraction failed for geometry '{id}': {e}");
                    build_row(id, None, &bands, composite, date, Some(e.to_string()))
                },
            };
            rows.push(row);
        }
        Ok(rows)
    }

    /// Bands to extract, in output order.
    fn required_bands(&self, composite: &CompositeImage) -> Result<Vec<String>> {
        if composite.bands.is_empty() {
            return Err(ExtractionError::NoBands {
                dataset_id: composite.dataset_id.clone(),
            }
            .into());
        }
        if self.options.bands.is_empty() {
            return Ok(composite.bands.clone());
        }
        if let Some(missing) = self.options.bands.iter().find(|b| !composite.has_band(b)) {
            return Err(ExtractionError::MissingBand {
                band: missing.clone(),
                dataset_id: composite.dataset_id.clone(),
                available: composite.bands.clone(),
            }
            .into());
        }
        Ok(self.options.bands.clone())
    }

    async fn request(
        &self,
        batch: Batch<'_>,
        composite: &CompositeImage,
        bands: &[String],
    ) -> Result<Vec<BandValues>> {
        let scale = self.options.scale.or(composite.native_scale);
        let results = match batch {
            Batch::Points(points) => {
                self.guarded(
                    "sample",
                    self.service
                        .sample_points(&composite.expr, points, scale, bands),
                )
                .await?
            },
            Batch::Areas(areas) => {
                self.guarded(
                    "reduce",
                    self.service.reduce_regions(
                        &composite.expr,
                        areas,
                        self.options.reducer,
                        scale,
                        bands,
                    ),
                )
                .await?
            },
        };
        if results.len() != batch.len() {
            return Err(ExtractionError::ResultCountMismatch {
                expected: batch.len(),
                actual: results.len(),
            }
            .into());
        }
        debug!("Received {} results", results.len());
        Ok(results)
    }

    async fn guarded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = std::result::Result<T, ServiceError>>,
    ) -> Result<T> {
        let timeout = self.options.request_timeout;
        let timed = tokio::time::timeout(timeout, call);
        let outcome = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return Err(ExtractionError::Cancelled.into()),
                    outcome = timed => outcome,
                }
            },
            None => timed.await,
        };
        match outcome {
            Ok(result) => result.map_err(GeoveilError::from),
            Err(_) => Err(NetworkError::Timeout {
                endpoint: operation.to_string(),
                after: timeout,
            }
            .into()),
        }
    }

    fn extraction_date(&self) -> NaiveDate {
        self.options
            .extraction_date
            .unwrap_or_else(|| Utc::now().date_naive())
    }
}

fn mode_name(batch: Batch<'_>) -> &'static str {
    match batch {
        Batch::Points(_) => "points",
        Batch::Areas(_) => "areas",
    }
}

fn build_row(
    id: &str,
    values: Option<&BandValues>,
    bands: &[String],
    composite: &CompositeImage,
    date: NaiveDate,
    failure: Option<String>,
) -> ExtractionRow {
    ExtractionRow {
        geometry_id: id.to_string(),
        values: bands
            .iter()
            .map(|band| {
                let value = values.and_then(|v| v.get(band).copied().flatten());
                (band.clone(), value.filter(|x| x.is_finite()))
            })
            .collect(),
        dataset_id: composite.dataset_id.clone(),
        extraction_date: date,
        failure,
    }
}
