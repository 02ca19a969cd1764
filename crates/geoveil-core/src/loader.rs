//! Turning a dataset id into one composite image.
//!
//! When the catalog declares a loadable type the loader issues exactly one
//! probe for that type. Only when the type is unknown does it try image,
//! then image collection, then feature collection, moving on after any
//! failure.

use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info};

use crate::catalog::CatalogResolver;
use crate::error::{DatasetError, GeoveilError, NetworkError, Result, ServiceError};
use crate::imagery::{FeatureBurn, ImageExpr, ImageInfo, ImageryService};
use crate::types::{DatasetType, DateRange};

/// Probe order when the catalog cannot tell the type.
const PROBE_ORDER: [DatasetType; 3] = [
    DatasetType::Image,
    DatasetType::ImageCollection,
    DatasetType::FeatureCollection,
];

/// A single raster with named bands, ready for extraction.
///
/// Built fresh by every [`ImageLoader::load`] call and never cached.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeImage {
    /// Dataset the composite was built from
    pub dataset_id: String,
    /// How the dataset was read
    pub kind: DatasetType,
    /// Expression the imagery service evaluates
    pub expr: ImageExpr,
    /// Band names in image order
    pub bands: Vec<String>,
    /// Nominal pixel size in meters, if known
    pub native_scale: Option<f64>,
}

impl CompositeImage {
    fn from_info(dataset_id: &str, expr: ImageExpr, info: ImageInfo) -> Self {
        Self {
            dataset_id: dataset_id.to_string(),
            kind: expr.dataset_type(),
            expr,
            bands: info.bands,
            native_scale: info.native_scale,
        }
    }

    #[must_use]
    pub fn has_band(&self, band: &str) -> bool {
        self.bands.iter().any(|b| b == band)
    }
}

/// Resolves dataset ids through the catalog and the imagery service.
pub struct ImageLoader<'a> {
    service: &'a dyn ImageryService,
    catalog: &'a CatalogResolver,
    burn: FeatureBurn,
    request_timeout: Duration,
}

impl<'a> ImageLoader<'a> {
    #[must_use]
    pub fn new(service: &'a dyn ImageryService, catalog: &'a CatalogResolver) -> Self {
        Self {
            service,
            catalog,
            burn: FeatureBurn::default(),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Value burned when a feature collection is rasterized.
    #[must_use]
    pub fn with_feature_burn(mut self, burn: FeatureBurn) -> Self {
        self.burn = burn;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Loads `dataset_id` as one composite image.
    ///
    /// The date range is inclusive and must have both ends or neither; it
    /// filters collections and is ignored for single images.
    ///
    /// # Errors
    ///
    /// - [`GeoveilError::InvalidParameter`] for a one-sided or reversed date
    ///   range, raised before any remote call.
    /// - [`GeoveilError::DatasetResolution`] if the declared type does not
    ///   load or no type probe succeeds.
    /// - [`GeoveilError::Network`] if the declared-type probe fails in
    ///   transport.
    pub async fn load(
        &self,
        dataset_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<CompositeImage> {
        let dates = DateRange::from_bounds(start_date, end_date)?;

        let declared = self
            .catalog
            .resolve(dataset_id)
            .await
            .and_then(|d| d.loadable_kind());

        match declared {
            Some(kind) => self.load_declared(dataset_id, kind, dates).await,
            None => self.load_probing(dataset_id, dates).await,
        }
    }

    async fn load_declared(
        &self,
        dataset_id: &str,
        kind: DatasetType,
        dates: Option<DateRange>,
    ) -> Result<CompositeImage> {
        info!("Loading '{dataset_id}' as {kind}");
        let expr = self.expr_for(kind, dataset_id, dates);
        match self.describe(&expr).await {
            Ok(info) => Ok(CompositeImage::from_info(dataset_id, expr, info)),
            Err(ServiceError::Network(e)) => Err(GeoveilError::Network(e)),
            Err(e) => Err(DatasetError::TypeMismatch {
                id: dataset_id.to_string(),
                declared: kind.to_string(),
                reason: e.to_string(),
            }
            .into()),
        }
    }

    async fn load_probing(
        &self,
        dataset_id: &str,
        dates: Option<DateRange>,
    ) -> Result<CompositeImage> {
        info!("Type of '{dataset_id}' unknown, probing");
        let mut attempts = Vec::with_capacity(PROBE_ORDER.len());
        for kind in PROBE_ORDER {
            let expr = self.expr_for(kind, dataset_id, dates);
            match self.describe(&expr).await {
                Ok(info) => {
                    info!("'{dataset_id}' loaded as {kind}");
                    return Ok(CompositeImage::from_info(dataset_id, expr, info));
                },
                Err(e) => {
                    debug!("'{dataset_id}' is not usable as {kind}: {e}");
                    attempts.push(format!("{kind}: {e}"));
                },
            }
        }
        Err(DatasetError::Unresolvable {
            id: dataset_id.to_string(),
            attempts,
        }
        .into())
    }

    fn expr_for(&self, kind: DatasetType, dataset_id: &str, dates: Option<DateRange>) -> ImageExpr {
        let id = dataset_id.to_string();
        match kind {
            DatasetType::ImageCollection => ImageExpr::CollectionMedian { id, dates },
            DatasetType::FeatureCollection => ImageExpr::RasterizedFeatures {
                id,
                burn: self.burn.clone(),
            },
            DatasetType::Image | DatasetType::Unknown => {
                if dates.is_some() {
                    debug!("Ignoring date range for single image '{dataset_id}'");
                }
                ImageExpr::Image { id }
            },
        }
    }

    async fn describe(&self, expr: &ImageExpr) -> std::result::Result<ImageInfo, ServiceError> {
        tokio::time::timeout(self.request_timeout, self.service.describe(expr))
            .await
            .map_err(|_| {
                ServiceError::Network(NetworkError::Timeout {
                    endpoint: format!("describe {}", expr.id()),
                    after: self.request_timeout,
                })
            })?
    }
}
