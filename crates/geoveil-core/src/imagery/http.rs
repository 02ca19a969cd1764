//! Client for a JSON imagery gateway.
//!
//! The gateway exposes three endpoints, each taking a JSON body with the
//! serialized [`ImageExpr`] under `image`:
//!
//! - `POST {endpoint}/v1/describe` → `{"bands": [...], "native_scale": 30.0}`
//! - `POST {endpoint}/v1/sample` with `points` → `{"results": [{band: value|null}]}`
//! - `POST {endpoint}/v1/reduce` with `regions` and `reducer` → same shape
//!
//! A 404 means the dataset does not exist as the requested kind; any other
//! 4xx is a rejected request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{BandValues, ImageExpr, ImageInfo, ImageryService, Reducer};
use crate::config::ImageryOptions;
use crate::error::{NetworkError, ServiceError};
use crate::http::{HttpClient, join_url};
use crate::types::{Area, SamplePoint};

#[derive(Serialize)]
struct DescribeRequest<'a> {
    image: &'a ImageExpr,
}

#[derive(Serialize)]
struct WirePoint<'a> {
    id: &'a str,
    lat: f64,
    lon: f64,
}

#[derive(Serialize)]
struct SampleRequest<'a> {
    image: &'a ImageExpr,
    points: Vec<WirePoint<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scale: Option<f64>,
    bands: &'a [String],
}

#[derive(Serialize)]
struct WireRegion<'a> {
    id: &'a str,
    geometry: geojson::Geometry,
}

#[derive(Serialize)]
struct ReduceRequest<'a> {
    image: &'a ImageExpr,
    regions: Vec<WireRegion<'a>>,
    reducer: Reducer,
    #[serde(skip_serializing_if = "Option::is_none")]
    scale: Option<f64>,
    bands: &'a [String],
}

#[derive(Deserialize)]
struct ResultsResponse {
    results: Vec<BandValues>,
}

/// [`ImageryService`] backed by an HTTP gateway.
#[derive(Debug, Clone)]
pub struct HttpImagery {
    client: HttpClient,
    endpoint: String,
}

impl HttpImagery {
    /// # Errors
    ///
    /// Returns [`NetworkError`] if the HTTP client cannot be built.
    pub fn new(options: &ImageryOptions) -> Result<Self, NetworkError> {
        Ok(Self {
            client: HttpClient::new(options.request_timeout, options.retry)?,
            endpoint: options.endpoint.clone(),
        })
    }

    async fn post<B, T>(&self, path: &str, expr: &ImageExpr, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let url = join_url(&self.endpoint, path);
        self.client
            .post_json(&url, body)
            .await
            .map_err(|e| classify(e, expr))
    }
}

fn classify(err: NetworkError, expr: &ImageExpr) -> ServiceError {
    match err {
        NetworkError::Status { status: 404, .. } => ServiceError::NotFound {
            id: expr.id().to_string(),
            expected: expr.dataset_type().to_string(),
        },
        NetworkError::Status { status, .. } if (400..500).contains(&status) && status != 429 => {
            ServiceError::Rejected {
                message: err.to_string(),
            }
        },
        other => ServiceError::Network(other),
    }
}

#[async_trait]
impl ImageryService for HttpImagery {
    async fn describe(&self, expr: &ImageExpr) -> Result<ImageInfo, ServiceError> {
        self.post("v1/describe", expr, &DescribeRequest { image: expr })
            .await
    }

    async fn sample_points(
        &self,
        expr: &ImageExpr,
        points: &[SamplePoint],
        scale: Option<f64>,
        bands: &[String],
    ) -> Result<Vec<BandValues>, ServiceError> {
        let request = SampleRequest {
            image: expr,
            points: points
                .iter()
                .map(|p| WirePoint {
                    id: &p.id,
                    lat: p.coordinate.lat,
                    lon: p.coordinate.lon,
                })
                .collect(),
            scale,
            bands,
        };
        let response: ResultsResponse = self.post("v1/sample", expr, &request).await?;
        Ok(response.results)
    }

    async fn reduce_regions(
        &self,
        expr: &ImageExpr,
        areas: &[Area],
        reducer: Reducer,
        scale: Option<f64>,
        bands: &[String],
    ) -> Result<Vec<BandValues>, ServiceError> {
        let request = ReduceRequest {
            image: expr,
            regions: areas
                .iter()
                .map(|a| WireRegion {
                    id: &a.id,
                    geometry: geojson::Geometry::new(geojson::Value::from(&a.geometry)),
                })
                .collect(),
            reducer,
            scale,
            bands,
        };
        let response: ResultsResponse = self.post("v1/reduce", expr, &request).await?;
        Ok(response.results)
    }
}
