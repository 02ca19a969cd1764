//! Explicit option structures for every pipeline stage.
//!
//! Each struct has sensible defaults, chainable `with_*` setters and a
//! `validate()` that raises [`ParameterError`] before any remote call is made.

use std::time::Duration;

use chrono::NaiveDate;

use crate::error::ParameterError;
use crate::geometry::DEFAULT_RESOLUTION;
use crate::imagery::Reducer;
use crate::types::BufferSpec;

/// Public catalog of Earth Engine datasets.
pub const DEFAULT_CATALOG_URL: &str =
    "https://raw.githubusercontent.com/opengeos/geospatial-data-catalogs/master/gee_catalog.json";

/// Environment variable overriding the catalog URL.
pub const CATALOG_URL_ENV: &str = "GEOVEIL_CATALOG_URL";

/// Environment variable naming the imagery gateway endpoint.
pub const IMAGERY_ENDPOINT_ENV: &str = "GEOVEIL_IMAGERY_ENDPOINT";

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 disables retrying)
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further one
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// How buffer polygons are placed around each point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferMode {
    /// Circle centered on the point itself
    #[default]
    Centered,
    /// Circle with a randomized center that still contains the point
    HiddenCenter,
}

/// Obfuscation and buffering settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PrivacyOptions {
    /// Uncertainty radius in feet (default: 1000)
    pub radius_feet: f64,
    /// Obfuscated samples per source point (default: 5)
    pub sample_count: usize,
    /// Circle segments per quadrant (default: 32)
    pub resolution: usize,
    /// Buffer placement (default: centered)
    pub buffer_mode: BufferMode,
    /// Seed for reproducible draws; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for PrivacyOptions {
    fn default() -> Self {
        Self {
            radius_feet: 1000.0,
            sample_count: 5,
            resolution: DEFAULT_RESOLUTION,
            buffer_mode: BufferMode::Centered,
            seed: None,
        }
    }
}

impl PrivacyOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_radius_feet(mut self, radius_feet: f64) -> Self {
        self.radius_feet = radius_feet;
        self
    }

    #[must_use]
    pub fn with_sample_count(mut self, sample_count: usize) -> Self {
        self.sample_count = sample_count;
        self
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    #[must_use]
    pub fn with_buffer_mode(mut self, buffer_mode: BufferMode) -> Self {
        self.buffer_mode = buffer_mode;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// The validated radius/count pair.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] for a non-positive radius or zero samples.
    pub fn buffer_spec(&self) -> Result<BufferSpec, ParameterError> {
        BufferSpec::new(self.radius_feet, self.sample_count)
    }

    /// # Errors
    ///
    /// Returns [`ParameterError`] if any field is out of range.
    pub fn validate(&self) -> Result<(), ParameterError> {
        self.buffer_spec()?;
        if self.resolution == 0 {
            return Err(ParameterError::InvalidResolution {
                resolution: self.resolution,
            });
        }
        Ok(())
    }
}

/// Sampling and reduction settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOptions {
    /// Sampling scale in meters; `None` uses the composite's native scale
    pub scale: Option<f64>,
    /// Zonal reducer for area mode (default: median)
    pub reducer: Reducer,
    /// Bands to extract; empty means all bands of the composite
    pub bands: Vec<String>,
    /// Upper bound on one remote sampling call
    pub request_timeout: Duration,
    /// In-flight requests when geometries are extracted one by one
    pub concurrency: usize,
    /// Date stamped on the rows; `None` means today (UTC)
    pub extraction_date: Option<NaiveDate>,
    /// One request per geometry, failures becoming missing-value rows
    pub isolate_failures: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            scale: None,
            reducer: Reducer::Median,
            bands: Vec::new(),
            request_timeout: Duration::from_secs(300),
            concurrency: 4,
            extraction_date: None,
            isolate_failures: false,
        }
    }
}

impl ExtractionOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Option<f64>) -> Self {
        self.scale = scale;
        self
    }

    #[must_use]
    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    #[must_use]
    pub fn with_bands<I, S>(mut self, bands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bands = bands.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_extraction_date(mut self, date: NaiveDate) -> Self {
        self.extraction_date = Some(date);
        self
    }

    #[must_use]
    pub fn with_isolated_failures(mut self, isolate_failures: bool) -> Self {
        self.isolate_failures = isolate_failures;
        self
    }

    /// # Errors
    ///
    /// Returns [`ParameterError::InvalidOption`] for a non-positive scale,
    /// zero concurrency or a zero timeout.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if let Some(scale) = self.scale.filter(|s| !s.is_finite() || *s <= 0.0) {
            return Err(invalid("scale", format!("must be positive, got {scale}")));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("request_timeout", "must be non-zero"));
        }
        Ok(())
    }
}

/// Where and how the dataset catalog is fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogOptions {
    pub url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_CATALOG_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl CatalogOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with the URL taken from `GEOVEIL_CATALOG_URL` when set.
    #[must_use]
    pub fn from_env() -> Self {
        match std::env::var(CATALOG_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::default().with_url(url),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// # Errors
    ///
    /// Returns [`ParameterError::InvalidOption`] if the URL does not parse.
    pub fn validate(&self) -> Result<(), ParameterError> {
        url::Url::parse(&self.url).map_err(|e| invalid("catalog url", e.to_string()))?;
        Ok(())
    }
}

/// Connection settings for the imagery gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageryOptions {
    pub endpoint: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ImageryOptions {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }

    /// Options for the endpoint in `GEOVEIL_IMAGERY_ENDPOINT`, if set.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var(IMAGERY_ENDPOINT_ENV)
            .ok()
            .filter(|endpoint| !endpoint.trim().is_empty())
            .map(Self::new)
    }

    #[must_use]
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// # Errors
    ///
    /// Returns [`ParameterError::InvalidOption`] if the endpoint does not
    /// parse as a URL.
    pub fn validate(&self) -> Result<(), ParameterError> {
        url::Url::parse(&self.endpoint).map_err(|e| invalid("imagery endpoint", e.to_string()))?;
        Ok(())
    }
}

fn invalid(option: &str, message: impl Into<String>) -> ParameterError {
    ParameterError::InvalidOption {
        option: option.to_string(),
        message: message.into(),
    }
}
