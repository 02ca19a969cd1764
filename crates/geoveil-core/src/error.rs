//! Custom error types for `geoveil` operations.
//!
//! This module provides structured error handling using `thiserror`. Each
//! concern (parameters, tables, dataset resolution, network, extraction, I/O)
//! has its own enum so callers can match on the failure they care about, and
//! the root [`GeoveilError`] wraps them all.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;

/// Main error type for `geoveil` operations.
///
/// This is the root error type that encompasses all domain-specific errors.
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum GeoveilError {
    /// Caller supplied an out-of-range or inconsistent parameter.
    #[error(transparent)]
    InvalidParameter(#[from] ParameterError),

    /// Input table problems (missing columns, unparsable cells).
    #[error(transparent)]
    Table(#[from] TableError),

    /// A dataset id could not be turned into a composite image.
    #[error(transparent)]
    DatasetResolution(#[from] DatasetError),

    /// A remote call failed after retries.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Sampling or reduction could not produce a result batch.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// File read/write failures
    #[error(transparent)]
    Io(#[from] IoError),

    /// Generic errors from dependencies
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Parameter validation errors.
///
/// Raised immediately, before any remote call is issued.
#[derive(Debug, Error)]
pub enum ParameterError {
    /// Buffer radius must be strictly positive and finite
    #[error("Radius must be a positive number of feet, got {radius_feet}")]
    NonPositiveRadius {
        /// The rejected radius
        radius_feet: f64,
    },

    /// At least one sample is required
    #[error("Sample count must be at least 1, got {sample_count}")]
    ZeroSampleCount {
        /// The rejected sample count
        sample_count: usize,
    },

    /// Circle resolution must be at least one segment per quadrant
    #[error("Circle resolution must be at least 1 segment per quadrant, got {resolution}")]
    InvalidResolution {
        /// The rejected resolution
        resolution: usize,
    },

    /// Coordinate outside WGS84 bounds
    #[error("Coordinate ({lat}, {lon}) is outside lat [-90, 90] / lon [-180, 180]")]
    CoordinateOutOfRange {
        /// Latitude in degrees
        lat: f64,
        /// Longitude in degrees
        lon: f64,
    },

    /// Only one end of a date range was given
    #[error("Date range needs both a start and an end date (got {which} only)")]
    OneSidedDateRange {
        /// Which bound was supplied ("start" or "end")
        which: &'static str,
    },

    /// Start date falls after end date
    #[error("Start date {start} is after end date {end}")]
    ReversedDateRange {
        /// Range start
        start: NaiveDate,
        /// Range end
        end: NaiveDate,
    },

    /// Any other invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },
}

/// Input table errors.
#[derive(Debug, Error)]
pub enum TableError {
    /// None of the accepted aliases matched a header
    #[error("No column matches any of [{}] (found: {})", aliases.join(", "), found.join(", "))]
    MissingColumn {
        /// Canonical name being resolved (e.g. `LAT`)
        canonical: &'static str,
        /// Aliases that were tried, in order
        aliases: Vec<&'static str>,
        /// Headers actually present
        found: Vec<String>,
    },

    /// A cell could not be parsed as the expected type
    #[error("Row {row}: column '{column}' has invalid value '{value}'")]
    InvalidValue {
        /// 1-based data row number
        row: usize,
        /// Column name
        column: String,
        /// Raw cell content
        value: String,
    },

    /// Underlying CSV reader failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Unsupported geometry in an area file
    #[error("Feature {feature} has unsupported geometry type {geometry_type}")]
    UnsupportedGeometry {
        /// 1-based feature index
        feature: usize,
        /// `GeoJSON` type name
        geometry_type: String,
    },

    /// `GeoJSON` document could not be parsed
    #[error("Invalid GeoJSON: {message}")]
    GeoJson {
        /// Parser message
        message: String,
    },
}

/// Dataset resolution errors.
///
/// These are fatal to the `load()` call that raised them.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The service rejected the dataset under its catalog-declared type
    #[error("Dataset '{id}' is declared as {declared} but could not be loaded as one: {reason}")]
    TypeMismatch {
        /// Dataset identifier
        id: String,
        /// Declared type name
        declared: String,
        /// Service message
        reason: String,
    },

    /// Every type probe failed
    #[error("Dataset '{id}' is not a valid image, image collection, or feature collection")]
    Unresolvable {
        /// Dataset identifier
        id: String,
        /// One message per failed probe, in probe order
        attempts: Vec<String>,
    },
}

/// Network errors at the catalog and imagery boundaries.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Transport failure (connection refused, TLS, body read, ...)
    #[error("Request to {endpoint} failed: {source}")]
    Request {
        /// URL that was being called
        endpoint: String,
        /// The underlying error
        #[source]
        source: reqwest::Error,
    },

    /// Non-success HTTP status
    #[error("{endpoint} answered HTTP {status}")]
    Status {
        /// URL that was being called
        endpoint: String,
        /// HTTP status code
        status: u16,
    },

    /// No answer within the configured timeout
    #[error("{endpoint} did not answer within {after:?}")]
    Timeout {
        /// URL or operation that timed out
        endpoint: String,
        /// The timeout that elapsed
        after: Duration,
    },

    /// Response body did not match the expected shape
    #[error("Could not decode response from {endpoint}: {message}")]
    Decode {
        /// URL that was being called
        endpoint: String,
        /// Decoder message
        message: String,
    },
}

impl NetworkError {
    /// Whether a retry has a chance of succeeding.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request { source, .. } => source.is_timeout() || source.is_connect(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Timeout { .. } => true,
            Self::Decode { .. } => false,
        }
    }
}

/// Errors reported by an [`ImageryService`](crate::imagery::ImageryService).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The dataset does not exist as the requested kind
    #[error("'{id}' is not available as {expected}")]
    NotFound {
        /// Dataset identifier
        id: String,
        /// What it was asked for as (e.g. "image")
        expected: String,
    },

    /// The service understood but refused the request
    #[error("Imagery service rejected the request: {message}")]
    Rejected {
        /// Service message
        message: String,
    },

    /// Transport-level failure
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// Extraction errors.
///
/// Any of these aborts the whole batch.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The composite has no bands to sample
    #[error("Composite for '{dataset_id}' has no bands")]
    NoBands {
        /// Dataset identifier
        dataset_id: String,
    },

    /// A requested band is absent from the composite
    #[error("Band '{band}' is not present in composite for '{dataset_id}' (available: {})", available.join(", "))]
    MissingBand {
        /// Requested band
        band: String,
        /// Dataset identifier
        dataset_id: String,
        /// Bands actually present
        available: Vec<String>,
    },

    /// Service answered with the wrong number of results
    #[error("Expected {expected} results from the imagery service, got {actual}")]
    ResultCountMismatch {
        /// Input geometry count
        expected: usize,
        /// Returned result count
        actual: usize,
    },

    /// The service refused the sampling request
    #[error("Imagery service rejected the extraction: {message}")]
    Rejected {
        /// Service message
        message: String,
    },

    /// Extraction was cancelled by the caller
    #[error("Extraction was cancelled")]
    Cancelled,
}

/// I/O related errors.
///
/// These errors occur during file or stream operations, including
/// reading, writing, and path validation.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failed to read from a file
    #[error("Failed to read {format} file '{path}': {source}")]
    Read {
        /// The format being read (e.g., "CSV", "`GeoJSON`")
        format: String,
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Failed to write to a file
    #[error("Failed to write {format} file '{path}': {source}")]
    Write {
        /// The format being written
        format: String,
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Input format could not be determined from the path
    #[error("Cannot tell the format of '{path}': {reason}")]
    UnknownFormat {
        /// The offending path
        path: PathBuf,
        /// Why detection failed
        reason: String,
    },
}

/// Type alias for Results using `GeoveilError`.
pub type Result<T> = std::result::Result<T, GeoveilError>;

impl From<ServiceError> for GeoveilError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Network(e) => Self::Network(e),
            ServiceError::NotFound { id, expected } => Self::Extraction(ExtractionError::Rejected {
                message: format!("'{id}' is not available as {expected}"),
            }),
            ServiceError::Rejected { message } => {
                Self::Extraction(ExtractionError::Rejected { message })
            },
        }
    }
}

impl From<csv::Error> for GeoveilError {
    fn from(err: csv::Error) -> Self {
        Self::Table(TableError::Csv(err))
    }
}

impl GeoveilError {
    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidParameter(e) => format!("Invalid parameter: {e}"),
            Self::Table(e) => e.user_message(),
            Self::DatasetResolution(e) => e.user_message(),
            Self::Network(e) => format!("Network error: {e}"),
            Self::Extraction(e) => format!("Extraction failed: {e}"),
            Self::Io(e) => e.user_message(),
            Self::Other(e) => format!("Error: {e}"),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Table(TableError::MissingColumn {
                canonical, aliases, ..
            }) => Some(format!(
                "Rename the {canonical} column to one of the accepted names: {}.",
                aliases
                    .iter()
                    .map(|a| format!("'{a}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
            Self::DatasetResolution(_) => {
                Some("Run 'geoveil catalog --search <text>' to find a valid dataset id.".to_string())
            },
            Self::Network(e) if e.is_transient() => {
                Some("The service may be busy; try again or raise --timeout-secs.".to_string())
            },
            Self::Network(_) => Some("Check the endpoint URL and your connection.".to_string()),
            _ => None,
        }
    }

    /// Check if this error is potentially recoverable.
    ///
    /// Recoverable errors might be fixed by retrying with different
    /// parameters or after the user takes some action.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidParameter(_) | Self::Table(TableError::MissingColumn { .. }) => true,
            Self::Network(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl TableError {
    fn user_message(&self) -> String {
        match self {
            Self::MissingColumn {
                canonical, found, ..
            } => {
                format!(
                    "Could not find a {canonical} column.\n\nColumns in the file:\n{}",
                    found
                        .iter()
                        .map(|c| format!("  - {c}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            },
            _ => self.to_string(),
        }
    }
}

impl DatasetError {
    fn user_message(&self) -> String {
        match self {
            Self::Unresolvable { id, attempts } => {
                format!(
                    "Dataset '{id}' could not be loaded.\n\nTried:\n{}",
                    attempts
                        .iter()
                        .map(|a| format!("  - {a}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            },
            Self::TypeMismatch { .. } => self.to_string(),
        }
    }
}

impl IoError {
    fn user_message(&self) -> String {
        match self {
            Self::Read { format, path, .. } => {
                format!("Failed to read {} file: {}", format, path.display())
            },
            Self::Write { format, path, .. } => {
                format!("Failed to write {} file: {}", format, path.display())
            },
            Self::UnknownFormat { .. } => self.to_string(),
        }
    }
}

/// Extension trait for adding I/O context to errors.
pub trait IoErrorExt<T> {
    /// Add read context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Read`] if the underlying operation fails.
    fn with_read_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T>;

    /// Add write context to an error.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError::Write`] if the underlying operation fails.
    fn with_write_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T, E> IoErrorExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_read_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            GeoveilError::Io(IoError::Read {
                format: format.to_string(),
                path: path.into(),
                source: Box::new(e),
            })
        })
    }

    fn with_write_context(self, format: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| {
            GeoveilError::Io(IoError::Write {
                format: format.to_string(),
                path: path.into(),
                source: Box::new(e),
            })
        })
    }
}
