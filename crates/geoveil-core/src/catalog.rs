//! Dataset catalog lookup.
//!
//! The catalog is a JSON array of `{id, title, type, url}` records fetched
//! once per resolver. A successful fetch is reused for every later lookup. A
//! failed fetch is reported once and the resolver then answers "not found"
//! for the rest of its lifetime; it never retries on its own.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::sync::OnceCell;

use crate::config::CatalogOptions;
use crate::error::NetworkError;
use crate::http::HttpClient;
use crate::types::DatasetDescriptor;

/// Where catalog entries come from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch every entry of the catalog.
    async fn fetch(&self) -> Result<Vec<DatasetDescriptor>, NetworkError>;

    /// Short description for log messages.
    fn describe(&self) -> String;
}

/// Catalog served as a JSON array over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCatalogSource {
    options: CatalogOptions,
}

impl HttpCatalogSource {
    #[must_use]
    pub fn new(options: CatalogOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl CatalogSource for HttpCatalogSource {
    async fn fetch(&self) -> Result<Vec<DatasetDescriptor>, NetworkError> {
        let client = HttpClient::new(self.options.request_timeout, self.options.retry)?;
        client.get_json(&self.options.url).await
    }

    fn describe(&self) -> String {
        self.options.url.clone()
    }
}

/// Fixed in-memory catalog.
///
/// Counts how often it was fetched, which makes memoisation observable.
#[derive(Debug, Default)]
pub struct StaticCatalogSource {
    entries: Option<Vec<DatasetDescriptor>>,
    fetches: AtomicUsize,
}

impl StaticCatalogSource {
    #[must_use]
    pub fn new(entries: Vec<DatasetDescriptor>) -> Self {
        Self {
            entries: Some(entries),
            fetches: AtomicUsize::new(0),
        }
    }

    /// A source whose every fetch fails.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Number of times `fetch` was called.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for StaticCatalogSource {
    async fn fetch(&self) -> Result<Vec<DatasetDescriptor>, NetworkError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.entries.clone().ok_or_else(|| NetworkError::Status {
            endpoint: self.describe(),
            status: 503,
        })
    }

    fn describe(&self) -> String {
        "static catalog".to_string()
    }
}

#[async_trait]
impl<S: CatalogSource + ?Sized> CatalogSource for Arc<S> {
    async fn fetch(&self) -> Result<Vec<DatasetDescriptor>, NetworkError> {
        (**self).fetch().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Memoising resolver over a [`CatalogSource`].
///
/// # Examples
///
/// ```
/// use geoveil_core::catalog::{CatalogResolver, StaticCatalogSource};
/// use geoveil_core::types::{DatasetDescriptor, DatasetType};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let resolver = CatalogResolver::new(StaticCatalogSource::new(vec![DatasetDescriptor {
///     id: "USGS/SRTMGL1_003".to_string(),
///     title: Some("NASA SRTM Digital Elevation 30m".to_string()),
///     kind: Some(DatasetType::Image),
///     url: None,
/// }]));
/// let found = resolver.resolve("USGS/SRTMGL1_003").await.unwrap();
/// assert_eq!(found.kind, Some(DatasetType::Image));
/// assert!(resolver.resolve("nope").await.is_none());
/// # }
/// ```
pub struct CatalogResolver {
    source: Box<dyn CatalogSource>,
    entries: OnceCell<Option<Arc<Vec<DatasetDescriptor>>>>,
}

impl std::fmt::Debug for CatalogResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogResolver")
            .field("source", &self.source.describe())
            .field("loaded", &self.entries.initialized())
            .finish()
    }
}

impl CatalogResolver {
    pub fn new(source: impl CatalogSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            entries: OnceCell::new(),
        }
    }

    /// A resolver over the HTTP catalog described by `options`.
    #[must_use]
    pub fn from_options(options: CatalogOptions) -> Self {
        Self::new(HttpCatalogSource::new(options))
    }

    /// Process-wide resolver over the configured HTTP catalog.
    ///
    /// The URL comes from `GEOVEIL_CATALOG_URL` when set, the public
    /// catalog otherwise; it is read on first use only.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<CatalogResolver> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::from_options(CatalogOptions::from_env()))
    }

    async fn entries(&self) -> Option<&Arc<Vec<DatasetDescriptor>>> {
        self.entries
            .get_or_init(|| async {
                match self.source.fetch().await {
                    Ok(entries) => {
                        info!(
                            "Loaded {} catalog entries from {}",
                            entries.len(),
                            self.source.describe()
                        );
                        Some(Arc::new(entries))
                    },
                    Err(e) => {
                        warn!("Dataset catalog unavailable, lookups will return nothing: {e}");
                        None
                    },
                }
            })
            .await
            .as_ref()
    }

    /// Whether the catalog was fetched successfully.
    pub async fn is_available(&self) -> bool {
        self.entries().await.is_some()
    }

    /// Exact-match lookup on the dataset id.
    pub async fn resolve(&self, dataset_id: &str) -> Option<DatasetDescriptor> {
        let found = self
            .entries()
            .await?
            .iter()
            .find(|entry| entry.id == dataset_id)
            .cloned();
        debug!(
            "Catalog lookup for '{dataset_id}': {}",
            found
                .as_ref()
                .and_then(|d| d.kind)
                .map_or("not found", |kind| kind.as_str())
        );
        found
    }

    /// Documentation URL of a dataset.
    pub async fn dataset_url(&self, dataset_id: &str) -> Option<String> {
        self.resolve(dataset_id).await.and_then(|d| d.url)
    }

    /// Title → id map over every titled entry, for pick lists.
    pub async fn title_index(&self) -> BTreeMap<String, String> {
        self.entries()
            .await
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| e.title.clone().map(|title| (title, e.id.clone())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entries whose id or title contains `text`, ignoring case.
    pub async fn search(&self, text: &str) -> Vec<DatasetDescriptor> {
        let needle = text.to_lowercase();
        let Some(entries) = self.entries().await else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|e| {
                e.id.to_lowercase().contains(&needle)
                    || e
                        .title
                        .as_deref()
                        .is_some_and(|t| t.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect()
    }
}
