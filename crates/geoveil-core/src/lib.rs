//! `geoveil-core` is the core library for the `Geoveil` project: privacy-preserving
//! extraction of remote-sensing values at sensitive field locations.
//!
//! This crate includes:
//! - **Geometry**: Coordinate obfuscation and circular buffers in a local metric frame.
//! - **Catalog**: A memoized dataset-id → type resolver backed by a public catalog.
//! - **Loading**: Resolution of a dataset id into a composite image, probing types when needed.
//! - **Extraction**: Point sampling and zonal reduction through an [`imagery::ImageryService`].
//! - **I/O**: Alias-tolerant CSV point tables, `GeoJSON` areas and buffers, CSV results.
//!
//! The `operations` module chains these stages into the pipelines used by the CLI.

pub mod catalog;
pub mod config;
pub mod error;
pub mod extraction;
pub mod geometry;
pub mod http;
pub mod imagery;
pub mod io;
pub mod loader;
pub mod operations;
pub mod types;

pub use catalog::CatalogResolver;
pub use error::{GeoveilError, Result};
pub use types::{Area, Coordinate, ExtractionRow, SamplePoint};
