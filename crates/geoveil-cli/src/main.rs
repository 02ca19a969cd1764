//! Command-line interface for `Geoveil`, privacy-preserving extraction of
//! remote-sensing values at sensitive field locations.
//!
//! This binary provides a thin façade over the [`geoveil_core`] library: it
//! parses arguments, configures logging, and delegates to
//! [`geoveil_core::operations`].
//!
//! # Architecture
//!
//! The CLI is built using [`clap`] for argument parsing and [`tracing`] for
//! structured logging. Library log records are bridged into `tracing`.
//!
//! # Available Commands
//!
//! - `catalog` - Look up or search datasets in the public catalog
//! - `obfuscate` - Replace point locations with randomized samples
//! - `buffer` - Write circular uncertainty buffers as `GeoJSON`
//! - `extract` - Sample a dataset at points or reduce it over areas

mod display;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::{Level, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geoveil_core::GeoveilError;
use geoveil_core::catalog::CatalogResolver;
use geoveil_core::config::{
    BufferMode, CatalogOptions, ExtractionOptions, ImageryOptions, PrivacyOptions,
};
use geoveil_core::geometry::DEFAULT_RESOLUTION;
use geoveil_core::imagery::{FeatureBurn, HttpImagery, Reducer};
use geoveil_core::io::{
    CsvWriterOptions, InputFormat, default_output_name, read_areas_file, read_points_file,
    write_buffers_file, write_rows_file, write_samples_file,
};
use geoveil_core::operations::{self, DatasetQuery};

/// Rows printed to the console after a command writes its output file.
const PREVIEW_ROWS: usize = 10;

const SEARCH_HINT: &str = "Run 'geoveil catalog --search <text>' to find a valid dataset id.";

#[derive(Parser)]
#[command(
    name = "geoveil",
    version,
    about = "Privacy-preserving remote-sensing extraction at field locations",
    long_about = "Geoveil obfuscates sensitive plot coordinates, buffers them, and extracts\n\
                  satellite or reference-dataset values at the resulting geometries."
)]
/// Command-line arguments and options for the `Geoveil` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Dataset catalog JSON used to look up dataset types.
    #[arg(long, global = true, env = "GEOVEIL_CATALOG_URL", value_name = "URL")]
    catalog_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by every command that randomizes locations.
#[derive(Args, Debug, Clone)]
struct PrivacyArgs {
    /// Uncertainty radius in feet.
    #[arg(long, default_value_t = 1000.0, value_name = "FEET")]
    radius_feet: f64,

    /// Seed for reproducible draws.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
}

/// Available subcommands for the `Geoveil` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Looks up a dataset id in the catalog, or searches it.
    Catalog {
        /// Exact dataset identifier to look up.
        #[arg(value_name = "DATASET_ID", required_unless_present = "search")]
        dataset_id: Option<String>,

        /// Case-insensitive text matched against ids and titles.
        #[arg(short, long, conflicts_with = "dataset_id", value_name = "TEXT")]
        search: Option<String>,

        /// Maximum number of search results shown.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Replaces every point in a CSV table with randomized samples.
    ///
    /// The output keeps the source identifier on each sample and has the
    /// columns `plot_ID,lat,lon`.
    Obfuscate {
        /// CSV table with latitude, longitude and identifier columns.
        #[arg(short, long, value_name = "CSV")]
        input: PathBuf,

        /// Output CSV of obfuscated samples.
        #[arg(short, long, value_name = "CSV")]
        output: PathBuf,

        #[command(flatten)]
        privacy: PrivacyArgs,

        /// Samples drawn per source point.
        #[arg(long, default_value_t = 5)]
        samples: usize,
    },

    /// Writes a circular buffer around every point as `GeoJSON`.
    Buffer {
        /// CSV table with latitude, longitude and identifier columns.
        #[arg(short, long, value_name = "CSV")]
        input: PathBuf,

        /// Output `GeoJSON` file.
        #[arg(short, long, value_name = "GEOJSON")]
        output: PathBuf,

        #[command(flatten)]
        privacy: PrivacyArgs,

        /// Circle segments per quadrant.
        #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
        resolution: usize,

        /// Randomize each circle center so the point is not at the center.
        #[arg(long)]
        hidden_center: bool,
    },

    /// Extracts dataset values at points (CSV) or over areas (`GeoJSON`).
    Extract {
        /// Dataset identifier, e.g. `USGS/SRTMGL1_003`.
        #[arg(long, value_name = "DATASET_ID")]
        dataset: String,

        /// Input geometries: `.csv` points or `.geojson` polygons.
        #[arg(short, long, value_name = "PATH")]
        input: PathBuf,

        /// Output CSV; defaults to the dataset id with `/` replaced by `_`.
        #[arg(short, long, value_name = "CSV")]
        output: Option<PathBuf>,

        /// Imagery gateway base URL.
        #[arg(long, env = "GEOVEIL_IMAGERY_ENDPOINT", value_name = "URL")]
        endpoint: Option<String>,

        /// Inclusive start date (YYYY-MM-DD) for image collections.
        #[arg(long, value_name = "DATE")]
        start: Option<NaiveDate>,

        /// Inclusive end date (YYYY-MM-DD) for image collections.
        #[arg(long, value_name = "DATE")]
        end: Option<NaiveDate>,

        /// Sampling scale in meters; defaults to the dataset's native scale.
        #[arg(long, value_name = "METERS")]
        scale: Option<f64>,

        /// Zonal reducer for areas: median, mean, min or max.
        #[arg(long, default_value = "median")]
        reducer: Reducer,

        /// Comma-separated bands to extract; all bands when omitted.
        #[arg(long, value_delimiter = ',', value_name = "BANDS")]
        bands: Vec<String>,

        /// Obfuscate CSV points before sampling.
        #[arg(long)]
        obfuscate: bool,

        #[command(flatten)]
        privacy: PrivacyArgs,

        /// Samples drawn per source point when obfuscating.
        #[arg(long, default_value_t = 5)]
        samples: usize,

        /// Numeric feature property burned when the dataset is a feature
        /// collection; features burn 1.0 when omitted.
        #[arg(long, value_name = "PROPERTY")]
        burn_property: Option<String>,

        /// One request per geometry; failures become rows with an error.
        #[arg(long)]
        each: bool,

        /// Requests in flight with `--each`.
        #[arg(long, default_value_t = 4)]
        concurrency: usize,

        /// Upper bound on each remote call, in seconds.
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
}

/// Entry point for the `Geoveil` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity flags
    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // An explicit URL gets its own resolver; otherwise share the process-wide one.
    let custom_catalog = catalog_resolver(cli.catalog_url.as_deref())?;
    let catalog = match &custom_catalog {
        Some(resolver) => resolver,
        None => CatalogResolver::global(),
    };

    match cli.command {
        Commands::Catalog {
            dataset_id,
            search,
            limit,
        } => {
            handle_catalog(catalog, dataset_id.as_deref(), search.as_deref(), limit).await?;
        },
        Commands::Obfuscate {
            input,
            output,
            privacy,
            samples,
        } => {
            info!("Obfuscating {} to {}", input.display(), output.display());
            let options = privacy_options(&privacy).with_sample_count(samples);
            handle_obfuscate(&input, &output, &options)?;
        },
        Commands::Buffer {
            input,
            output,
            privacy,
            resolution,
            hidden_center,
        } => {
            info!("Buffering {} to {}", input.display(), output.display());
            let mode = if hidden_center {
                BufferMode::HiddenCenter
            } else {
                BufferMode::Centered
            };
            let options = privacy_options(&privacy)
                .with_resolution(resolution)
                .with_buffer_mode(mode);
            handle_buffer(&input, &output, &options)?;
        },
        Commands::Extract {
            dataset,
            input,
            output,
            endpoint,
            start,
            end,
            scale,
            reducer,
            bands,
            obfuscate,
            privacy,
            samples,
            burn_property,
            each,
            concurrency,
            timeout_secs,
        } => {
            let timeout = Duration::from_secs(timeout_secs);
            let endpoint = endpoint.ok_or_else(|| {
                anyhow!(
                    "No imagery endpoint configured; pass --endpoint or set \
                     GEOVEIL_IMAGERY_ENDPOINT."
                )
            })?;
            let burn = burn_property.map_or_else(FeatureBurn::default, |name| {
                FeatureBurn::Property { name, reducer }
            });
            let query = DatasetQuery::new(dataset)
                .with_dates(start, end)
                .with_feature_burn(burn);
            let options = ExtractionOptions::new()
                .with_scale(scale)
                .with_reducer(reducer)
                .with_bands(bands)
                .with_request_timeout(timeout)
                .with_concurrency(concurrency)
                .with_isolated_failures(each);
            let privacy =
                obfuscate.then(|| privacy_options(&privacy).with_sample_count(samples));
            let output = output.unwrap_or_else(|| default_output_name(&query.dataset_id).into());

            let imagery = ImageryOptions::new(endpoint).with_request_timeout(timeout);
            handle_extract(
                catalog,
                &imagery,
                &query,
                &input,
                &output,
                privacy.as_ref(),
                options,
            )
            .await?;
        },
    }

    Ok(())
}

/// A dedicated resolver for a non-blank `--catalog-url`, `None` otherwise.
fn catalog_resolver(url: Option<&str>) -> Result<Option<CatalogResolver>> {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Ok(None);
    };
    let options = CatalogOptions::new().with_url(url);
    options
        .validate()
        .map_err(|e| explain(GeoveilError::from(e)))?;
    Ok(Some(CatalogResolver::from_options(options)))
}

fn privacy_options(args: &PrivacyArgs) -> PrivacyOptions {
    PrivacyOptions::new()
        .with_radius_feet(args.radius_feet)
        .with_seed(args.seed)
}

/// Turns a library error into a console message with its recovery hint.
fn explain(err: GeoveilError) -> anyhow::Error {
    let message = err.user_message();
    match err.recovery_suggestion() {
        Some(hint) => anyhow!("{message}\n\nHint: {hint}"),
        None => anyhow::Error::msg(message),
    }
}

async fn handle_catalog(
    catalog: &CatalogResolver,
    dataset_id: Option<&str>,
    search: Option<&str>,
    limit: usize,
) -> Result<()> {
    if !catalog.is_available().await {
        return Err(anyhow!(
            "The dataset catalog could not be fetched; rerun with --verbose for details."
        ));
    }

    if let Some(text) = search {
        let found = catalog.search(text).await;
        println!("\nDatasets matching '{text}' ({} total):\n", found.len());
        display::display_datasets(&found[..found.len().min(limit)]);
        return Ok(());
    }

    let dataset_id = dataset_id.ok_or_else(|| anyhow!("Provide a dataset id or --search."))?;
    match catalog.resolve(dataset_id).await {
        Some(descriptor) => {
            display::display_datasets(std::slice::from_ref(&descriptor));
            if let Some(url) = descriptor.url {
                println!("\n{url}");
            }
            Ok(())
        },
        None => Err(anyhow!(
            "Dataset '{dataset_id}' is not in the catalog.\n\nHint: {SEARCH_HINT}"
        )),
    }
}

fn handle_obfuscate(input: &Path, output: &Path, options: &PrivacyOptions) -> Result<()> {
    let points = read_points_file(input).map_err(explain)?;
    let samples = operations::obfuscate_points(&points, options).map_err(explain)?;
    write_samples_file(output, &samples, &CsvWriterOptions::default()).map_err(explain)?;

    println!(
        "\nWrote {} samples for {} points to {}\n",
        samples.len(),
        points.len(),
        output.display()
    );
    display::display_samples(&samples, PREVIEW_ROWS);
    Ok(())
}

fn handle_buffer(input: &Path, output: &Path, options: &PrivacyOptions) -> Result<()> {
    let points = read_points_file(input).map_err(explain)?;
    let buffers = operations::buffer_points(&points, options).map_err(explain)?;
    write_buffers_file(output, &buffers, geoveil_core::io::ID_COLUMN).map_err(explain)?;

    println!("Wrote {} buffers to {}", buffers.len(), output.display());
    Ok(())
}

async fn handle_extract(
    catalog: &CatalogResolver,
    imagery: &ImageryOptions,
    query: &DatasetQuery,
    input: &Path,
    output: &Path,
    privacy: Option<&PrivacyOptions>,
    options: ExtractionOptions,
) -> Result<()> {
    imagery
        .validate()
        .map_err(|e| explain(GeoveilError::from(e)))?;
    let service = HttpImagery::new(imagery).map_err(|e| explain(GeoveilError::from(e)))?;

    let rows = match InputFormat::from_path(input).map_err(explain)? {
        InputFormat::Csv => {
            let points = read_points_file(input).map_err(explain)?;
            operations::extract_points(&service, catalog, query, &points, privacy, options).await
        },
        InputFormat::GeoJson => {
            if privacy.is_some() {
                return Err(anyhow!("--obfuscate applies to CSV points only."));
            }
            let areas = read_areas_file(input).map_err(explain)?;
            operations::extract_areas(&service, catalog, query, &areas, options).await
        },
    }
    .map_err(explain)?;

    write_rows_file(output, &rows, &CsvWriterOptions::default()).map_err(explain)?;
    println!(
        "\nWrote {} rows from {} to {}\n",
        rows.len(),
        query.dataset_id,
        output.display()
    );
    display::display_rows(&rows, PREVIEW_ROWS);
    Ok(())
}
