//! Integration tests for the HTTP-backed catalog and imagery clients.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use geoveil_core::catalog::{CatalogResolver, HttpCatalogSource};
use geoveil_core::config::{CatalogOptions, ExtractionOptions, ImageryOptions, RetryPolicy};
use geoveil_core::error::{GeoveilError, ServiceError};
use geoveil_core::imagery::{HttpImagery, ImageExpr, ImageryService};
use geoveil_core::operations::{self, DatasetQuery};
use geoveil_core::types::{Coordinate, DatasetType, SamplePoint};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

type Handler = dyn Fn(&str, &Value, usize) -> (u16, Value) + Send + Sync;

/// Serves `handler` on a local port; the handler also gets the number of
/// requests seen before this one.
async fn serve<F>(handler: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(&str, &Value, usize) -> (u16, Value) + Send + Sync + 'static,
{
    let handler: Arc<Handler> = Arc::new(handler);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            let seen = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(respond(stream, handler, seen));
        }
    });
    (format!("http://{address}"), hits)
}

async fn respond(mut stream: TcpStream, handler: Arc<Handler>, seen: usize) {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let Ok(read) = stream.read(&mut chunk).await else {
            return;
        };
        if read == 0 {
            return;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break end + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let path = head.split_whitespace().nth(1).unwrap_or_default().to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() < header_end + content_length {
        let Ok(read) = stream.read(&mut chunk).await else {
            return;
        };
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    let body: Value = serde_json::from_slice(&buffer[header_end..]).unwrap_or(Value::Null);

    let (status, payload) = handler(&path, &body, seen);
    let payload = payload.to_string();
    let response = format!(
        "HTTP/1.1 {status} STUB\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_retries(2)
        .with_base_delay(Duration::from_millis(10))
}

fn catalog_document() -> Value {
    json!([
        {"id": "USGS/SRTMGL1_003", "title": "NASA SRTM Digital Elevation 30m", "type": "image"},
        {"id": "TIGER/2018/States", "title": "TIGER: US Census States", "type": "table"},
        {"id": "Odd/Thing", "type": "something_new"}
    ])
}

#[tokio::test]
async fn test_catalog_retries_then_memoizes() {
    let (base, hits) = serve(|_, _, seen| {
        if seen == 0 {
            (503, json!({"error": "busy"}))
        } else {
            (200, catalog_document())
        }
    })
    .await;

    let options = CatalogOptions::new()
        .with_url(format!("{base}/catalog.json"))
        .with_retry(fast_retry());
    let resolver = CatalogResolver::new(HttpCatalogSource::new(options));

    let srtm = resolver.resolve("USGS/SRTMGL1_003").await.unwrap();
    assert_eq!(srtm.kind, Some(DatasetType::Image));
    let states = resolver.resolve("TIGER/2018/States").await.unwrap();
    assert_eq!(states.kind, Some(DatasetType::FeatureCollection));
    let odd = resolver.resolve("Odd/Thing").await.unwrap();
    assert_eq!(odd.kind, Some(DatasetType::Unknown));
    assert!(odd.loadable_kind().is_none());
    assert!(resolver.resolve("Missing/Id").await.is_none());

    // One failed attempt, one success, then served from memory
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_catalog_outage_is_not_fatal() {
    let (base, hits) = serve(|_, _, _| (500, json!({}))).await;
    let options = CatalogOptions::new()
        .with_url(format!("{base}/catalog.json"))
        .with_retry(fast_retry());
    let resolver = CatalogResolver::new(HttpCatalogSource::new(options));

    assert!(resolver.resolve("USGS/SRTMGL1_003").await.is_none());
    assert!(!resolver.is_available().await);
    assert!(resolver.search("srtm").await.is_empty());
    // First attempt plus two retries, never repeated
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_imagery_not_found_and_rejected() {
    let (base, _) = serve(|path, body, _| match path {
        "/v1/describe" if body["image"]["kind"] == "image" => {
            (404, json!({"error": "no such image"}))
        },
        "/v1/describe" => (400, json!({"error": "bad expression"})),
        _ => (404, json!({})),
    })
    .await;
    let service = HttpImagery::new(&ImageryOptions::new(base).with_retry(fast_retry())).unwrap();

    let image = ImageExpr::Image {
        id: "X".to_string(),
    };
    match service.describe(&image).await.unwrap_err() {
        ServiceError::NotFound { id, expected } => {
            assert_eq!(id, "X");
            assert_eq!(expected, "image");
        },
        other => panic!("unexpected error: {other}"),
    }

    let collection = ImageExpr::CollectionMedian {
        id: "X".to_string(),
        dates: None,
    };
    assert!(matches!(
        service.describe(&collection).await,
        Err(ServiceError::Rejected { .. })
    ));
}

#[tokio::test]
async fn test_probing_pipeline_over_http() {
    // Without a catalog entry the loader probes: image 404s, collection loads
    let (base, hits) = serve(|path, body, _| match path {
        "/catalog.json" => (200, json!([])),
        "/v1/describe" if body["image"]["kind"] == "collection_median" => {
            assert_eq!(body["image"]["dates"]["start"], "2024-06-01");
            (200, json!({"bands": ["LST_Day_1km"], "native_scale": 1000.0}))
        },
        "/v1/describe" => (404, json!({})),
        "/v1/sample" => {
            assert_eq!(body["scale"], 1000.0);
            let results: Vec<Value> = body["points"]
                .as_array()
                .unwrap()
                .iter()
                .map(|p| {
                    let value = if p["id"] == "A2" {
                        Value::Null
                    } else {
                        json!(14_500.0)
                    };
                    json!({ "LST_Day_1km": value })
                })
                .collect();
            (200, json!({ "results": results }))
        },
        _ => (404, json!({})),
    })
    .await;

    let catalog = CatalogResolver::new(HttpCatalogSource::new(
        CatalogOptions::new().with_url(format!("{base}/catalog.json")),
    ));
    let service = HttpImagery::new(&ImageryOptions::new(base.clone())).unwrap();
    let points = vec![
        SamplePoint::new("A1", Coordinate::new(44.0582, -121.3153).unwrap()),
        SamplePoint::new("A2", Coordinate::new(44.1, -121.2).unwrap()),
    ];
    let query = DatasetQuery::new("MODIS/061/MOD11A1").with_dates(
        chrono::NaiveDate::from_ymd_opt(2024, 6, 1),
        chrono::NaiveDate::from_ymd_opt(2024, 6, 30),
    );

    let rows = operations::extract_points(
        &service,
        &catalog,
        &query,
        &points,
        None,
        ExtractionOptions::new(),
    )
    .await
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].value("LST_Day_1km"), Some(14_500.0));
    assert!(rows[1].is_missing());
    // catalog, image probe, collection probe, sample
    assert_eq!(hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_unresolvable_dataset_lists_attempts() {
    let (base, _) = serve(|path, _, _| match path {
        "/catalog.json" => (200, json!([])),
        _ => (404, json!({})),
    })
    .await;
    let catalog = CatalogResolver::new(HttpCatalogSource::new(
        CatalogOptions::new().with_url(format!("{base}/catalog.json")),
    ));
    let service = HttpImagery::new(&ImageryOptions::new(base.clone())).unwrap();
    let points = vec![SamplePoint::new(
        "A1",
        Coordinate::new(44.0, -121.0).unwrap(),
    )];

    let err = operations::extract_points(
        &service,
        &catalog,
        &DatasetQuery::new("NOPE/NOTHING"),
        &points,
        None,
        ExtractionOptions::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, GeoveilError::DatasetResolution(_)));
    let message = err.user_message();
    assert!(message.contains("NOPE/NOTHING"));
    assert_eq!(message.matches("  - ").count(), 3);
}
