//! End-to-end tests for the `geoveil` binary.
//!
//! Remote collaborators are replaced by a small HTTP stub that serves a
//! catalog document and the three imagery gateway endpoints.

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::thread;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::TempDir;

const PLOTS: &str = "Plot_ID,Latitude,Longitude,notes\nA1,44.0582,-121.3153,bend\nA2,44.1,-121.2,\n";

fn geoveil() -> Command {
    let mut cmd = Command::cargo_bin("geoveil").unwrap();
    cmd.env_remove("GEOVEIL_CATALOG_URL")
        .env_remove("GEOVEIL_IMAGERY_ENDPOINT");
    cmd
}

fn write_plots(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("plots.csv");
    fs::write(&path, PLOTS).unwrap();
    path
}

/// Starts a stub server and returns its base URL.
fn serve() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            handle(stream);
        }
    });
    format!("http://{address}")
}

fn handle(stream: TcpStream) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();

    let mut content_length = 0;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.split_once(':')
            && name.eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse().unwrap_or(0);
        }
    }
    let mut body = vec![0; content_length];
    if reader.read_exact(&mut body).is_err() {
        return;
    }
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    let (status, response) = route(&path, &request);
    let payload = response.to_string();
    let mut stream = reader.into_inner();
    let _ = write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
        payload.len()
    );
}

fn route(path: &str, request: &Value) -> (&'static str, Value) {
    match path {
        "/catalog.json" => (
            "200 OK",
            json!([
                {
                    "id": "USGS/SRTMGL1_003",
                    "title": "NASA SRTM Digital Elevation 30m",
                    "type": "image",
                    "url": "https://example.org/srtm"
                },
                {
                    "id": "MODIS/061/MOD11A1",
                    "title": "MOD11A1.061 Terra Land Surface Temperature",
                    "type": "image_collection"
                }
            ]),
        ),
        "/v1/describe" if request["image"]["id"] == "USGS/SRTMGL1_003" => (
            "200 OK",
            json!({"bands": ["elevation"], "native_scale": 30.0}),
        ),
        "/v1/sample" => {
            let count = request["points"].as_array().map_or(0, Vec::len);
            let results: Vec<Value> = (0..count).map(|_| json!({"elevation": 1203.5})).collect();
            ("200 OK", json!({ "results": results }))
        },
        _ => ("404 Not Found", json!({"error": "not found"})),
    }
}

fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_obfuscate_writes_samples() {
    let dir = TempDir::new().unwrap();
    let input = write_plots(&dir);
    let output = dir.path().join("samples.csv");

    geoveil()
        .args(["obfuscate", "--samples", "3", "--seed", "7", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 6 samples for 2 points"));

    let written = lines(&output);
    assert_eq!(written[0], "plot_ID,lat,lon");
    assert_eq!(written.len(), 7);
    assert_eq!(written.iter().filter(|l| l.starts_with("A1,")).count(), 3);

    // Same seed, same samples
    let again = dir.path().join("again.csv");
    geoveil()
        .args(["obfuscate", "--samples", "3", "--seed", "7", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&again)
        .assert()
        .success();
    assert_eq!(written, lines(&again));
}

#[test]
fn test_obfuscate_reports_missing_column() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("plots.csv");
    fs::write(&input, "id,Longitude\n1,-121.0\n").unwrap();

    geoveil()
        .arg("obfuscate")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not find a LAT column"))
        .stderr(predicate::str::contains("Hint:"));
}

#[test]
fn test_buffer_writes_geojson() {
    let dir = TempDir::new().unwrap();
    let input = write_plots(&dir);

    for hidden in [false, true] {
        let output = dir.path().join(format!("buffers_{hidden}.geojson"));
        let mut cmd = geoveil();
        cmd.args(["buffer", "--radius-feet", "500", "--resolution", "8", "--seed", "1"])
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output);
        if hidden {
            cmd.arg("--hidden-center");
        }
        cmd.assert()
            .success()
            .stdout(predicate::str::contains("Wrote 2 buffers"));

        let document: Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
        let features = document["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["properties"]["plot_ID"], "A1");
        assert_eq!(features[1]["geometry"]["type"], "Polygon");
        assert_eq!(
            features[0]["geometry"]["coordinates"][0]
                .as_array()
                .unwrap()
                .len(),
            33
        );
    }
}

#[test]
fn test_buffer_rejects_zero_resolution() {
    let dir = TempDir::new().unwrap();
    let input = write_plots(&dir);

    geoveil()
        .args(["buffer", "--resolution", "0", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("b.geojson"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid parameter"));
}

#[test]
fn test_catalog_lookup_and_search() {
    let catalog = format!("{}/catalog.json", serve());

    geoveil()
        .args(["catalog", "USGS/SRTMGL1_003", "--catalog-url", &catalog])
        .assert()
        .success()
        .stdout(predicate::str::contains("NASA SRTM Digital Elevation 30m"))
        .stdout(predicate::str::contains("image"))
        .stdout(predicate::str::contains("https://example.org/srtm"));

    geoveil()
        .args(["catalog", "--search", "temperature", "--catalog-url", &catalog])
        .assert()
        .success()
        .stdout(predicate::str::contains("MODIS/061/MOD11A1"))
        .stdout(predicate::str::contains("USGS/SRTMGL1_003").not());

    geoveil()
        .args(["catalog", "NOPE/NOTHING", "--catalog-url", &catalog])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not in the catalog"));
}

#[test]
fn test_extract_points_through_gateway() {
    let base = serve();
    let dir = TempDir::new().unwrap();
    let input = write_plots(&dir);
    let output = dir.path().join("srtm.csv");

    geoveil()
        .args(["extract", "--dataset", "USGS/SRTMGL1_003", "--endpoint", &base])
        .args(["--catalog-url", &format!("{base}/catalog.json")])
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote 2 rows"));

    let written = lines(&output);
    assert_eq!(written[0], "plot_ID,elevation,dataset,extraction_date");
    assert!(written[1].starts_with("A1,1203.5,USGS/SRTMGL1_003,"));
    assert!(written[2].starts_with("A2,1203.5,"));
}

#[test]
fn test_extract_obfuscated_points() {
    let base = serve();
    let dir = TempDir::new().unwrap();
    let input = write_plots(&dir);
    let output = dir.path().join("srtm.csv");

    geoveil()
        .args(["extract", "--dataset", "USGS/SRTMGL1_003", "--endpoint", &base])
        .args(["--catalog-url", &format!("{base}/catalog.json")])
        .args(["--obfuscate", "--samples", "4", "--seed", "11"])
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success();

    assert_eq!(lines(&output).len(), 9);
}

#[test]
fn test_extract_unknown_band() {
    let base = serve();
    let dir = TempDir::new().unwrap();
    let input = write_plots(&dir);

    geoveil()
        .args(["extract", "--dataset", "USGS/SRTMGL1_003", "--endpoint", &base])
        .args(["--catalog-url", &format!("{base}/catalog.json")])
        .args(["--bands", "elevation,slope"])
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("slope"));
}

#[test]
fn test_extract_requires_endpoint() {
    let dir = TempDir::new().unwrap();
    let input = write_plots(&dir);

    geoveil()
        .args(["extract", "--dataset", "USGS/SRTMGL1_003", "-i"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No imagery endpoint configured"));
}

#[test]
fn test_extract_rejects_reversed_dates() {
    let base = serve();
    let dir = TempDir::new().unwrap();
    let input = write_plots(&dir);

    geoveil()
        .args(["extract", "--dataset", "MODIS/061/MOD11A1", "--endpoint", &base])
        .args(["--catalog-url", &format!("{base}/catalog.json")])
        .args(["--start", "2024-07-01", "--end", "2024-06-01"])
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid parameter"));
}
