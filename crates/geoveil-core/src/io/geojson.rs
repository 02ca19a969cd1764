//! `GeoJSON` area input and buffer output.
#![allow(clippy::result_large_err)]

use std::convert::TryInto;
use std::fs;
use std::path::Path;

use geo_types::{Geometry, MultiPolygon, Polygon};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use log::debug;

use super::table::{ID_ALIASES, ID_COLUMN};
use crate::error::{IoErrorExt, Result, TableError};
use crate::types::Area;

/// Parse a `GeoJSON` document into identified areas.
///
/// Accepts a `FeatureCollection`, a single `Feature` or a bare geometry.
/// Every Polygon or `MultiPolygon` feature becomes one area. The identifier
/// comes from the first property matching the id aliases, else the feature
/// `id`, else the 1-based feature position.
///
/// # Errors
///
/// Returns [`TableError::GeoJson`] for malformed input and
/// [`TableError::UnsupportedGeometry`] for features without a polygonal
/// geometry.
pub fn parse_areas(text: &str) -> Result<Vec<Area>> {
    let geojson: GeoJson = text.parse().map_err(|e: geojson::Error| TableError::GeoJson {
        message: e.to_string(),
    })?;

    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    let areas = features
        .into_iter()
        .enumerate()
        .map(|(index, feature)| feature_to_area(index + 1, feature))
        .collect::<std::result::Result<Vec<_>, TableError>>()?;
    debug!("Parsed {} areas", areas.len());
    Ok(areas)
}

/// Read identified areas from a `GeoJSON` file.
///
/// # Errors
///
/// See [`parse_areas`]; read failures become
/// [`IoError::Read`](crate::error::IoError::Read).
pub fn read_areas_file(path: impl AsRef<Path>) -> Result<Vec<Area>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).with_read_context("GeoJSON", path)?;
    parse_areas(&text)
}

fn feature_to_area(position: usize, feature: Feature) -> std::result::Result<Area, TableError> {
    let id = area_id(position, &feature);
    let Some(geometry) = feature.geometry else {
        return Err(TableError::UnsupportedGeometry {
            feature: position,
            geometry_type: "null".to_string(),
        });
    };
    let type_name = geometry_type_name(&geometry.value);
    let converted: Geometry<f64> = geometry.try_into().map_err(|e: geojson::Error| {
        TableError::GeoJson {
            message: format!("feature {position}: {e}"),
        }
    })?;

    let footprint = match converted {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
        Geometry::MultiPolygon(multi) => multi,
        _ => {
            return Err(TableError::UnsupportedGeometry {
                feature: position,
                geometry_type: type_name.to_string(),
            });
        },
    };
    Ok(Area::new(id, footprint))
}

fn area_id(position: usize, feature: &Feature) -> String {
    let from_properties = feature.properties.as_ref().and_then(|properties| {
        let keys: Vec<&String> = properties.keys().collect();
        let index = super::table::find_column(keys.as_slice(), ID_COLUMN, ID_ALIASES).ok()?;
        json_to_id(&properties[keys[index].as_str()])
    });

    from_properties
        .or_else(|| {
            feature.id.as_ref().map(|id| match id {
                Id::String(s) => s.clone(),
                Id::Number(n) => n.to_string(),
            })
        })
        .unwrap_or_else(|| position.to_string())
}

fn json_to_id(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        JsonValue::Null | JsonValue::Array(_) | JsonValue::Object(_) => None,
    }
}

fn geometry_type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

/// Build a `FeatureCollection` of buffer polygons, each tagged with its
/// identifier under `id_property`.
#[must_use]
pub fn buffers_to_geojson(buffers: &[(String, Polygon<f64>)], id_property: &str) -> GeoJson {
    let features = buffers
        .iter()
        .map(|(id, polygon)| {
            let mut properties = JsonObject::new();
            properties.insert(id_property.to_string(), JsonValue::String(id.clone()));
            Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(polygon))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();
    GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Write buffer polygons to a `GeoJSON` file.
///
/// # Errors
///
/// Returns [`IoError::Write`](crate::error::IoError::Write) if the file
/// cannot be written.
pub fn write_buffers_file(
    path: impl AsRef<Path>,
    buffers: &[(String, Polygon<f64>)],
    id_property: &str,
) -> Result<()> {
    let path = path.as_ref();
    let document = buffers_to_geojson(buffers, id_property);
    let text = serde_json::to_string_pretty(&document).with_write_context("GeoJSON", path)?;
    fs::write(path, text).with_write_context("GeoJSON", path)
}
