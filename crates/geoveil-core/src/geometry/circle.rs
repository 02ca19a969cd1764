//! Circular buffer polygons built in a local metric frame.

use std::f64::consts::TAU;

use geo_types::{Coord, LineString, Polygon};

use super::projection::{LocalFrame, Projected};
use crate::error::ParameterError;
use crate::types::{Coordinate, METERS_PER_FOOT};

/// Segments per quadrant used when none is given.
pub const DEFAULT_RESOLUTION: usize = 32;

/// Smallest radius a circle can be built with. Below it the vertex offsets
/// fall under `f64` resolution at UTM magnitudes and the ring collapses
/// onto its center.
pub const MIN_RADIUS_FEET: f64 = 0.01;

/// Builds a circle of `radius_feet` centered on `point`, in WGS84.
///
/// The point is buffered in its local UTM frame with `resolution` segments
/// per quadrant and every vertex is unprojected independently, so the ring
/// is metrically round on the ground rather than in degrees. The result
/// always contains `point`.
///
/// # Errors
///
/// Returns [`ParameterError`] for a non-positive radius, a radius below
/// [`MIN_RADIUS_FEET`], or a zero resolution.
///
/// # Examples
///
/// ```
/// use geo::Contains;
/// use geoveil_core::geometry::{DEFAULT_RESOLUTION, build_circle};
/// use geoveil_core::types::Coordinate;
///
/// let plot = Coordinate::new(44.0582, -121.3153)?;
/// let circle = build_circle(plot, 100.0, DEFAULT_RESOLUTION)?;
/// assert!(circle.contains(&plot.to_point()));
/// assert_eq!(circle.exterior().0.len(), 4 * DEFAULT_RESOLUTION + 1);
/// # Ok::<(), geoveil_core::error::ParameterError>(())
/// ```
pub fn build_circle(
    point: Coordinate,
    radius_feet: f64,
    resolution: usize,
) -> Result<Polygon<f64>, ParameterError> {
    validate_circle(radius_feet, resolution)?;
    let frame = LocalFrame::for_coordinate(point);
    let center = frame.forward(point);
    Ok(ring_around(
        &frame,
        point,
        center,
        radius_feet * METERS_PER_FOOT,
        resolution,
    ))
}

pub(crate) fn validate_circle(radius_feet: f64, resolution: usize) -> Result<(), ParameterError> {
    if !radius_feet.is_finite() || radius_feet <= 0.0 {
        return Err(ParameterError::NonPositiveRadius { radius_feet });
    }
    if radius_feet < MIN_RADIUS_FEET {
        return Err(ParameterError::InvalidOption {
            option: "radius_feet".to_string(),
            message: format!("circles need at least {MIN_RADIUS_FEET} ft, got {radius_feet}"),
        });
    }
    if resolution == 0 {
        return Err(ParameterError::InvalidResolution { resolution });
    }
    Ok(())
}

/// Distance from the center of the polygonised ring to the middle of an
/// edge, i.e. the largest circle the polygon fully contains.
pub(crate) fn inscribed_radius(radius_m: f64, resolution: usize) -> f64 {
    let segments = (4 * resolution) as f64;
    radius_m * (std::f64::consts::PI / segments).cos()
}

/// Polygonised ring of `radius_m` around `center`, placed relative to
/// `anchor` as `anchor + (inverse(vertex) - inverse(forward(anchor)))` so the
/// projection round-trip error cancels out.
pub(crate) fn ring_around(
    frame: &LocalFrame,
    anchor: Coordinate,
    center: Projected,
    radius_m: f64,
    resolution: usize,
) -> Polygon<f64> {
    let reference = frame.inverse(frame.forward(anchor));
    let segments = 4 * resolution;
    let coords: Vec<Coord<f64>> = (0..segments)
        .map(|i| {
            let theta = TAU * i as f64 / segments as f64;
            let (sin, cos) = theta.sin_cos();
            let vertex = frame.inverse(center.offset(radius_m * cos, radius_m * sin));
            Coord {
                x: anchor.lon + (vertex.lon - reference.lon),
                y: anchor.lat + (vertex.lat - reference.lat),
            }
        })
        .collect();
    Polygon::new(LineString::new(coords), vec![])
}
