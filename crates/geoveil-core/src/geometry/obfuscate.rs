//! Coordinate obfuscation with a bounded-uncertainty guarantee.
//!
//! Each draw picks an angle uniformly in `[0, 2π)` and a distance uniformly
//! in `[0, r]` and moves the point by the reversed offset in its local UTM
//! frame. The result is the center of a hidden disk of radius `r` that
//! contains the source point, so one published coordinate bounds the source
//! location only to within `r`.
//!
//! Draws are independent: publishing many samples for the same source
//! narrows the feasible region to the intersection of their disks.

use std::f64::consts::TAU;

use geo_types::Polygon;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::circle::{inscribed_radius, ring_around, validate_circle};
use super::projection::{LocalFrame, Projected};
use crate::error::ParameterError;
use crate::types::{BufferSpec, Coordinate, METERS_PER_FOOT};

/// Randomised obfuscation of coordinates.
///
/// Generic over the random source so tests can seed it.
///
/// # Examples
///
/// ```
/// use geoveil_core::geometry::ObfuscationEngine;
/// use geoveil_core::types::Coordinate;
///
/// let mut engine = ObfuscationEngine::seeded(7);
/// let plot = Coordinate::new(44.0582, -121.3153)?;
/// let samples = engine.obfuscate(plot, 1000.0, 5)?;
/// assert_eq!(samples.len(), 5);
/// # Ok::<(), geoveil_core::error::ParameterError>(())
/// ```
#[derive(Debug)]
pub struct ObfuscationEngine<R = StdRng> {
    rng: R,
}

impl ObfuscationEngine<StdRng> {
    /// An engine seeded from the operating system.
    #[must_use]
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_os_rng())
    }

    /// A reproducible engine.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }

    /// Seeded when `seed` is given, from entropy otherwise.
    #[must_use]
    pub fn with_seed(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }
}

impl<R: Rng> ObfuscationEngine<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Returns `sample_count` randomised coordinates around `point`.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] if `radius_feet <= 0` or
    /// `sample_count == 0`.
    pub fn obfuscate(
        &mut self,
        point: Coordinate,
        radius_feet: f64,
        sample_count: usize,
    ) -> Result<Vec<Coordinate>, ParameterError> {
        let spec = BufferSpec::new(radius_feet, sample_count)?;
        Ok(self.obfuscate_with(point, &spec))
    }

    /// Same as [`obfuscate`](Self::obfuscate) with an already validated spec.
    pub fn obfuscate_with(&mut self, point: Coordinate, spec: &BufferSpec) -> Vec<Coordinate> {
        let frame = LocalFrame::for_coordinate(point);
        let origin = frame.forward(point);
        let radius_m = spec.radius_meters();
        debug!(
            "Obfuscating {point} in {frame}: {} draws within {radius_m:.3} m",
            spec.sample_count()
        );

        (0..spec.sample_count())
            .map(|_| frame.inverse(self.draw_center(origin, radius_m)))
            .collect()
    }

    /// A circle of `radius_feet` whose center is hidden: `point` lies inside
    /// the polygon but, except on a zero-probability draw, not at its center.
    ///
    /// # Errors
    ///
    /// Returns [`ParameterError`] for a non-positive radius, a radius below
    /// [`MIN_RADIUS_FEET`](super::circle::MIN_RADIUS_FEET), or a zero
    /// resolution.
    pub fn obfuscated_circle(
        &mut self,
        point: Coordinate,
        radius_feet: f64,
        resolution: usize,
    ) -> Result<Polygon<f64>, ParameterError> {
        validate_circle(radius_feet, resolution)?;
        let frame = LocalFrame::for_coordinate(point);
        let origin = frame.forward(point);
        let radius_m = radius_feet * METERS_PER_FOOT;

        // Keep the source strictly inside the polygonised ring, not just the
        // true circle.
        let reach = inscribed_radius(radius_m, resolution) * (1.0 - 1e-4);
        let center = self.draw_center_below(origin, reach);
        Ok(ring_around(&frame, point, center, radius_m, resolution))
    }

    fn draw_center(&mut self, origin: Projected, radius_m: f64) -> Projected {
        let angle = self.rng.random_range(0.0..TAU);
        let distance = self.rng.random_range(0.0..=radius_m);
        offset_back(origin, angle, distance)
    }

    fn draw_center_below(&mut self, origin: Projected, reach_m: f64) -> Projected {
        let angle = self.rng.random_range(0.0..TAU);
        let distance = self.rng.random_range(0.0..reach_m);
        offset_back(origin, angle, distance)
    }
}

fn offset_back(origin: Projected, angle: f64, distance: f64) -> Projected {
    let (sin, cos) = angle.sin_cos();
    origin.offset(-distance * cos, -distance * sin)
}
