//! Pure-Rust WGS84 ↔ UTM projection for local metric work.
//!
//! Uses the sixth-order Krüger series (Karney 2011), which is accurate to a
//! few nanometers inside a zone, so projecting and unprojecting a point
//! without any offset returns it to well under 1e-9 degrees.
//!
//! The zone is banded on longitude and the hemisphere is taken from the sign
//! of the latitude. Neither poles nor points far from the zone's central
//! meridian (e.g. across the antimeridian) are handled specially; distances
//! there carry the projection's usual distortion.

use std::fmt;

use crate::types::Coordinate;

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// A projected easting/northing in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected {
    pub easting: f64,
    pub northing: f64,
}

impl Projected {
    /// Offsets this position by `(dx, dy)` meters.
    #[must_use]
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            easting: self.easting + dx,
            northing: self.northing + dy,
        }
    }

    /// Planar distance in meters.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (self.easting - other.easting).hypot(self.northing - other.northing)
    }
}

/// A UTM zone with an explicit hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalFrame {
    zone: u8,
    north: bool,
}

impl LocalFrame {
    /// Picks the frame for a coordinate: zone `⌊(lon + 180) / 6⌋ + 1`
    /// (longitude 180 folds into zone 60), hemisphere from the latitude sign.
    #[must_use]
    pub fn for_coordinate(coordinate: Coordinate) -> Self {
        let band = ((coordinate.lon + 180.0) / 6.0).floor() as i64 + 1;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let zone = band.clamp(1, 60) as u8;
        Self {
            zone,
            north: coordinate.lat >= 0.0,
        }
    }

    /// Builds a frame from an explicit zone.
    ///
    /// Returns `None` when `zone` is outside `1..=60`.
    #[must_use]
    pub fn new(zone: u8, north: bool) -> Option<Self> {
        (1..=60).contains(&zone).then_some(Self { zone, north })
    }

    #[must_use]
    pub fn zone(&self) -> u8 {
        self.zone
    }

    #[must_use]
    pub fn is_north(&self) -> bool {
        self.north
    }

    /// EPSG code of this frame (326xx north, 327xx south).
    #[must_use]
    pub fn epsg(&self) -> u32 {
        let base = if self.north { 32600 } else { 32700 };
        base + u32::from(self.zone)
    }

    fn central_meridian(&self) -> f64 {
        (f64::from(self.zone) - 1.0) * 6.0 - 180.0 + 3.0
    }

    /// Projects a geographic coordinate into this frame.
    #[must_use]
    pub fn forward(&self, coordinate: Coordinate) -> Projected {
        let series = Series::wgs84();
        let e = series.e;

        let phi = coordinate.lat.to_radians();
        let lambda = (coordinate.lon - self.central_meridian()).to_radians();

        let tau = phi.tan();
        let sigma = (e * (e * tau / (1.0 + tau * tau).sqrt()).atanh()).sinh();
        let tau_prime = tau * (1.0 + sigma * sigma).sqrt() - sigma * (1.0 + tau * tau).sqrt();

        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let xi_prime = tau_prime.atan2(cos_lambda);
        let eta_prime = (sin_lambda / (tau_prime * tau_prime + cos_lambda * cos_lambda).sqrt()).asinh();

        let mut xi = xi_prime;
        let mut eta = eta_prime;
        for (j, alpha) in series.alpha.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            xi += alpha * (k * xi_prime).sin() * (k * eta_prime).cosh();
            eta += alpha * (k * xi_prime).cos() * (k * eta_prime).sinh();
        }

        let easting = K0 * series.rectifying_radius * eta + FALSE_EASTING;
        let northing = K0 * series.rectifying_radius * xi;
        let northing = if self.north {
            northing
        } else {
            northing + FALSE_NORTHING_SOUTH
        };

        Projected { easting, northing }
    }

    /// Unprojects a position in this frame back to geographic degrees.
    #[must_use]
    pub fn inverse(&self, projected: Projected) -> Coordinate {
        let series = Series::wgs84();
        let e = series.e;
        let e2 = e * e;

        let x = projected.easting - FALSE_EASTING;
        let y = if self.north {
            projected.northing
        } else {
            projected.northing - FALSE_NORTHING_SOUTH
        };

        let eta = x / (K0 * series.rectifying_radius);
        let xi = y / (K0 * series.rectifying_radius);

        let mut xi_prime = xi;
        let mut eta_prime = eta;
        for (j, beta) in series.beta.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            xi_prime -= beta * (k * xi).sin() * (k * eta).cosh();
            eta_prime -= beta * (k * xi).cos() * (k * eta).sinh();
        }

        let sinh_eta = eta_prime.sinh();
        let (sin_xi, cos_xi) = xi_prime.sin_cos();
        let tau_prime = sin_xi / (sinh_eta * sinh_eta + cos_xi * cos_xi).sqrt();

        // Newton-Raphson on the conformal latitude
        let mut tau = tau_prime;
        for _ in 0..8 {
            let sigma = (e * (e * tau / (1.0 + tau * tau).sqrt()).atanh()).sinh();
            let tau_i = tau * (1.0 + sigma * sigma).sqrt() - sigma * (1.0 + tau * tau).sqrt();
            let delta = (tau_prime - tau_i) / (1.0 + tau_i * tau_i).sqrt()
                * (1.0 + (1.0 - e2) * tau * tau)
                / ((1.0 - e2) * (1.0 + tau * tau).sqrt());
            tau += delta;
            if delta.abs() < 1e-14 {
                break;
            }
        }

        let lat = tau.atan().to_degrees();
        let lon = sinh_eta.atan2(cos_xi).to_degrees() + self.central_meridian();

        Coordinate { lat, lon }
    }
}

impl fmt::Display for LocalFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hemisphere = if self.north { 'N' } else { 'S' };
        write!(f, "UTM {}{} (EPSG:{})", self.zone, hemisphere, self.epsg())
    }
}

/// Krüger series coefficients for the WGS84 ellipsoid.
struct Series {
    e: f64,
    rectifying_radius: f64,
    alpha: [f64; 6],
    beta: [f64; 6],
}

impl Series {
    fn wgs84() -> Self {
        let e = (F * (2.0 - F)).sqrt();
        let n = F / (2.0 - F);
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let rectifying_radius = A / (1.0 + n) * (1.0 + n2 / 4.0 + n4 / 64.0 + n6 / 256.0);

        let alpha = [
            n / 2.0 - 2.0 * n2 / 3.0 + 5.0 * n3 / 16.0 + 41.0 * n4 / 180.0 - 127.0 * n5 / 288.0
                + 7891.0 * n6 / 37800.0,
            13.0 * n2 / 48.0 - 3.0 * n3 / 5.0 + 557.0 * n4 / 1440.0 + 281.0 * n5 / 630.0
                - 1_983_433.0 * n6 / 1_935_360.0,
            61.0 * n3 / 240.0 - 103.0 * n4 / 140.0 + 15061.0 * n5 / 26880.0
                + 167_603.0 * n6 / 181_440.0,
            49561.0 * n4 / 161_280.0 - 179.0 * n5 / 168.0 + 6_601_661.0 * n6 / 7_257_600.0,
            34729.0 * n5 / 80640.0 - 3_418_889.0 * n6 / 1_995_840.0,
            212_378_941.0 * n6 / 319_334_400.0,
        ];

        let beta = [
            n / 2.0 - 2.0 * n2 / 3.0 + 37.0 * n3 / 96.0 - n4 / 360.0 - 81.0 * n5 / 512.0
                + 96199.0 * n6 / 604_800.0,
            n2 / 48.0 + n3 / 15.0 - 437.0 * n4 / 1440.0 + 46.0 * n5 / 105.0
                - 1_118_711.0 * n6 / 3_870_720.0,
            17.0 * n3 / 480.0 - 37.0 * n4 / 840.0 - 209.0 * n5 / 4480.0 + 5569.0 * n6 / 90720.0,
            4397.0 * n4 / 161_280.0 - 11.0 * n5 / 504.0 - 830_251.0 * n6 / 7_257_600.0,
            4583.0 * n5 / 161_280.0 - 108_847.0 * n6 / 3_991_680.0,
            20_648_693.0 * n6 / 638_668_800.0,
        ];

        Self {
            e,
            rectifying_radius,
            alpha,
            beta,
        }
    }
}
