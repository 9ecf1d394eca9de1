//! # Coordinate projection
//!
//! Converts geographic positions (longitude/latitude in degrees, NAD83/WGS84 datum) into a
//! planar, meters-based frame so that Euclidean distances and buffers are meaningful.
//!
//! The projection is the **Albers equal-area conic** on the GRS80 ellipsoid, with the
//! parameters of the CONUS Albers frame (EPSG:5070):
//!
//! ```text
//! standard parallels  φ1 = 29.5°, φ2 = 45.5°
//! latitude of origin  φ0 = 23°
//! central meridian    λ0 = -96°
//! false easting/northing = 0
//! ```
//!
//! Formulas follow Snyder, *Map Projections: A Working Manual* (USGS PP 1395), §14.
//! A [`Projector`] is cheap to copy and holds the precomputed cone constants, so it can be
//! shared across worker threads without synchronization.
//!
//! ## See also
//! ------------
//! * [`crate::spatial_index::CandidateIndex`] – Buffers footprints in the projected frame.
//! * [`crate::matching`] – Projects every GPS sample before querying the index.
use nalgebra::Point2;

use crate::constants::{Degree, GRS80_INV_FLATTENING, GRS80_MAJOR_AXIS};

/// A geographic position in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lon: Degree,
    pub lat: Degree,
}

impl GeoPoint {
    pub fn new(lon: Degree, lat: Degree) -> Self {
        GeoPoint { lon, lat }
    }

    /// Both coordinates are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

/// Parameters of an Albers equal-area conic projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlbersParams {
    pub first_parallel: Degree,
    pub second_parallel: Degree,
    pub origin_latitude: Degree,
    pub central_meridian: Degree,
    pub semi_major_axis: f64,
    pub inverse_flattening: f64,
}

/// CONUS Albers (EPSG:5070) on GRS80.
pub const CONUS_ALBERS: AlbersParams = AlbersParams {
    first_parallel: 29.5,
    second_parallel: 45.5,
    origin_latitude: 23.0,
    central_meridian: -96.0,
    semi_major_axis: GRS80_MAJOR_AXIS,
    inverse_flattening: GRS80_INV_FLATTENING,
};

/// Planar projector with the cone constants precomputed.
#[derive(Debug, Clone, Copy)]
pub struct Projector {
    a: f64,
    e: f64,
    e2: f64,
    n: f64,
    c: f64,
    rho0: f64,
    lon0: f64,
}

impl Default for Projector {
    fn default() -> Self {
        Projector::new(&CONUS_ALBERS)
    }
}

impl Projector {
    /// Precompute the cone constant `n`, the constant `C` and the origin radius `ρ0`.
    pub fn new(params: &AlbersParams) -> Self {
        let a = params.semi_major_axis;
        let f = 1.0 / params.inverse_flattening;
        let e2 = f * (2.0 - f);
        let e = e2.sqrt();

        let phi1 = params.first_parallel.to_radians();
        let phi2 = params.second_parallel.to_radians();
        let phi0 = params.origin_latitude.to_radians();

        let m1 = m_factor(phi1, e2);
        let m2 = m_factor(phi2, e2);
        let q0 = q_factor(phi0, e, e2);
        let q1 = q_factor(phi1, e, e2);
        let q2 = q_factor(phi2, e, e2);

        let n = if (phi1 - phi2).abs() < 1e-12 {
            phi1.sin()
        } else {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        };
        let c = m1 * m1 + n * q1;
        let rho0 = a * (c - n * q0).sqrt() / n;

        Projector {
            a,
            e,
            e2,
            n,
            c,
            rho0,
            lon0: params.central_meridian.to_radians(),
        }
    }

    /// Project a geographic point into the planar frame (meters).
    ///
    /// Pure and deterministic; non-finite inputs propagate to non-finite outputs.
    pub fn project(&self, point: &GeoPoint) -> Point2<f64> {
        let phi = point.lat.to_radians();
        let lam = point.lon.to_radians();

        let q = q_factor(phi, self.e, self.e2);
        let rho = self.a * (self.c - self.n * q).max(0.0).sqrt() / self.n;
        let theta = self.n * (lam - self.lon0);

        Point2::new(rho * theta.sin(), self.rho0 - rho * theta.cos())
    }
}

/// Snyder eq. 14-15: `m = cos φ / sqrt(1 - e² sin² φ)`
#[inline]
fn m_factor(phi: f64, e2: f64) -> f64 {
    let s = phi.sin();
    phi.cos() / (1.0 - e2 * s * s).sqrt()
}

/// Snyder eq. 3-12: authalic `q` function.
#[inline]
fn q_factor(phi: f64, e: f64, e2: f64) -> f64 {
    let s = phi.sin();
    let es = e * s;
    (1.0 - e2) * (s / (1.0 - e2 * s * s) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
}
