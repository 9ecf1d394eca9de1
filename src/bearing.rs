//! # Bearings and yaw angles
//!
//! Angle helpers shared by the orientation estimator and the yaw normalizer.
//!
//! * [`initial_bearing`] – geodesic initial heading from one point to another, in `[0, 360)`.
//! * [`required_yaw`] – rotation between the vehicle heading and the direction of the building,
//!   in `[0, 360)`.
//! * [`normalize_yaw`] – applies the camera mount offset and wraps into `(-180, 180]`.
//!
//! All inputs and outputs are in **degrees**.
use crate::constants::Degree;
use crate::projection::GeoPoint;

/// Initial bearing (forward azimuth) from `from` to `to`, clockwise from north.
///
/// ```text
/// Δλ = λ2 − λ1
/// y  = sin(Δλ)·cos(φ2)
/// x  = cos(φ1)·sin(φ2) − sin(φ1)·cos(φ2)·cos(Δλ)
/// θ  = (atan2(y, x) in degrees + 360) mod 360
/// ```
///
/// Identical points yield `atan2(0, 0) = 0`, i.e. a bearing of `0°`.
pub fn initial_bearing(from: &GeoPoint, to: &GeoPoint) -> Degree {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lon = (to.lon - from.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    wrap_bearing(y.atan2(x).to_degrees())
}

/// Wrap an angle into `[0, 360)`.
#[inline]
pub fn wrap_bearing(angle: Degree) -> Degree {
    let wrapped = (angle + 360.0).rem_euclid(360.0);
    // rem_euclid may round up to the modulus for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Rotation from the vehicle heading to the building direction, in `[0, 360)`.
#[inline]
pub fn required_yaw(bearing_to_building: Degree, heading: Degree) -> Degree {
    wrap_bearing(bearing_to_building - heading)
}

/// Add the mount offset to a required yaw and wrap the result into `(-180, 180]`.
///
/// A single ±360 correction is enough for a required yaw in `[0, 360)` and an offset in
/// `[-180, 180]`. Larger offsets fall back to a modular wrap so the output range holds for
/// any finite input.
pub fn normalize_yaw(required_yaw: Degree, yaw_offset: Degree) -> Degree {
    let mut yaw = required_yaw + yaw_offset;
    if yaw > 180.0 {
        yaw -= 360.0;
    } else if yaw <= -180.0 {
        yaw += 360.0;
    }

    if yaw > -180.0 && yaw <= 180.0 {
        return yaw;
    }

    let wrapped = (yaw + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Full yaw composition: bearing camera → building, relative to `heading`, plus the mount offset.
pub fn camera_yaw(
    camera: &GeoPoint,
    building: &GeoPoint,
    heading: Degree,
    yaw_offset: Degree,
) -> Degree {
    let to_building = initial_bearing(camera, building);
    normalize_yaw(required_yaw(to_building, heading), yaw_offset)
}
