//! Sky position to nested HEALPix cell.
//!
//! Implements the Gorski et al. (2005) projection for the nested scheme: the
//! sphere is cut into 12 base faces, each face into a `nside × nside` grid
//! with `nside = 2^order`, and the grid position is interleaved into a
//! Z-order index.

use crate::dim::Dimension;
use crate::error::{MocError, Result};
use std::f64::consts::PI;

/// Nested HEALPix cell of `(lon_deg, lat_deg)` at `order`.
///
/// Longitude is wrapped into `[0, 360)`; latitude must lie in `[-90, 90]`.
pub fn lonlat_to_cell(order: u8, lon_deg: f64, lat_deg: f64) -> Result<u64> {
    Dimension::Space.check_order(order)?;
    if !lon_deg.is_finite() {
        return Err(MocError::InvalidCoordinate(format!(
            "longitude {lon_deg} is not finite"
        )));
    }
    if !lat_deg.is_finite() || !(-90.0..=90.0).contains(&lat_deg) {
        return Err(MocError::InvalidCoordinate(format!(
            "latitude {lat_deg} is outside [-90, 90]"
        )));
    }

    let lon = lon_deg.rem_euclid(360.0);
    let phi = lon.to_radians();
    let z = libm::sin(lat_deg.to_radians());
    let nside = 1u64 << order;

    let (face, ix, iy) = face_and_position(phi, z, nside);
    Ok(((face as u64) << (2 * order as u32)) + interleave(ix, iy, order))
}

/// Base face (0..12) and in-face grid position of a point.
fn face_and_position(phi: f64, z: f64, nside: u64) -> (u32, u64, u64) {
    let tt = (phi * 2.0 / PI).min(4.0 - f64::EPSILON);
    let (face, ix, iy) = if libm::fabs(z) <= 2.0 / 3.0 {
        equatorial(tt, z, nside)
    } else {
        polar(tt, z, nside)
    };
    let last = nside as i64 - 1;
    (face, ix.clamp(0, last) as u64, iy.clamp(0, last) as u64)
}

fn equatorial(tt: f64, z: f64, nside: u64) -> (u32, i64, i64) {
    let n = nside as i64;
    let temp1 = nside as f64 * (0.5 + tt);
    let temp2 = nside as f64 * z * 0.75;
    let jp = libm::floor(temp1 - temp2) as i64;
    let jm = libm::floor(temp1 + temp2) as i64;
    let ifp = jp / n;
    let ifm = jm / n;
    let face = match (ifp, ifm) {
        (4, _) => ((ifm + 4) % 4) as u32,
        (_, 4) => ((ifp + 4) % 4 + 4) as u32,
        _ if ifp == ifm => (ifp + 4) as u32,
        _ if ifp < ifm => ifp as u32,
        _ => (ifm + 8) as u32,
    };
    let ix = jm - (face as i64 % 4) * n;
    let iy = n - 1 - (jp - (face as i64 / 4) * n);
    (face, ix, iy)
}

fn polar(tt: f64, z: f64, nside: u64) -> (u32, i64, i64) {
    let n = nside as i64;
    let ntt = libm::floor(tt);
    let tp = tt - ntt;
    let tmp = nside as f64 * libm::sqrt(3.0 * (1.0 - libm::fabs(z)));
    let jp = ((tp * tmp) as i64).min(n - 1);
    let jm = (((1.0 - tp) * tmp) as i64).min(n - 1);
    let column = (ntt as u32) % 4;
    if z > 0.0 {
        (column, n - jm - 1, n - jp - 1)
    } else {
        (column + 8, jp, jm)
    }
}

/// Z-order interleave: bit `i` of `ix` lands at bit `2i`, bit `i` of `iy` at
/// bit `2i + 1`.
fn interleave(ix: u64, iy: u64, order: u8) -> u64 {
    let mut result = 0u64;
    for i in 0..order as u32 {
        result |= ((ix >> i) & 1) << (2 * i);
        result |= ((iy >> i) & 1) << (2 * i + 1);
    }
    result
}
