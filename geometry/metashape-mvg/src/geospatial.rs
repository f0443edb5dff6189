//! Geodetic helpers for choosing an output coordinate reference system.
//!
//! The chunk transform maps into earth-centered, earth-fixed coordinates
//! (EPSG:4978). Downstream products are usually written in the UTM zone
//! containing the scene.

use nalgebra::Point3;

/// Earth-centered, earth-fixed coordinates on WGS84.
pub const CHUNK_WORLD_EPSG: u32 = 4978;
/// Geographic latitude/longitude on WGS84.
pub const WGS84_EPSG: u32 = 4326;

const WGS84_A: f64 = 6_378_137.0;
const WGS84_F: f64 = 1.0 / 298.257_223_563;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geodetic {
    pub lat_deg: f64,
    pub lon_deg: f64,
    /// Height above the ellipsoid in meters.
    pub height: f64,
}

pub fn geodetic_to_ecef(geo: &Geodetic) -> Point3<f64> {
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let (lat, lon) = (geo.lat_deg.to_radians(), geo.lon_deg.to_radians());
    let n = WGS84_A / (1.0 - e2 * lat.sin().powi(2)).sqrt();
    Point3::new(
        (n + geo.height) * lat.cos() * lon.cos(),
        (n + geo.height) * lat.cos() * lon.sin(),
        (n * (1.0 - e2) + geo.height) * lat.sin(),
    )
}

/// Convert ECEF to geodetic coordinates using Bowring's method.
///
/// Accurate to well below a millimeter for points near the earth's surface.
pub fn ecef_to_geodetic(pt: &Point3<f64>) -> Geodetic {
    let a = WGS84_A;
    let b = a * (1.0 - WGS84_F);
    let e2 = WGS84_F * (2.0 - WGS84_F);
    let ep2 = (a * a - b * b) / (b * b);

    let p = pt.x.hypot(pt.y);
    let lon = pt.y.atan2(pt.x);
    let theta = (pt.z * a).atan2(p * b);
    let lat = (pt.z + ep2 * b * theta.sin().powi(3)).atan2(p - e2 * a * theta.cos().powi(3));
    let sin_lat = lat.sin();
    let height = p * lat.cos() + pt.z * sin_lat - a * (1.0 - e2 * sin_lat * sin_lat).sqrt();

    Geodetic {
        lat_deg: lat.to_degrees(),
        lon_deg: lon.to_degrees(),
        height,
    }
}

/// EPSG code of the WGS84 UTM zone for a latitude/longitude in degrees.
///
/// With `assume_western_hemisphere`, a positive longitude is negated first.
/// This handles sources which drop the sign of western longitudes.
pub fn utm_epsg_code(lat_deg: f64, lon_deg: f64, assume_western_hemisphere: bool) -> u32 {
    let lon_deg = if assume_western_hemisphere && lon_deg > 0.0 {
        -lon_deg
    } else {
        lon_deg
    };
    let hemisphere = ((45.0 + lat_deg) / 90.0).round_ties_even();
    let zone = ((183.0 + lon_deg) / 6.0).round_ties_even();
    (32700.0 - hemisphere * 100.0 + zone) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_utm_codes() {
        // Portland, Oregon: UTM 10N.
        assert_eq!(utm_epsg_code(45.5, -122.7, false), 32610);
        assert_eq!(utm_epsg_code(45.5, 122.7, true), 32610);
        // Cape Town: UTM 34S.
        assert_eq!(utm_epsg_code(-33.9, 18.4, false), 32734);
        assert_eq!(utm_epsg_code(-33.9, 18.4, true), 32727);
        // Exactly on the equator rounds half to even, i.e. south.
        assert_eq!(utm_epsg_code(0.0, -122.7, false), 32710);
    }

    #[test]
    fn test_ecef_geodetic() {
        let on_equator = ecef_to_geodetic(&Point3::new(WGS84_A, 0.0, 0.0));
        assert_relative_eq!(on_equator.lat_deg, 0.0, epsilon = 1e-12);
        assert_relative_eq!(on_equator.lon_deg, 0.0, epsilon = 1e-12);
        assert_relative_eq!(on_equator.height, 0.0, epsilon = 1e-6);

        let geo = Geodetic {
            lat_deg: 38.54,
            lon_deg: -121.74,
            height: 120.0,
        };
        let back = ecef_to_geodetic(&geodetic_to_ecef(&geo));
        assert_relative_eq!(back.lat_deg, geo.lat_deg, epsilon = 1e-8);
        assert_relative_eq!(back.lon_deg, geo.lon_deg, epsilon = 1e-8);
        assert_relative_eq!(back.height, geo.height, epsilon = 1e-2);
    }
}
