use serde::{Deserialize, Serialize};

/// Mean earth radius used for all spherical computations, in meters.
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_007.2;

/// Geodetic position. Altitude is carried along unchanged by projections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl Coordinate {
    pub fn new(latitude_deg: f64, longitude_deg: f64, altitude_m: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            altitude_m,
        }
    }

    pub fn with_altitude(self, altitude_m: f64) -> Self {
        Self { altitude_m, ..self }
    }

    /// Great-circle (haversine) distance, ignoring altitude.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let lat_a = self.latitude_deg.to_radians();
        let lat_b = other.latitude_deg.to_radians();

        let d_lat_half = (lat_b - lat_a) / 2.0;
        let d_lon_half = (other.longitude_deg - self.longitude_deg).to_radians() / 2.0;

        let a = d_lat_half.sin() * d_lat_half.sin()
            + d_lon_half.sin() * d_lon_half.sin() * lat_a.cos() * lat_b.cos();
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_MEAN_RADIUS_M * c
    }

    /// Initial bearing towards `other` in degrees, within `[0, 360)`.
    ///
    /// Coincident points yield an arbitrary (but finite) bearing.
    pub fn azimuth_to(&self, other: &Coordinate) -> f64 {
        let lat_a = self.latitude_deg.to_radians();
        let lat_b = other.latitude_deg.to_radians();
        let d_lon = (other.longitude_deg - self.longitude_deg).to_radians();

        let y = d_lon.sin() * lat_b.cos();
        let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * d_lon.cos();

        normalize_bearing(y.atan2(x).to_degrees())
    }

    /// Point reached by travelling `distance_m` along `azimuth_deg` on the sphere.
    pub fn at_distance_and_azimuth(&self, distance_m: f64, azimuth_deg: f64) -> Coordinate {
        let lat = self.latitude_deg.to_radians();
        let lon = self.longitude_deg.to_radians();
        let bearing = azimuth_deg.to_radians();
        let ratio = distance_m / EARTH_MEAN_RADIUS_M;

        let lat_target = (lat.sin() * ratio.cos() + lat.cos() * ratio.sin() * bearing.cos()).asin();
        let lon_target = lon
            + (bearing.sin() * ratio.sin() * lat.cos())
                .atan2(ratio.cos() - lat.sin() * lat_target.sin());

        Coordinate {
            latitude_deg: lat_target.to_degrees(),
            longitude_deg: normalize_longitude(lon_target.to_degrees()),
            altitude_m: self.altitude_m,
        }
    }
}

/// Wraps any bearing into `[0, 360)`.
pub fn normalize_bearing(bearing_deg: f64) -> f64 {
    let wrapped = bearing_deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to exactly 360.0
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Smallest absolute angle between two bearings, within `[0, 180]`.
pub fn bearing_difference(a_deg: f64, b_deg: f64) -> f64 {
    let d = (a_deg - b_deg).rem_euclid(360.0);
    d.min(360.0 - d)
}

fn normalize_longitude(longitude_deg: f64) -> f64 {
    (longitude_deg + 180.0).rem_euclid(360.0) - 180.0
}
