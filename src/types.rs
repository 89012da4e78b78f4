use geo::{HaversineDistance, Point};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{TrackerError, TrackerResult};

/// WGS84 position in degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Great-circle distance in meters
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        let a = Point::new(self.longitude, self.latitude);
        let b = Point::new(other.longitude, other.latitude);
        a.haversine_distance(&b)
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// Location fix as reported by the platform provider
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub point: GeoPoint,
    /// Horizontal accuracy radius (meters)
    pub accuracy: f64,
    /// Ground speed (m/s)
    pub speed: f64,
    /// Monotonic milliseconds
    pub timestamp: u64,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64, speed: f64, timestamp: u64) -> Self {
        Self {
            point: GeoPoint::new(latitude, longitude),
            accuracy,
            speed,
            timestamp,
        }
    }

    /// Rejects NaN/inf and negative metadata; sensor noise of this kind is dropped, not surfaced.
    pub fn is_valid(&self) -> bool {
        self.point.is_valid()
            && self.accuracy.is_finite()
            && self.accuracy >= 0.0
            && self.speed.is_finite()
            && self.speed >= 0.0
    }
}

/// Raw accelerometer sample (m/s², gravity included)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Monotonic milliseconds
    pub timestamp: u64,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp: u64) -> Self {
        Self { x, y, z, timestamp }
    }

    pub fn magnitude(&self) -> f64 {
        Vector3::new(self.x, self.y, self.z).norm()
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Encode a track as `lat,lng;` pairs, the format the persistence layer stores.
///
/// `{:?}` keeps a trailing `.0` on integral coordinates so the text matches
/// what the mobile client has always written.
pub fn encode_track(points: &[GeoPoint]) -> String {
    let mut out = String::with_capacity(points.len() * 24);
    for p in points {
        out.push_str(&format!("{:?},{:?};", p.latitude, p.longitude));
    }
    out
}

pub fn decode_track(encoded: &str) -> TrackerResult<Vec<GeoPoint>> {
    encoded
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (lat, lng) = pair
                .split_once(',')
                .ok_or_else(|| TrackerError::MalformedTrack(format!("missing comma in {pair:?}")))?;
            let latitude = lat
                .trim()
                .parse::<f64>()
                .map_err(|e| TrackerError::MalformedTrack(format!("bad latitude {lat:?}: {e}")))?;
            let longitude = lng
                .trim()
                .parse::<f64>()
                .map_err(|e| TrackerError::MalformedTrack(format!("bad longitude {lng:?}: {e}")))?;
            Ok(GeoPoint::new(latitude, longitude))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_accel_magnitude() {
        let accel = AccelSample::new(3.0, 4.0, 0.0, 0);
        assert_eq!(accel.magnitude(), 5.0);
    }

    #[test]
    fn test_distance_one_millidegree_latitude() {
        let a = GeoPoint::new(40.0, -120.0);
        let b = GeoPoint::new(40.001, -120.0);
        // ~111.2 m per millidegree of latitude
        assert_relative_eq!(a.distance_to(&b), 111.2, epsilon = 0.2);
        assert_eq!(a.distance_to(&a), 0.0);
    }

    #[test]
    fn test_invalid_fixes() {
        assert!(RawFix::new(39.9, 116.4, 5.0, 2.0, 1).is_valid());
        assert!(!RawFix::new(f64::NAN, 116.4, 5.0, 2.0, 1).is_valid());
        assert!(!RawFix::new(91.0, 116.4, 5.0, 2.0, 1).is_valid());
        assert!(!RawFix::new(39.9, 116.4, -1.0, 2.0, 1).is_valid());
        assert!(!RawFix::new(39.9, 116.4, 5.0, f64::INFINITY, 1).is_valid());
        assert!(!AccelSample::new(0.0, f64::NAN, 9.8, 0).is_valid());
    }

    #[test]
    fn test_track_encoding_format() {
        let track = vec![GeoPoint::new(39.9042, 116.4074), GeoPoint::new(40.0, -120.5)];
        assert_eq!(encode_track(&track), "39.9042,116.4074;40.0,-120.5;");
        assert_eq!(encode_track(&[]), "");
    }

    #[test]
    fn test_track_decoding() {
        let decoded = decode_track("39.9042,116.4074;40.0,-120.5;").unwrap();
        assert_eq!(decoded, vec![GeoPoint::new(39.9042, 116.4074), GeoPoint::new(40.0, -120.5)]);
        assert!(decode_track("").unwrap().is_empty());
        assert!(matches!(decode_track("39.9;"), Err(TrackerError::MalformedTrack(_))));
        assert!(matches!(decode_track("abc,1.0;"), Err(TrackerError::MalformedTrack(_))));
    }
}
