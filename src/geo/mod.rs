use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Average courier speed assumed by every ETA in the system.
pub const AVERAGE_SPEED_KMH: f64 = 30.0;

/// Fixed pickup/handover overhead added to total-route estimates.
pub const HANDLING_OVERHEAD_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lon = (delta_lon / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lon * sin_lon;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Minutes to travel `distance_km` at the assumed average speed,
/// truncated to whole minutes.
pub fn travel_minutes(distance_km: f64) -> i64 {
    (distance_km / AVERAGE_SPEED_KMH * 60.0) as i64
}

/// Total-route estimate: travel time plus the fixed handling overhead.
pub fn route_minutes(total_distance_km: f64) -> i64 {
    travel_minutes(total_distance_km) + HANDLING_OVERHEAD_MINUTES
}

#[cfg(test)]
mod tests {
    use super::{GeoPoint, haversine_km, route_minutes, travel_minutes};

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 37.5665,
            lon: 126.9780,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lon: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lon: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn travel_minutes_truncates_to_whole_minutes() {
        // 10 km at 30 km/h is exactly 20 minutes.
        assert_eq!(travel_minutes(10.0), 20);
        // 5.4 km is 10.8 minutes; fractional minutes are dropped.
        assert_eq!(travel_minutes(5.4), 10);
        assert_eq!(travel_minutes(0.0), 0);
    }

    #[test]
    fn route_minutes_adds_handling_overhead() {
        assert_eq!(route_minutes(15.0), 30 + 10);
    }
}
