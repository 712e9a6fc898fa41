//! Two-factor match score: departure time proximity times route proximity.

use carpool_shared::{GeoPoint, Trip};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
/// Minutes of departure-time difference costing one score point
pub const MINUTES_PER_POINT: f64 = 7.2;
/// Kilometres of endpoint distance costing one score point
pub const KM_PER_POINT: f64 = 0.5;

/// Great-circle distance in kilometres
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// 100 for simultaneous departures, 0 at twelve hours apart
pub fn time_factor(minutes_apart: f64) -> f64 {
    (100.0 - minutes_apart.abs() / MINUTES_PER_POINT).max(0.0)
}

/// 100 for the same point, 0 at 50 km
pub fn distance_factor(km: f64) -> f64 {
    (100.0 - km / KM_PER_POINT).max(0.0)
}

pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn score(trip: &Trip, candidate: &Trip) -> f64 {
    let minutes_apart = (trip.departure_time - candidate.departure_time).num_seconds() as f64 / 60.0;
    let mut score = 100.0 * time_factor(minutes_apart) / 100.0;

    let departure = distance_factor(haversine_km(trip.departure_point(), candidate.departure_point()));
    let destination = distance_factor(haversine_km(trip.destination_point(), candidate.destination_point()));
    score *= (departure + destination) / 200.0;

    round2(score)
}
