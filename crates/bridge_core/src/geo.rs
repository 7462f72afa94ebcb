use crate::models::ChargeLocation;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers (haversine).
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// A location retained by [`filter_by_proximity`], with its distance to the
/// search point rounded to two decimals.
#[derive(Debug, Clone)]
pub struct NearbyLocation {
    pub location: ChargeLocation,
    pub distance_km: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Beckn distance label, e.g. `"3.2 km"`, `"0.0 km"`.
pub fn format_distance(distance_km: f64) -> String {
    let mut text = distance_km.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    format!("{text} km")
}

/// Keep the locations within `radius_km` of the target, nearest first.
///
/// Locations without parsable coordinates, or sitting exactly on (0, 0), are
/// dropped. The radius check uses the unrounded distance.
pub fn filter_by_proximity(
    locations: Vec<ChargeLocation>,
    target_lat: f64,
    target_lon: f64,
    radius_km: f64,
) -> Vec<NearbyLocation> {
    let mut nearby: Vec<NearbyLocation> = locations
        .into_iter()
        .filter_map(|location| {
            let (lat, lon) = location.coordinates.as_ref()?.degrees()?;
            if lat == 0.0 && lon == 0.0 {
                return None;
            }
            let distance = distance_km(target_lat, target_lon, lat, lon);
            (distance <= radius_km).then(|| NearbyLocation {
                location,
                distance_km: round2(distance),
            })
        })
        .collect();

    nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
    nearby
}
