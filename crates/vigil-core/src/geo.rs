//! Great-circle distance on the WGS-84 mean sphere.

use crate::subject::GeoPoint;

/// IUGG mean Earth radius.
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Haversine distance between two points, in kilometres.
///
/// Returns `None` when either point is not a finite, in-range coordinate, so
/// callers can fall back to another ordering instead of sorting on `NaN`.
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> Option<f64> {
  if !is_valid(a) || !is_valid(b) {
    return None;
  }

  let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
  let d_lat = (b.lat - a.lat).to_radians();
  let d_lng = (b.lng - a.lng).to_radians();

  let h = (d_lat / 2.0).sin().powi(2)
    + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
  let c = 2.0 * h.sqrt().min(1.0).asin();

  Some(EARTH_RADIUS_KM * c)
}

fn is_valid(p: GeoPoint) -> bool {
  p.lat.is_finite()
    && p.lng.is_finite()
    && (-90.0..=90.0).contains(&p.lat)
    && (-180.0..=180.0).contains(&p.lng)
}
