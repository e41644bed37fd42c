//! Monitored subjects and the location samples recorded for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A WGS-84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub lat: f64,
  pub lng: f64,
}

impl GeoPoint {
  pub fn new(lat: f64, lng: f64) -> Self { Self { lat, lng } }
}

/// A monitored user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id:   Uuid,
  pub display_name: String,
  /// Most recent known position, if the subject has ever reported one.
  pub last_known:   Option<GeoPoint>,
}

/// One append-only point in a subject's location trail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
  /// Store-assigned identity; two samples may share a timestamp.
  pub sample_id:   i64,
  pub point:       GeoPoint,
  pub recorded_at: DateTime<Utc>,
}
