//! Delivery ordering within a tier: wake the closest person first.
//!
//! Ordering only decides who is contacted first. Every contact in the tier
//! is still notified, so a contact whose distance cannot be computed is
//! ranked lower, never dropped.

use std::cmp::Ordering;

use vigil_core::{contact::Contact, geo::distance_km, subject::GeoPoint};

use crate::config::PriorityOrdering;

/// Sort `contacts` for delivery relative to `origin`, the incident's
/// last-known location.
pub fn order_contacts(
  mut contacts: Vec<Contact>,
  origin:       Option<GeoPoint>,
  ordering:     PriorityOrdering,
) -> Vec<Contact> {
  let distance = |c: &Contact| -> Option<f64> {
    let (origin, location) = (origin?, c.location?);
    distance_km(origin, location)
  };

  let mut keyed: Vec<(Option<f64>, Contact)> =
    contacts.drain(..).map(|c| (distance(&c), c)).collect();

  keyed.sort_by(|(da, a), (db, b)| {
    let by_distance = cmp_missing_last(da.as_ref(), db.as_ref(), f64::total_cmp);
    let by_priority = cmp_missing_last(a.priority.as_ref(), b.priority.as_ref(), Ord::cmp);
    let primary = match ordering {
      PriorityOrdering::DistanceFirst => by_distance.then(by_priority),
      PriorityOrdering::PriorityFirst => by_priority.then(by_distance),
    };
    primary.then_with(|| a.contact_id.cmp(&b.contact_id))
  });

  keyed.into_iter().map(|(_, c)| c).collect()
}

/// Forget the position of every contact that does not share its location
/// live, so only always-sharing contacts are ranked by distance.
pub fn hide_unshared_locations(contacts: &mut [Contact]) {
  for contact in contacts.iter_mut().filter(|c| !c.always_share) {
    contact.location = None;
  }
}

fn cmp_missing_last<T>(
  a:   Option<&T>,
  b:   Option<&T>,
  cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
  match (a, b) {
    (Some(a), Some(b)) => cmp(a, b),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
}
