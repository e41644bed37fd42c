//! Integration tests for `SqliteStore` against an in-memory database.

use std::collections::HashSet;

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;
use vigil_core::{
  contact::{ChannelKind, Tier},
  incident::{GrantOutcome, IncidentStatus, NewIncident, TriggerReason},
  store::{
    ContactDirectory, IncidentStore, LocationStore, NotificationLedger, SafetyCheckStore,
  },
  subject::GeoPoint,
};

use crate::{NewContact, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn contact(subject_id: Uuid, tier: Tier) -> NewContact {
  NewContact {
    subject_id,
    recipient_id: Uuid::new_v4(),
    tier,
    priority: None,
    always_share: false,
  }
}

fn new_incident(subject_id: Uuid, source_check_id: Option<Uuid>) -> NewIncident {
  NewIncident {
    subject_id,
    trigger: TriggerReason::CurfewTimeout,
    last_known: None,
    source_check_id,
  }
}

// ─── Contact directory ───────────────────────────────────────────────────────

#[tokio::test]
async fn subject_last_known_is_latest_sample() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let t0 = Utc.with_ymd_and_hms(2026, 2, 19, 22, 0, 0).unwrap();

  s.record_location(subject.subject_id, GeoPoint::new(1.0, 1.0), t0).await.unwrap();
  s.record_location(subject.subject_id, GeoPoint::new(2.0, 2.0), t0 + Duration::minutes(5))
    .await
    .unwrap();

  let fetched = s.get_subject(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(fetched.display_name, "Alice");
  assert_eq!(fetched.last_known, Some(GeoPoint::new(2.0, 2.0)));
}

#[tokio::test]
async fn get_subject_missing_returns_none() {
  let s = store().await;
  assert!(s.get_subject(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn tier_contacts_filters_by_tier() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  s.add_contact(contact(subject.subject_id, Tier::ONE)).await.unwrap();
  s.add_contact(contact(subject.subject_id, Tier::ONE)).await.unwrap();
  s.add_contact(contact(subject.subject_id, Tier::TWO)).await.unwrap();

  assert_eq!(s.tier_contacts(subject.subject_id, Tier::ONE).await.unwrap().len(), 2);
  assert_eq!(s.tier_contacts(subject.subject_id, Tier::TWO).await.unwrap().len(), 1);
  assert!(s.tier_contacts(subject.subject_id, Tier::THREE).await.unwrap().is_empty());
  assert!(s.tier_contacts(subject.subject_id, Tier::new(9).unwrap()).await.unwrap().is_empty());
}

#[tokio::test]
async fn contact_location_is_latest_sample_shared_or_not() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();

  let mut sharing = contact(subject.subject_id, Tier::ONE);
  sharing.always_share = true;
  let sharing = s.add_contact(sharing).await.unwrap();
  let private = s.add_contact(contact(subject.subject_id, Tier::ONE)).await.unwrap();

  let silent = s.add_contact(contact(subject.subject_id, Tier::ONE)).await.unwrap();

  let at = Utc::now();
  s.record_location(sharing.recipient_id, GeoPoint::new(10.0, 20.0), at).await.unwrap();
  s.record_location(private.recipient_id, GeoPoint::new(30.0, 40.0), at).await.unwrap();
  s.record_location(private.recipient_id, GeoPoint::new(31.0, 41.0), at + Duration::minutes(1))
    .await
    .unwrap();

  let contacts = s.tier_contacts(subject.subject_id, Tier::ONE).await.unwrap();
  let find = |id| contacts.iter().find(|c| c.contact_id == id).unwrap();
  assert_eq!(find(sharing.contact_id).location, Some(GeoPoint::new(10.0, 20.0)));
  assert!(find(sharing.contact_id).always_share);
  assert_eq!(find(private.contact_id).location, Some(GeoPoint::new(31.0, 41.0)));
  assert!(!find(private.contact_id).always_share);
  assert_eq!(find(silent.contact_id).location, None);
}

#[tokio::test]
async fn reachable_addresses_per_channel() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let c = s.add_contact(contact(subject.subject_id, Tier::ONE)).await.unwrap();

  s.add_address(c.recipient_id, ChannelKind::Email, "bob@example.com").await.unwrap();
  s.add_address(c.recipient_id, ChannelKind::Push, "device-1").await.unwrap();
  s.add_address(c.recipient_id, ChannelKind::Push, "device-1").await.unwrap();

  let addrs = s.reachable_addresses(c.contact_id).await.unwrap();
  assert_eq!(addrs.for_channel(ChannelKind::Push).collect::<Vec<_>>(), ["device-1"]);
  assert_eq!(addrs.for_channel(ChannelKind::Email).collect::<Vec<_>>(), ["bob@example.com"]);
}

#[tokio::test]
async fn contact_without_addresses_is_empty() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let c = s.add_contact(contact(subject.subject_id, Tier::ONE)).await.unwrap();
  assert!(s.reachable_addresses(c.contact_id).await.unwrap().addresses.is_empty());
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_grant_is_idempotent() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let c = s.add_contact(contact(subject.subject_id, Tier::ONE)).await.unwrap();
  let incident = s.insert_incident(new_incident(subject.subject_id, None)).await.unwrap().incident;

  assert!(!s.has_grant(incident.incident_id, c.contact_id).await.unwrap());

  let first = s.record_grant(incident.incident_id, c.contact_id, Tier::ONE).await.unwrap();
  assert!(matches!(first, GrantOutcome::Created(_)));

  // A later tier does not overwrite the original grant.
  let second = s.record_grant(incident.incident_id, c.contact_id, Tier::TWO).await.unwrap();
  assert_eq!(second, GrantOutcome::AlreadyExists);

  assert!(s.has_grant(incident.incident_id, c.contact_id).await.unwrap());
  let grants = s.list_grants(incident.incident_id).await.unwrap();
  assert_eq!(grants.len(), 1);
  assert_eq!(grants[0].tier, Tier::ONE);
}

#[tokio::test]
async fn concurrent_grants_create_exactly_one() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let c = s.add_contact(contact(subject.subject_id, Tier::ONE)).await.unwrap();
  let incident = s.insert_incident(new_incident(subject.subject_id, None)).await.unwrap().incident;

  let mut handles = Vec::new();
  for _ in 0..16 {
    let s = s.clone();
    let (incident_id, contact_id) = (incident.incident_id, c.contact_id);
    handles.push(tokio::spawn(async move {
      s.record_grant(incident_id, contact_id, Tier::ONE).await.unwrap()
    }));
  }

  let mut created = 0;
  for h in handles {
    if matches!(h.await.unwrap(), GrantOutcome::Created(_)) {
      created += 1;
    }
  }
  assert_eq!(created, 1);
  assert_eq!(s.list_grants(incident.incident_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn list_notified_contacts_spans_tiers() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let a = s.add_contact(contact(subject.subject_id, Tier::ONE)).await.unwrap();
  let b = s.add_contact(contact(subject.subject_id, Tier::TWO)).await.unwrap();
  let incident = s.insert_incident(new_incident(subject.subject_id, None)).await.unwrap().incident;

  s.record_grant(incident.incident_id, a.contact_id, Tier::ONE).await.unwrap();
  s.record_grant(incident.incident_id, b.contact_id, Tier::TWO).await.unwrap();

  let notified = s.list_notified_contacts(incident.incident_id).await.unwrap();
  assert_eq!(notified, HashSet::from([a.contact_id, b.contact_id]));
}

// ─── Incidents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_incident() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();

  let mut input = new_incident(subject.subject_id, None);
  input.last_known = Some(GeoPoint::new(51.5, -0.12));
  let inserted = s.insert_incident(input).await.unwrap();
  assert!(inserted.created);

  let fetched = s.get_incident(inserted.incident.incident_id).await.unwrap().unwrap();
  assert_eq!(fetched.status, IncidentStatus::Active);
  assert_eq!(fetched.trigger, TriggerReason::CurfewTimeout);
  assert_eq!(fetched.last_known, Some(GeoPoint::new(51.5, -0.12)));
  assert_eq!(fetched.created_at, inserted.incident.created_at);
}

#[tokio::test]
async fn insert_incident_for_same_check_returns_existing() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let check = s.add_pending_check(subject.subject_id, Utc::now()).await.unwrap();

  let first = s
    .insert_incident(new_incident(subject.subject_id, Some(check.check_id)))
    .await
    .unwrap();
  let second = s
    .insert_incident(new_incident(subject.subject_id, Some(check.check_id)))
    .await
    .unwrap();

  assert!(first.created);
  assert!(!second.created);
  assert_eq!(first.incident.incident_id, second.incident.incident_id);
  assert_eq!(s.list_active_incidents().await.unwrap().len(), 1);
}

#[tokio::test]
async fn resolve_removes_from_active_list() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let a = s.insert_incident(new_incident(subject.subject_id, None)).await.unwrap().incident;
  let b = s.insert_incident(new_incident(subject.subject_id, None)).await.unwrap().incident;

  assert!(s.resolve_incident(a.incident_id).await.unwrap());
  assert!(!s.resolve_incident(a.incident_id).await.unwrap());

  let active = s.list_active_incidents().await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].incident_id, b.incident_id);
  assert!(active[0].created_at.is_some());
}

#[tokio::test]
async fn zoneless_created_at_reads_as_utc() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let incident = s.insert_incident(new_incident(subject.subject_id, None)).await.unwrap().incident;

  let id_str = incident.incident_id.hyphenated().to_string();
  s.conn
    .call(move |conn| {
      conn.execute(
        "UPDATE incidents SET created_at = '2026-02-19 23:00:00' WHERE incident_id = ?1",
        rusqlite::params![id_str],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let fetched = s.get_incident(incident.incident_id).await.unwrap().unwrap();
  assert_eq!(fetched.created_at, Utc.with_ymd_and_hms(2026, 2, 19, 23, 0, 0).unwrap());
}

#[tokio::test]
async fn location_history_preserves_timestamps_and_ignores_repeats() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let t0 = Utc.with_ymd_and_hms(2026, 2, 19, 20, 0, 0).unwrap();
  for i in 0..3_i32 {
    let at = t0 + Duration::minutes(i64::from(i));
    s.record_location(subject.subject_id, GeoPoint::new(f64::from(i), 0.0), at)
      .await
      .unwrap();
  }
  // A second fix in the same instant is its own sample.
  s.record_location(subject.subject_id, GeoPoint::new(9.0, 9.0), t0).await.unwrap();

  let samples = s.location_samples(subject.subject_id).await.unwrap();
  assert_eq!(samples.len(), 4);
  assert!(samples.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
  assert_eq!(samples[0].recorded_at, samples[1].recorded_at);
  assert_ne!(samples[0].point, samples[1].point);

  let incident = s.insert_incident(new_incident(subject.subject_id, None)).await.unwrap().incident;
  s.append_location_history(incident.incident_id, samples.clone()).await.unwrap();
  s.append_location_history(incident.incident_id, samples.clone()).await.unwrap();

  let history = s.location_history(incident.incident_id).await.unwrap();
  assert_eq!(history.len(), 4);
  assert_eq!(history, samples);
}

// ─── Pending checks ──────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_checks_excludes_future_and_responded() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let now = Utc::now();

  let overdue  = s.add_pending_check(subject.subject_id, now - Duration::minutes(1)).await.unwrap();
  let on_time  = s.add_pending_check(subject.subject_id, now).await.unwrap();
  let _future  = s.add_pending_check(subject.subject_id, now + Duration::minutes(5)).await.unwrap();
  let answered = s.add_pending_check(subject.subject_id, now - Duration::minutes(2)).await.unwrap();
  assert!(s.mark_responded(answered.check_id, now).await.unwrap());

  let expired: Vec<_> = s
    .list_expired_checks(now)
    .await
    .unwrap()
    .into_iter()
    .map(|c| c.check_id)
    .collect();
  assert_eq!(expired, [overdue.check_id, on_time.check_id]);
}

#[tokio::test]
async fn undecodable_check_does_not_hide_others() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let now = Utc::now();
  let overdue = s.add_pending_check(subject.subject_id, now - Duration::minutes(1)).await.unwrap();

  let subject_str = subject.subject_id.hyphenated().to_string();
  let bad_id = Uuid::new_v4().hyphenated().to_string();
  s.conn
    .call(move |conn| {
      conn.execute(
        "INSERT INTO pending_safety_checks (check_id, subject_id, expires_at)
         VALUES (?1, ?2, 'garbage')",
        rusqlite::params![bad_id, subject_str],
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let expired: Vec<_> = s
    .list_expired_checks(now)
    .await
    .unwrap()
    .into_iter()
    .map(|c| c.check_id)
    .collect();
  assert_eq!(expired, [overdue.check_id]);
}

#[tokio::test]
async fn mark_responded_is_terminal() {
  let s = store().await;
  let subject = s.add_subject("Alice").await.unwrap();
  let check = s.add_pending_check(subject.subject_id, Utc::now()).await.unwrap();
  let first_at = Utc::now();

  assert!(s.mark_responded(check.check_id, first_at).await.unwrap());
  assert!(!s.mark_responded(check.check_id, first_at + Duration::hours(1)).await.unwrap());

  let fetched = s.get_check(check.check_id).await.unwrap().unwrap();
  assert!(!fetched.is_pending());
  assert_eq!(
    fetched.responded_at.unwrap().timestamp_micros(),
    first_at.timestamp_micros()
  );
}
