//! Engine, lifecycle and sweep behaviour against a real in-memory store.


use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use uuid::Uuid;
use vigil_core::{
  contact::{ChannelKind, Tier},
  incident::{NewIncident, TriggerReason},
  store::{IncidentStore, NotificationLedger},
  subject::{GeoPoint, Subject},
};
use vigil_store_sqlite::NewContact;

use self::fake::{Fixture, RecordingChannel};
use crate::{EscalationConfig, Error, sweep::promotion_tiers};

fn mins(n: i64) -> TimeDelta { TimeDelta::minutes(n) }

// ─── promotion_tiers ─────────────────────────────────────────────────────────

#[test]
fn promotion_tiers_follow_thresholds() {
  let config = EscalationConfig::default();
  assert!(promotion_tiers(mins(5), &config).is_empty());
  assert_eq!(promotion_tiers(mins(10), &config), vec![Tier::TWO]);
  assert_eq!(promotion_tiers(mins(11), &config), vec![Tier::TWO]);
  assert_eq!(promotion_tiers(mins(20), &config), vec![Tier::TWO, Tier::THREE]);
  assert_eq!(promotion_tiers(mins(600), &config), vec![Tier::TWO, Tier::THREE]);
}

#[test]
fn clock_skew_never_promotes() {
  let config = EscalationConfig::default();
  assert!(promotion_tiers(mins(-30), &config).is_empty());
}

// ─── escalate ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn escalating_twice_notifies_once() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  for label in ["a", "b", "c"] {
    fx.push_contact(&alice, Tier::ONE, label).await;
  }
  let opened = fx
    .scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap();
  let incident_id = opened.incident.incident_id;
  assert_eq!(opened.escalation.unwrap().notified, 3);

  let again = fx.engine.escalate(incident_id, Tier::ONE).await.unwrap();
  assert_eq!(again.notified, 0);
  assert_eq!(again.already_notified, 3);
  assert_eq!(fx.push.targets().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_escalations_grant_each_contact_once() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  for label in ["a", "b", "c", "d"] {
    fx.push_contact(&alice, Tier::TWO, label).await;
  }
  let incident_id = fx
    .scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap()
    .incident
    .incident_id;

  let calls: Vec<_> = (0..8)
    .map(|_| {
      let engine = fx.engine.clone();
      tokio::spawn(async move { engine.escalate(incident_id, Tier::TWO).await })
    })
    .collect();

  let mut notified = 0;
  for call in calls {
    notified += call.await.unwrap().unwrap().notified;
  }

  assert_eq!(notified, 4);
  assert_eq!(fx.push.targets_at(2).len(), 4);
  assert_eq!(fx.store.list_grants(incident_id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn unconfigured_tiers_notify_nobody() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  fx.push_contact(&alice, Tier::ONE, "a").await;
  let incident_id = fx
    .scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap()
    .incident
    .incident_id;

  let tier2 = fx.engine.escalate(incident_id, Tier::TWO).await.unwrap();
  assert_eq!(tier2.contacts_at_tier, 0);
  assert_eq!(tier2.notified, 0);

  let tier7 = fx.engine.escalate(incident_id, Tier::new(7).unwrap()).await.unwrap();
  assert_eq!(tier7.tier, 7);
  assert_eq!(tier7.notified, 0);
}

#[tokio::test]
async fn unknown_incident_is_not_found() {
  let fx = Fixture::new().await;
  let err = fx.engine.escalate(Uuid::new_v4(), Tier::ONE).await.unwrap_err();
  assert!(matches!(err, Error::IncidentNotFound(_)));
  assert!(err.is_not_found());
}

#[tokio::test]
async fn email_only_contact_is_reached_by_email() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  fx.contact(&alice, Tier::ONE, None, None, Some(ChannelKind::Email), "mum").await;

  let outcome = fx
    .scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap()
    .escalation
    .unwrap();

  assert_eq!(outcome.notified, 1);
  assert_eq!(outcome.sent.get(&ChannelKind::Email), Some(&1));
  assert_eq!(fx.email.targets(), vec!["email:mum".to_owned()]);
  assert!(fx.push.targets().is_empty());
}

#[tokio::test]
async fn failing_channel_does_not_block_other_channels() {
  let fx =
    Fixture::build(EscalationConfig::default(), RecordingChannel::failing(ChannelKind::Push)).await;
  let alice = fx.subject("Alice").await;
  fx.push_contact(&alice, Tier::ONE, "dad").await;
  fx.contact(&alice, Tier::ONE, None, None, Some(ChannelKind::Email), "mum").await;
  fx.contact(&alice, Tier::ONE, None, None, None, "nowhere").await;

  let opened = fx
    .scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap();
  let outcome = opened.escalation.unwrap();

  assert_eq!(outcome.notified, 3);
  assert_eq!(outcome.failed.get(&ChannelKind::Push), Some(&1));
  assert_eq!(outcome.sent.get(&ChannelKind::Email), Some(&1));
  assert_eq!(outcome.unreachable, 1);

  // Delivery failures do not reopen the grant.
  let again = fx.engine.escalate(opened.incident.incident_id, Tier::ONE).await.unwrap();
  assert_eq!(again.notified, 0);
}

#[tokio::test]
async fn grant_committed_after_timeout_is_still_dispatched() {
  let config = EscalationConfig { storage_timeout_ms: 50, ..Default::default() };
  let fx = Fixture::with_config(config).await;
  let alice = fx.subject("Alice").await;
  fx.push_contact(&alice, Tier::ONE, "dad").await;
  let incident = fx
    .store
    .inner
    .insert_incident(NewIncident {
      subject_id:      alice.subject_id,
      trigger:         TriggerReason::ManualPanic,
      last_known:      None,
      source_check_id: None,
    })
    .await
    .unwrap()
    .incident;

  fx.store.delay_grants(Duration::from_millis(300));
  let outcome = fx.engine.escalate(incident.incident_id, Tier::ONE).await.unwrap();
  assert_eq!(outcome.notified, 1);
  assert_eq!(outcome.grant_failures, 0);
  assert_eq!(fx.push.targets(), vec!["push:dad".to_owned()]);

  let again = fx.engine.escalate(incident.incident_id, Tier::ONE).await.unwrap();
  assert_eq!(again.notified, 0);
  assert_eq!(fx.push.targets().len(), 1);
}

/// Two tier-1 contacts: one sharing live from ~10 km away, one whose latest
/// sample (not shared live) is ~1 km away.
async fn live_and_recent(fx: &Fixture, alice: &Subject) {
  let push = Some(ChannelKind::Push);
  fx.contact(alice, Tier::ONE, None, Some(GeoPoint::new(0.09, 0.0)), push, "live").await;

  let recipient_id = Uuid::new_v4();
  fx.store
    .inner
    .add_contact(NewContact {
      subject_id: alice.subject_id,
      recipient_id,
      tier: Tier::ONE,
      priority: None,
      always_share: false,
    })
    .await
    .unwrap();
  fx.store.inner.record_location(recipient_id, GeoPoint::new(0.009, 0.0), Utc::now()).await.unwrap();
  fx.store.inner.add_address(recipient_id, ChannelKind::Push, "push:recent").await.unwrap();
}

#[tokio::test]
async fn recent_samples_rank_by_distance() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  fx.store.inner.record_location(alice.subject_id, GeoPoint::new(0.0, 0.0), Utc::now()).await.unwrap();
  live_and_recent(&fx, &alice).await;

  fx.scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap();
  assert_eq!(fx.push.targets(), vec!["push:recent", "push:live"]);
}

#[tokio::test]
async fn recent_samples_ignored_when_disabled() {
  let config = EscalationConfig { rank_by_recent_samples: false, ..Default::default() };
  let fx = Fixture::with_config(config).await;
  let alice = fx.subject("Alice").await;
  fx.store.inner.record_location(alice.subject_id, GeoPoint::new(0.0, 0.0), Utc::now()).await.unwrap();
  live_and_recent(&fx, &alice).await;

  fx.scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap();
  assert_eq!(fx.push.targets(), vec!["push:live", "push:recent"]);
}

#[tokio::test]
async fn dispatch_starts_nearest_first() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  fx.store.inner.record_location(alice.subject_id, GeoPoint::new(0.0, 0.0), Utc::now()).await.unwrap();

  let push = Some(ChannelKind::Push);
  fx.contact(&alice, Tier::ONE, Some(2), None, push, "p2").await;
  fx.contact(&alice, Tier::ONE, None, Some(GeoPoint::new(0.09, 0.0)), push, "far").await;
  fx.contact(&alice, Tier::ONE, Some(1), None, push, "p1").await;
  fx.contact(&alice, Tier::ONE, None, Some(GeoPoint::new(0.009, 0.0)), push, "near").await;
  fx.contact(&alice, Tier::ONE, None, Some(GeoPoint::new(0.045, 0.0)), push, "mid").await;

  fx.scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap();

  assert_eq!(fx.push.targets(), vec!["push:near", "push:mid", "push:far", "push:p1", "push:p2"]);
}

// ─── lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn trigger_for_unknown_subject_is_rejected() {
  let fx = Fixture::new().await;
  let err = fx
    .scheduler
    .lifecycle()
    .create_from_trigger(Uuid::new_v4(), TriggerReason::ManualPanic)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::SubjectNotFound(_)));
}

#[tokio::test]
async fn trigger_snapshots_location_history() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  let t0 = Utc::now() - mins(30);
  fx.store.inner.record_location(alice.subject_id, GeoPoint::new(1.0, 1.0), t0).await.unwrap();
  fx.store
    .inner
    .record_location(alice.subject_id, GeoPoint::new(2.0, 2.0), t0 + mins(10))
    .await
    .unwrap();

  let opened = fx
    .scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::Other("fall_detected".into()))
    .await
    .unwrap();

  assert!(opened.created);
  assert_eq!(opened.incident.trigger.as_str(), "fall_detected");
  assert_eq!(opened.incident.last_known, Some(GeoPoint::new(2.0, 2.0)));
  let history = fx.store.location_history(opened.incident.incident_id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].recorded_at.timestamp(), t0.timestamp());
}

// ─── sweep ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn tiers_widen_as_time_passes() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  fx.push_contact(&alice, Tier::ONE, "t1").await;
  fx.push_contact(&alice, Tier::TWO, "t2").await;
  fx.push_contact(&alice, Tier::THREE, "t3").await;

  let t0 = Utc::now();
  let check = fx.store.inner.add_pending_check(alice.subject_id, t0 - mins(1)).await.unwrap();

  let first = fx.scheduler.sweep_at(t0).await;
  assert_eq!(first.processed, 1);
  assert_eq!(first.newly_notified, 1);
  assert_eq!(fx.push.targets_at(1), vec!["push:t1"]);
  assert!(!fx.store.inner.get_check(check.check_id).await.unwrap().unwrap().is_pending());

  let at5 = fx.scheduler.sweep_at(t0 + mins(5)).await;
  assert_eq!(at5.processed, 0);
  assert_eq!(at5.promotions, 0);
  assert_eq!(at5.newly_notified, 0);

  let at11 = fx.scheduler.sweep_at(t0 + mins(11)).await;
  assert_eq!(at11.promotions, 1);
  assert_eq!(at11.newly_notified, 1);
  assert_eq!(fx.push.targets_at(2), vec!["push:t2"]);
  assert!(fx.push.targets_at(3).is_empty());

  let at21 = fx.scheduler.sweep_at(t0 + mins(21)).await;
  assert_eq!(at21.promotions, 2);
  assert_eq!(at21.newly_notified, 1);
  assert_eq!(fx.push.targets_at(3), vec!["push:t3"]);

  assert_eq!(fx.push.targets().len(), 3);
}

#[tokio::test]
async fn late_first_sweep_reaches_tier_three_directly() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  fx.push_contact(&alice, Tier::TWO, "t2").await;
  fx.push_contact(&alice, Tier::THREE, "t3").await;
  fx.scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap();

  let report = fx.scheduler.sweep_at(Utc::now() + mins(45)).await;
  assert_eq!(report.promotions, 2);
  assert_eq!(report.newly_notified, 2);
}

#[tokio::test]
async fn repeated_sweeps_are_idempotent() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  fx.push_contact(&alice, Tier::ONE, "t1").await;
  fx.push_contact(&alice, Tier::TWO, "t2").await;
  let t0 = Utc::now();
  fx.store.inner.add_pending_check(alice.subject_id, t0 - mins(1)).await.unwrap();

  let later = t0 + mins(15);
  let first = fx.scheduler.sweep_at(later).await;
  assert_eq!(first.processed, 1);

  let second = fx.scheduler.sweep_at(later).await;
  assert_eq!(second.processed, 0);
  assert_eq!(second.newly_notified, 0);
  assert_eq!(fx.store.inner.list_active_incidents().await.unwrap().len(), 1);
}

async fn promote_with_raw_created_at(raw: &str, now: DateTime<Utc>) -> (usize, Vec<String>) {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  fx.push_contact(&alice, Tier::TWO, "t2").await;
  let incident_id = fx
    .scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap()
    .incident
    .incident_id;
  fx.store.set_raw_created_at(incident_id, raw);

  let report = fx.scheduler.sweep_at(now).await;
  (report.promotions, fx.push.targets_at(2))
}

#[tokio::test]
async fn zoneless_created_at_is_read_as_utc() {
  let before = Utc.with_ymd_and_hms(2026, 3, 1, 8, 9, 0).unwrap();
  let after = Utc.with_ymd_and_hms(2026, 3, 1, 8, 11, 0).unwrap();

  for (raw, expected) in [
    ("2026-03-01 08:00:00", 0),
    ("2026-03-01T08:00:00+00", 0),
    ("2026-03-01T08:00:00Z", 0),
  ] {
    assert_eq!(promote_with_raw_created_at(raw, before).await.0, expected, "{raw}");
  }

  let zoneless = promote_with_raw_created_at("2026-03-01 08:00:00", after).await;
  let offset = promote_with_raw_created_at("2026-03-01T08:00:00+00", after).await;
  assert_eq!(zoneless, offset);
  assert_eq!(zoneless, (1, vec!["push:t2".to_owned()]));
}

#[tokio::test]
async fn malformed_created_at_skips_only_that_incident() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  let bob = fx.subject("Bob").await;
  fx.push_contact(&alice, Tier::TWO, "alice-t2").await;
  fx.push_contact(&bob, Tier::TWO, "bob-t2").await;

  let lifecycle = fx.scheduler.lifecycle();
  let broken = lifecycle
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap()
    .incident
    .incident_id;
  lifecycle.create_from_trigger(bob.subject_id, TriggerReason::ManualPanic).await.unwrap();
  fx.store.set_raw_created_at(broken, "last tuesday");

  let report = fx.scheduler.sweep_at(Utc::now() + mins(11)).await;
  assert_eq!(report.incidents_examined, 2);
  assert_eq!(report.skipped_incidents, 1);
  assert_eq!(report.promotions, 1);
  assert_eq!(fx.push.targets_at(2), vec!["push:bob-t2"]);
}

#[tokio::test]
async fn failing_check_leaves_siblings_unaffected() {
  let fx = Fixture::new().await;
  let t0 = Utc::now();
  let mut checks = Vec::new();
  for name in ["Alice", "Bob", "Carol"] {
    let subject = fx.subject(name).await;
    fx.push_contact(&subject, Tier::ONE, name).await;
    let check = fx.store.inner.add_pending_check(subject.subject_id, t0 - mins(1)).await.unwrap();
    checks.push((subject, check));
  }
  fx.store.fail_inserts_for(checks[0].0.subject_id);

  let report = fx.scheduler.sweep_at(t0).await;
  assert_eq!(report.processed, 2);
  assert_eq!(report.failed_checks, 1);

  let pending = |i: usize| {
    let store = fx.store.clone();
    let check_id = checks[i].1.check_id;
    async move { store.inner.get_check(check_id).await.unwrap().unwrap().is_pending() }
  };
  assert!(pending(0).await);
  assert!(!pending(1).await);
  assert!(!pending(2).await);

  let mut notified = fx.push.targets();
  notified.sort();
  assert_eq!(notified, vec!["push:Bob", "push:Carol"]);

  // The failed check is retried by the next sweep.
  let retry = fx.scheduler.sweep_at(t0).await;
  assert_eq!(retry.failed_checks, 1);
  assert_eq!(retry.processed, 0);
}

#[tokio::test]
async fn resolved_incidents_are_not_promoted() {
  let fx = Fixture::new().await;
  let alice = fx.subject("Alice").await;
  fx.push_contact(&alice, Tier::TWO, "t2").await;
  let incident_id = fx
    .scheduler
    .lifecycle()
    .create_from_trigger(alice.subject_id, TriggerReason::ManualPanic)
    .await
    .unwrap()
    .incident
    .incident_id;
  assert!(fx.store.resolve_incident(incident_id).await.unwrap());

  let report = fx.scheduler.sweep_at(Utc::now() + mins(30)).await;
  assert_eq!(report.incidents_examined, 0);
  assert!(fx.push.targets().is_empty());
}

#[tokio::test]
async fn expired_deadline_leaves_work_for_next_sweep() {
  let config = EscalationConfig { sweep_deadline_secs: 0, ..EscalationConfig::default() };
  let fx = Fixture::with_config(config).await;
  let t0 = Utc::now();
  let mut check_ids = Vec::new();
  for name in ["Alice", "Bob"] {
    let subject = fx.subject(name).await;
    fx.push_contact(&subject, Tier::ONE, name).await;
    let check = fx.store.inner.add_pending_check(subject.subject_id, t0 - mins(1)).await.unwrap();
    check_ids.push(check.check_id);
  }

  let report = fx.scheduler.sweep_at(t0).await;
  assert_eq!(report.processed, 0);
  assert_eq!(report.abandoned, 2);
  for check_id in check_ids {
    assert!(fx.store.inner.get_check(check_id).await.unwrap().unwrap().is_pending());
  }
  assert!(fx.push.targets().is_empty());
}
