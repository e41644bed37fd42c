//! SQL schema for the Vigil SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS subjects (
    subject_id    TEXT PRIMARY KEY,
    display_name  TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    contact_id    TEXT PRIMARY KEY,
    subject_id    TEXT NOT NULL REFERENCES subjects(subject_id),
    recipient_id  TEXT NOT NULL,
    tier          INTEGER NOT NULL CHECK (tier BETWEEN 1 AND 3),
    priority      INTEGER,
    always_share  INTEGER NOT NULL DEFAULT 0,
    UNIQUE (subject_id, recipient_id)
);

-- Channel addresses belong to the recipient account, not the contact row,
-- so a person who is a contact for several subjects registers once.
CREATE TABLE IF NOT EXISTS recipient_addresses (
    recipient_id  TEXT NOT NULL,
    channel       TEXT NOT NULL,   -- 'push' | 'email'
    target        TEXT NOT NULL,
    UNIQUE (recipient_id, channel, target)
);

-- Append-only. Keyed by user so both subjects and recipients have trails.
CREATE TABLE IF NOT EXISTS location_samples (
    sample_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       TEXT NOT NULL,
    lat           REAL NOT NULL,
    lng           REAL NOT NULL,
    recorded_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS pending_safety_checks (
    check_id      TEXT PRIMARY KEY,
    subject_id    TEXT NOT NULL REFERENCES subjects(subject_id),
    expires_at    TEXT NOT NULL,
    responded_at  TEXT
);

-- created_at is authoritative for every elapsed-time computation.
CREATE TABLE IF NOT EXISTS incidents (
    incident_id      TEXT PRIMARY KEY,
    subject_id       TEXT NOT NULL REFERENCES subjects(subject_id),
    status           TEXT NOT NULL DEFAULT 'active',   -- 'active' | 'resolved'
    trigger          TEXT NOT NULL,
    last_known_lat   REAL,
    last_known_lng   REAL,
    created_at       TEXT NOT NULL,
    source_check_id  TEXT UNIQUE REFERENCES pending_safety_checks(check_id)
);

-- One row per copied sample; re-copying the same sample is a no-op.
CREATE TABLE IF NOT EXISTS incident_location_history (
    incident_id   TEXT NOT NULL REFERENCES incidents(incident_id),
    sample_id     INTEGER NOT NULL REFERENCES location_samples(sample_id),
    lat           REAL NOT NULL,
    lng           REAL NOT NULL,
    recorded_at   TEXT NOT NULL,
    UNIQUE (incident_id, sample_id)
);

-- The ledger. The primary key is the at-most-once guarantee: a second
-- INSERT for the same pair is ignored atomically, whoever issues it.
CREATE TABLE IF NOT EXISTS incident_grants (
    incident_id   TEXT NOT NULL REFERENCES incidents(incident_id),
    contact_id    TEXT NOT NULL REFERENCES contacts(contact_id),
    tier          INTEGER NOT NULL,
    notified_at   TEXT NOT NULL,
    PRIMARY KEY (incident_id, contact_id)
);

CREATE INDEX IF NOT EXISTS contacts_subject_tier_idx ON contacts(subject_id, tier);
CREATE INDEX IF NOT EXISTS samples_user_idx          ON location_samples(user_id, recorded_at);
CREATE INDEX IF NOT EXISTS checks_expiry_idx         ON pending_safety_checks(expires_at);
CREATE INDEX IF NOT EXISTS incidents_status_idx      ON incidents(status);

PRAGMA user_version = 1;
";
