//! SQL schemas for the two kiosk databases.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Relational records; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const RECORDS_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS departments (
    department_id TEXT PRIMARY KEY,
    name          TEXT NOT NULL UNIQUE,
    floor         TEXT,
    location_note TEXT
);

CREATE TABLE IF NOT EXISTS doctors (
    doctor_id     TEXT PRIMARY KEY,
    department_id TEXT NOT NULL REFERENCES departments(department_id),
    name          TEXT NOT NULL,
    specialty     TEXT,
    room          TEXT
);

CREATE TABLE IF NOT EXISTS patients (
    patient_id    TEXT PRIMARY KEY,
    external_id   TEXT UNIQUE,      -- medical record number, when known
    full_name     TEXT NOT NULL,
    name_folded   TEXT NOT NULL,    -- Unicode lowercase of full_name, for search
    date_of_birth TEXT,             -- YYYY-MM-DD
    phone         TEXT,
    note          TEXT
);

CREATE TABLE IF NOT EXISTS appointments (
    appointment_id TEXT PRIMARY KEY,
    patient_id     TEXT NOT NULL REFERENCES patients(patient_id) ON DELETE CASCADE,
    doctor_id      TEXT NOT NULL REFERENCES doctors(doctor_id),
    start_time     TEXT NOT NULL,   -- fixed-width RFC 3339 UTC; sorts lexically
    end_time       TEXT,
    status         TEXT NOT NULL DEFAULT 'PENDING',
    CHECK (end_time IS NULL OR end_time >= start_time)
);

CREATE INDEX IF NOT EXISTS patients_name_idx      ON patients(full_name);
CREATE INDEX IF NOT EXISTS patients_folded_idx    ON patients(name_folded);
CREATE INDEX IF NOT EXISTS doctors_department_idx ON doctors(department_id);
CREATE INDEX IF NOT EXISTS appt_patient_start_idx ON appointments(patient_id, start_time);
CREATE INDEX IF NOT EXISTS appt_doctor_start_idx  ON appointments(doctor_id, start_time);

PRAGMA user_version = 1;
";

/// Session documents. Each row carries one JSON document; updates rewrite it
/// in a single statement.
pub const SESSIONS_SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS chat_sessions (
    session_id TEXT PRIMARY KEY,
    doc        TEXT NOT NULL CHECK (json_valid(doc))
);

-- Messages are append-only.
CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    timestamp  TEXT NOT NULL,
    doc        TEXT NOT NULL CHECK (json_valid(doc))
);

CREATE INDEX IF NOT EXISTS chat_sessions_device_idx
    ON chat_sessions(json_extract(doc, '$.device_id'), json_extract(doc, '$.started_at'));
CREATE INDEX IF NOT EXISTS chat_sessions_status_idx
    ON chat_sessions(json_extract(doc, '$.status'));
CREATE INDEX IF NOT EXISTS messages_session_idx
    ON messages(session_id, timestamp);

PRAGMA user_version = 1;
";
