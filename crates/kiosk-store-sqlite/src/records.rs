//! [`SqliteRecordStore`], the SQLite implementation of [`RecordStore`].

use std::{path::Path, time::Duration};

use kiosk_core::{
  record::{Appointment, AppointmentRecord, Department, Doctor, Patient},
  store::{AppointmentQuery, RecordStore, SortOrder},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  DEFAULT_BUSY_TIMEOUT, Error, Result,
  encode::{
    PATIENT_COLUMNS, RawAppointmentRecord, RawPatient, decode_uuid, encode_date,
    encode_dt, encode_uuid,
  },
  schema::RECORDS_SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Hospital records backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteRecordStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteRecordStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT).await
  }

  /// Like [`open`](Self::open) with an explicit lock wait.
  pub async fn open_with_timeout(
    path: impl AsRef<Path>,
    busy_timeout: Duration,
  ) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema(busy_timeout).await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema(DEFAULT_BUSY_TIMEOUT).await?;
    Ok(store)
  }

  async fn init_schema(&self, busy_timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(RECORDS_SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Writes ────────────────────────────────────────────────────────────────
  //
  // Administrative writes are not part of `RecordStore`; they exist for
  // seeding and tests.

  pub async fn insert_department(&self, department: &Department) -> Result<()> {
    let id_str = encode_uuid(department.department_id);
    let name = department.name.clone();
    let floor = department.floor.clone();
    let note = department.location_note.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO departments (department_id, name, floor, location_note)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, name, floor, note],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_doctor(&self, doctor: &Doctor) -> Result<()> {
    let id_str = encode_uuid(doctor.doctor_id);
    let dept_str = encode_uuid(doctor.department_id);
    let name = doctor.name.clone();
    let specialty = doctor.specialty.clone();
    let room = doctor.room.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO doctors (doctor_id, department_id, name, specialty, room)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, dept_str, name, specialty, room],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_patient(&self, patient: &Patient) -> Result<()> {
    let id_str = encode_uuid(patient.patient_id);
    let external_id = patient.external_id.clone();
    let full_name = patient.full_name.clone();
    // SQLite's lower() folds ASCII only; search compares against this.
    let name_folded = patient.full_name.to_lowercase();
    let dob_str = patient.date_of_birth.map(encode_date);
    let phone = patient.phone.clone();
    let note = patient.note.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO patients (
             patient_id, external_id, full_name, name_folded, date_of_birth, phone, note
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![id_str, external_id, full_name, name_folded, dob_str, phone, note],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
    let id_str = encode_uuid(appointment.appointment_id);
    let patient_str = encode_uuid(appointment.patient_id);
    let doctor_str = encode_uuid(appointment.doctor_id);
    let start_str = encode_dt(appointment.start_time);
    let end_str = appointment.end_time.map(encode_dt);
    let status = appointment.status.as_str();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO appointments (
             appointment_id, patient_id, doctor_id, start_time, end_time, status
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, patient_str, doctor_str, start_str, end_str, status],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Look up a department by its unique name.
  pub async fn department_by_name(&self, name: &str) -> Result<Option<Department>> {
    let name = name.to_owned();

    let raw: Option<(String, String, Option<String>, Option<String>)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT department_id, name, floor, location_note
             FROM departments WHERE name = ?1",
            rusqlite::params![name],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
          )
          .optional()?)
      })
      .await?;

    raw
      .map(|(id, name, floor, location_note)| {
        Ok(Department {
          department_id: decode_uuid(&id)?,
          name,
          floor,
          location_note,
        })
      })
      .transpose()
  }

  async fn query_patient(
    &self,
    clause: &'static str,
    arg: String,
  ) -> Result<Option<Patient>> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE {clause}");

    let raw: Option<RawPatient> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(&sql, rusqlite::params![arg], RawPatient::from_row)
          .optional()?)
      })
      .await?;

    raw.map(RawPatient::into_patient).transpose()
  }
}

/// Appointment rows left-joined with their patient and doctor; columns in
/// [`RawAppointmentRecord::from_row`] order.
const APPOINTMENT_SELECT: &str = "
  SELECT a.appointment_id, a.patient_id, a.doctor_id, a.start_time,
         a.end_time, a.status,
         p.full_name, d.name, d.department_id
  FROM appointments a
  LEFT JOIN patients p ON p.patient_id = a.patient_id
  LEFT JOIN doctors  d ON d.doctor_id  = a.doctor_id";

// ─── RecordStore impl ────────────────────────────────────────────────────────

impl RecordStore for SqliteRecordStore {
  type Error = Error;

  async fn patient_by_id(&self, id: Uuid) -> Result<Option<Patient>> {
    self.query_patient("patient_id = ?1", encode_uuid(id)).await
  }

  async fn patient_by_external_id(&self, external_id: &str) -> Result<Option<Patient>> {
    self.query_patient("external_id = ?1", external_id.to_owned()).await
  }

  async fn patients_by_name(&self, fragment: &str, limit: usize) -> Result<Vec<Patient>> {
    // `instr` rather than LIKE so '%' and '_' in the fragment match literally.
    let fragment = fragment.to_lowercase();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let sql = format!(
      "SELECT {PATIENT_COLUMNS} FROM patients
       WHERE instr(name_folded, ?1) > 0
       ORDER BY full_name, patient_id
       LIMIT ?2"
    );

    let raws: Vec<RawPatient> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![fragment, limit], RawPatient::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPatient::into_patient).collect()
  }

  async fn appointments(&self, query: &AppointmentQuery) -> Result<Vec<AppointmentRecord>> {
    let patient_str = encode_uuid(query.patient_id);
    let from_str = query.starting_from.map(encode_dt);
    let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);
    let direction = match query.order {
      SortOrder::Ascending => "ASC",
      SortOrder::Descending => "DESC",
    };
    let sql = format!(
      "{APPOINTMENT_SELECT}
       WHERE a.patient_id = ?1
         AND (?2 IS NULL OR a.start_time >= ?2)
       ORDER BY a.start_time {direction}, a.appointment_id {direction}
       LIMIT ?3 OFFSET ?4"
    );

    let raws: Vec<RawAppointmentRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![patient_str, from_str, limit, offset],
            RawAppointmentRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAppointmentRecord::into_record).collect()
  }

  async fn appointment_by_id(&self, id: Uuid) -> Result<Option<AppointmentRecord>> {
    let id_str = encode_uuid(id);
    let sql = format!("{APPOINTMENT_SELECT} WHERE a.appointment_id = ?1");

    let raw: Option<RawAppointmentRecord> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(&sql, rusqlite::params![id_str], RawAppointmentRecord::from_row)
          .optional()?)
      })
      .await?;

    raw.map(RawAppointmentRecord::into_record).transpose()
  }
}
