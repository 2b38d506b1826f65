//! Demo dataset for a fresh kiosk install.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use kiosk_core::{
  record::{Appointment, AppointmentStatus, Department, Doctor, Patient},
  store::RecordStore,
};
use kiosk_store_sqlite::SqliteRecordStore;
use uuid::Uuid;

pub const DEMO_MRN: &str = "MRN123456";

/// Insert one department, doctor, patient, and a couple of upcoming
/// appointments relative to `now`.
///
/// Returns `false` without writing anything when the demo patient already
/// exists.
pub async fn seed_demo(
  store: &SqliteRecordStore,
  now: DateTime<Utc>,
) -> kiosk_store_sqlite::Result<bool> {
  if store.patient_by_external_id(DEMO_MRN).await?.is_some() {
    tracing::info!(mrn = DEMO_MRN, "demo data already present");
    return Ok(false);
  }

  let department = match store.department_by_name("Cardiology").await? {
    Some(existing) => existing,
    None => {
      let department = Department {
        department_id: Uuid::new_v4(),
        name:          "Cardiology".into(),
        floor:         Some("2".into()),
        location_note: Some("Near elevator".into()),
      };
      store.insert_department(&department).await?;
      department
    }
  };

  let doctor = Doctor {
    doctor_id:     Uuid::new_v4(),
    department_id: department.department_id,
    name:          "Smith".into(),
    specialty:     Some("Cardiologist".into()),
    room:          Some("201".into()),
  };
  store.insert_doctor(&doctor).await?;

  let patient = Patient {
    external_id: Some(DEMO_MRN.into()),
    date_of_birth: NaiveDate::from_ymd_opt(1980, 5, 20),
    phone: Some("0123456789".into()),
    ..Patient::named("John Doe")
  };
  store.insert_patient(&patient).await?;

  for (days, status) in [(1, AppointmentStatus::Confirmed), (7, AppointmentStatus::Pending)] {
    let start = now + Duration::days(days);
    let appointment = Appointment::new(
      patient.patient_id,
      doctor.doctor_id,
      start,
      Some(start + Duration::hours(1)),
      status,
    )?;
    store.insert_appointment(&appointment).await?;
  }

  tracing::info!(mrn = DEMO_MRN, "demo data seeded");
  Ok(true)
}
