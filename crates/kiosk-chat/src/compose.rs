//! Reply composition. Pure, no I/O.

use chrono::{DateTime, Utc};
use kiosk_core::{intent::Intent, record::AppointmentView};
use serde::{Deserialize, Serialize};

/// At most this many appointments are spelled out in the reply text.
pub const LISTED_IN_TEXT: usize = 3;

/// Fixed reply texts. Swappable per deployment through the `[replies]`
/// config table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyContent {
  pub directions:     String,
  pub hours:          String,
  pub fallback:       String,
  pub ask_identifier: String,
  pub no_results:     String,
  pub results_header: String,
}

impl Default for ReplyContent {
  fn default() -> Self {
    Self {
      directions:     "Please follow the signs to Wing B, 2nd floor.".into(),
      hours:          "The hospital is open 24/7. Clinics: 8am–5pm, Mon–Fri."
        .into(),
      fallback:       "Sorry, I didn’t catch that. You can ask for directions, \
                       clinic hours, or say `Check my appointment`."
        .into(),
      ask_identifier: "Please tell me your patient ID or your full name to \
                       check appointments. For example: `ID: MRN-12345`."
        .into(),
      no_results:     "I couldn’t find any upcoming appointments. Would you \
                       like me to check past ones?"
        .into(),
      results_header: "Here are your upcoming appointments:".into(),
    }
  }
}

/// What the appointment branch of the conversation came up with.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
  /// No token attached to the session or present in the message.
  MissingToken,
  /// The token matched no patient, or more than one.
  Unresolved,
  Found(Vec<AppointmentView>),
}

/// A composed reply: user-facing text plus the structured list, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reply {
  pub text:  String,
  pub items: Option<Vec<AppointmentView>>,
}

impl Reply {
  fn plain(text: &str) -> Self { Self { text: text.to_owned(), items: None } }
}

#[derive(Debug, Clone, Default)]
pub struct ReplyComposer {
  content: ReplyContent,
}

impl ReplyComposer {
  pub fn new(content: ReplyContent) -> Self { Self { content } }

  pub fn compose(&self, intent: Intent, outcome: Option<LookupOutcome>) -> Reply {
    match intent {
      Intent::AskDirections => Reply::plain(&self.content.directions),
      Intent::ClinicHours => Reply::plain(&self.content.hours),
      Intent::Fallback => Reply::plain(&self.content.fallback),
      Intent::CheckAppointment => {
        match outcome.unwrap_or(LookupOutcome::MissingToken) {
          LookupOutcome::MissingToken => {
            Reply::plain(&self.content.ask_identifier)
          }
          LookupOutcome::Unresolved => Reply::plain(&self.content.no_results),
          LookupOutcome::Found(items) if items.is_empty() => {
            Reply::plain(&self.content.no_results)
          }
          LookupOutcome::Found(items) => self.list(items),
        }
      }
    }
  }

  fn list(&self, items: Vec<AppointmentView>) -> Reply {
    let lines: Vec<String> = items
      .iter()
      .take(LISTED_IN_TEXT)
      .map(|it| {
        format!(
          "- {} with Dr. {} ({})",
          format_start(it.start_time),
          it.doctor_name,
          it.status
        )
      })
      .collect();
    let more = match items.len().checked_sub(LISTED_IN_TEXT) {
      Some(rest) if rest > 0 => format!(" and {rest} more…"),
      _ => String::new(),
    };
    Reply {
      text:  format!("{}\n{}{more}", self.content.results_header, lines.join("\n")),
      items: Some(items),
    }
  }
}

/// `10 Aug 2025, 10:30` in UTC, independent of locale.
pub fn format_start(at: DateTime<Utc>) -> String {
  at.format("%d %b %Y, %H:%M").to_string()
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use kiosk_core::record::AppointmentStatus;
  use uuid::Uuid;

  use super::*;

  fn view(start: DateTime<Utc>, doctor: &str) -> AppointmentView {
    AppointmentView {
      appointment_id: Uuid::new_v4(),
      patient_name:   "John Doe".into(),
      doctor_name:    doctor.into(),
      department_id:  Uuid::new_v4(),
      start_time:     start,
      end_time:       None,
      status:         AppointmentStatus::Pending,
    }
  }

  fn start() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 8, 10, 10, 30, 0).unwrap() }

  #[test]
  fn formats_start_time() {
    assert_eq!(format_start(start()), "10 Aug 2025, 10:30");
    let early = Utc.with_ymd_and_hms(2026, 1, 3, 7, 5, 0).unwrap();
    assert_eq!(format_start(early), "03 Jan 2026, 07:05");
  }

  #[test]
  fn fixed_texts_per_intent() {
    let composer = ReplyComposer::default();
    let content = ReplyContent::default();
    assert_eq!(composer.compose(Intent::AskDirections, None), Reply::plain(&content.directions));
    assert_eq!(composer.compose(Intent::ClinicHours, None).text, content.hours);
    assert_eq!(composer.compose(Intent::Fallback, None).text, content.fallback);
    assert_eq!(
      composer.compose(Intent::CheckAppointment, None).text,
      content.ask_identifier
    );
    assert!(content.ask_identifier.contains("ID: MRN-12345"));
  }

  #[test]
  fn unresolved_and_empty_both_read_as_no_results() {
    let composer = ReplyComposer::default();
    let unresolved =
      composer.compose(Intent::CheckAppointment, Some(LookupOutcome::Unresolved));
    let empty =
      composer.compose(Intent::CheckAppointment, Some(LookupOutcome::Found(vec![])));
    assert_eq!(unresolved, empty);
    assert!(empty.items.is_none());
  }

  #[test]
  fn lists_at_most_three_and_counts_the_rest() {
    let items: Vec<_> = (0..5)
      .map(|i| view(start() + Duration::days(i), "Smith"))
      .collect();
    let reply = ReplyComposer::default()
      .compose(Intent::CheckAppointment, Some(LookupOutcome::Found(items)));

    let lines: Vec<_> = reply.text.lines().filter(|l| l.starts_with("- ")).collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "- 10 Aug 2025, 10:30 with Dr. Smith (PENDING)");
    assert!(reply.text.ends_with(" and 2 more…"));
    assert_eq!(reply.items.map(|i| i.len()), Some(5));
  }

  #[test]
  fn short_lists_have_no_trailer() {
    let items = vec![view(start(), "Smith"), view(start() + Duration::hours(1), "Jones")];
    let reply = ReplyComposer::default()
      .compose(Intent::CheckAppointment, Some(LookupOutcome::Found(items)));
    assert!(!reply.text.contains("more…"));
    assert!(reply.text.ends_with("- 10 Aug 2025, 11:30 with Dr. Jones (PENDING)"));
  }
}
