//! Intents recognised in kiosk chat messages.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// The symbolic meaning assigned to an inbound message.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Intent {
  AskDirections,
  ClinicHours,
  CheckAppointment,
  Fallback,
}

impl Intent {
  pub fn as_str(self) -> &'static str { self.into() }
}

/// Maps message text to an [`Intent`].
///
/// Implementations must be total and deterministic: every input yields an
/// intent, and the same input always yields the same one.
pub trait Classifier: Send + Sync {
  fn classify(&self, text: &str) -> Intent;
}
