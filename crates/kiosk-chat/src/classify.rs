//! Deterministic keyword classifier.
//!
//! Categories are checked in a fixed order (directions, hours, appointment)
//! because their vocabularies overlap; the first category with a matching
//! keyword wins.

use kiosk_core::intent::{Classifier, Intent};
use serde::{Deserialize, Serialize};

/// Keyword lists per category. Deserialised from the `[keywords]` config
/// table; any list left out falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordRules {
  pub directions:  Vec<String>,
  pub hours:       Vec<String>,
  pub appointment: Vec<String>,
}

impl Default for KeywordRules {
  fn default() -> Self {
    let words = |ws: &[&str]| ws.iter().map(|w| (*w).to_owned()).collect();
    Self {
      directions:  words(&["where", "direction", "locate", "how to get"]),
      hours:       words(&["open", "hour", "time"]),
      appointment: words(&[
        "check my appointment",
        "my appointment",
        "appointment status",
        "check appointment",
      ]),
    }
  }
}

#[derive(Debug, Clone)]
pub struct KeywordClassifier {
  /// Evaluated in order.
  table: Vec<(Intent, Vec<String>)>,
}

impl KeywordClassifier {
  pub fn new(rules: KeywordRules) -> Self {
    let normalise = |ws: Vec<String>| {
      ws.into_iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
    };
    Self {
      table: vec![
        (Intent::AskDirections, normalise(rules.directions)),
        (Intent::ClinicHours, normalise(rules.hours)),
        (Intent::CheckAppointment, normalise(rules.appointment)),
      ],
    }
  }
}

impl Default for KeywordClassifier {
  fn default() -> Self { Self::new(KeywordRules::default()) }
}

impl Classifier for KeywordClassifier {
  fn classify(&self, text: &str) -> Intent {
    let text = text.to_lowercase();
    self
      .table
      .iter()
      .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k.as_str())))
      .map(|(intent, _)| *intent)
      .unwrap_or(Intent::Fallback)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn classify(text: &str) -> Intent { KeywordClassifier::default().classify(text) }

  #[test]
  fn recognises_each_category() {
    assert_eq!(classify("Where is cardiology?"), Intent::AskDirections);
    assert_eq!(classify("When do you OPEN on Sunday"), Intent::ClinicHours);
    assert_eq!(classify("Check my appointment please"), Intent::CheckAppointment);
    assert_eq!(classify("hello there"), Intent::Fallback);
    assert_eq!(classify(""), Intent::Fallback);
  }

  #[test]
  fn directions_win_over_hours() {
    // Both "where" and "open" appear; directions are checked first.
    assert_eq!(classify("Where is the open pharmacy?"), Intent::AskDirections);
  }

  #[test]
  fn hours_win_over_appointment() {
    assert_eq!(classify("what time is my appointment"), Intent::ClinicHours);
  }

  #[test]
  fn bare_identifier_is_fallback() {
    assert_eq!(classify("id: MRN123456"), Intent::Fallback);
  }

  #[test]
  fn is_deterministic() {
    let classifier = KeywordClassifier::default();
    for text in ["How to get to radiology", "appointment status", "??"] {
      assert_eq!(classifier.classify(text), classifier.classify(text));
    }
  }

  #[test]
  fn rules_are_replaceable() {
    let classifier = KeywordClassifier::new(KeywordRules {
      directions:  vec!["  DÓNDE ".into()],
      hours:       vec![],
      appointment: vec!["cita".into(), String::new()],
    });
    assert_eq!(classifier.classify("¿Dónde está la farmacia?"), Intent::AskDirections);
    assert_eq!(classifier.classify("mi cita"), Intent::CheckAppointment);
    // Default vocabulary no longer applies.
    assert_eq!(classifier.classify("where is it"), Intent::Fallback);
  }
}
