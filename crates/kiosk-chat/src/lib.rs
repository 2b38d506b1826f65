//! The conversational appointment-lookup engine.
//!
//! Per inbound message the [`Conversation`] classifies the text, resolves a
//! patient token when the intent asks for appointments, looks the
//! appointments up, composes a reply, and records the exchange. It is generic
//! over the two store traits in [`kiosk_core::store`] so tests can run it
//! against in-memory fakes.

pub mod classify;
pub mod compose;
pub mod conversation;
pub mod error;
pub mod lookup;
pub mod resolve;
pub mod sessions;

mod bounded;

pub use bounded::StoreTimeouts;
pub use classify::{KeywordClassifier, KeywordRules};
pub use compose::{LookupOutcome, Reply, ReplyComposer, ReplyContent};
pub use conversation::{ChatSettings, Conversation, Exchange};
pub use error::{Error, Result, StoreKind};
pub use lookup::{AppointmentLookup, FaultReporter, IntegrityFault};
pub use resolve::{PatientResolver, Resolution};
pub use sessions::SessionManager;
