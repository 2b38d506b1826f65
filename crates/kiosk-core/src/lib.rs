//! Core types and trait definitions for the hospital kiosk backend.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The chat engine, the storage backends, and the HTTP surface all depend on
//! it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod error;
pub mod intent;
pub mod memory;
pub mod record;
pub mod session;
pub mod store;

pub use error::{Error, Result};
