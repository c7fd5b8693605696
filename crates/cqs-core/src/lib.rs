//! Core types and session state for clinic-queue-sync (cqs)
//!
//! This crate provides the shared building blocks for keeping a hospital
//! client consistent when several instances of it run concurrently against
//! the same per-user state directory:
//!
//! - schema types for queue entries, the appointment ledger, and the
//!   authenticated session
//! - a [`session::SessionStore`] holding the single logged-in session,
//!   persisted through an atomic file write so that every instance sees it
//! - a filesystem watcher that turns "the session file changed externally"
//!   into typed outcomes, including the hard identity-conflict path
//!
//! All schema types preserve unknown fields for forward compatibility and
//! use proper serde configuration for camelCase ↔ snake_case.

pub mod config;
pub mod error;
pub mod home;
pub mod io;
pub mod logging;
pub mod schema;
pub mod session;

pub use error::StoreError;
pub use schema::{
    CanonicalRecord, CanonicalSet, ChangeEvent, ChangeReason, EntityKey, PaymentState, Principal,
    QueueStatus, RawSourceRecord, Role, Session,
};
pub use session::{ExternalOutcome, SessionStore};
