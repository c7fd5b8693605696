//! Shared session slot and cross-instance change detection
//!
//! [`store::SessionStore`] is the process-wide single source of truth for
//! "who is logged in". It persists through the shared state directory so
//! every concurrently running instance observes the same slot;
//! [`watcher::watch_session`] turns external writes to that slot into typed
//! outcomes, escalating identity mismatches to a hard reload.

pub mod store;
pub mod watcher;

pub use store::{ExternalOutcome, PersistedSession, SessionStore, SubscriptionGuard};
pub use watcher::{ReloadHandler, watch_session};
