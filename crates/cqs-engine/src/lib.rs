//! Sync engine for clinic-queue-sync
//!
//! Sits on top of `clinic-queue-sync-core` and provides the pieces that keep
//! a running client fresh:
//!
//! - [`bus::ChangeBus`] — in-process publish/subscribe with coalesced
//!   "settle" delivery for burst producers
//! - [`feed`] — collaborator traits for the per-department queue feeds and
//!   the authoritative appointment ledger
//! - [`reconcile`] — the pure merge of N inconsistent feeds into one
//!   canonical record set
//! - [`scheduler::RefreshScheduler`] — re-runs the fetch-and-reconcile
//!   pipeline on bus triggers and a polling safety net, publishing
//!   canonical sets through a watch channel

pub mod bus;
pub mod feed;
pub mod reconcile;
pub mod scheduler;

pub use bus::{BusSubscription, ChangeBus, SettledSubscription};
pub use feed::{DateRange, FeedError, LedgerSource, QueueFeedSource};
pub use reconcile::{Reconciled, ServiceCodeFilter, reconcile};
pub use scheduler::RefreshScheduler;

use clinic_queue_sync_core::schema::{CATEGORY_REFRESH, CATEGORY_SESSION, ChangeReason, Session};
use clinic_queue_sync_core::session::{SessionStore, SubscriptionGuard};
use std::sync::Arc;

/// Republish every session change as bus events.
///
/// Each change is published under `session` (for UI consumers) and `refresh`
/// (so the scheduler resyncs rather than merging incrementally). The
/// returned guard keeps the bridge alive; drop it to disconnect.
pub fn bridge_session_events(store: &SessionStore, bus: Arc<ChangeBus>) -> SubscriptionGuard {
    store.subscribe(Arc::new(move |_session: &Session| {
        bus.publish(CATEGORY_SESSION, ChangeReason::External);
        bus.publish(CATEGORY_REFRESH, ChangeReason::External);
    }))
}
