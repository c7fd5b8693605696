//! Change notification schema
//!
//! Fan-out value objects carried by the in-process bus. Never persisted and
//! never durable: consumers that care about freshness also refetch on their
//! own schedule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue state was mutated (entry called/started/completed, record saved).
pub const CATEGORY_QUEUE: &str = "queue";
/// The shared session slot changed.
pub const CATEGORY_SESSION: &str = "session";
/// A consumer explicitly asked for a resync.
pub const CATEGORY_REFRESH: &str = "refresh";

/// Why a change event was published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// A new entity was created
    Created,
    /// An existing entity moved through its status flow
    StatusChanged,
    /// An entity reached its terminal state
    Completed,
    /// The change originated outside this instance
    External,
}

/// A single published change notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Coarse routing key ([`CATEGORY_QUEUE`] etc.)
    pub category: String,
    /// What happened
    pub reason: ChangeReason,
    /// When the publisher fired
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// Build an event stamped with the current time.
    pub fn now(category: &str, reason: ChangeReason) -> Self {
        Self {
            category: category.to_string(),
            reason,
            timestamp: Utc::now(),
        }
    }
}
