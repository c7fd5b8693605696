//! Queue entry and canonical record schema types
//!
//! A [`RawSourceRecord`] is one queue entry as reported by a single feed
//! (one department's listing pull, or the appointment ledger). The same
//! logical entry can appear in several feeds; reconciliation collapses them
//! into one [`CanonicalRecord`] per [`EntityKey`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Position of a queue entry in its department's flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Registered, not yet called
    Waiting,
    /// Called to the room
    Called,
    /// Consultation underway
    InProgress,
    /// Visit finished
    Done,
}

/// Settlement state of the entry's payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    /// No source reported a payment state; the defined sentinel, never absent
    /// on a canonical record
    Unknown,
    /// Invoice issued, not settled
    Pending,
    /// Settled
    Paid,
}

/// Natural key identifying one logical queue entry across feeds.
///
/// Two raw records with the same key are the same entry viewed from
/// different feeds. Records sharing only `subject_id` are distinct entries
/// for the same patient; subject-level aggregation tracks that relation
/// separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityKey {
    /// Patient the entry is about
    pub subject_id: u64,
    /// Appointment the entry belongs to
    pub appointment_id: u64,
    /// Department tag the entry is queued under
    pub department: String,
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.subject_id, self.appointment_id, self.department
        )
    }
}

/// One entity as seen through a single data source.
///
/// Ephemeral: reconstructed on every fetch, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSourceRecord {
    /// Which feed produced this record
    pub source_id: String,

    /// Patient the record is about
    pub subject_id: u64,

    /// Appointment id; absent on malformed feed rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<u64>,

    /// Department tag; absent on malformed feed rows
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,

    /// Queue position as this feed last saw it
    pub status: QueueStatus,

    /// Payment state; some feeds do not carry it at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_state: Option<PaymentState>,

    /// Booked service codes (e.g., "CONSULT", "ECG")
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub service_codes: BTreeSet<String>,

    /// Calendar date the entry is for; pairs with `subject_id` to match
    /// ledger rows against queue rows
    pub service_date: NaiveDate,

    /// Free-form display fields plus unknown fields for forward compatibility
    #[serde(flatten)]
    pub display: HashMap<String, serde_json::Value>,
}

impl RawSourceRecord {
    /// Compute the natural key, or `None` when the record is malformed
    /// (missing appointment or department).
    pub fn entity_key(&self) -> Option<EntityKey> {
        Some(EntityKey {
            subject_id: self.subject_id,
            appointment_id: self.appointment_id?,
            department: self.department.clone()?,
        })
    }
}

/// The reconciled view of one entity.
///
/// Exactly one exists per distinct [`EntityKey`] in a reconciliation pass.
/// Rebuilt wholesale on every pass; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    /// De-duplication key
    pub entity_key: EntityKey,

    /// Queue position after dedup
    pub status: QueueStatus,

    /// Resolved payment state; [`PaymentState::Unknown`] when no source knew
    pub payment_state: PaymentState,

    /// The record's own service codes (from the surviving raw record)
    pub service_codes: BTreeSet<String>,

    /// Union of service codes across every raw record for this subject,
    /// all feeds, computed before filtering and dedup drops
    pub all_service_codes_for_subject: BTreeSet<String>,

    /// Feeds that contributed a view of this entity
    pub sources: Vec<String>,

    /// Carried-over display fields
    #[serde(flatten)]
    pub display: HashMap<String, serde_json::Value>,
}

/// A full reconciliation output, replacing the previous one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalSet {
    /// The visible, de-duplicated, enriched records
    pub records: Vec<CanonicalRecord>,

    /// One or more sources failed this pass; records reflect the survivors
    pub partial: bool,

    /// Every queue feed failed; `records` are retained from the previous
    /// pass and the UI should offer a retry
    pub stale: bool,

    /// Raw records dropped because no entity key was computable
    pub dropped_malformed: usize,

    /// When this set was produced
    pub refreshed_at: DateTime<Utc>,
}

impl CanonicalSet {
    /// An empty, never-refreshed set for initial state.
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            partial: false,
            stale: false,
            dropped_malformed: 0,
            refreshed_at: Utc::now(),
        }
    }
}
