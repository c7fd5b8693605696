//! Collaborator contracts for the data sources the engine consumes
//!
//! Implemented elsewhere (HTTP clients, test stubs); the engine is agnostic
//! to transport and serialization as long as the feeds deliver
//! [`RawSourceRecord`]-shaped data.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use clinic_queue_sync_core::schema::RawSourceRecord;
use thiserror::Error;

/// Failure of a single feed request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The endpoint answered with a non-success status
    #[error("Feed returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never completed (DNS, connect, timeout)
    #[error("Feed transport error: {message}")]
    Transport { message: String },
}

/// Inclusive date window for ledger queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// A single-day range.
    pub fn single(date: NaiveDate) -> Self {
        Self { from: date, to: date }
    }

    /// Today, per the wall clock.
    pub fn today() -> Self {
        Self::single(Utc::now().date_naive())
    }
}

/// One per-department queue listing endpoint.
#[async_trait]
pub trait QueueFeedSource: Send + Sync {
    /// Stable identifier recorded on canonical records as a contributing
    /// source.
    fn source_id(&self) -> &str;

    /// Pull the current listing.
    async fn fetch(&self) -> Result<Vec<RawSourceRecord>, FeedError>;
}

/// The appointment ledger: authoritative for payment state.
///
/// Keyed by subject and date rather than by entity key; a queue snapshot may
/// be stale relative to a payment that settled after the queue was pulled.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn fetch(&self, range: DateRange) -> Result<Vec<RawSourceRecord>, FeedError>;
}
