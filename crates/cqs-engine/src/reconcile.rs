//! Pure reconciliation of raw feeds into the canonical record set
//!
//! Non-suspending computation over explicit inputs. The pipeline:
//!
//! 1. flatten all queue feeds and compute entity keys; records without a
//!    computable key are dropped and counted, never aborting the pass
//! 2. de-duplicate by entity key (first-seen wins, contributing source ids
//!    accumulate on the survivor)
//! 3. filter by the caller-supplied inclusion predicate over service codes
//! 4. resolve payment state: ledger value by `(subject, date)` wins over the
//!    queue-provided value, with [`PaymentState::Unknown`] as the sentinel
//! 5. aggregate service codes per subject over every raw record, pre-filter
//!    and pre-dedup, across queue feeds and ledger alike
//! 6. emit in first-seen key order
//!
//! Output is deterministic for fixed input, so a repeated run with no
//! intervening change yields identical canonical output. The previous result
//! set is always discarded wholesale; nothing here patches in place.

use chrono::NaiveDate;
use clinic_queue_sync_core::schema::{
    CanonicalRecord, EntityKey, PaymentState, RawSourceRecord,
};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Inclusion predicate over a record's service codes.
///
/// A record whose codes fail the predicate is dropped from the visible set
/// but still contributes to subject aggregation.
pub type ServiceCodeFilter = dyn Fn(&BTreeSet<String>) -> bool + Send + Sync;

/// Output of one reconciliation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub records: Vec<CanonicalRecord>,
    /// Raw records dropped for lacking a computable entity key
    pub dropped_malformed: usize,
}

/// Merge N queue feeds and the authoritative ledger into one canonical set.
pub fn reconcile(
    raw_feeds: &[Vec<RawSourceRecord>],
    ledger: &[RawSourceRecord],
    filter: &ServiceCodeFilter,
) -> Reconciled {
    // Subject aggregation index over every raw record, before any dropping.
    let mut subject_codes: HashMap<u64, BTreeSet<String>> = HashMap::new();
    for record in raw_feeds.iter().flatten().chain(ledger.iter()) {
        subject_codes
            .entry(record.subject_id)
            .or_default()
            .extend(record.service_codes.iter().cloned());
    }

    // Ledger precedence index: first ledger row per (subject, date) wins.
    let mut ledger_payment: HashMap<(u64, NaiveDate), PaymentState> = HashMap::new();
    for record in ledger {
        if let Some(state) = record.payment_state {
            ledger_payment
                .entry((record.subject_id, record.service_date))
                .or_insert(state);
        }
    }

    // Flatten, key, and de-duplicate. First-seen survives; later views of
    // the same entity only add their source id.
    struct Draft {
        record: RawSourceRecord,
        key: EntityKey,
        sources: Vec<String>,
    }
    let mut drafts: Vec<Draft> = Vec::new();
    let mut by_key: HashMap<EntityKey, usize> = HashMap::new();
    let mut dropped_malformed = 0usize;

    for record in raw_feeds.iter().flatten() {
        let Some(key) = record.entity_key() else {
            dropped_malformed += 1;
            continue;
        };
        match by_key.get(&key) {
            Some(&idx) => {
                let sources = &mut drafts[idx].sources;
                if !sources.contains(&record.source_id) {
                    sources.push(record.source_id.clone());
                }
            }
            None => {
                by_key.insert(key.clone(), drafts.len());
                drafts.push(Draft {
                    sources: vec![record.source_id.clone()],
                    record: record.clone(),
                    key,
                });
            }
        }
    }

    if dropped_malformed > 0 {
        debug!("Dropped {} malformed raw record(s)", dropped_malformed);
    }

    // Filter, resolve precedence, attach aggregation.
    let records = drafts
        .into_iter()
        .filter(|draft| filter(&draft.record.service_codes))
        .map(|draft| {
            let payment_state = ledger_payment
                .get(&(draft.record.subject_id, draft.record.service_date))
                .copied()
                .or(draft.record.payment_state)
                .unwrap_or(PaymentState::Unknown);
            let all_for_subject = subject_codes
                .get(&draft.record.subject_id)
                .cloned()
                .unwrap_or_default();
            CanonicalRecord {
                entity_key: draft.key,
                status: draft.record.status,
                payment_state,
                service_codes: draft.record.service_codes,
                all_service_codes_for_subject: all_for_subject,
                sources: draft.sources,
                display: draft.record.display,
            }
        })
        .collect();

    Reconciled {
        records,
        dropped_malformed,
    }
}
