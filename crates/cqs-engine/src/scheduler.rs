//! Refresh scheduling for the reconciliation pipeline
//!
//! Re-runs fetch-and-reconcile when the bus signals a queue mutation or an
//! explicit refresh request, and on a fixed polling interval as a safety net
//! against missed events. Runs never overlap: a trigger arriving while a run
//! is in flight schedules exactly one follow-up run (a bounded(1) channel
//! with `try_send` coalesces everything beyond that). In-flight fetches are
//! not cancelled; superseding runs simply wait their turn.

use crate::bus::ChangeBus;
use crate::feed::{DateRange, LedgerSource, QueueFeedSource};
use crate::reconcile::reconcile;
use anyhow::Result;
use chrono::Utc;
use clinic_queue_sync_core::config::Config;
use clinic_queue_sync_core::schema::record::CanonicalSet;
use clinic_queue_sync_core::schema::{CATEGORY_QUEUE, CATEGORY_REFRESH, RawSourceRecord};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owns the feed sources and republishes reconciled canonical sets.
///
/// Consumers hold a [`watch::Receiver`] from [`subscribe_output`] and render
/// whatever it currently carries; every refresh replaces the set wholesale.
///
/// [`subscribe_output`]: RefreshScheduler::subscribe_output
pub struct RefreshScheduler {
    bus: Arc<ChangeBus>,
    feeds: Vec<Arc<dyn QueueFeedSource>>,
    ledger: Arc<dyn LedgerSource>,
    filter: Arc<dyn Fn(&BTreeSet<String>) -> bool + Send + Sync>,
    poll_interval: Duration,
    coalesce_window: Duration,
    output_tx: watch::Sender<CanonicalSet>,
}

impl RefreshScheduler {
    pub fn new(
        bus: Arc<ChangeBus>,
        feeds: Vec<Arc<dyn QueueFeedSource>>,
        ledger: Arc<dyn LedgerSource>,
        filter: Arc<dyn Fn(&BTreeSet<String>) -> bool + Send + Sync>,
        config: &Config,
    ) -> Self {
        let (output_tx, _) = watch::channel(CanonicalSet::empty());
        Self {
            bus,
            feeds,
            ledger,
            filter,
            poll_interval: config.poll_interval(),
            coalesce_window: config.coalesce_window(),
            output_tx,
        }
    }

    /// Receiver for the latest canonical set.
    pub fn subscribe_output(&self) -> watch::Receiver<CanonicalSet> {
        self.output_tx.subscribe()
    }

    /// Latest canonical set by value.
    pub fn latest(&self) -> CanonicalSet {
        self.output_tx.borrow().clone()
    }

    /// Run the refresh loop until cancelled.
    ///
    /// Performs an initial pass immediately, then reacts to settled bus
    /// triggers (`queue`, `refresh`) and the polling interval.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        info!(
            "Refresh scheduler starting ({} feed(s), poll {:?})",
            self.feeds.len(),
            self.poll_interval
        );

        // Capacity 1: an in-flight run plus at most one queued follow-up.
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);

        let queue_tx = trigger_tx.clone();
        let _queue_sub =
            self.bus
                .subscribe_settled(CATEGORY_QUEUE, self.coalesce_window, move |_| {
                    let _ = queue_tx.try_send(());
                });
        let refresh_tx = trigger_tx.clone();
        let _refresh_sub =
            self.bus
                .subscribe_settled(CATEGORY_REFRESH, self.coalesce_window, move |_| {
                    let _ = refresh_tx.try_send(());
                });

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; it doubles as the startup pass.

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Refresh scheduler cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("Poll interval refresh");
                    self.run_once().await;
                }
                Some(()) = trigger_rx.recv() => {
                    debug!("Bus-triggered refresh");
                    self.run_once().await;
                }
            }
        }

        Ok(())
    }

    /// One full fetch-and-reconcile pass.
    async fn run_once(&self) {
        let mut partial = false;

        // Fetch all queue feeds concurrently, keeping results in feed
        // declaration order so output is deterministic.
        let mut tasks = JoinSet::new();
        for (idx, feed) in self.feeds.iter().enumerate() {
            let feed = Arc::clone(feed);
            tasks.spawn(async move {
                let source = feed.source_id().to_string();
                (idx, source, feed.fetch().await)
            });
        }

        let mut feed_results: Vec<Option<Vec<RawSourceRecord>>> = Vec::new();
        feed_results.resize_with(self.feeds.len(), || None);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, _, Ok(records))) => {
                    feed_results[idx] = Some(records);
                }
                Ok((_, source, Err(e))) => {
                    warn!("Queue feed {} failed: {}", source, e);
                    partial = true;
                }
                Err(e) => {
                    warn!("Queue feed task panicked: {}", e);
                    partial = true;
                }
            }
        }

        let succeeded: Vec<Vec<RawSourceRecord>> =
            feed_results.into_iter().flatten().collect();

        if !self.feeds.is_empty() && succeeded.is_empty() {
            // Total failure: keep the previous records on screen and let the
            // consumer offer a retry.
            warn!("All queue feeds failed; retaining previous canonical set");
            let previous = self.output_tx.borrow().clone();
            self.output_tx.send_replace(CanonicalSet {
                records: previous.records,
                partial: true,
                stale: true,
                dropped_malformed: previous.dropped_malformed,
                refreshed_at: Utc::now(),
            });
            return;
        }

        let ledger = match self.ledger.fetch(DateRange::today()).await {
            Ok(records) => records,
            Err(e) => {
                // Precedence falls back entirely to per-source values.
                warn!("Ledger feed failed: {}", e);
                partial = true;
                Vec::new()
            }
        };

        let reconciled = reconcile(&succeeded, &ledger, self.filter.as_ref());
        debug!(
            "Reconciled {} record(s), partial={}, dropped={}",
            reconciled.records.len(),
            partial,
            reconciled.dropped_malformed
        );
        self.output_tx.send_replace(CanonicalSet {
            records: reconciled.records,
            partial,
            stale: false,
            dropped_malformed: reconciled.dropped_malformed,
            refreshed_at: Utc::now(),
        });
    }
}
