//! End-to-end flow: bus triggers drive the scheduler, output lands on the
//! watch channel, failures degrade instead of clearing the screen.

use async_trait::async_trait;
use chrono::NaiveDate;
use clinic_queue_sync_core::config::Config;
use clinic_queue_sync_core::schema::{
    CATEGORY_QUEUE, CATEGORY_REFRESH, ChangeReason, PaymentState, QueueStatus, RawSourceRecord,
};
use clinic_queue_sync_engine::{
    ChangeBus, DateRange, FeedError, LedgerSource, QueueFeedSource, RefreshScheduler,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

struct StubFeed {
    id: String,
    response: Mutex<Result<Vec<RawSourceRecord>, FeedError>>,
    fetches: AtomicUsize,
}

impl StubFeed {
    fn new(id: &str, records: Vec<RawSourceRecord>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            response: Mutex::new(Ok(records)),
            fetches: AtomicUsize::new(0),
        })
    }

    fn set_records(&self, records: Vec<RawSourceRecord>) {
        *self.response.lock().unwrap() = Ok(records);
    }

    fn fail(&self) {
        *self.response.lock().unwrap() = Err(FeedError::Status {
            status: 500,
            message: "backend down".to_string(),
        });
    }

    fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueFeedSource for StubFeed {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<Vec<RawSourceRecord>, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.response.lock().unwrap().clone()
    }
}

struct StubLedger {
    records: Mutex<Vec<RawSourceRecord>>,
}

impl StubLedger {
    fn new(records: Vec<RawSourceRecord>) -> Arc<Self> {
        Arc::new(Self {
            records: Mutex::new(records),
        })
    }
}

#[async_trait]
impl LedgerSource for StubLedger {
    async fn fetch(&self, _range: DateRange) -> Result<Vec<RawSourceRecord>, FeedError> {
        Ok(self.records.lock().unwrap().clone())
    }
}

fn queue_record(source: &str, subject: u64, appointment: u64, codes: &[&str]) -> RawSourceRecord {
    RawSourceRecord {
        source_id: source.to_string(),
        subject_id: subject,
        appointment_id: Some(appointment),
        department: Some(source.to_string()),
        status: QueueStatus::Waiting,
        payment_state: Some(PaymentState::Pending),
        service_codes: codes.iter().map(|c| c.to_string()).collect(),
        service_date: chrono::Utc::now().date_naive(),
        display: HashMap::new(),
    }
}

fn ledger_record(subject: u64, date: NaiveDate, state: PaymentState) -> RawSourceRecord {
    RawSourceRecord {
        source_id: "ledger".to_string(),
        subject_id: subject,
        appointment_id: None,
        department: None,
        status: QueueStatus::Waiting,
        payment_state: Some(state),
        service_codes: BTreeSet::new(),
        service_date: date,
        display: HashMap::new(),
    }
}

/// A feed whose fetch blocks until the test opens the gate, so a run can be
/// held in flight while triggers arrive.
struct GatedFeed {
    id: String,
    gate: Semaphore,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl GatedFeed {
    fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            gate: Semaphore::new(0),
            fetches: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl QueueFeedSource for GatedFeed {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<Vec<RawSourceRecord>, FeedError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(vec![queue_record(&self.id, 1, 10, &[])])
    }
}

#[tokio::test(start_paused = true)]
async fn bus_triggered_refresh_flow() {
    let bus = Arc::new(ChangeBus::new());
    let cardio = StubFeed::new("cardio", vec![queue_record("cardio", 1, 10, &["CONSULT"])]);
    let lab = StubFeed::new("lab", vec![queue_record("lab", 2, 20, &["CBC"])]);
    let ledger = StubLedger::new(vec![ledger_record(
        1,
        chrono::Utc::now().date_naive(),
        PaymentState::Paid,
    )]);

    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::clone(&bus),
        vec![
            Arc::clone(&cardio) as Arc<dyn QueueFeedSource>,
            Arc::clone(&lab) as Arc<dyn QueueFeedSource>,
        ],
        ledger,
        Arc::new(|_: &BTreeSet<String>| true),
        &Config::default(),
    ));

    let mut output = scheduler.subscribe_output();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&scheduler).run(cancel.clone()));

    // Startup pass.
    output.changed().await.unwrap();
    {
        let set = output.borrow_and_update();
        assert_eq!(set.records.len(), 2);
        assert!(!set.partial);
        // Ledger precedence applied over the queue's pending state.
        assert_eq!(set.records[0].payment_state, PaymentState::Paid);
    }
    assert_eq!(cardio.fetch_count(), 1);

    // A burst of queue mutations coalesces into one refresh.
    cardio.set_records(vec![queue_record("cardio", 3, 30, &["ECHO"])]);
    bus.publish(CATEGORY_QUEUE, ChangeReason::StatusChanged);
    bus.publish(CATEGORY_QUEUE, ChangeReason::Completed);
    bus.publish(CATEGORY_QUEUE, ChangeReason::Completed);

    output.changed().await.unwrap();
    {
        let set = output.borrow_and_update();
        let subjects: Vec<u64> = set
            .records
            .iter()
            .map(|r| r.entity_key.subject_id)
            .collect();
        assert_eq!(subjects, vec![3, 2]);
    }
    assert_eq!(cardio.fetch_count(), 2, "burst produced one pass");

    // One feed down: partial, remaining records still visible.
    lab.fail();
    bus.publish(CATEGORY_REFRESH, ChangeReason::External);
    output.changed().await.unwrap();
    {
        let set = output.borrow_and_update();
        assert!(set.partial);
        assert!(!set.stale);
        assert_eq!(set.records.len(), 1);
        assert_eq!(set.records[0].entity_key.subject_id, 3);
    }

    // Every feed down: previous records retained, stale flagged.
    cardio.fail();
    bus.publish(CATEGORY_REFRESH, ChangeReason::External);
    output.changed().await.unwrap();
    {
        let set = output.borrow_and_update();
        assert!(set.partial);
        assert!(set.stale);
        assert_eq!(set.records.len(), 1, "previous set survives total failure");
    }

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn triggers_during_in_flight_run_queue_one_follow_up() {
    let bus = Arc::new(ChangeBus::new());
    let feed = GatedFeed::new("cardio");
    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::clone(&bus),
        vec![Arc::clone(&feed) as Arc<dyn QueueFeedSource>],
        StubLedger::new(Vec::new()),
        Arc::new(|_: &BTreeSet<String>| true),
        &Config::default(),
    ));

    let mut output = scheduler.subscribe_output();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&scheduler).run(cancel.clone()));

    // Let the startup pass begin and block inside the feed fetch.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(feed.fetches.load(Ordering::SeqCst), 1);

    // Two bursts settle while the run is still in flight. The first trigger
    // takes the single follow-up slot; the second finds it occupied and is
    // absorbed.
    for _ in 0..3 {
        bus.publish(CATEGORY_QUEUE, ChangeReason::StatusChanged);
    }
    tokio::time::sleep(Duration::from_millis(400)).await;
    for _ in 0..2 {
        bus.publish(CATEGORY_REFRESH, ChangeReason::External);
    }
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(
        feed.fetches.load(Ordering::SeqCst),
        1,
        "no pass starts while one is in flight"
    );

    // Open the gate: the blocked pass finishes, then the queued follow-up
    // runs to completion.
    feed.gate.add_permits(8);
    output.changed().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(feed.fetches.load(Ordering::SeqCst), 2, "exactly one follow-up");
    assert_eq!(
        feed.max_in_flight.load(Ordering::SeqCst),
        1,
        "runs never overlap"
    );

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn polling_safety_net_refreshes_without_events() {
    let bus = Arc::new(ChangeBus::new());
    let feed = StubFeed::new("cardio", vec![queue_record("cardio", 1, 10, &[])]);
    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::clone(&bus),
        vec![Arc::clone(&feed) as Arc<dyn QueueFeedSource>],
        StubLedger::new(Vec::new()),
        Arc::new(|_: &BTreeSet<String>| true),
        &Config::default(),
    ));

    let mut output = scheduler.subscribe_output();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&scheduler).run(cancel.clone()));

    output.changed().await.unwrap();
    output.borrow_and_update();
    assert_eq!(feed.fetch_count(), 1);

    // No bus traffic at all: the poll interval still refreshes.
    feed.set_records(vec![queue_record("cardio", 9, 90, &[])]);
    output.changed().await.unwrap();
    {
        let set = output.borrow_and_update();
        assert_eq!(set.records[0].entity_key.subject_id, 9);
    }
    assert_eq!(feed.fetch_count(), 2);

    cancel.cancel();
    task.await.unwrap().unwrap();
}
