//! Broadcast hub: fans decoded records out to every live subscriber.
//!
//! The hub is the only owner of the subscriber set. The ingestion task calls
//! [`BroadcastHub::broadcast`]; connection handlers call
//! [`BroadcastHub::subscribe`] or [`BroadcastHub::register`]. Both take the
//! same mutex, so neither ever sees a half-updated set.
//!
//! Delivery is best effort. Each push is non-blocking: a subscriber whose
//! queue is full misses that record, and a subscriber whose channel is gone
//! is evicted for good. A sink that panics inside `push` is treated as gone.
//!
//! ```text
//!   Active ──(push reports Disconnected or panics)──▶ Evicted   (terminal)
//! ```
//!
//! Delivery and eviction happen in the same pass over the set, so an evicted
//! subscriber is never left behind in it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, trace, warn};

use crate::packet::CarTelemetry;

/// Record as shared between subscribers; decoded once, cloned by pointer.
pub type SharedRecord = Arc<CarTelemetry>;

/// Result of a single non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Subscriber is alive but lagging; this record was skipped for it
    Dropped,
    /// Subscriber is gone and must be evicted
    Disconnected,
}

/// An opaque sink the hub pushes records into.
///
/// Implementations must not block; a slow peer reports [`Delivery::Dropped`].
pub trait Subscriber: Send + 'static {
    fn push(&mut self, record: &SharedRecord) -> Delivery;
}

impl Subscriber for mpsc::Sender<SharedRecord> {
    fn push(&mut self, record: &SharedRecord) -> Delivery {
        match self.try_send(Arc::clone(record)) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Disconnected,
        }
    }
}

/// Handle identifying a registration, used only in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

struct Slot {
    sink: Box<dyn Subscriber>,
}

impl Slot {
    /// Push one record; a panicking sink counts as disconnected.
    fn deliver(&mut self, id: SubscriberId, record: &SharedRecord) -> Delivery {
        match panic::catch_unwind(AssertUnwindSafe(|| self.sink.push(record))) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(%id, "Subscriber panicked during push");
                Delivery::Disconnected
            }
        }
    }
}

#[derive(Default)]
struct HubState {
    slots: HashMap<SubscriberId, Slot>,
    closed: bool,
}

#[derive(Default)]
struct Counters {
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

struct Inner {
    state: Mutex<HubState>,
    next_id: AtomicU64,
    counters: Counters,
}

/// Per-call fan-out summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub evicted: usize,
}

/// Cumulative hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub subscribers: usize,
    pub broadcasts: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub evicted: u64,
}

/// Receiving half of a queue-backed subscription.
///
/// Ends (yields `None`) once the hub evicts or closes it. Dropping it makes the
/// next broadcast evict the subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<SharedRecord>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next record.
    pub async fn recv(&mut self) -> Option<SharedRecord> {
        self.rx.recv().await
    }

    /// Take a queued record without waiting.
    pub fn try_recv(&mut self) -> Option<SharedRecord> {
        self.rx.try_recv().ok()
    }

    /// Convert into a [`futures::Stream`] of records.
    pub fn into_stream(self) -> ReceiverStream<SharedRecord> {
        ReceiverStream::new(self.rx)
    }
}

/// Cloneable handle to the shared subscriber set.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<Inner>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(HubState::default()),
                next_id: AtomicU64::new(0),
                counters: Counters::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a subscriber to the live set.
    ///
    /// After [`close`](Self::close) the sink is dropped straight away.
    pub fn register<S: Subscriber>(&self, subscriber: S) -> SubscriberId {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.lock();
        if state.closed {
            debug!(%id, "Hub closed, rejecting subscriber");
            return id;
        }
        state
            .slots
            .insert(id, Slot { sink: Box::new(subscriber) });
        info!(%id, subscribers = state.slots.len(), "Subscriber registered");
        id
    }

    /// Register a bounded queue and return its receiving half.
    ///
    /// `capacity` is clamped to at least one record.
    pub fn subscribe(&self, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.register(tx);
        Subscription { id, rx }
    }

    /// Push one record to every live subscriber, evicting those that are gone.
    ///
    /// Never waits on a subscriber; with no subscribers this is a no-op.
    pub fn broadcast(&self, record: CarTelemetry) -> BroadcastReport {
        let record: SharedRecord = Arc::new(record);
        let mut report = BroadcastReport::default();

        self.lock().slots.retain(|id, slot| match slot.deliver(*id, &record) {
            Delivery::Delivered => {
                report.delivered += 1;
                true
            }
            Delivery::Dropped => {
                trace!(%id, "Subscriber lagging, record dropped");
                report.dropped += 1;
                true
            }
            Delivery::Disconnected => {
                warn!(%id, "Subscriber disconnected, evicting");
                report.evicted += 1;
                false
            }
        });

        let counters = &self.inner.counters;
        counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        counters.delivered.fetch_add(report.delivered as u64, Ordering::Relaxed);
        counters.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        counters.evicted.fetch_add(report.evicted as u64, Ordering::Relaxed);

        report
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Drop every subscriber and refuse new ones.
    ///
    /// Waits for an in-flight broadcast to finish first, so queued records
    /// are still readable by subscribers after their sender is gone.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        let released = state.slots.len();
        state.slots.clear();
        info!(released, "Broadcast hub closed");
    }

    pub fn stats(&self) -> HubStats {
        let counters = &self.inner.counters;
        HubStats {
            subscribers: self.len(),
            broadcasts: counters.broadcasts.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            evicted: counters.evicted.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_telemetry;
    use futures::StreamExt;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    /// Counts pushes, then reports Disconnected once `fail_after` is reached.
    struct CountingSink {
        pushes: Arc<AtomicUsize>,
        fail_after: Option<usize>,
    }

    impl CountingSink {
        fn healthy(pushes: &Arc<AtomicUsize>) -> Self {
            Self { pushes: Arc::clone(pushes), fail_after: None }
        }

        fn failing_after(pushes: &Arc<AtomicUsize>, n: usize) -> Self {
            Self { pushes: Arc::clone(pushes), fail_after: Some(n) }
        }
    }

    impl Subscriber for CountingSink {
        fn push(&mut self, _record: &SharedRecord) -> Delivery {
            let seen = self.pushes.fetch_add(1, Ordering::SeqCst);
            match self.fail_after {
                Some(limit) if seen >= limit => Delivery::Disconnected,
                _ => Delivery::Delivered,
            }
        }
    }

    #[test]
    fn all_subscribers_receive_the_same_record() {
        let hub = BroadcastHub::new();
        let mut subs: Vec<Subscription> = (0..3).map(|_| hub.subscribe(4)).collect();

        let report = hub.broadcast(sample_telemetry(287));
        assert_eq!(report, BroadcastReport { delivered: 3, dropped: 0, evicted: 0 });

        for sub in &mut subs {
            let record = sub.try_recv().expect("record should be queued");
            assert_eq!(record.speed, 287);
        }
    }

    #[test]
    fn failing_subscriber_is_evicted_after_one_broadcast() {
        let hub = BroadcastHub::new();
        let mut healthy: Vec<Subscription> = (0..2).map(|_| hub.subscribe(4)).collect();
        let failing_pushes = Arc::new(AtomicUsize::new(0));
        hub.register(CountingSink::failing_after(&failing_pushes, 0));
        assert_eq!(hub.len(), 3);

        let report = hub.broadcast(sample_telemetry(1));
        assert_eq!(report.evicted, 1);
        assert_eq!(hub.len(), 2);

        let report = hub.broadcast(sample_telemetry(2));
        assert_eq!(report.delivered, 2);
        assert_eq!(report.evicted, 0);
        // Evicted subscribers are never pushed to again
        assert_eq!(failing_pushes.load(Ordering::SeqCst), 1);

        for sub in &mut healthy {
            assert_eq!(sub.try_recv().unwrap().speed, 1);
            assert_eq!(sub.try_recv().unwrap().speed, 2);
        }
    }

    /// Panics on every push.
    struct PanickingSink {
        pushes: Arc<AtomicUsize>,
    }

    impl Subscriber for PanickingSink {
        fn push(&mut self, _record: &SharedRecord) -> Delivery {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            panic!("sink exploded");
        }
    }

    #[test]
    fn disconnected_and_panicking_subscribers_are_both_evicted() {
        let hub = BroadcastHub::new();
        let mut healthy = hub.subscribe(4);
        let gone_pushes = Arc::new(AtomicUsize::new(0));
        let boom_pushes = Arc::new(AtomicUsize::new(0));
        hub.register(CountingSink::failing_after(&gone_pushes, 0));
        hub.register(PanickingSink { pushes: Arc::clone(&boom_pushes) });

        let report = hub.broadcast(sample_telemetry(1));
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 0, evicted: 2 });
        assert_eq!(hub.len(), 1);

        for n in 2..5 {
            let report = hub.broadcast(sample_telemetry(n));
            assert_eq!(report, BroadcastReport { delivered: 1, dropped: 0, evicted: 0 });
        }
        assert_eq!(gone_pushes.load(Ordering::SeqCst), 1);
        assert_eq!(boom_pushes.load(Ordering::SeqCst), 1);
        assert_eq!(hub.stats().evicted, 2);

        let speeds: Vec<u16> = std::iter::from_fn(|| healthy.try_recv()).map(|r| r.speed).collect();
        assert_eq!(speeds, vec![1, 2, 3, 4]);
    }

    #[test]
    fn dropped_subscription_is_evicted() {
        let hub = BroadcastHub::new();
        let sub = hub.subscribe(4);
        let _keep = hub.subscribe(4);
        drop(sub);

        let report = hub.broadcast(sample_telemetry(0));
        assert_eq!(report.evicted, 1);
        assert_eq!(hub.len(), 1);
        assert_eq!(hub.stats().evicted, 1);
    }

    #[test]
    fn lagging_subscriber_misses_records_but_stays() {
        let hub = BroadcastHub::new();
        let mut slow = hub.subscribe(1);

        assert_eq!(hub.broadcast(sample_telemetry(1)).delivered, 1);
        let report = hub.broadcast(sample_telemetry(2));
        assert_eq!(report.dropped, 1);
        assert_eq!(report.evicted, 0);
        assert_eq!(hub.len(), 1);

        assert_eq!(slow.try_recv().unwrap().speed, 1);
        assert!(slow.try_recv().is_none());

        hub.broadcast(sample_telemetry(3));
        assert_eq!(slow.try_recv().unwrap().speed, 3);
    }

    #[test]
    fn broadcast_without_subscribers_is_a_no_op() {
        let hub = BroadcastHub::new();
        assert!(hub.is_empty());
        assert_eq!(hub.broadcast(sample_telemetry(0)), BroadcastReport::default());
        assert_eq!(hub.stats().broadcasts, 1);
    }

    #[tokio::test]
    async fn close_ends_subscriptions_after_draining() {
        let hub = BroadcastHub::new();
        let sub = hub.subscribe(4);
        hub.broadcast(sample_telemetry(5));
        hub.close();

        assert!(hub.is_closed());
        assert!(hub.is_empty());

        let received: Vec<u16> = sub.into_stream().map(|r| r.speed).collect().await;
        assert_eq!(received, vec![5]);
    }

    #[tokio::test]
    async fn register_after_close_is_rejected() {
        let hub = BroadcastHub::new();
        hub.close();
        let mut sub = hub.subscribe(4);

        assert!(hub.is_empty());
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn subscriber_ids_are_unique() {
        let hub = BroadcastHub::new();
        let a = hub.subscribe(1);
        let b = hub.subscribe(1);
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id().to_string(), b.id().to_string());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn concurrent_registration_during_broadcast_keeps_set_consistent(
            threads in 1usize..6,
            per_thread in 1usize..20,
            broadcasts in 1usize..50,
            fail_every in 2usize..5
        ) {
            let hub = BroadcastHub::new();
            let pushes = Arc::new(AtomicUsize::new(0));

            std::thread::scope(|scope| {
                for t in 0..threads {
                    let hub = hub.clone();
                    let pushes = Arc::clone(&pushes);
                    scope.spawn(move || {
                        for i in 0..per_thread {
                            if (t * per_thread + i) % fail_every == 0 {
                                hub.register(CountingSink::failing_after(&pushes, 0));
                            } else {
                                hub.register(CountingSink::healthy(&pushes));
                            }
                        }
                    });
                }
                for n in 0..broadcasts {
                    hub.broadcast(sample_telemetry(n as u16));
                    std::thread::yield_now();
                }
            });

            let total = threads * per_thread;
            let failing = (0..total).filter(|k| k % fail_every == 0).count();

            // One more pass evicts failing sinks registered after the last broadcast
            hub.broadcast(sample_telemetry(0));

            prop_assert_eq!(hub.len(), total - failing);
            prop_assert_eq!(hub.stats().evicted as usize, failing);
        }
    }
}
