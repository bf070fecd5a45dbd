// src/notifier.rs
//! Per-target notification batching
//!
//! Matched domains accumulate per target and are flushed to a
//! [`NotificationSink`] when either the batch reaches `max_batch_size`
//! or the debounce timer started by its first domain expires.

use crate::delivery::DeliveryOutcome;
use crate::stats::StatsCollector;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Destination for flushed batches
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, target: &str, domains: &[String]) -> DeliveryOutcome;
}

#[derive(Debug, Clone)]
pub struct BatchPolicy {
    pub debounce: Duration,
    pub max_batch_size: usize,
    /// Upper bound on deliveries running at once
    pub max_concurrent_deliveries: usize,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
            max_batch_size: 25,
            max_concurrent_deliveries: 4,
        }
    }
}

struct PendingBatch {
    domains: Vec<String>,
    /// Identifies the accumulation cycle this batch's timer belongs to
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Batches {
    pending: HashMap<String, PendingBatch>,
    next_generation: u64,
}

struct BufferInner {
    batches: Mutex<Batches>,
    sink: Arc<dyn NotificationSink>,
    policy: BatchPolicy,
    permits: Arc<Semaphore>,
    stats: StatsCollector,
}

/// Buffers matched domains per target and hands full or expired batches
/// to the sink. Cheap to clone; clones share the same batches.
#[derive(Clone)]
pub struct NotificationBuffer {
    inner: Arc<BufferInner>,
}

impl NotificationBuffer {
    pub fn new(sink: Arc<dyn NotificationSink>, policy: BatchPolicy, stats: StatsCollector) -> Self {
        let permits = Arc::new(Semaphore::new(policy.max_concurrent_deliveries.max(1)));

        Self {
            inner: Arc::new(BufferInner {
                batches: Mutex::new(Batches::default()),
                sink,
                policy,
                permits,
                stats,
            }),
        }
    }

    /// Queue `domain` for `target`.
    ///
    /// Never blocks on delivery. Must be called from within a tokio runtime.
    pub fn add(&self, target: &str, domain: String) {
        let ready = {
            let mut batches = self.inner.lock();

            match batches.pending.get_mut(target) {
                Some(batch) => {
                    batch.domains.push(domain);
                    if batch.domains.len() >= self.inner.policy.max_batch_size {
                        batches.pending.remove(target).map(|batch| {
                            batch.timer.abort();
                            batch.domains
                        })
                    } else {
                        None
                    }
                }
                None if self.inner.policy.max_batch_size <= 1 => Some(vec![domain]),
                None => {
                    let generation = batches.next_generation;
                    batches.next_generation += 1;

                    let timer = self.start_timer(target.to_string(), generation);
                    batches.pending.insert(
                        target.to_string(),
                        PendingBatch {
                            domains: vec![domain],
                            generation,
                            timer,
                        },
                    );
                    None
                }
            }
        };

        if let Some(domains) = ready {
            debug!(watch_target = %target, count = domains.len(), "batch full, flushing");
            self.inner.dispatch(target.to_string(), domains);
        }
    }

    /// Number of domains waiting in `target`'s batch
    pub fn pending_len(&self, target: &str) -> usize {
        self.inner
            .lock()
            .pending
            .get(target)
            .map_or(0, |batch| batch.domains.len())
    }

    /// Number of targets with a batch in progress
    pub fn pending_targets(&self) -> usize {
        self.inner.lock().pending.len()
    }

    fn start_timer(&self, target: String, generation: u64) -> JoinHandle<()> {
        let weak: Weak<BufferInner> = Arc::downgrade(&self.inner);
        let debounce = self.inner.policy.debounce;

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(inner) = weak.upgrade() {
                inner.flush_expired(target, generation);
            }
        })
    }
}

impl BufferInner {
    fn lock(&self) -> MutexGuard<'_, Batches> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Timer callback. A no-op when the batch it was started for has
    /// already been flushed by the size trigger.
    fn flush_expired(self: Arc<Self>, target: String, generation: u64) {
        let domains = {
            let mut batches = self.lock();
            match batches.pending.get(&target) {
                Some(batch) if batch.generation == generation => {
                    batches.pending.remove(&target).map(|batch| batch.domains)
                }
                _ => None,
            }
        };

        if let Some(domains) = domains {
            debug!(watch_target = %target, count = domains.len(), "debounce expired, flushing");
            self.dispatch(target, domains);
        }
    }

    fn dispatch(self: &Arc<Self>, target: String, domains: Vec<String>) {
        let inner = Arc::clone(self);

        tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&inner.permits).acquire_owned().await else {
                return;
            };

            let outcome = inner.sink.deliver(&target, &domains).await;
            if let DeliveryOutcome::Delivered { attempts } = outcome {
                info!(watch_target = %target, count = domains.len(), attempts, "notification sent");
            }
            inner.stats.record_delivery(outcome);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    struct RecordingSink {
        tx: mpsc::UnboundedSender<(String, Vec<String>, Instant)>,
        outcome: DeliveryOutcome,
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn deliver(&self, target: &str, domains: &[String]) -> DeliveryOutcome {
            let _ = self
                .tx
                .send((target.to_string(), domains.to_vec(), Instant::now()));
            self.outcome
        }
    }

    fn buffer_with(
        policy: BatchPolicy,
        outcome: DeliveryOutcome,
    ) -> (
        NotificationBuffer,
        mpsc::UnboundedReceiver<(String, Vec<String>, Instant)>,
        StatsCollector,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = StatsCollector::new();
        let sink = Arc::new(RecordingSink { tx, outcome });
        (NotificationBuffer::new(sink, policy, stats.clone()), rx, stats)
    }

    fn buffer() -> (
        NotificationBuffer,
        mpsc::UnboundedReceiver<(String, Vec<String>, Instant)>,
    ) {
        let (buffer, rx, _) = buffer_with(
            BatchPolicy::default(),
            DeliveryOutcome::Delivered { attempts: 1 },
        );
        (buffer, rx)
    }

    fn domain(i: usize) -> String {
        format!("host{}.example.com", i)
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_trigger_flushes_before_debounce() {
        let (buffer, mut rx) = buffer();
        let start = Instant::now();

        for i in 0..25 {
            buffer.add("example.com", domain(i));
        }
        assert_eq!(buffer.pending_targets(), 0);

        let (target, domains, at) = rx.recv().await.unwrap();
        assert_eq!(target, "example.com");
        assert_eq!(domains, (0..25).map(domain).collect::<Vec<_>>());
        assert!(at.duration_since(start) < Duration::from_secs(5));

        // The cancelled timer must not produce a second delivery
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_trigger_flushes_partial_batch() {
        let (buffer, mut rx) = buffer();
        let start = Instant::now();

        for i in 0..3 {
            buffer.add("example.com", domain(i));
        }
        assert_eq!(buffer.pending_len("example.com"), 3);

        let (_, domains, at) = rx.recv().await.unwrap();
        assert_eq!(domains.len(), 3);
        assert!(at.duration_since(start) >= Duration::from_secs(5));
        assert_eq!(buffer.pending_targets(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_is_measured_from_first_domain() {
        let (buffer, mut rx) = buffer();
        let start = Instant::now();

        buffer.add("example.com", domain(0));
        tokio::time::sleep(Duration::from_secs(4)).await;
        buffer.add("example.com", domain(1));

        let (_, domains, at) = rx.recv().await.unwrap();
        assert_eq!(domains.len(), 2);
        assert!(at.duration_since(start) < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_targets_are_batched_separately() {
        let (buffer, mut rx) = buffer();

        buffer.add("a.com", "x.a.com".to_string());
        buffer.add("b.com", "x.b.com".to_string());
        buffer.add("a.com", "y.a.com".to_string());
        assert_eq!(buffer.pending_targets(), 2);

        let mut got = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        got.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(got[0].0, "a.com");
        assert_eq!(got[0].1, vec!["x.a.com", "y.a.com"]);
        assert_eq!(got[1].0, "b.com");
        assert_eq!(got[1].1, vec!["x.b.com"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_cycle_after_size_flush() {
        let (buffer, mut rx) = buffer();

        for i in 0..27 {
            buffer.add("example.com", domain(i));
        }

        let (_, first, _) = rx.recv().await.unwrap();
        assert_eq!(first.len(), 25);
        assert_eq!(buffer.pending_len("example.com"), 2);

        let (_, second, _) = rx.recv().await.unwrap();
        assert_eq!(second, vec![domain(25), domain(26)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_size_flush_racing_timer_delivers_once() {
        let (buffer, mut rx) = buffer();

        buffer.add("example.com", domain(0));
        tokio::time::sleep(Duration::from_millis(4999)).await;
        for i in 1..25 {
            buffer.add("example.com", domain(i));
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
        // The next cycle starts right as the stale timer would have fired
        buffer.add("example.com", domain(25));

        tokio::time::sleep(Duration::from_secs(30)).await;

        let mut delivered = Vec::new();
        while let Ok((_, domains, _)) = rx.try_recv() {
            delivered.push(domains);
        }

        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].len(), 25);
        assert_eq!(delivered[1], vec![domain(25)]);
        let total: usize = delivered.iter().map(Vec::len).sum();
        assert_eq!(total, 26);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_size_one_flushes_immediately() {
        let policy = BatchPolicy {
            max_batch_size: 1,
            ..BatchPolicy::default()
        };
        let (buffer, mut rx, _) =
            buffer_with(policy, DeliveryOutcome::Delivered { attempts: 1 });

        buffer.add("example.com", domain(0));
        buffer.add("example.com", domain(1));
        assert_eq!(buffer.pending_targets(), 0);

        assert_eq!(rx.recv().await.unwrap().1, vec![domain(0)]);
        assert_eq!(rx.recv().await.unwrap().1, vec![domain(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_is_counted_and_dropped() {
        let (buffer, mut rx, stats) = buffer_with(
            BatchPolicy::default(),
            DeliveryOutcome::Throttled { attempts: 3 },
        );

        buffer.add("example.com", domain(0));
        rx.recv().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(buffer.pending_targets(), 0);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.batches_failed, 1);
        assert_eq!(snapshot.batches_delivered, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_lose_nothing() {
        let policy = BatchPolicy {
            debounce: Duration::from_millis(20),
            max_batch_size: 7,
            max_concurrent_deliveries: 2,
        };
        let (buffer, mut rx, _) =
            buffer_with(policy, DeliveryOutcome::Delivered { attempts: 1 });

        let mut handles = Vec::new();
        for task in 0..4 {
            let buffer = buffer.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    buffer.add("example.com", format!("t{}-{}.example.com", task, i));
                    if i % 10 == 0 {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                    }
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut total = 0;
        while total < 200 {
            let (_, domains, _) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(domains.len() <= 7);
            total += domains.len();
        }
        assert_eq!(total, 200);
    }
}
