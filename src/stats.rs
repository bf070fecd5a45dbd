// src/stats.rs
//! Pipeline counters

use crate::delivery::DeliveryOutcome;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Thread-safe counters shared by the event loop, matcher and delivery tasks
#[derive(Clone)]
pub struct StatsCollector {
    events_processed: Arc<AtomicU64>,
    new_subdomains: Arc<AtomicU64>,
    batches_delivered: Arc<AtomicU64>,
    batches_failed: Arc<AtomicU64>,
    start_time: Instant,
}

/// Snapshot of statistics at a point in time
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub events_processed: u64,
    pub new_subdomains: u64,
    pub batches_delivered: u64,
    pub batches_failed: u64,
    pub events_per_minute: f64,
    pub uptime_secs: u64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            events_processed: Arc::new(AtomicU64::new(0)),
            new_subdomains: Arc::new(AtomicU64::new(0)),
            batches_delivered: Arc::new(AtomicU64::new(0)),
            batches_failed: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    /// Count one certificate update handed to the matcher
    pub fn increment_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_new_subdomains(&self) {
        self.new_subdomains.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a finished delivery. Skipped sends are not counted.
    pub fn record_delivery(&self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Skipped => {}
            DeliveryOutcome::Delivered { .. } => {
                self.batches_delivered.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.batches_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self.start_time.elapsed();
        let processed = self.events_processed.load(Ordering::Relaxed);

        let rate = if elapsed.as_secs() > 0 {
            (processed as f64 / elapsed.as_secs() as f64) * 60.0
        } else {
            0.0
        };

        StatsSnapshot {
            events_processed: processed,
            new_subdomains: self.new_subdomains.load(Ordering::Relaxed),
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            events_per_minute: rate,
            uptime_secs: elapsed.as_secs(),
        }
    }

    /// Format statistics as a single log line
    pub fn format_stats(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            "{} certs | {} new subdomains | {} batches sent | {} failed | {:.1} certs/min | uptime: {}",
            snapshot.events_processed,
            snapshot.new_subdomains,
            snapshot.batches_delivered,
            snapshot.batches_failed,
            snapshot.events_per_minute,
            Self::format_uptime(snapshot.uptime_secs)
        )
    }

    pub fn format_uptime(secs: u64) -> String {
        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
