//! Batched Collector (C6): time- or size-bounded batching of progress items
//! (spec §4.6).
//!
//! Kept as a plain, synchronous struct — no background task of its own —
//! so the warm-up/size/timer decision is a pure function of `add()` calls
//! and is trivially unit-testable without a runtime. The service layer
//! (C8) drives the timer side with a `tokio::time::interval` calling
//! [`BatchedCollector::take_if_stale`].

use crate::config;
use std::time::{Duration, Instant};

/// Wraps a progress callback with warm-up, size, and timer-bounded
/// flushing: below `warmup` items total, every addition flushes
/// immediately (first results visible fast); after warm-up, items
/// accumulate until `batch_size` is reached or `flush_interval` elapses
/// (fewer IPC crossings on throughput-heavy searches).
pub struct BatchedCollector<T> {
    batch: Vec<T>,
    total: usize,
    warmup: usize,
    batch_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
}

impl<T> BatchedCollector<T> {
    pub fn new(warmup: usize, batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            batch: Vec::new(),
            total: 0,
            warmup,
            batch_size: batch_size.max(1),
            flush_interval,
            last_flush: Instant::now(),
        }
    }

    pub fn with_defaults(batch_size: usize) -> Self {
        Self::new(config::BATCH_WARMUP_COUNT, batch_size, config::BATCH_FLUSH_INTERVAL)
    }

    /// Running total of items ever added (used by the warm-up check, and
    /// reported upstream as the progress item's `worked` counter).
    pub fn total(&self) -> usize {
        self.total
    }

    /// Add one item. Returns the drained batch if this addition should
    /// flush immediately: still under warm-up, or the batch just reached
    /// `batch_size`.
    pub fn add(&mut self, item: T) -> Option<Vec<T>> {
        self.batch.push(item);
        self.total += 1;
        if self.total <= self.warmup || self.batch.len() >= self.batch_size {
            return self.flush();
        }
        None
    }

    /// Add several items at once, returning every batch that flushed along
    /// the way (in order). Mirrors the `(items[], size)` call shape spec
    /// §4.6 describes alongside the single-item `(item, size)` form.
    pub fn add_many(&mut self, items: impl IntoIterator<Item = T>) -> Vec<Vec<T>> {
        let mut flushed = Vec::new();
        for item in items {
            if let Some(batch) = self.add(item) {
                flushed.push(batch);
            }
        }
        flushed
    }

    /// Drain and return the current batch unconditionally, resetting the
    /// flush timer. Returns `None` if there is nothing pending.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        self.last_flush = Instant::now();
        if self.batch.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.batch))
        }
    }

    /// Whether the pending batch has been sitting longer than
    /// `flush_interval` and should be force-flushed by the caller's timer.
    pub fn is_stale(&self) -> bool {
        !self.batch.is_empty() && self.last_flush.elapsed() >= self.flush_interval
    }

    /// Flush only if stale; the convenience form for a timer tick.
    pub fn take_if_stale(&mut self) -> Option<Vec<T>> {
        if self.is_stale() { self.flush() } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_warmup_flushes_every_item() {
        // Scenario 1 (spec §8): 5 items, default warm-up (50) — every
        // addition flushes immediately as its own batch of 1.
        let mut c: BatchedCollector<u32> = BatchedCollector::with_defaults(10);
        let flushed = c.add_many(0..5);
        assert_eq!(flushed.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn past_warmup_batches_by_size() {
        // Scenario 2 (spec §8): 25 items, batch_size=10, with warm-up
        // disabled (0) so only the size boundary governs flushing —
        // expect batches of [10, 10, 5].
        let mut c: BatchedCollector<u32> = BatchedCollector::new(0, 10, Duration::from_secs(4));
        let flushed = c.add_many(0..25);
        assert_eq!(flushed.iter().map(Vec::len).collect::<Vec<_>>(), vec![10, 10]);
        let last = c.flush().unwrap();
        assert_eq!(last.len(), 5);
    }

    #[test]
    fn stale_batch_flushes_on_timer() {
        let mut c: BatchedCollector<u32> = BatchedCollector::new(0, 100, Duration::from_millis(1));
        assert!(c.add(1).is_none());
        std::thread::sleep(Duration::from_millis(5));
        assert!(c.is_stale());
        let batch = c.take_if_stale().unwrap();
        assert_eq!(batch, vec![1]);
        assert!(!c.is_stale());
    }
}
