//! Bounded blocking MPMC queues between pipeline stages.
//!
//! `BoundedQueue` is the only shared mutable state between stages of the
//! recorder and analyzer pipelines. Producers block (with a timeout) when
//! the queue is full, consumers block when it is empty, and `stop()` wakes
//! every waiter so a stage can drain what is left and exit.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct Inner<T> {
    items: VecDeque<T>,
    stopped: bool,
}

/// Bounded multi-producer/multi-consumer FIFO.
///
/// Semantics around shutdown:
/// - `push_timeout` returns `false` once the queue is stopped, or when no
///   slot frees up within the timeout.
/// - `pop_timeout` keeps returning items after `stop()` until the queue is
///   drained, then returns `None` without waiting.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items.
    ///
    /// A capacity of zero means unbounded.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                stopped: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    fn is_full(&self, inner: &Inner<T>) -> bool {
        self.capacity != 0 && inner.items.len() >= self.capacity
    }

    /// Push an item, waiting up to `timeout` for a free slot.
    ///
    /// Returns `false` if the slot never freed up or the queue was stopped.
    pub fn push_timeout(&self, value: T, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        while self.is_full(&inner) && !inner.stopped {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, wait) = self
                .not_full
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
            if wait.timed_out() && self.is_full(&inner) {
                return false;
            }
        }

        if inner.stopped {
            return false;
        }

        inner.items.push_back(value);
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Pop an item, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout, or immediately once the queue is stopped
    /// and drained.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        while inner.items.is_empty() {
            if inner.stopped {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, wait) = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
            if wait.timed_out() && inner.items.is_empty() {
                return None;
            }
        }

        let value = inner.items.pop_front();
        drop(inner);
        self.not_full.notify_one();
        value
    }

    /// Pop without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let value = inner.items.pop_front();
        if value.is_some() {
            drop(inner);
            self.not_full.notify_one();
        }
        value
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discard all queued items.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.items.clear();
        drop(inner);
        self.not_full.notify_all();
    }

    /// Stop the queue: refuse further pushes and wake every waiter.
    ///
    /// Consumers drain remaining items before seeing `None`.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.stopped = true;
        drop(inner);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .stopped
    }

    /// Re-arm a stopped queue, discarding anything left in it.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.items.clear();
        inner.stopped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(20);
    const LONG: Duration = Duration::from_millis(500);

    #[test]
    fn test_push_pop_fifo() {
        let queue = BoundedQueue::new(4);
        assert!(queue.push_timeout(1, SHORT));
        assert!(queue.push_timeout(2, SHORT));
        assert_eq!(queue.pop_timeout(SHORT), Some(1));
        assert_eq!(queue.pop_timeout(SHORT), Some(2));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_times_out_when_full() {
        let queue = BoundedQueue::new(1);
        assert!(queue.push_timeout(1, SHORT));
        assert!(!queue.push_timeout(2, SHORT));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let queue: BoundedQueue<u32> = BoundedQueue::new(1);
        assert_eq!(queue.pop_timeout(SHORT), None);
    }

    #[test]
    fn test_stop_refuses_push_but_drains_pop() {
        let queue = BoundedQueue::new(4);
        assert!(queue.push_timeout(1, SHORT));
        queue.stop();
        assert!(!queue.push_timeout(2, SHORT));
        assert_eq!(queue.pop_timeout(SHORT), Some(1));
        // Drained and stopped: returns immediately.
        let start = Instant::now();
        assert_eq!(queue.pop_timeout(LONG), None);
        assert!(start.elapsed() < LONG);
    }

    #[test]
    fn test_stop_wakes_blocked_consumer() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(1));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop_timeout(Duration::from_secs(5)))
        };
        thread::sleep(SHORT);
        queue.stop();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_stop_wakes_blocked_producer() {
        let queue = Arc::new(BoundedQueue::new(1));
        assert!(queue.push_timeout(1, SHORT));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push_timeout(2, Duration::from_secs(5)))
        };
        thread::sleep(SHORT);
        queue.stop();
        assert!(!producer.join().unwrap());
    }

    #[test]
    fn test_blocked_producer_resumes_on_pop() {
        let queue = Arc::new(BoundedQueue::new(1));
        assert!(queue.push_timeout(1, SHORT));
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push_timeout(2, Duration::from_secs(5)))
        };
        thread::sleep(SHORT);
        assert_eq!(queue.pop_timeout(SHORT), Some(1));
        assert!(producer.join().unwrap());
        assert_eq!(queue.pop_timeout(SHORT), Some(2));
    }

    #[test]
    fn test_mpmc_all_items_delivered() {
        let queue: Arc<BoundedQueue<u32>> = Arc::new(BoundedQueue::new(8));
        let mut producers = Vec::new();
        for p in 0..4u32 {
            let queue = Arc::clone(&queue);
            producers.push(thread::spawn(move || {
                for i in 0..100 {
                    assert!(queue.push_timeout(p * 100 + i, Duration::from_secs(5)));
                }
            }));
        }

        let mut consumers = Vec::new();
        for _ in 0..2 {
            let queue = Arc::clone(&queue);
            consumers.push(thread::spawn(move || {
                let mut seen = Vec::new();
                while let Some(value) = queue.pop_timeout(Duration::from_secs(1)) {
                    seen.push(value);
                }
                seen
            }));
        }

        for producer in producers {
            producer.join().unwrap();
        }
        queue.stop();

        let mut all: Vec<u32> = consumers
            .into_iter()
            .flat_map(|c| c.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (0..400).collect::<Vec<u32>>());
    }

    #[test]
    fn test_reset_after_stop() {
        let queue = BoundedQueue::new(2);
        queue.push_timeout(1, SHORT);
        queue.stop();
        queue.reset();
        assert!(!queue.is_stopped());
        assert!(queue.is_empty());
        assert!(queue.push_timeout(3, SHORT));
    }

    #[test]
    fn test_unbounded_queue_never_blocks_push() {
        let queue = BoundedQueue::new(0);
        for i in 0..10_000 {
            assert!(queue.push_timeout(i, Duration::ZERO));
        }
        assert_eq!(queue.len(), 10_000);
    }
}
