//! Bounded SPSC ring buffer
//!
//! Fixed-capacity, wait-free ring buffer for exactly one producer thread and
//! one consumer thread. Used for the quote and order hand-offs described in
//! the engine module: `push` never blocks and fails with `Full` rather than
//! growing; `pop` never blocks and fails with `Empty` rather than waiting.
//!
//! Two producers or two consumers racing on the same queue is undefined
//! behavior at the API level (it will not corrupt memory, but item order and
//! count are no longer guaranteed); callers must own exactly one producer
//! handle and one consumer handle per queue.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Error returned when the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue is full")]
pub struct Full;

/// Error returned when the ring is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue is empty")]
pub struct Empty;

/// A fixed-capacity single-producer/single-consumer ring buffer.
///
/// Capacity must be a power of two (asserted at construction) so the index
/// mask is a single `AND`. Head and tail counters are cache-line padded to
/// avoid false sharing between the producer and consumer.
pub struct SpscQueue<T> {
    buf: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: the ring enforces single-producer/single-consumer access through
// its API; `T: Send` is sufficient to move items across the thread boundary.
unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    /// Build a queue with the given capacity, which must be a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two(), "capacity must be a power of two");
        let mut buf = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            buf.push(UnsafeCell::new(MaybeUninit::uninit()));
        }
        Self {
            buf: buf.into_boxed_slice(),
            mask: capacity - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    /// Default capacity of 1024, per the engine's default queue sizing.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Producer-side: push an item, returning it back on failure (queue full).
    ///
    /// Publishes the item with a `Release` store of the new tail so that a
    /// consumer that observes the new tail via `Acquire` is guaranteed to see
    /// the written slot.
    pub fn push(&self, item: T) -> Result<(), (T, Full)> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail.wrapping_sub(head) >= self.buf.len() {
            return Err((item, Full));
        }
        let idx = tail & self.mask;
        // SAFETY: this slot is only ever written by the single producer, and
        // is only read by the consumer after it observes `tail` via Acquire,
        // which happens-after this write due to the Release store below.
        unsafe {
            (*self.buf[idx].get()).write(item);
        }
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Ok(())
    }

    /// Consumer-side: pop the oldest item, or `Empty` if none is available.
    ///
    /// Acquires the tail before reading so the write from `push`'s `Release`
    /// store is visible.
    pub fn pop(&self) -> Result<T, Empty> {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head == tail {
            return Err(Empty);
        }
        let idx = head & self.mask;
        // SAFETY: this slot was published by the producer's Release store of
        // `tail`, observed above, and is only read here by the single
        // consumer; it will not be overwritten until `head` advances.
        let item = unsafe { (*self.buf[idx].get()).assume_init_read() };
        self.head.store(head.wrapping_add(1), Ordering::Release);
        Ok(item)
    }

    /// Approximate number of queued items. Racy if called off the
    /// producer/consumer threads; useful only for observability.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SpscQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        // Drain any remaining initialized items so we don't leak them.
        while self.pop().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_single_thread() {
        let q: SpscQueue<i32> = SpscQueue::with_capacity(8);
        for i in 0..8 {
            q.push(i).unwrap();
        }
        assert!(q.push(99).is_err());
        assert_eq!(q.pop().unwrap(), 0);
        q.push(8).unwrap();
        for i in 1..=8 {
            assert_eq!(q.pop().unwrap(), i);
        }
        assert!(q.pop().is_err());
    }

    #[test]
    fn full_then_pop_then_push_preserves_fifo() {
        // Scenario S5
        let q: SpscQueue<u32> = SpscQueue::with_capacity(8);
        for i in 0..8 {
            q.push(i).unwrap();
        }
        assert!(q.push(8).is_err());
        assert_eq!(q.pop().unwrap(), 0);
        q.push(8).unwrap();
        let drained: Vec<_> = std::iter::from_fn(|| q.pop().ok()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn empty_pop_reports_empty() {
        let q: SpscQueue<u8> = SpscQueue::with_capacity(4);
        assert!(q.pop().is_err());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn non_power_of_two_capacity_panics() {
        let _q: SpscQueue<u8> = SpscQueue::with_capacity(3);
    }

    #[test]
    fn concurrent_spsc_preserves_order_and_count() {
        let q = Arc::new(SpscQueue::<u64>::with_capacity(1024));
        let producer_q = q.clone();
        let n = 200_000u64;
        let producer = thread::spawn(move || {
            let mut i = 0;
            while i < n {
                if producer_q.push(i).is_ok() {
                    i += 1;
                }
            }
        });
        let mut received = Vec::with_capacity(n as usize);
        while (received.len() as u64) < n {
            if let Ok(v) = q.pop() {
                received.push(v);
            }
        }
        producer.join().unwrap();
        assert_eq!(received.len() as u64, n);
        assert!(received.windows(2).all(|w| w[0] < w[1]));
    }

    proptest::proptest! {
        #[test]
        fn fifo_holds_for_arbitrary_interleavings(ops in proptest::collection::vec(proptest::bool::ANY, 0..500)) {
            // `true` = push the next sequential value, `false` = pop.
            let q: SpscQueue<u32> = SpscQueue::with_capacity(64);
            let mut model = std::collections::VecDeque::new();
            let mut next_val = 0u32;
            for push in ops {
                if push {
                    if q.push(next_val).is_ok() {
                        model.push_back(next_val);
                        next_val += 1;
                    }
                } else if let Ok(v) = q.pop() {
                    let expected = model.pop_front();
                    prop_assert_eq!(Some(v), expected);
                }
            }
        }
    }
}
