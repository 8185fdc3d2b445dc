//! Blocking bounded queue for multi-producer, multi-consumer task hand-off.
//!
//! This module provides `BoundedQueue`, a fixed-size circular buffer with
//! blocking `push` and `pop` for any number of producer and consumer threads.
//! A full buffer suspends producers instead of growing, giving natural
//! backpressure, and a one-way `close` signal lets blocked threads observe
//! termination instead of waiting forever.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::PoolError;

/// Ring state. Every field is guarded by the queue mutex; `len` is tracked
/// explicitly and never derived from the indices.
#[derive(Debug)]
struct Ring<const SLOTS: usize, T> {
    slots: [Option<T>; SLOTS],
    read: usize,
    write: usize,
    len: usize,
    closed: bool,
}

impl<const SLOTS: usize, T> Ring<SLOTS, T> {
    fn put(&mut self, item: T) {
        let stale = self.slots[self.write].replace(item);
        assert!(
            stale.is_none(),
            "BoundedQueue overwrote an occupied slot, indicates a bug."
        );
        self.write = (self.write + 1) % SLOTS;
        self.len += 1;
    }

    fn take(&mut self) -> T {
        let item = self.slots[self.read]
            .take()
            .expect("BoundedQueue popped a vacant slot, indicates a bug.");
        self.read = (self.read + 1) % SLOTS;
        self.len -= 1;
        item
    }
}

/// A fixed-capacity blocking queue safe for concurrent producers and consumers.
///
/// All state lives under a single mutex paired with a single condition
/// variable. Every mutation wakes all waiters; each waiter re-checks its own
/// predicate in a loop, so a wakeup never implies the predicate holds.
#[derive(Debug)]
pub struct BoundedQueue<const SLOTS: usize, T> {
    ring: Mutex<Ring<SLOTS, T>>,
    cond: Condvar,
}

impl<const SLOTS: usize, T> BoundedQueue<SLOTS, T> {
    /// Creates a new empty queue. `SLOTS` must be greater than 0.
    pub fn new() -> Result<Self, PoolError> {
        if SLOTS == 0 {
            return Err(PoolError::NoSlots);
        }
        let slots = array_init::array_init(|_| None);
        Ok(Self {
            ring: Mutex::new(Ring {
                slots,
                read: 0,
                write: 0,
                len: 0,
                closed: false,
            }),
            cond: Condvar::new(),
        })
    }

    // Items execute and drop outside the lock, so a user panic can never
    // poison the ring; recover the guard instead of propagating.
    fn lock(&self) -> MutexGuard<'_, Ring<SLOTS, T>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Ring<SLOTS, T>>) -> MutexGuard<'a, Ring<SLOTS, T>> {
        self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    /// Pushes an item, blocking while the queue is full.
    ///
    /// Returns `Err(PoolError::Closed)` without inserting if the queue is
    /// closed, or becomes closed while this thread is blocked waiting for a
    /// slot.
    pub fn push(&self, item: T) -> Result<(), PoolError> {
        let mut ring = self.lock();
        loop {
            if ring.closed {
                return Err(PoolError::Closed);
            }
            if ring.len < SLOTS {
                break;
            }
            ring = self.wait(ring);
        }
        ring.put(item);
        self.cond.notify_all();
        Ok(())
    }

    /// Pops the oldest item, blocking while the queue is empty and open.
    ///
    /// A closed queue still hands out whatever it holds; `Err(PoolError::Closed)`
    /// is returned only once the queue is closed *and* empty.
    pub fn pop(&self) -> Result<T, PoolError> {
        let mut ring = self.lock();
        loop {
            if ring.len > 0 {
                break;
            }
            if ring.closed {
                return Err(PoolError::Closed);
            }
            ring = self.wait(ring);
        }
        let item = ring.take();
        self.cond.notify_all();
        Ok(item)
    }

    /// Non-blocking push. Fails with `Full` instead of waiting for a slot.
    pub fn try_push(&self, item: T) -> Result<(), PoolError> {
        let mut ring = self.lock();
        if ring.closed {
            return Err(PoolError::Closed);
        }
        if ring.len == SLOTS {
            return Err(PoolError::Full);
        }
        ring.put(item);
        self.cond.notify_all();
        Ok(())
    }

    /// Non-blocking pop. Fails with `Empty` instead of waiting for an item.
    pub fn try_pop(&self) -> Result<T, PoolError> {
        let mut ring = self.lock();
        if ring.len == 0 {
            return Err(if ring.closed {
                PoolError::Closed
            } else {
                PoolError::Empty
            });
        }
        let item = ring.take();
        self.cond.notify_all();
        Ok(item)
    }

    /// Closes the queue. One-way and idempotent.
    ///
    /// Wakes every blocked thread so it can re-check its predicate: blocked
    /// producers fail with `Closed`, blocked consumers keep draining whatever
    /// is still queued and fail only once it is gone.
    pub fn close(&self) {
        let mut ring = self.lock();
        ring.closed = true;
        self.cond.notify_all();
    }

    /// Blocks until the queue is observably empty.
    ///
    /// The emptiness check and the wait share the queue mutex with `pop`, so
    /// the consumer that removes the last item cannot slip between them.
    pub fn wait_empty(&self) {
        let mut ring = self.lock();
        while ring.len > 0 {
            ring = self.wait(ring);
        }
    }

    /// Number of items currently queued. A point-in-time hint under
    /// concurrency, never a basis for a blocking decision.
    pub fn len(&self) -> usize {
        self.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.lock().len == 0
    }

    pub fn is_full(&self) -> bool {
        self.lock().len == SLOTS
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub const fn capacity(&self) -> usize {
        SLOTS
    }
}

#[cfg(test)]
mod queue_tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn sequential_push_pop_fifo() {
        let queue = BoundedQueue::<3, i32>::new().unwrap();

        // popping an empty open queue should complain
        assert_eq!(queue.try_pop().unwrap_err(), PoolError::Empty);

        queue.push(42).expect("first push okay");
        queue.push(1337).expect("second push okay");

        assert_eq!(queue.pop().unwrap(), 42);
        assert_eq!(queue.pop().unwrap(), 1337);

        assert_eq!(queue.try_pop().unwrap_err(), PoolError::Empty);
    }

    #[test]
    fn zero_slots_rejected() {
        let result = BoundedQueue::<0, usize>::new();
        assert_eq!(result.err(), Some(PoolError::NoSlots));
    }

    #[test]
    fn try_push_fails_exactly_at_capacity() {
        const N: usize = 8;
        let queue = BoundedQueue::<N, usize>::new().unwrap();

        for i in 0..N {
            assert!(queue.try_push(i).is_ok(), "push {i} failed unexpectedly");
        }
        assert_eq!(queue.try_push(N).unwrap_err(), PoolError::Full);
        assert!(queue.is_full());

        // one pop frees exactly one slot
        assert_eq!(queue.try_pop().unwrap(), 0);
        queue.try_push(N).expect("recovered after pop");
        assert_eq!(queue.try_push(N + 1).unwrap_err(), PoolError::Full);

        for expected in 1..=N {
            assert_eq!(queue.try_pop().unwrap(), expected);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn blocking_push_unblocks_after_pop() {
        let queue = Arc::new(BoundedQueue::<1, usize>::new().unwrap());
        queue.push(1).unwrap();

        let prod = Arc::clone(&queue);
        let producer = thread::spawn(move || prod.push(2));

        // give the producer time to block on the full queue
        thread::sleep(Duration::from_millis(50));
        assert_eq!(queue.pop().unwrap(), 1);

        producer.join().unwrap().expect("blocked push completed");
        assert_eq!(queue.pop().unwrap(), 2);
    }

    #[test]
    fn close_unblocks_blocked_producer() {
        let queue = Arc::new(BoundedQueue::<1, usize>::new().unwrap());
        queue.push(1).unwrap();

        let prod = Arc::clone(&queue);
        let producer = thread::spawn(move || prod.push(2));

        thread::sleep(Duration::from_millis(50));
        queue.close();

        // the woken producer observes the close and inserts nothing
        assert_eq!(producer.join().unwrap().unwrap_err(), PoolError::Closed);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn close_unblocks_blocked_consumer() {
        let queue = Arc::new(BoundedQueue::<4, usize>::new().unwrap());

        let cons = Arc::clone(&queue);
        let consumer = thread::spawn(move || cons.pop());

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(consumer.join().unwrap().unwrap_err(), PoolError::Closed);
    }

    #[test]
    fn closed_queue_drains_before_failing() {
        let queue = BoundedQueue::<4, usize>::new().unwrap();
        for i in 0..3 {
            queue.push(i).unwrap();
        }
        queue.close();
        assert!(queue.is_closed());

        // no new items after close
        assert_eq!(queue.push(99).unwrap_err(), PoolError::Closed);
        assert_eq!(queue.try_push(99).unwrap_err(), PoolError::Closed);

        // but everything already queued is still handed out, in order
        assert_eq!(queue.pop().unwrap(), 0);
        assert_eq!(queue.pop().unwrap(), 1);
        assert_eq!(queue.pop().unwrap(), 2);

        assert_eq!(queue.pop().unwrap_err(), PoolError::Closed);
        assert_eq!(queue.try_pop().unwrap_err(), PoolError::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let queue = BoundedQueue::<2, usize>::new().unwrap();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert_eq!(queue.pop().unwrap_err(), PoolError::Closed);
    }

    #[test]
    fn spsc_strict_fifo() {
        const ITEMS: usize = 1000;
        let queue = Arc::new(BoundedQueue::<4, usize>::new().unwrap());
        let prod = Arc::clone(&queue);
        let cons = Arc::clone(&queue);

        let producer = thread::spawn(move || {
            for i in 0..ITEMS {
                prod.push(i).expect("push while open");
            }
        });

        let consumer = thread::spawn(move || {
            for expected in 0..ITEMS {
                let got = cons.pop().expect("pop while open");
                assert_eq!(got, expected, "FIFO violated at item {expected}");
            }
        });

        producer.join().unwrap();
        consumer.join().unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_empty_returns_once_drained() {
        const ITEMS: usize = 50;
        let queue = Arc::new(BoundedQueue::<8, usize>::new().unwrap());

        let cons = Arc::clone(&queue);
        let consumer = thread::spawn(move || {
            for _ in 0..ITEMS {
                cons.pop().expect("pop while open");
                thread::sleep(Duration::from_micros(100));
            }
        });

        for i in 0..ITEMS {
            queue.push(i).unwrap();
        }
        queue.wait_empty();
        assert!(queue.is_empty());

        consumer.join().unwrap();
    }
}
