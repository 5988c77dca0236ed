//! Capacity-limited hand-off queue shared between pipeline workers.
//!
//! Producers block while the queue is full, consumers block while it is empty.
//! [`BoundedQueue::finish`] latches a one-way flag: further pushes fail and
//! consumers drain what is left before [`BoundedQueue::pop`] reports the end
//! of the stream with `None`.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

use crate::error::PipelineError;

/// Default number of chunks a pipeline queue holds before producers block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    finished: bool,
}

/// Upper limit on slots reserved when a queue is created.
const PREALLOCATED_ITEMS: usize = 64;

/// Thread-safe FIFO with backpressure and a latching "finished" signal.
///
/// A capacity of `0` means the queue never blocks producers.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                // The bound is enforced in `push`; storage grows on demand.
                items: VecDeque::with_capacity(capacity.min(PREALLOCATED_ITEMS)),
                finished: false,
            }),
            changed: Condvar::new(),
            capacity,
        }
    }

    /// Queue that never blocks producers.
    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `item`, waiting for room if the queue is at capacity.
    ///
    /// Fails with [`PipelineError::IllegalOperation`] once the queue has been
    /// finished, including when it is finished while this call is waiting.
    pub fn push(&self, item: T) -> Result<(), PipelineError> {
        let mut state = self.state.lock();
        loop {
            if state.finished {
                return Err(PipelineError::IllegalOperation(
                    "push on finished queue".to_owned(),
                ));
            }
            if self.capacity == 0 || state.items.len() < self.capacity {
                break;
            }
            self.changed.wait(&mut state);
        }

        state.items.push_back(item);
        // Producers and consumers share one condition variable.
        self.changed.notify_all();
        Ok(())
    }

    /// Remove the oldest item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is both empty and finished.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.finished {
            self.changed.wait(&mut state);
        }

        let item = state.items.pop_front()?;
        self.changed.notify_all();
        Some(item)
    }

    /// Mark the queue finished and wake every waiter. Idempotent.
    pub fn finish(&self) {
        let mut state = self.state.lock();
        state.finished = true;
        self.changed.notify_all();
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Current occupancy. Advisory only: it may be stale by the time it is used.
    pub fn size(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
