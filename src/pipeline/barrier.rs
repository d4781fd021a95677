use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Completion signal for one `sync()` caller.
///
/// Dropping a barrier without releasing it never reports success to the
/// waiter; the waiter runs into its timeout instead.
#[derive(Debug)]
pub struct Barrier(oneshot::Sender<()>);

impl Barrier {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn release(self) {
        // The waiter may already have timed out.
        let _ = self.0.send(());
    }
}

/// Barriers waiting for the next successful flush.
///
/// Bounded: when full, the oldest barrier is evicted to make room. An evicted
/// waiter is abandoned and will time out.
#[derive(Debug)]
pub struct PendingBarriers {
    pending: VecDeque<Barrier>,
    capacity: usize,
}

impl PendingBarriers {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Queue a barrier, returning the evicted one if the set was full.
    pub fn push(&mut self, barrier: Barrier) -> Option<Barrier> {
        let evicted = if self.pending.len() >= self.capacity {
            self.pending.pop_front()
        } else {
            None
        };
        self.pending.push_back(barrier);
        evicted
    }

    /// Signal and forget every pending barrier.
    pub fn release_all(&mut self) -> usize {
        let count = self.pending.len();
        for barrier in self.pending.drain(..) {
            barrier.release();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
