//! Bounded MPMC channel with drop-on-full admission and drop accounting

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::utils::CachePadded;
use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

/// Outcome of [`BoundedChannel::try_put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    Dropped,
}

impl Offer {
    pub fn is_accepted(self) -> bool {
        self == Offer::Accepted
    }
}

/// Fixed-capacity queue that sheds load instead of blocking the producer.
///
/// Any number of threads may put and take concurrently. FIFO order holds for
/// a single producer only; callers that need ordering across producers must
/// carry their own sequence numbers.
pub struct BoundedChannel<T> {
    name: &'static str,
    capacity: usize,
    tx: Sender<T>,
    rx: Receiver<T>,
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    accepted: AtomicU64,
    dropped: AtomicU64,
    consecutive_drops: AtomicU64,
}

/// Point-in-time drop accounting for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub total: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub consecutive_drop_run: u64,
}

impl<T> BoundedChannel<T> {
    /// Panics if `capacity` is zero; a rendezvous channel would drop every offer.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        assert!(capacity > 0, "channel capacity must be non-zero");
        let (tx, rx) = flume::bounded(capacity);
        Self {
            name,
            capacity,
            tx,
            rx,
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Non-blocking insert. A full channel drops `item` and records it.
    pub fn try_put(&self, item: T) -> Offer {
        match self.tx.try_send(item) {
            Ok(()) => {
                self.stats.accepted.fetch_add(1, Ordering::Relaxed);
                self.stats.consecutive_drops.store(0, Ordering::Relaxed);
                Offer::Accepted
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                let run = self.stats.consecutive_drops.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!("frames_dropped", "stage" => self.name).increment(1);
                if run == 1 {
                    warn!(channel = self.name, capacity = self.capacity, "Channel full, dropping frames");
                } else {
                    debug!(channel = self.name, run, "Dropped frame");
                }
                Offer::Dropped
            }
        }
    }

    /// Block until an item is available.
    pub fn take(&self) -> Option<T> {
        self.rx.recv().ok()
    }

    /// Block for at most `timeout`.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Return immediately, empty or not.
    pub fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> ChannelStats {
        let accepted = self.stats.accepted.load(Ordering::Relaxed);
        let dropped = self.stats.dropped.load(Ordering::Relaxed);
        ChannelStats {
            total: accepted + dropped,
            accepted,
            dropped,
            consecutive_drop_run: self.stats.consecutive_drops.load(Ordering::Relaxed),
        }
    }
}
