//! Sequence-ordered release of out-of-order transform results

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::capture::frame::TransformedFrame;
use crate::pipeline::channel::BoundedChannel;

/// Counters kept by the reorder stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReorderStats {
    /// Times `next_expected` was forced past a missing sequence number
    pub forced_gap_events: u64,
    /// Sequence numbers skipped by those forced advances
    pub skipped_sequences: u64,
    /// Items shed because the buffer was at capacity
    pub overflow_events: u64,
    /// Items that arrived behind `next_expected` or duplicated a buffered one
    pub late_discards: u64,
}

/// Releases frames strictly in ascending sequence order.
///
/// Items are pulled from the processed channel without blocking and held in a
/// map keyed by sequence number. Only the item equal to `next_expected` is
/// ever released. When the head stays missing for longer than `gap_timeout`
/// while later items wait, the buffer skips ahead to the lowest buffered key.
pub struct ReorderBuffer {
    source: Arc<BoundedChannel<TransformedFrame>>,
    pending: BTreeMap<u64, TransformedFrame>,
    capacity: usize,
    next_expected: u64,
    gap_timeout: Duration,
    stalled_since: Option<Instant>,
    stats: ReorderStats,
}

impl ReorderBuffer {
    pub fn new(
        source: Arc<BoundedChannel<TransformedFrame>>,
        capacity: usize,
        gap_timeout: Duration,
    ) -> Self {
        Self::starting_at(source, capacity, gap_timeout, 0)
    }

    /// `first` is the first sequence number the upstream tagger hands out.
    pub fn starting_at(
        source: Arc<BoundedChannel<TransformedFrame>>,
        capacity: usize,
        gap_timeout: Duration,
        first: u64,
    ) -> Self {
        Self {
            source,
            pending: BTreeMap::new(),
            capacity: capacity.max(1),
            next_expected: first,
            gap_timeout,
            stalled_since: None,
            stats: ReorderStats::default(),
        }
    }

    /// Drain the source channel and release the next in-order frame, if any.
    pub fn drain_and_release(&mut self) -> Option<TransformedFrame> {
        self.drain_and_release_at(Instant::now())
    }

    /// Same as [`ReorderBuffer::drain_and_release`] with an explicit clock reading.
    pub fn drain_and_release_at(&mut self, now: Instant) -> Option<TransformedFrame> {
        while let Some(frame) = self.source.try_take() {
            self.admit(frame);
        }
        self.release(now)
    }

    fn admit(&mut self, frame: TransformedFrame) {
        let sequence = frame.sequence();

        if sequence < self.next_expected || self.pending.contains_key(&sequence) {
            self.stats.late_discards += 1;
            debug!(sequence, next_expected = self.next_expected, "Discarding late frame");
            return;
        }

        if self.pending.len() >= self.capacity {
            self.stats.overflow_events += 1;
            metrics::counter!("reorder_overflow_events").increment(1);

            // Shed the newest of the buffered items and the incoming one.
            let newest = self.pending.last_key_value().map(|(&k, _)| k);
            match newest {
                Some(newest) if newest > sequence => {
                    self.pending.pop_last();
                    warn!(dropped = newest, "Reorder buffer full, dropping newest frame");
                }
                _ => {
                    warn!(dropped = sequence, "Reorder buffer full, dropping newest frame");
                    return;
                }
            }
        }

        self.pending.insert(sequence, frame);
    }

    fn release(&mut self, now: Instant) -> Option<TransformedFrame> {
        let head = match self.pending.first_key_value() {
            Some((&head, _)) => head,
            None => {
                self.stalled_since = None;
                return None;
            }
        };

        if head != self.next_expected {
            let since = *self.stalled_since.get_or_insert(now);
            if now.saturating_duration_since(since) < self.gap_timeout {
                return None;
            }

            let skipped = head - self.next_expected;
            self.stats.forced_gap_events += 1;
            self.stats.skipped_sequences += skipped;
            metrics::counter!("forced_gap_events").increment(1);
            warn!(
                missing = self.next_expected,
                resume_at = head,
                skipped,
                "Sequence gap timed out, advancing"
            );
            self.next_expected = head;
        }

        self.stalled_since = None;
        self.next_expected += 1;
        self.pending.pop_first().map(|(_, frame)| frame)
    }

    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// Frames held back waiting for their predecessors.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> ReorderStats {
        self.stats
    }
}
