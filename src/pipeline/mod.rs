//! Frame pipeline: raw channel → worker pool → processed channel → reorder buffer
//!
//! ```text
//! submit_raw ─► [tag] ─► raw ch ─► worker 0..N ─► processed ch ─► reorder ─► try_take_ordered
//! ```
//!
//! Both channels shed load when full, so the producer never blocks. Drops,
//! failed transforms and forced sequence gaps are absorbed and counted; only
//! lifecycle misuse is reported as an error.

pub mod channel;
pub mod reorder;
pub mod sequence;
pub mod telemetry;
pub mod workers;

pub use channel::{BoundedChannel, ChannelStats, Offer};
pub use reorder::{ReorderBuffer, ReorderStats};
pub use sequence::SequenceTagger;
pub use telemetry::Telemetry;
pub use workers::{TransformFn, WorkerOptions, WorkerPool};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{info, instrument};

use crate::capture::frame::{PixelEncoding, RawFrame, TransformedFrame};
use crate::error::PipelineError;
use crate::transform::demosaic;
use crate::PipelineConfig;

pub struct FramePipeline {
    config: PipelineConfig,
    raw: Arc<BoundedChannel<RawFrame>>,
    processed: Arc<BoundedChannel<TransformedFrame>>,
    raw_tagger: SequenceTagger,
    delivery_tagger: SequenceTagger,
    reorder: Mutex<ReorderBuffer>,
    transform: TransformFn,
    failures: Arc<AtomicU64>,
    running: AtomicBool,
    pool: Mutex<Option<WorkerPool>>,
}

impl FramePipeline {
    /// Pipeline running the Bayer demosaic with the configured normalization.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let normalization = config.normalization;
        let transform: TransformFn = Arc::new(move |raw: &RawFrame| demosaic(raw, normalization));
        Self::with_transform(config, transform)
    }

    /// Pipeline running a caller-supplied transform.
    pub fn with_transform(config: PipelineConfig, transform: TransformFn) -> Result<Self, PipelineError> {
        config.validate()?;

        let raw = Arc::new(BoundedChannel::new("raw", config.raw_capacity));
        let processed = Arc::new(BoundedChannel::new("processed", config.processed_capacity));
        let raw_tagger = SequenceTagger::new();
        let reorder = ReorderBuffer::starting_at(
            Arc::clone(&processed),
            config.processed_capacity + config.reorder_slack,
            Duration::from_millis(config.gap_timeout_ms),
            raw_tagger.peek(),
        );

        Ok(Self {
            config,
            raw,
            processed,
            raw_tagger,
            delivery_tagger: SequenceTagger::new(),
            reorder: Mutex::new(reorder),
            transform,
            failures: Arc::new(AtomicU64::new(0)),
            running: AtomicBool::new(false),
            pool: Mutex::new(None),
        })
    }

    /// Spawn `worker_count` transform workers.
    #[instrument(skip(self))]
    pub fn start(&self, worker_count: usize) -> Result<(), PipelineError> {
        if worker_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "worker count must be at least 1".into(),
            ));
        }

        let mut pool = lock(&self.pool);
        if pool.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        let options = WorkerOptions {
            poll_interval: Duration::from_millis(self.config.worker_poll_ms),
            pin_workers: self.config.pin_workers,
        };
        *pool = Some(WorkerPool::spawn(
            worker_count,
            Arc::clone(&self.raw),
            Arc::clone(&self.processed),
            Arc::clone(&self.transform),
            Arc::clone(&self.failures),
            options,
        )?);
        self.running.store(true, Ordering::Release);

        info!(
            workers = worker_count,
            raw_capacity = self.raw.capacity(),
            processed_capacity = self.processed.capacity(),
            "Frame pipeline started"
        );
        Ok(())
    }

    /// Stop and join all workers. A no-op when not running.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        // `running` only changes while the pool lock is held
        let pool = {
            let mut slot = lock(&self.pool);
            self.running.store(false, Ordering::Release);
            slot.take()
        };
        if let Some(mut pool) = pool {
            pool.stop();
            info!("Frame pipeline stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        lock(&self.pool).as_ref().map_or(0, WorkerPool::len)
    }

    /// Tag a raw buffer and offer it to the workers.
    ///
    /// Returns [`Offer::Dropped`] when the raw channel is full; the frame keeps
    /// its sequence number, leaving a gap for the reorder stage to skip.
    pub fn submit_raw(
        &self,
        data: Bytes,
        width: u32,
        height: u32,
        encoding: PixelEncoding,
    ) -> Result<Offer, PipelineError> {
        if !self.is_running() {
            return Err(PipelineError::NotRunning);
        }

        let sequence = self.raw_tagger.next();
        let frame = RawFrame::new(data, width, height, encoding, sequence);
        Ok(self.raw.try_put(frame))
    }

    /// Next frame in sequence order, or `None` without waiting.
    pub fn try_take_ordered(&self) -> Option<TransformedFrame> {
        let frame = lock(&self.reorder).drain_and_release()?;
        self.delivery_tagger.next();
        Some(frame)
    }

    pub fn telemetry(&self) -> Telemetry {
        let raw = self.raw.stats();
        let processed = self.processed.stats();
        let (reorder, pending) = {
            let buf = lock(&self.reorder);
            (buf.stats(), buf.len())
        };

        Telemetry {
            raw_total: raw.total,
            raw_dropped: raw.dropped,
            raw_consecutive_drop_run: raw.consecutive_drop_run,
            processed_total: processed.total,
            processed_dropped: processed.dropped,
            processed_consecutive_drop_run: processed.consecutive_drop_run,
            forced_gap_events: reorder.forced_gap_events,
            skipped_sequences: reorder.skipped_sequences,
            reorder_overflow_events: reorder.overflow_events,
            late_discards: reorder.late_discards,
            transform_failures: self.failures.load(Ordering::Relaxed),
            delivered: self.delivery_tagger.peek(),
            reorder_pending: pending,
            workers: self.worker_count(),
        }
    }

    /// Raw frames waiting for a worker.
    pub fn raw_backlog(&self) -> usize {
        self.raw.len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
