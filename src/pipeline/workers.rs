//! Fixed-size pool of transform workers

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span, warn};

use crate::capture::frame::{RawFrame, TransformedFrame};
use crate::error::{PipelineError, TransformError};
use crate::pipeline::channel::BoundedChannel;
use crate::utils;

/// Pixel transform applied by every worker. Must be a pure function of its input.
pub type TransformFn =
    Arc<dyn Fn(&RawFrame) -> Result<TransformedFrame, TransformError> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Upper bound on how long an idle worker waits before re-checking the stop flag
    pub poll_interval: Duration,
    /// Pin worker `i` to core `i % cores`
    pub pin_workers: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            pin_workers: false,
        }
    }
}

/// Everything a worker thread needs, cloned once per worker.
#[derive(Clone)]
struct WorkerContext {
    raw: Arc<BoundedChannel<RawFrame>>,
    processed: Arc<BoundedChannel<TransformedFrame>>,
    transform: TransformFn,
    stop: Arc<AtomicBool>,
    failures: Arc<AtomicU64>,
    options: WorkerOptions,
}

/// N independent workers: take raw, transform, offer downstream.
///
/// Completion order across workers is unspecified; results keep the sequence
/// number of the raw frame they were derived from.
pub struct WorkerPool {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        count: usize,
        raw: Arc<BoundedChannel<RawFrame>>,
        processed: Arc<BoundedChannel<TransformedFrame>>,
        transform: TransformFn,
        failures: Arc<AtomicU64>,
        options: WorkerOptions,
    ) -> Result<Self, PipelineError> {
        let stop = Arc::new(AtomicBool::new(false));
        let ctx = WorkerContext {
            raw,
            processed,
            transform,
            stop: Arc::clone(&stop),
            failures,
            options,
        };

        let mut pool = Self {
            stop,
            handles: Vec::with_capacity(count),
        };

        for index in 0..count {
            let ctx = ctx.clone();
            let spawned = thread::Builder::new()
                .name(format!("bayerflow-worker-{index}"))
                .spawn(move || run_worker(index, ctx));

            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(e) => {
                    error!(index, "Failed to spawn worker: {}", e);
                    pool.stop();
                    return Err(PipelineError::Spawn(e));
                }
            }
        }

        info!(workers = count, "Worker pool started");
        Ok(pool)
    }

    /// Live worker count.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every worker and wait for all of them. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if self.handles.is_empty() {
            return;
        }

        let count = self.handles.len();
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().map(str::to_owned);
            if handle.join().is_err() {
                warn!(worker = ?name, "Worker exited by panic");
            }
        }
        info!(workers = count, "Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(index: usize, ctx: WorkerContext) {
    let span = info_span!("worker", index);
    let _guard = span.enter();

    if ctx.options.pin_workers && !utils::pin_current_thread(index) {
        warn!("Could not pin worker to a core");
    }
    debug!("Worker started");

    while !ctx.stop.load(Ordering::Acquire) {
        let Some(raw) = ctx.raw.take_timeout(ctx.options.poll_interval) else {
            continue;
        };
        let sequence = raw.sequence();
        let started = Instant::now();

        match transform_frame(&ctx.transform, &raw) {
            Ok(frame) => {
                metrics::histogram!("transform_time_us").record(started.elapsed().as_micros() as f64);
                ctx.processed.try_put(frame);
            }
            Err(e) => {
                ctx.failures.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("transform_failures").increment(1);
                debug!(sequence, "Transform failed, skipping frame: {}", e);
            }
        }
    }

    debug!("Worker exiting");
}

/// Run the transform with panics and mislabelled results folded into failures.
fn transform_frame(transform: &TransformFn, raw: &RawFrame) -> Result<TransformedFrame, TransformError> {
    let frame = panic::catch_unwind(AssertUnwindSafe(|| transform(raw)))
        .unwrap_or_else(|payload| Err(TransformError::Panicked(panic_message(payload.as_ref()))))?;

    if frame.sequence() != raw.sequence() {
        return Err(TransformError::SequenceMismatch {
            expected: raw.sequence(),
            actual: frame.sequence(),
        });
    }
    Ok(frame)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{BayerPattern, PixelEncoding};
    use crate::transform::{demosaic, Normalization};
    use bytes::Bytes;

    fn channels(cap: usize) -> (Arc<BoundedChannel<RawFrame>>, Arc<BoundedChannel<TransformedFrame>>) {
        (
            Arc::new(BoundedChannel::new("raw", cap)),
            Arc::new(BoundedChannel::new("processed", cap)),
        )
    }

    fn raw(seq: u64, len: usize) -> RawFrame {
        RawFrame::new(
            Bytes::from(vec![128u8; len]),
            2,
            2,
            PixelEncoding::bayer8(BayerPattern::Rggb),
            seq,
        )
    }

    fn demosaic_fn() -> TransformFn {
        Arc::new(|raw: &RawFrame| demosaic(raw, Normalization::FullScale))
    }

    fn collect(ch: &BoundedChannel<TransformedFrame>, n: usize) -> Vec<u64> {
        let mut seqs = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while seqs.len() < n && Instant::now() < deadline {
            if let Some(f) = ch.take_timeout(Duration::from_millis(10)) {
                seqs.push(f.sequence());
            }
        }
        seqs
    }

    #[test]
    fn transforms_every_frame_once() {
        let (raw_ch, processed) = channels(16);
        let failures = Arc::new(AtomicU64::new(0));
        let mut pool = WorkerPool::spawn(
            4,
            Arc::clone(&raw_ch),
            Arc::clone(&processed),
            demosaic_fn(),
            Arc::clone(&failures),
            WorkerOptions::default(),
        )
        .unwrap();
        assert_eq!(pool.len(), 4);

        for seq in 0..12 {
            assert!(raw_ch.try_put(raw(seq, 4)).is_accepted());
        }
        let mut seqs = collect(&processed, 12);
        seqs.sort_unstable();
        assert_eq!(seqs, (0..12).collect::<Vec<_>>());

        pool.stop();
        assert!(pool.is_empty());
        assert_eq!(failures.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn failed_transform_is_skipped() {
        let (raw_ch, processed) = channels(8);
        let failures = Arc::new(AtomicU64::new(0));
        let mut pool = WorkerPool::spawn(
            1,
            Arc::clone(&raw_ch),
            Arc::clone(&processed),
            demosaic_fn(),
            Arc::clone(&failures),
            WorkerOptions::default(),
        )
        .unwrap();

        raw_ch.try_put(raw(0, 4));
        raw_ch.try_put(raw(1, 1)); // too short
        raw_ch.try_put(raw(2, 4));

        assert_eq!(collect(&processed, 2), vec![0, 2]);
        pool.stop();
        assert_eq!(failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn panicking_transform_does_not_kill_worker() {
        let (raw_ch, processed) = channels(8);
        let failures = Arc::new(AtomicU64::new(0));
        let transform: TransformFn = Arc::new(|raw: &RawFrame| {
            if raw.sequence() == 1 {
                panic!("bad frame");
            }
            demosaic(raw, Normalization::FullScale)
        });
        let mut pool = WorkerPool::spawn(
            1,
            Arc::clone(&raw_ch),
            Arc::clone(&processed),
            transform,
            Arc::clone(&failures),
            WorkerOptions::default(),
        )
        .unwrap();

        for seq in 0..3 {
            raw_ch.try_put(raw(seq, 4));
        }
        assert_eq!(collect(&processed, 2), vec![0, 2]);
        pool.stop();
        assert_eq!(failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let (raw_ch, processed) = channels(2);
        let mut pool = WorkerPool::spawn(
            2,
            raw_ch,
            processed,
            demosaic_fn(),
            Arc::new(AtomicU64::new(0)),
            WorkerOptions::default(),
        )
        .unwrap();
        pool.stop();
        pool.stop();
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn mislabelled_result_is_a_failure() {
        let (raw_ch, processed) = channels(8);
        let failures = Arc::new(AtomicU64::new(0));
        let transform: TransformFn = Arc::new(|raw: &RawFrame| {
            let frame = demosaic(raw, Normalization::FullScale)?;
            if raw.sequence() != 0 {
                return Ok(frame);
            }
            let mut meta = (*frame.meta).clone();
            meta.sequence = 99;
            Ok(TransformedFrame {
                meta: Arc::new(meta),
                ..frame
            })
        });
        let mut pool = WorkerPool::spawn(
            1,
            Arc::clone(&raw_ch),
            Arc::clone(&processed),
            transform,
            Arc::clone(&failures),
            WorkerOptions::default(),
        )
        .unwrap();

        for seq in 0..4 {
            raw_ch.try_put(raw(seq, 4));
        }
        // the worker survives and keeps draining
        assert_eq!(collect(&processed, 3), vec![1, 2, 3]);
        pool.stop();
        assert_eq!(failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn panic_is_reported_with_its_message() {
        let transform: TransformFn =
            Arc::new(|_: &RawFrame| -> Result<TransformedFrame, TransformError> { panic!("sensor glitch") });
        assert_eq!(
            transform_frame(&transform, &raw(5, 4)).unwrap_err(),
            TransformError::Panicked("sensor glitch".into())
        );
    }
}
