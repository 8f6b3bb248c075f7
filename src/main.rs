//! bayerflow demo: synthetic Bayer source → frame pipeline → ordered consumer
//!
//! Usage: `bayerflow [config.toml] [seconds]`. Runs until ctrl-c when no
//! duration is given.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bayerflow::analysis::RoiLine;
use bayerflow::capture::{FrameSource, SyntheticBayerSource};
use bayerflow::display::{FrameSink, PngSnapshotSink};
use bayerflow::utils::RateMeter;
use bayerflow::{Config, FramePipeline, PipelineError};
use color_eyre::{eyre::eyre, Result};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Consumer cadence, ~60Hz
const RENDER_INTERVAL: Duration = Duration::from_millis(16);
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bayerflow=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("bayerflow launching...");

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let run_for = args
        .next()
        .map(|s| s.parse::<u64>().map(Duration::from_secs))
        .transpose()
        .map_err(|e| eyre!("invalid duration: {}", e))?;

    // Load configuration
    let config = Config::load(config_path.as_deref())?;
    bayerflow::CONFIG.store(Arc::new(config.clone()));
    info!(?config, "Configuration loaded");

    let pipeline = Arc::new(FramePipeline::new(config.pipeline.clone())?);
    pipeline.start(config.pipeline.worker_count)?;

    let mut source = SyntheticBayerSource::new(config.source.clone());
    source.connect()?;
    source.start()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn capture task
    let capture_handle = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(capture_loop(source, pipeline, shutdown_rx))
    };

    let mut sink = if config.snapshot.enabled {
        Some(PngSnapshotSink::from_config(&config.snapshot)?)
    } else {
        None
    };

    let (w, h) = (config.source.width, config.source.height);
    let roi = RoiLine::new((0, h / 2), (w.saturating_sub(1), h / 2));

    let mut display_meter = RateMeter::new(REPORT_INTERVAL);
    let mut ticker = tokio::time::interval(RENDER_INTERVAL);
    let mut last_report = Instant::now();
    let deadline = run_for.map(|d| Instant::now() + d);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupt received");
                break;
            }
            _ = ticker.tick() => {}
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Run duration reached");
            break;
        }

        while let Some(frame) = pipeline.try_take_ordered() {
            display_meter.tick();
            metrics::histogram!("frame_latency_ms").record(frame.timestamp.elapsed().as_millis() as f64);

            if let Some(sink) = sink.as_mut() {
                if let Err(e) = sink.present(&frame) {
                    error!("Snapshot failed: {}", e);
                }
            }

            if last_report.elapsed() >= REPORT_INTERVAL {
                last_report = Instant::now();
                let profile = roi.sample(&frame);
                let mean = profile.iter().map(|p| (p[0] + p[1] + p[2]) / 3.0).sum::<f32>()
                    / profile.len().max(1) as f32;
                debug!(sequence = frame.sequence(), roi_mean = mean, "ROI profile");

                let telemetry = pipeline.telemetry();
                telemetry.export_metrics();
                info!(
                    display_fps = format!("{:.1}", display_meter.rate()),
                    delivered = telemetry.delivered,
                    raw_dropped = telemetry.raw_dropped,
                    forced_gaps = telemetry.forced_gap_events,
                    pending = telemetry.reorder_pending,
                    "Pipeline status"
                );
            }
        }
    }

    // Shutdown
    let _ = shutdown_tx.send(true);
    if let Err(e) = capture_handle.await {
        warn!("Capture task ended abnormally: {}", e);
    }
    pipeline.stop();

    let telemetry = pipeline.telemetry();
    telemetry.log_summary();
    telemetry.export_metrics();

    info!("bayerflow shutting down");
    Ok(())
}

async fn capture_loop(
    mut source: SyntheticBayerSource,
    pipeline: Arc<FramePipeline>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(source.frame_interval());
    let mut capture_meter = RateMeter::new(REPORT_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }

        // mosaic encoding is CPU-bound; keep it off the async workers
        let produced = tokio::task::spawn_blocking(move || {
            let result = source.next_frame();
            (source, result)
        })
        .await;

        let capture = match produced {
            Ok((returned, Ok(capture))) => {
                source = returned;
                capture
            }
            Ok((returned, Err(e))) => {
                source = returned;
                error!("Capture error: {}", e);
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
            Err(e) => {
                error!("Capture task failed: {}", e);
                return;
            }
        };

        match pipeline.submit_raw(capture.data, capture.width, capture.height, capture.encoding) {
            Ok(_) => capture_meter.tick(),
            Err(PipelineError::NotRunning) => {
                info!("Pipeline stopped, ending capture");
                break;
            }
            Err(e) => {
                error!("Failed to submit frame: {}", e);
                break;
            }
        }
    }

    debug!(capture_fps = capture_meter.rate(), "Capture loop finished");
    source.disconnect();
}
