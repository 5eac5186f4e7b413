//! HDR merge demo: streams synthetic HDR framesets through the merge stage

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use flume::bounded;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use hdr_merge::frame::HeapAllocator;
use hdr_merge::pipeline::spawn_worker;
use hdr_merge::source::SyntheticHdrSource;
use hdr_merge::{Config, FrameUnit, HdrMerge};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hdr_merge=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("HDR merge launching...");

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    hdr_merge::CONFIG.store(Arc::new(config.clone()));
    info!("Configuration: {:?}", config);

    // Set up tx/rx around the merge worker
    let (in_tx, in_rx) = bounded::<FrameUnit>(config.worker.queue_depth);
    let (out_tx, out_rx) = bounded::<FrameUnit>(config.worker.queue_depth);

    let stage = HdrMerge::from_config(&config.hdr);
    let worker = spawn_worker(
        stage,
        HeapAllocator::new(),
        in_rx,
        out_tx,
        config.worker.pin_core,
    )?;

    // Spawn synthetic capture task
    let source_config = config.source.clone();
    let capture_handle = tokio::spawn(async move {
        let period = Duration::from_secs_f64(1.0 / f64::from(source_config.fps));
        let mut ticker = tokio::time::interval(period);
        let mut source = SyntheticHdrSource::new(source_config);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl-C received, stopping capture");
                    break;
                }
                _ = ticker.tick() => {
                    let Some(set) = source.next() else {
                        info!("Frame limit reached");
                        break;
                    };
                    if let Err(e) = in_tx.send_async(FrameUnit::Set(set)).await {
                        error!("Failed to send frameset: {}", e);
                        break;
                    }
                }
            }
        }
        // Dropping in_tx closes the worker's input
    });

    // Consume merged output
    let report_every = u64::from(config.source.fps);
    let consumer_handle = tokio::spawn(async move {
        let mut received = 0u64;
        let mut merged = 0u64;
        while let Ok(unit) = out_rx.recv_async().await {
            received += 1;
            // Framesets pass through until the first pair merges
            if matches!(unit, FrameUnit::Single(_)) {
                merged += 1;
            }
            if received % report_every == 0 {
                let coverage = unit
                    .primary()
                    .and_then(|f| f.as_depth().ok())
                    .map(|d| {
                        let total = (d.width() * d.height()).max(1) as f64;
                        d.samples().filter(|&s| s != 0).count() as f64 / total
                    })
                    .unwrap_or(0.0);
                info!(
                    "{} frames out, {} merged, counter {:?}, coverage {:.1}%",
                    received,
                    merged,
                    unit.frame_counter(),
                    coverage * 100.0
                );
            }
        }
        received
    });

    capture_handle.await?;
    let received = consumer_handle.await?;
    let stage = worker
        .join()
        .map_err(|_| eyre!("Merge worker panicked"))?;

    info!("Received {} frames; stage stats: {:?}", received, stage.stats());
    info!("HDR merge shutting down");
    Ok(())
}
