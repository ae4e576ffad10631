//! Streaming media player (sme-play) - Main entry point
//!
//! Loads one file through the symphonia backend, plays it on a driver task,
//! optionally seeks, logs what the sink receives, and can dump pipeline
//! timing stats as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sme_common::time::format_media_time;
use sme_engine::config::PlayerConfig;
use sme_engine::media::{BufferedUnit, MediaInput, SymphoniaBackend, UnitData};
use sme_engine::{spawn_engine, PlaybackEngine};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for sme-play
#[derive(Parser, Debug)]
#[command(name = "sme-play")]
#[command(about = "Play a media file through the streaming engine")]
#[command(version)]
struct Args {
    /// Media file to play
    file: PathBuf,

    /// Configuration file (overrides SME_CONFIG and the user config dir)
    #[arg(short, long, env = "SME_CONFIG")]
    config: Option<PathBuf>,

    /// Start position in seconds
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// Playback speed multiplier
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Seek here once playback is running
    #[arg(long)]
    seek: Option<f64>,

    /// Stop after this many wall-clock seconds (default: until the end)
    #[arg(long)]
    duration: Option<f64>,

    /// Print pipeline timing stats as JSON on exit
    #[arg(long)]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = PlayerConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sme_engine={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting sme-play for {}", args.file.display());

    let engine = PlaybackEngine::new(Arc::new(SymphoniaBackend::new()), config.engine.clone())
        .context("Failed to initialize playback engine")?;
    let (handle, task) = spawn_engine(engine);

    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<Option<BufferedUnit>>();
    handle
        .set_output_sink(Some(Box::new(sink_tx)))
        .await
        .context("Engine stopped before accepting the sink")?;

    let loaded = handle
        .load(MediaInput::File(args.file.clone()))
        .await
        .with_context(|| format!("Failed to load {}", args.file.display()))?;

    let Some(track) = loaded.track else {
        warn!("No playable {} track found", config.engine.track_kind);
        handle.shutdown().await.ok();
        return Ok(());
    };
    info!(
        "Track {}: {} ({})",
        track.id,
        track.codec,
        format_media_time(loaded.duration)
    );

    let mut events = handle.subscribe();
    handle.play(args.start, args.speed).await?;

    if let Some(seek) = args.seek {
        tokio::time::sleep(Duration::from_millis(500)).await;
        info!("Seeking to {}", format_media_time(seek));
        handle.seek(seek).await?;
    }

    let deadline = args
        .duration
        .map(|secs| tokio::time::Instant::now() + Duration::from_secs_f64(secs.max(0.0)));

    loop {
        tokio::select! {
            unit = sink_rx.recv() => match unit {
                Some(Some(unit)) => log_unit(&unit),
                Some(None) => debug!("Sink cleared (nothing current)"),
                None => break,
            },
            event = events.recv() => match event {
                Ok(sme_common::EngineEvent::Ended { duration, .. }) => {
                    info!("Playback ended at {}", format_media_time(duration));
                    break;
                }
                Ok(event) => debug!("Event: {}", event.event_type()),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} engine events", n);
                }
                Err(_) => break,
            },
            _ = sleep_until(deadline) => {
                info!("Requested duration elapsed");
                break;
            }
        }
    }

    let position = handle.pause().await?;
    info!("Stopped at {}", format_media_time(position));

    if args.stats {
        let stats = handle.perf_stats().await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?
        );
    }

    handle.shutdown().await?;
    task.await.context("Engine task panicked")?;
    Ok(())
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn log_unit(unit: &BufferedUnit) {
    match unit.data.as_ref() {
        UnitData::Audio {
            sample_rate,
            planes,
        } => debug!(
            "Audio block at {}: {} frames x {} ch @ {} Hz",
            format_media_time(unit.timestamp),
            planes.first().map(|p| p.len()).unwrap_or(0),
            planes.len(),
            sample_rate
        ),
        UnitData::Video {
            width,
            height,
            format,
            ..
        } => debug!(
            "Picture at {}: {}x{} {:?}",
            format_media_time(unit.timestamp),
            width,
            height,
            format
        ),
    }
}
