//! sonicpipe-server - standalone demo harness for sonicpipe-core.
//!
//! Capture acquisition is out of scope for the library itself, so this
//! binary simulates a real-time audio callback with a synthetic sine wave
//! on a dedicated thread, feeding it into a `Session` exactly the way a
//! real capture backend would.

mod config;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sonicpipe_core::{CaptureBlock, LoggingSupervisor, Session, SupervisorCommand};
use tokio::signal;

use crate::config::ServerConfig;

/// sonicpipe-server - demo harness driving a synthetic capture signal through sonicpipe-core.
#[derive(Parser, Debug)]
#[command(name = "sonicpipe-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "SONICPIPE_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Sink WebSocket URL (overrides config file).
    #[arg(long, env = "SONICPIPE_SINK_URL")]
    sink_url: Option<String>,

    /// Frequency in Hz of the synthetic sine wave fed into the ring.
    #[arg(long, default_value_t = 440.0)]
    tone_hz: f32,

    /// Seed for the TPDF dither RNG (Int16 rings only).
    #[arg(long, default_value_t = 0)]
    dither_seed: u64,

    /// Simulated capture block size, in frames per channel.
    #[arg(long, default_value_t = 480)]
    block_frames: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(args.log_level)
        .format_timestamp_millis()
        .init();

    log::info!("sonicpipe-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Apply CLI overrides
    if let Some(sink_url) = args.sink_url {
        config.sink_url = sink_url;
    }

    log::info!(
        "Configuration: sink_url={}, codec={:?}, sample_rate={}, channels={}",
        config.sink_url,
        config.codec,
        config.sample_rate,
        config.channels
    );

    let session_config = config.to_session_config();
    let supervisor = Arc::new(LoggingSupervisor);
    let (session, producer_handle) =
        Session::build(session_config, supervisor).context("Failed to build session")?;

    let mut producer = session.make_producer(producer_handle, args.dither_seed);

    // Simulates a real-time audio callback: capture acquisition itself is not
    // this crate's concern, so a dedicated thread stands in for it here.
    let running = Arc::new(AtomicBool::new(true));
    let capture_running = running.clone();
    let sample_rate = config.sample_rate;
    let channels = config.channels;
    let tone_hz = args.tone_hz;
    let block_frames = args.block_frames;

    let capture_thread = std::thread::spawn(move || {
        let mut phase = 0.0f32;
        let phase_step = 2.0 * std::f32::consts::PI * tone_hz / sample_rate as f32;
        let mut interleaved = vec![0.0f32; block_frames * channels as usize];
        let block_period = Duration::from_secs_f64(block_frames as f64 / sample_rate as f64);

        while capture_running.load(Ordering::Relaxed) {
            for frame in 0..block_frames {
                let sample = phase.sin() * 0.2;
                phase += phase_step;
                if phase >= 2.0 * std::f32::consts::PI {
                    phase -= 2.0 * std::f32::consts::PI;
                }
                for ch in 0..channels as usize {
                    interleaved[frame * channels as usize + ch] = sample;
                }
            }

            let block = CaptureBlock {
                frame_count: block_frames,
                channels,
                interleaved: &interleaved,
            };
            producer.push_block(&block);
            std::thread::sleep(block_period);
        }
    });

    log::info!("Synthetic capture thread started ({tone_hz} Hz tone)");

    let (stop_tx, stop_rx) = tokio::sync::mpsc::unbounded_channel();
    let run_handle = tokio::spawn(session.run(stop_rx));

    // Wait for shutdown signal
    shutdown_signal().await;

    log::info!("Shutdown signal received, stopping session...");

    let _ = stop_tx.send(SupervisorCommand::Stop);
    let outcome = run_handle.await.context("session task panicked")?;

    running.store(false, Ordering::Relaxed);
    let _ = capture_thread.join();

    log::info!("Shutdown complete");

    match outcome {
        Ok(()) => Ok(()),
        Err(err) => {
            log::error!("Session ended with an error: {err}");
            Err(err.into())
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
