//! uvc-capture binary: stream frames from a V4L2 camera and log the frame rate.

mod args;

use std::thread;
use std::time::Instant;

use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use uvc_capture::{CaptureConfig, CaptureEngine, DeviceSession, FrameRateCounter, V4l2Driver};

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("uvc_capture={level}"))),
        )
        .init();

    if let Err(err) = run(&args) {
        error!(%err, "capture failed");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> uvc_capture::Result<()> {
    let config = args.to_config();

    let session = DeviceSession::open(&config.device_path)?;
    let mut engine = CaptureEngine::new(session).with_errored_frames(config.errored_frames);

    let format = engine.negotiate(config.width, config.height)?;
    if let Some(caps) = engine.session().capabilities() {
        info!(card = %caps.card, driver = %caps.driver, "capture device");
    }
    info!(
        width = format.width,
        height = format.height,
        fourcc = %format.fourcc,
        "capturing"
    );

    engine.allocate_buffers(config.buffer_count)?;
    engine.start()?;

    let counter = engine.frame_counter();
    let result = capture_loop(&mut engine, &config, &counter, args.frames);
    let shutdown = engine.shutdown();
    result.and(shutdown)
}

/// Poll the engine at the configured period until `limit` frames were
/// captured, logging the frame rate once per window.
fn capture_loop(
    engine: &mut CaptureEngine<V4l2Driver>,
    config: &CaptureConfig,
    counter: &FrameRateCounter,
    limit: Option<u64>,
) -> uvc_capture::Result<()> {
    let mut captured: u64 = 0;
    let mut window_start = Instant::now();

    loop {
        if let Some(frame) = engine.try_acquire_frame()? {
            captured += 1;
            debug!(
                sequence = frame.metadata.sequence,
                timestamp = ?frame.metadata.timestamp,
                bytes = frame.data.len(),
                errored = frame.metadata.errored,
                "frame"
            );
            if limit.is_some_and(|limit| captured >= limit) {
                info!(captured, "frame limit reached");
                return Ok(());
            }
        }

        let elapsed = window_start.elapsed();
        if elapsed >= config.fps_window {
            let frames = counter.take();
            let fps = f64::from(frames) / elapsed.as_secs_f64();
            info!(fps = format_args!("{fps:.1}"), frames, "frame rate");
            window_start = Instant::now();
        }

        thread::sleep(config.poll_interval);
    }
}
