use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use uvc_capture::config::{DEFAULT_DEVICE, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use uvc_capture::{CaptureConfig, ErroredFramePolicy};

/// Handling of buffers the driver marks as errored.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq, Copy)]
pub enum ErroredFrames {
    /// Convert and report them, flagged in the frame metadata
    Deliver,
    /// Requeue them without converting
    Drop,
}

impl From<ErroredFrames> for ErroredFramePolicy {
    fn from(value: ErroredFrames) -> Self {
        match value {
            ErroredFrames::Deliver => Self::Deliver,
            ErroredFrames::Drop => Self::Drop,
        }
    }
}

/// Command-line arguments for the capture tool.
///
/// Every option can also be set through the environment variable named in
/// its help text.
///
/// ```bash
/// uvc-capture --camera /dev/video0 --camera-size 640 480 --frames 100
///
/// CAMERA=/dev/video0 BUFFERS=6 uvc-capture
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Camera capture device path (e.g., /dev/video0)
    #[arg(short, long, env = "CAMERA", default_value = DEFAULT_DEVICE)]
    pub camera: PathBuf,

    /// Preferred capture resolution in pixels (width height); the driver
    /// may choose another
    #[arg(
        long,
        env = "CAMERA_SIZE",
        default_values_t = [DEFAULT_WIDTH, DEFAULT_HEIGHT],
        value_delimiter = ' ',
        num_args = 2
    )]
    pub camera_size: Vec<u32>,

    /// Number of memory-mapped buffers to request
    #[arg(short, long, env = "BUFFERS", default_value = "4")]
    pub buffers: u32,

    /// Milliseconds between frame polls
    #[arg(long, env = "POLL_MS", default_value = "17")]
    pub poll_ms: u64,

    /// Handling of buffers the driver flags as errored
    #[arg(long, env = "ERRORED_FRAMES", default_value = "deliver", value_enum)]
    pub errored_frames: ErroredFrames,

    /// Stop after this many frames
    #[arg(short, long)]
    pub frames: Option<u64>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Capture configuration described by these arguments.
    pub fn to_config(&self) -> CaptureConfig {
        let defaults = CaptureConfig::default();
        let (width, height) = match self.camera_size.as_slice() {
            [width, height] => (*width, *height),
            _ => (defaults.width, defaults.height),
        };

        CaptureConfig {
            device_path: self.camera.clone(),
            width,
            height,
            buffer_count: self.buffers,
            poll_interval: Duration::from_millis(self.poll_ms),
            errored_frames: self.errored_frames.into(),
            ..defaults
        }
    }
}
