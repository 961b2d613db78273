//! Capture configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::device::DEFAULT_BUFFER_COUNT;

/// Device opened when none is given.
pub const DEFAULT_DEVICE: &str = "/dev/video1";

/// Default requested capture width.
pub const DEFAULT_WIDTH: u32 = 320;

/// Default requested capture height.
pub const DEFAULT_HEIGHT: u32 = 240;

/// Default poll period; bounds the loop to roughly 60 polls per second.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(17);

/// How to treat a buffer the driver dequeued with an I/O fault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErroredFramePolicy {
    /// Convert and return it anyway, flagged in its metadata.
    #[default]
    Deliver,
    /// Requeue it without converting and report no frame.
    Drop,
}

/// Capture configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Character device to open.
    pub device_path: PathBuf,
    /// Preferred frame width; the driver may override it.
    pub width: u32,
    /// Preferred frame height; the driver may override it.
    pub height: u32,
    /// Buffers to request from the driver.
    pub buffer_count: u32,
    /// Period between `try_acquire_frame` polls.
    pub poll_interval: Duration,
    /// Length of a frame-rate observation window.
    pub fps_window: Duration,
    /// Handling of driver-flagged buffers.
    pub errored_frames: ErroredFramePolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            buffer_count: DEFAULT_BUFFER_COUNT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            fps_window: Duration::from_secs(1),
            errored_frames: ErroredFramePolicy::default(),
        }
    }
}
