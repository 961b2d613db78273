//! Error type for capture operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::CaptureState;
use crate::traits::Ioctl;

/// Error type for capture operations.
///
/// Device-originated failures carry the underlying [`io::Error`]. Misuse of
/// the API (calls out of state order, bad slot indices) uses dedicated
/// variants; see [`CaptureError::is_contract_violation`].
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device path could not be stat'ed.
    #[error("cannot identify '{}': {source}", .path.display())]
    DeviceNotFound {
        /// Path that was probed.
        path: PathBuf,
        /// Underlying stat error.
        source: io::Error,
    },
    /// The device node exists but could not be opened.
    #[error("cannot open '{}': {source}", .path.display())]
    OpenFailed {
        /// Path that was opened.
        path: PathBuf,
        /// Underlying open error.
        source: io::Error,
    },
    /// The path is not a character device, or the device cannot capture video.
    #[error("{} is no video capture device", .0.display())]
    NotACaptureDevice(PathBuf),
    /// The device does not support memory-mapped streaming I/O.
    #[error("{} does not support streaming i/o", .0.display())]
    NotStreamingCapable(PathBuf),
    /// The driver granted fewer buffers than a pipelined capture needs.
    #[error("insufficient buffer memory: requested {requested}, driver granted {granted}")]
    InsufficientBufferMemory {
        /// Buffers requested.
        requested: u32,
        /// Buffers granted by the driver.
        granted: u32,
    },
    /// Mapping a buffer slot into the process failed.
    #[error("failed to map buffer {slot}: {source}")]
    MapFailed {
        /// Slot being mapped.
        slot: u32,
        /// Underlying error.
        source: io::Error,
    },
    /// Queueing a slot while starting the stream failed.
    #[error("failed to queue buffer {slot}: {source}")]
    QueueFailed {
        /// Slot being queued.
        slot: u32,
        /// Underlying error.
        source: io::Error,
    },
    /// The stream-on directive failed.
    #[error("failed to start streaming: {0}")]
    StreamOnFailed(#[source] io::Error),
    /// Any other driver failure.
    #[error("{op} failed: {source}")]
    Device {
        /// Operation that failed.
        op: Ioctl,
        /// Underlying error.
        source: io::Error,
    },
    /// `start` was called on an engine that is already streaming.
    #[error("capture is already streaming")]
    AlreadyStreaming,
    /// A streaming-only operation was called while not streaming.
    #[error("capture is not streaming")]
    NotStreaming,
    /// An operation was called in a state that does not permit it.
    #[error("{operation} is not allowed in state {state:?}")]
    InvalidState {
        /// Rejected operation.
        operation: &'static str,
        /// State the engine was in.
        state: CaptureState,
    },
    /// Buffer allocation was attempted before a format was negotiated.
    #[error("no format has been negotiated")]
    NotNegotiated,
    /// A slot index outside the pool was used.
    #[error("invalid buffer slot {slot} (pool has {count})")]
    InvalidSlot {
        /// Requested slot.
        slot: u32,
        /// Number of slots in the pool.
        count: usize,
    },
    /// Buffer contents were requested while the driver owns the slot.
    #[error("buffer slot {0} is owned by the driver")]
    SlotNotReadable(u32),
}

impl CaptureError {
    /// Whether this error reports API misuse rather than a device failure.
    #[must_use]
    pub const fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::AlreadyStreaming
                | Self::NotStreaming
                | Self::InvalidState { .. }
                | Self::NotNegotiated
                | Self::InvalidSlot { .. }
                | Self::SlotNotReadable(_)
        )
    }
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
