//! Frame-rate tally shared between the capture loop and a display tick.

use std::sync::atomic::{AtomicU32, Ordering};

/// Frames completed in the current observation window.
///
/// The capture side calls [`record`](Self::record); a coarser periodic tick
/// calls [`take`](Self::take) to read and reset it.
#[derive(Debug, Default)]
pub struct FrameRateCounter {
    frames: AtomicU32,
}

impl FrameRateCounter {
    /// A counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frames: AtomicU32::new(0),
        }
    }

    /// Count one completed frame.
    pub fn record(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames counted so far in this window.
    pub fn get(&self) -> u32 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Return the count and start a new window.
    pub fn take(&self) -> u32 {
        self.frames.swap(0, Ordering::Relaxed)
    }
}
