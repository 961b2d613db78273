//! Capture state machine and the per-frame acquire/convert/requeue cycle.

use std::io;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::buffer::BufferPool;
use crate::config::ErroredFramePolicy;
use crate::convert::OutputFrame;
use crate::device::DeviceSession;
use crate::error::{CaptureError, Result};
use crate::fps::FrameRateCounter;
use crate::traits::{CaptureDriver, Format, Ioctl};

/// Streaming state of a [`CaptureEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Device open, no format or buffers yet.
    Idle,
    /// Format negotiated and buffers mapped.
    Negotiated,
    /// All slots queued and the driver is filling them.
    Streaming,
    /// Streaming was switched off. Terminal.
    Stopped,
}

/// Drives one device through `Idle -> Negotiated -> Streaming -> Stopped`.
///
/// Every state-changing call takes `&mut self`; the engine is not reentrant
/// and is meant to be polled from a single thread.
pub struct CaptureEngine<D: CaptureDriver> {
    session: DeviceSession<D>,
    pool: Option<BufferPool<D::Region>>,
    state: CaptureState,
    errored_frames: ErroredFramePolicy,
    counter: Arc<FrameRateCounter>,
}

impl<D: CaptureDriver> CaptureEngine<D> {
    /// Create an engine in the `Idle` state around an open session.
    pub fn new(session: DeviceSession<D>) -> Self {
        Self {
            session,
            pool: None,
            state: CaptureState::Idle,
            errored_frames: ErroredFramePolicy::default(),
            counter: Arc::new(FrameRateCounter::new()),
        }
    }

    /// Set how buffers the driver flags as errored are handled.
    #[must_use]
    pub const fn with_errored_frames(mut self, policy: ErroredFramePolicy) -> Self {
        self.errored_frames = policy;
        self
    }

    /// Record completed frames into a shared counter.
    #[must_use]
    pub fn with_frame_counter(mut self, counter: Arc<FrameRateCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Current state.
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// The negotiated format, if any.
    pub const fn format(&self) -> Option<&Format> {
        self.session.format()
    }

    /// The buffer pool, once allocated.
    pub const fn pool(&self) -> Option<&BufferPool<D::Region>> {
        self.pool.as_ref()
    }

    /// The underlying device session.
    pub const fn session(&self) -> &DeviceSession<D> {
        &self.session
    }

    /// Counter of frames produced since it was last reset.
    pub fn frame_counter(&self) -> Arc<FrameRateCounter> {
        Arc::clone(&self.counter)
    }

    fn require_idle(&self, operation: &'static str) -> Result<()> {
        if self.state == CaptureState::Idle {
            Ok(())
        } else {
            Err(CaptureError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Negotiate the capture format. Only valid while `Idle`.
    pub fn negotiate(&mut self, width: u32, height: u32) -> Result<Format> {
        self.require_idle("negotiate")?;
        self.session.negotiate(width, height)
    }

    /// Allocate and map `count` buffers, moving to `Negotiated`.
    pub fn allocate_buffers(&mut self, count: u32) -> Result<()> {
        self.require_idle("allocate_buffers")?;
        let pool = self.session.allocate_buffers(count)?;
        self.pool = Some(pool);
        self.transition(CaptureState::Negotiated);
        Ok(())
    }

    fn transition(&mut self, next: CaptureState) {
        info!(from = ?self.state, to = ?next, "capture state changed");
        self.state = next;
    }

    /// Queue every slot to the driver and switch streaming on.
    ///
    /// A queue failure part way through is not rolled back; the caller is
    /// expected to tear the engine down.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Negotiated => {}
            CaptureState::Streaming => return Err(CaptureError::AlreadyStreaming),
            state => {
                return Err(CaptureError::InvalidState {
                    operation: "start",
                    state,
                })
            }
        }

        let Some(pool) = self.pool.as_mut() else {
            return Err(CaptureError::InvalidState {
                operation: "start",
                state: self.state,
            });
        };
        let driver = self.session.driver_mut();

        for slot in (0u32..).take(pool.len()) {
            driver
                .queue_buffer(slot)
                .map_err(|source| CaptureError::QueueFailed { slot, source })?;
            pool.mark_driver_owned(slot)?;
        }
        debug!(count = pool.len(), "queued all buffers");

        driver.stream_on().map_err(CaptureError::StreamOnFailed)?;
        self.transition(CaptureState::Streaming);
        Ok(())
    }

    /// Fetch one frame if the driver has one ready. Never blocks.
    ///
    /// Returns `Ok(None)` when nothing is ready. The dequeued slot is always
    /// handed back to the driver before this returns; the frame is a copy.
    pub fn try_acquire_frame(&mut self) -> Result<Option<OutputFrame>> {
        if self.state != CaptureState::Streaming {
            return Err(CaptureError::NotStreaming);
        }
        let (Some(pool), Some(format)) = (self.pool.as_mut(), self.session.format().copied())
        else {
            return Err(CaptureError::InvalidState {
                operation: "try_acquire_frame",
                state: self.state,
            });
        };
        let driver = self.session.driver_mut();

        let dequeued = match driver.dequeue_buffer() {
            Ok(dequeued) => dequeued,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                trace!("no frame ready");
                return Ok(None);
            }
            Err(source) => {
                return Err(CaptureError::Device {
                    op: Ioctl::DequeueBuffer,
                    source,
                })
            }
        };

        let slot = dequeued.slot;
        pool.mark_application_owned(slot)?;

        let metadata = dequeued.metadata;
        let frame = if metadata.errored {
            warn!(slot, sequence = metadata.sequence, policy = ?self.errored_frames, "driver flagged buffer as errored");
            match self.errored_frames {
                ErroredFramePolicy::Deliver => Some(OutputFrame::from_yuyv(
                    pool.bytes(slot)?,
                    &format,
                    metadata,
                )),
                ErroredFramePolicy::Drop => None,
            }
        } else {
            Some(OutputFrame::from_yuyv(pool.bytes(slot)?, &format, metadata))
        };

        driver
            .queue_buffer(slot)
            .map_err(|source| CaptureError::Device {
                op: Ioctl::QueueBuffer,
                source,
            })?;
        pool.mark_driver_owned(slot)?;

        if frame.is_some() {
            self.counter.record();
        }
        Ok(frame)
    }

    /// Switch streaming off. Slot ownership is left as it is.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != CaptureState::Streaming {
            return Err(CaptureError::NotStreaming);
        }
        self.session
            .driver_mut()
            .stream_off()
            .map_err(|source| CaptureError::Device {
                op: Ioctl::StreamOff,
                source,
            })?;
        self.transition(CaptureState::Stopped);
        Ok(())
    }

    /// Stop streaming if needed, tear the pool down and close the device.
    pub fn shutdown(mut self) -> Result<()> {
        if self.state == CaptureState::Streaming {
            self.stop()?;
        }
        if let Some(pool) = self.pool.take() {
            pool.teardown(&mut self.session)?;
        }
        self.session.close();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn driver_for_test(&mut self) -> &mut D {
        self.session.driver_mut()
    }
}
