//! uvc-capture: memory-mapped V4L2 video capture with YUYV to RGB24 conversion
//!
//! A [`DeviceSession`] opens a capture device, negotiates a YUYV format and
//! maps a ring of kernel buffers into a [`BufferPool`]. A [`CaptureEngine`]
//! drives the stream and hands out converted [`OutputFrame`]s without ever
//! blocking. Driver access goes through the [`CaptureDriver`] trait, so the
//! whole pipeline runs against a simulated driver in tests.

pub mod buffer;
pub mod config;
pub mod convert;
pub mod device;
pub mod engine;
pub mod error;
pub mod fps;
pub mod traits;
pub mod v4l2;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use buffer::{BufferPool, BufferRegion, Ownership};
pub use config::{CaptureConfig, ErroredFramePolicy};
pub use convert::{yuyv_to_rgb24, yuyv_to_rgb24_into, OutputFrame};
pub use device::DeviceSession;
pub use engine::{CaptureEngine, CaptureState};
pub use error::{CaptureError, Result};
pub use fps::FrameRateCounter;
pub use traits::{CaptureDriver, DeviceCapabilities, Format, FourCC, FrameMetadata, Ioctl};
pub use v4l2::V4l2Driver;
