//! Core types and the low-level driver control interface.

use std::fmt;
use std::io;
use std::time::Duration;

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Bytes per pixel of the packed YUYV source format.
pub const YUYV_BYTES_PER_PIXEL: u32 = 2;

/// Video format specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format specification with a tightly packed YUYV layout.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width.saturating_mul(YUYV_BYTES_PER_PIXEL);
        let size = stride.saturating_mul(height);
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }

    /// Smallest stride that can hold one row of packed 4:2:2 pixels.
    #[must_use]
    pub const fn min_stride(&self) -> u32 {
        self.width.saturating_mul(YUYV_BYTES_PER_PIXEL)
    }

    /// Smallest image size that can hold `height` rows of `stride` bytes.
    #[must_use]
    pub const fn min_size(&self) -> u32 {
        self.stride.saturating_mul(self.height)
    }

    /// Raise stride and size to their geometric minimum.
    ///
    /// Some drivers report a `bytesperline` or `sizeimage` smaller than the
    /// frame actually needs. Stride is fixed first because the minimum size
    /// depends on it. Returns `true` if anything was changed.
    pub fn clamp_to_minimum(&mut self) -> bool {
        let mut clamped = false;

        let min_stride = self.min_stride();
        if self.stride < min_stride {
            self.stride = min_stride;
            clamped = true;
        }

        let min_size = self.min_size();
        if self.size < min_size {
            self.size = min_size;
            clamped = true;
        }

        clamped
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Driver version as (major, minor, patch).
    pub version: (u8, u8, u8),
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
    /// The driver reported an I/O fault for this buffer; contents may be stale.
    pub errored: bool,
}

/// A buffer slot handed back by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dequeued {
    /// Slot index of the filled buffer.
    pub slot: u32,
    /// Metadata reported with the buffer.
    pub metadata: FrameMetadata,
}

/// Control operations whose failures surface as [`CaptureError::Device`].
///
/// Crop, mapping and stream-on failures are either ignored or reported
/// through their own error variants.
///
/// [`CaptureError::Device`]: crate::error::CaptureError::Device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ioctl {
    /// Capability query.
    QueryCap,
    /// Format negotiation.
    SetFormat,
    /// Kernel buffer allocation (or release, with a count of zero).
    RequestBuffers,
    /// Handing a slot to the driver.
    QueueBuffer,
    /// Retrieving a filled slot.
    DequeueBuffer,
    /// Stop filling queued slots.
    StreamOff,
}

impl fmt::Display for Ioctl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::QueryCap => "VIDIOC_QUERYCAP",
            Self::SetFormat => "VIDIOC_S_FMT",
            Self::RequestBuffers => "VIDIOC_REQBUFS",
            Self::QueueBuffer => "VIDIOC_QBUF",
            Self::DequeueBuffer => "VIDIOC_DQBUF",
            Self::StreamOff => "VIDIOC_STREAMOFF",
        };
        f.write_str(name)
    }
}

/// Abstraction over the control operations of a memory-mapped capture device.
///
/// Each method corresponds to one V4L2 control operation and carries fixed
/// payload types.
/// Errors are returned raw; callers decide which ones are fatal. A dequeue
/// with nothing ready must fail with [`io::ErrorKind::WouldBlock`].
pub trait CaptureDriver {
    /// One mapped buffer region. Dropping it unmaps the memory.
    type Region: AsRef<[u8]>;

    /// Query driver identity and capability flags.
    fn query_capabilities(&mut self) -> io::Result<DeviceCapabilities>;

    /// Reset the crop rectangle to the driver default.
    fn reset_crop(&mut self) -> io::Result<()>;

    /// Request a capture format. Returns the format the driver actually set.
    fn set_format(&mut self, format: &Format) -> io::Result<Format>;

    /// Request `count` memory-mapped buffers. Returns the number granted.
    ///
    /// A count of zero releases the kernel-side allocation.
    fn request_buffers(&mut self, count: u32) -> io::Result<u32>;

    /// Map the buffer backing `slot` into the process.
    fn map_buffer(&mut self, slot: u32) -> io::Result<Self::Region>;

    /// Hand `slot` to the driver to be filled.
    fn queue_buffer(&mut self, slot: u32) -> io::Result<()>;

    /// Retrieve the next filled slot without blocking.
    fn dequeue_buffer(&mut self) -> io::Result<Dequeued>;

    /// Start streaming into queued slots.
    fn stream_on(&mut self) -> io::Result<()>;

    /// Stop streaming.
    fn stream_off(&mut self) -> io::Result<()>;
}
