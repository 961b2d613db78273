//! Device session: open, negotiate, allocate, close.

use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::buffer::BufferPool;
use crate::error::{CaptureError, Result};
use crate::traits::{CaptureDriver, DeviceCapabilities, Format, FourCC, Ioctl};
use crate::v4l2::V4l2Driver;

/// Buffers requested when the caller has no preference.
pub const DEFAULT_BUFFER_COUNT: u32 = 4;

/// Fewest buffers that still allow one slot to be processed while the
/// driver fills another.
pub const MIN_BUFFER_COUNT: u32 = 2;

/// An open capture device and its negotiated format.
///
/// Exclusively owns the driver handle. Dropping the session closes it.
pub struct DeviceSession<D> {
    path: PathBuf,
    driver: D,
    capabilities: Option<DeviceCapabilities>,
    format: Option<Format>,
}

impl DeviceSession<V4l2Driver> {
    /// Open a V4L2 capture device node in non-blocking mode.
    ///
    /// The path must exist and be a character device. Failures are not
    /// retried.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        check_character_device(path)?;

        let driver = V4l2Driver::open(path).map_err(|source| CaptureError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "opened capture device");

        Ok(Self::with_driver(path, driver))
    }
}

/// Validate that `path` names a character special file.
pub fn check_character_device(path: &Path) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|source| CaptureError::DeviceNotFound {
        path: path.to_path_buf(),
        source,
    })?;

    if !metadata.file_type().is_char_device() {
        return Err(CaptureError::NotACaptureDevice(path.to_path_buf()));
    }
    Ok(())
}

impl<D: CaptureDriver> DeviceSession<D> {
    /// Wrap an already opened driver.
    pub fn with_driver<P: Into<PathBuf>>(path: P, driver: D) -> Self {
        Self {
            path: path.into(),
            driver,
            capabilities: None,
            format: None,
        }
    }

    /// Device path this session was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Capabilities reported during negotiation.
    pub const fn capabilities(&self) -> Option<&DeviceCapabilities> {
        self.capabilities.as_ref()
    }

    /// The negotiated format, once [`negotiate`](Self::negotiate) succeeded.
    pub const fn format(&self) -> Option<&Format> {
        self.format.as_ref()
    }

    /// Read-only access to the underlying driver.
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    pub(crate) fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Check capabilities and negotiate a YUYV capture format.
    ///
    /// The driver may substitute its own geometry; the returned format is
    /// what it actually set, with stride and size raised to their minimum if
    /// the driver under-reported them.
    pub fn negotiate(&mut self, width: u32, height: u32) -> Result<Format> {
        let caps = self
            .driver
            .query_capabilities()
            .map_err(|source| CaptureError::Device {
                op: Ioctl::QueryCap,
                source,
            })?;

        debug!(
            driver = %caps.driver,
            card = %caps.card,
            bus = %caps.bus_info,
            version = ?caps.version,
            "queried capabilities"
        );

        if !caps.can_capture {
            return Err(CaptureError::NotACaptureDevice(self.path.clone()));
        }
        if !caps.can_stream {
            return Err(CaptureError::NotStreamingCapable(self.path.clone()));
        }
        self.capabilities = Some(caps);

        // Cropping is optional; drivers without it are fine.
        if let Err(err) = self.driver.reset_crop() {
            debug!(%err, "crop reset not supported");
        }

        let requested = Format::new(width, height, FourCC::YUYV);
        let mut format = self
            .driver
            .set_format(&requested)
            .map_err(|source| CaptureError::Device {
                op: Ioctl::SetFormat,
                source,
            })?;

        if format.width != width || format.height != height {
            info!(
                requested_width = width,
                requested_height = height,
                width = format.width,
                height = format.height,
                "driver adjusted capture size"
            );
        }

        let reported = format;
        if format.clamp_to_minimum() {
            warn!(
                reported_stride = reported.stride,
                reported_size = reported.size,
                stride = format.stride,
                size = format.size,
                "driver under-reported frame layout, clamped"
            );
        }

        info!(
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            stride = format.stride,
            size = format.size,
            "negotiated format"
        );
        self.format = Some(format);
        Ok(format)
    }

    /// Request `count` memory-mapped buffers and map each one.
    ///
    /// Fails if the driver grants fewer than [`MIN_BUFFER_COUNT`]. A mapping
    /// failure unmaps everything mapped so far and releases the kernel
    /// allocation before returning.
    pub fn allocate_buffers(&mut self, count: u32) -> Result<BufferPool<D::Region>> {
        if self.format.is_none() {
            return Err(CaptureError::NotNegotiated);
        }

        let granted = match self.driver.request_buffers(count) {
            Ok(granted) => granted,
            Err(err) if err.raw_os_error() == Some(libc::EINVAL) => {
                return Err(CaptureError::NotStreamingCapable(self.path.clone()));
            }
            Err(source) => {
                return Err(CaptureError::Device {
                    op: Ioctl::RequestBuffers,
                    source,
                })
            }
        };
        debug!(requested = count, granted, "requested buffers");

        if granted < MIN_BUFFER_COUNT {
            self.release_buffers();
            return Err(CaptureError::InsufficientBufferMemory {
                requested: count,
                granted,
            });
        }

        let mut mappings = Vec::with_capacity(granted as usize);
        for slot in 0..granted {
            match self.driver.map_buffer(slot) {
                Ok(region) => {
                    debug!(slot, len = region.as_ref().len(), "mapped buffer");
                    mappings.push(region);
                }
                Err(source) => {
                    drop(mappings);
                    self.release_buffers();
                    return Err(CaptureError::MapFailed { slot, source });
                }
            }
        }

        info!(count = granted, "allocated capture buffers");
        Ok(BufferPool::new(mappings))
    }

    /// Best-effort release of the kernel allocation on an unwind path.
    fn release_buffers(&mut self) {
        if let Err(err) = self.driver.request_buffers(0) {
            warn!(%err, "failed to release buffers");
        }
    }

    /// Close the device.
    ///
    /// The buffer pool must have been torn down and streaming stopped first.
    pub fn close(self) {
        info!(path = %self.path.display(), "closing capture device");
        drop(self.driver);
    }
}
