//! V4L2 driver implementation using the v4l crate.
//!
//! Device open, capability query and format negotiation go through the v4l
//! crate's safe API. Buffer management is done with raw ioctls so each slot
//! can be queued and dequeued individually, and so a dequeue never blocks.
#![allow(unsafe_code)]

use std::io;
use std::mem;
use std::os::raw::{c_int, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::slice;
use std::time::Duration;

use tracing::warn;
use v4l::buffer::Type;
use v4l::format::FieldOrder;
use v4l::v4l2;
use v4l::v4l2::vidioc;
use v4l::v4l_sys::{v4l2_buffer, v4l2_crop, v4l2_cropcap, v4l2_requestbuffers};
use v4l::video::Capture;
use v4l::{Device, Memory, Timestamp};

use crate::traits::{CaptureDriver, Dequeued, DeviceCapabilities, Format, FourCC, FrameMetadata};

/// `V4L2_BUF_FLAG_ERROR`: the buffer was dequeued but its data may be corrupt.
const BUF_FLAG_ERROR: u32 = 0x0000_0040;

/// Issue an ioctl, retrying when interrupted by a signal.
///
/// # Safety
///
/// `arg` must point to a live value of the type `request` expects.
unsafe fn xioctl(fd: c_int, request: vidioc::_IOC_TYPE, arg: *mut c_void) -> io::Result<()> {
    loop {
        match v4l2::ioctl(fd, request, arg) {
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            result => return result,
        }
    }
}

/// V4L2 capture driver wrapping an open device node.
pub struct V4l2Driver {
    device: Device,
    buffer_count: u32,
}

impl V4l2Driver {
    /// Open the device node at `path` in non-blocking mode.
    pub fn open(path: &Path) -> io::Result<Self> {
        let device = Device::with_path(path)?;
        set_nonblocking(device.handle().fd())?;
        Ok(Self {
            device,
            buffer_count: 0,
        })
    }

    fn fd(&self) -> c_int {
        self.device.handle().fd()
    }

    fn buffer_desc(index: u32) -> v4l2_buffer {
        // SAFETY: v4l2_buffer is a plain C struct; all-zero is a valid value.
        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.type_ = Type::VideoCapture as u32;
        buf.memory = Memory::Mmap as u32;
        buf.index = index;
        buf
    }
}

fn set_nonblocking(fd: c_int) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own, with integer arguments only.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK == 0 {
        // SAFETY: as above.
        let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// A buffer mapped from the device into process memory.
///
/// Unmapped on drop.
#[derive(Debug)]
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
}

impl AsRef<[u8]> for MmapRegion {
    fn as_ref(&self) -> &[u8] {
        // SAFETY: ptr/len describe a live MAP_SHARED mapping owned by self.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: the mapping was created by mmap with this exact length and
        // is not referenced after drop.
        let rc = unsafe { libc::munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) };
        if rc != 0 {
            warn!(err = %io::Error::last_os_error(), "munmap failed");
        }
    }
}

impl CaptureDriver for V4l2Driver {
    type Region = MmapRegion;

    fn query_capabilities(&mut self) -> io::Result<DeviceCapabilities> {
        let caps = self.device.query_caps()?;
        Ok(DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            version: caps.version,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        })
    }

    fn reset_crop(&mut self) -> io::Result<()> {
        let fd = self.fd();
        // SAFETY: zeroed C structs are valid; pointers are to locals that
        // outlive the calls.
        unsafe {
            let mut cropcap: v4l2_cropcap = mem::zeroed();
            cropcap.type_ = Type::VideoCapture as u32;
            xioctl(fd, vidioc::VIDIOC_CROPCAP, ptr::addr_of_mut!(cropcap).cast())?;

            let mut crop: v4l2_crop = mem::zeroed();
            crop.type_ = Type::VideoCapture as u32;
            crop.c = cropcap.defrect;
            xioctl(fd, vidioc::VIDIOC_S_CROP, ptr::addr_of_mut!(crop).cast())
        }
    }

    fn set_format(&mut self, format: &Format) -> io::Result<Format> {
        let mut fmt = self.device.format()?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();
        fmt.field_order = FieldOrder::Interlaced;

        let fmt = self.device.set_format(&fmt)?;

        Ok(Format {
            width: fmt.width,
            height: fmt.height,
            fourcc: FourCC::from(fmt.fourcc),
            stride: fmt.stride,
            size: fmt.size,
        })
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        // SAFETY: zeroed C struct is valid.
        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.count = count;
        req.type_ = Type::VideoCapture as u32;
        req.memory = Memory::Mmap as u32;

        // SAFETY: req lives across the call.
        unsafe { xioctl(self.fd(), vidioc::VIDIOC_REQBUFS, ptr::addr_of_mut!(req).cast())? };
        self.buffer_count = req.count;
        Ok(req.count)
    }

    fn map_buffer(&mut self, slot: u32) -> io::Result<MmapRegion> {
        let fd = self.fd();
        let mut buf = Self::buffer_desc(slot);

        // SAFETY: buf lives across the call.
        unsafe { xioctl(fd, vidioc::VIDIOC_QUERYBUF, ptr::addr_of_mut!(buf).cast())? };

        let len = buf.length as usize;
        // SAFETY: the MMAP memory type means the offset member of the union
        // is the one the driver filled in.
        let offset = unsafe { buf.m.offset };
        let offset = libc::off_t::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "buffer offset out of range"))?;

        // SAFETY: mapping a driver-provided offset/length on our own fd.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned null"))?;

        Ok(MmapRegion { ptr, len })
    }

    fn queue_buffer(&mut self, slot: u32) -> io::Result<()> {
        let mut buf = Self::buffer_desc(slot);
        // SAFETY: buf lives across the call.
        unsafe { xioctl(self.fd(), vidioc::VIDIOC_QBUF, ptr::addr_of_mut!(buf).cast()) }
    }

    fn dequeue_buffer(&mut self) -> io::Result<Dequeued> {
        // An index the driver never writes back reads as out of range.
        let mut buf = Self::buffer_desc(u32::MAX);

        // SAFETY: buf lives across the call.
        let result =
            unsafe { xioctl(self.fd(), vidioc::VIDIOC_DQBUF, ptr::addr_of_mut!(buf).cast()) };

        let errored = match result {
            Ok(()) => buf.flags & BUF_FLAG_ERROR != 0,
            // The driver may hand back a slot alongside EIO; only trust the
            // index if it names one of our buffers.
            Err(err) if err.raw_os_error() == Some(libc::EIO) && buf.index < self.buffer_count => {
                true
            }
            Err(err) => return Err(err),
        };

        let timestamp = Timestamp::from(buf.timestamp);
        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (timestamp.usec.max(0) as u32).saturating_mul(1000);

        Ok(Dequeued {
            slot: buf.index,
            metadata: FrameMetadata {
                sequence: buf.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: buf.bytesused,
                errored,
            },
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        let mut typ = Type::VideoCapture as u32;
        // SAFETY: typ lives across the call.
        unsafe { xioctl(self.fd(), vidioc::VIDIOC_STREAMON, ptr::addr_of_mut!(typ).cast()) }
    }

    fn stream_off(&mut self) -> io::Result<()> {
        let mut typ = Type::VideoCapture as u32;
        // SAFETY: typ lives across the call.
        unsafe { xioctl(self.fd(), vidioc::VIDIOC_STREAMOFF, ptr::addr_of_mut!(typ).cast()) }
    }
}
