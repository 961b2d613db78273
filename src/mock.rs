//! Simulated capture driver for testing without hardware.

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::traits::{
    CaptureDriver, Dequeued, DeviceCapabilities, Format, FourCC, FrameMetadata,
};

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// A mock mapping. Dropping it counts as an unmap.
#[derive(Debug)]
pub struct MockRegion {
    data: Vec<u8>,
    live: Rc<Cell<usize>>,
}

impl AsRef<[u8]> for MockRegion {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockRegion {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

/// Simulated driver with scriptable frames and injectable faults.
///
/// Frames become ready only when a test pushes them; a dequeue with nothing
/// pending fails with `EAGAIN` like a non-blocking V4L2 device.
#[derive(Debug)]
pub struct MockDriver {
    capabilities: DeviceCapabilities,
    format: Format,
    pattern: TestPattern,
    size_override: Option<(u32, u32)>,
    reported_layout: Option<(u32, u32)>,
    granted_override: Option<u32>,
    crop_supported: bool,
    mmap_supported: bool,
    crop_reset: bool,
    buffer_count: u32,
    buffer_requests: Vec<u32>,
    live: Rc<Cell<usize>>,
    queued: VecDeque<u32>,
    pending: VecDeque<bool>,
    dequeued: Vec<u32>,
    streaming: bool,
    sequence: u32,
    fail_map_at: Option<u32>,
    fail_queue_at: Option<u32>,
    fail_stream_on: bool,
    fail_next_queue: bool,
    fail_next_dequeue: Option<i32>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create a new mock driver with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: Self::default_capabilities(),
            format: Format::new(640, 480, FourCC::YUYV),
            pattern: TestPattern::ColorBars,
            size_override: None,
            reported_layout: None,
            granted_override: None,
            crop_supported: true,
            mmap_supported: true,
            crop_reset: false,
            buffer_count: 0,
            buffer_requests: Vec::new(),
            live: Rc::new(Cell::new(0)),
            queued: VecDeque::new(),
            pending: VecDeque::new(),
            dequeued: Vec::new(),
            streaming: false,
            sequence: 0,
            fail_map_at: None,
            fail_queue_at: None,
            fail_stream_on: false,
            fail_next_queue: false,
            fail_next_dequeue: None,
        }
    }

    /// Capabilities of a capture-and-stream capable device.
    #[must_use]
    pub fn default_capabilities() -> DeviceCapabilities {
        DeviceCapabilities {
            driver: "mock".to_owned(),
            card: "Mock Camera".to_owned(),
            bus_info: "mock:0".to_owned(),
            version: (6, 1, 0),
            can_capture: true,
            can_stream: true,
        }
    }

    /// Set the capabilities for this mock driver.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Substitute this geometry for whatever is requested.
    #[must_use]
    pub const fn with_size_override(mut self, width: u32, height: u32) -> Self {
        self.size_override = Some((width, height));
        self
    }

    /// Report this stride and image size from format negotiation.
    #[must_use]
    pub const fn with_reported_layout(mut self, stride: u32, size: u32) -> Self {
        self.reported_layout = Some((stride, size));
        self
    }

    /// Grant exactly `count` buffers regardless of the request.
    #[must_use]
    pub const fn with_granted_buffers(mut self, count: u32) -> Self {
        self.granted_override = Some(count);
        self
    }

    /// Fill mapped buffers with `pattern`.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Fail crop ioctls.
    #[must_use]
    pub const fn without_crop(mut self) -> Self {
        self.crop_supported = false;
        self
    }

    /// Reject memory-mapped buffer requests with `EINVAL`.
    #[must_use]
    pub const fn without_mmap(mut self) -> Self {
        self.mmap_supported = false;
        self
    }

    /// Fail mapping of `slot`.
    #[must_use]
    pub const fn fail_map_at(mut self, slot: u32) -> Self {
        self.fail_map_at = Some(slot);
        self
    }

    /// Fail queueing of `slot`.
    #[must_use]
    pub const fn fail_queue_at(mut self, slot: u32) -> Self {
        self.fail_queue_at = Some(slot);
        self
    }

    /// Fail the stream-on directive.
    #[must_use]
    pub const fn fail_stream_on(mut self) -> Self {
        self.fail_stream_on = true;
        self
    }

    /// Make `count` frames ready.
    pub fn push_frames(&mut self, count: u32) {
        self.pending.extend((0..count).map(|_| false));
    }

    /// Make `count` frames ready that carry the driver error flag.
    pub fn push_errored_frames(&mut self, count: u32) {
        self.pending.extend((0..count).map(|_| true));
    }

    /// Fail the next queue call.
    pub fn fail_next_queue(&mut self) {
        self.fail_next_queue = true;
    }

    /// Fail the next dequeue with `errno`.
    pub fn fail_next_dequeue(&mut self, errno: i32) {
        self.fail_next_dequeue = Some(errno);
    }

    /// Whether the crop rectangle was reset.
    pub const fn crop_was_reset(&self) -> bool {
        self.crop_reset
    }

    /// Number of regions currently mapped.
    pub fn live_mappings(&self) -> usize {
        self.live.get()
    }

    /// Shared handle to the live mapping count, readable after the driver is gone.
    pub fn live_mapping_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.live)
    }

    /// Every buffer count requested so far, in order.
    pub fn buffer_requests(&self) -> &[u32] {
        &self.buffer_requests
    }

    /// Slots currently queued, in fill order.
    pub fn queued(&self) -> Vec<u32> {
        self.queued.iter().copied().collect()
    }

    /// Slots dequeued so far, in order.
    pub fn dequeued_slots(&self) -> &[u32] {
        &self.dequeued
    }

    /// Whether streaming is on.
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }
}

fn errno(code: i32) -> io::Error {
    io::Error::from_raw_os_error(code)
}

impl CaptureDriver for MockDriver {
    type Region = MockRegion;

    fn query_capabilities(&mut self) -> io::Result<DeviceCapabilities> {
        Ok(self.capabilities.clone())
    }

    fn reset_crop(&mut self) -> io::Result<()> {
        if !self.crop_supported {
            return Err(errno(libc::EINVAL));
        }
        self.crop_reset = true;
        Ok(())
    }

    fn set_format(&mut self, format: &Format) -> io::Result<Format> {
        let (width, height) = self
            .size_override
            .unwrap_or((format.width, format.height));
        self.format = Format::new(width, height, format.fourcc);

        let mut reported = self.format;
        if let Some((stride, size)) = self.reported_layout {
            reported.stride = stride;
            reported.size = size;
        }
        Ok(reported)
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<u32> {
        self.buffer_requests.push(count);
        if !self.mmap_supported {
            return Err(errno(libc::EINVAL));
        }
        self.buffer_count = if count == 0 {
            0
        } else {
            self.granted_override.unwrap_or(count)
        };
        Ok(self.buffer_count)
    }

    fn map_buffer(&mut self, slot: u32) -> io::Result<MockRegion> {
        if self.fail_map_at == Some(slot) {
            return Err(errno(libc::ENOMEM));
        }
        if slot >= self.buffer_count {
            return Err(errno(libc::EINVAL));
        }
        self.live.set(self.live.get() + 1);
        Ok(MockRegion {
            data: generate_test_frame(&self.format, self.pattern),
            live: Rc::clone(&self.live),
        })
    }

    fn queue_buffer(&mut self, slot: u32) -> io::Result<()> {
        if self.fail_next_queue || self.fail_queue_at == Some(slot) {
            self.fail_next_queue = false;
            return Err(errno(libc::EIO));
        }
        if slot >= self.buffer_count || self.queued.contains(&slot) {
            return Err(errno(libc::EINVAL));
        }
        self.queued.push_back(slot);
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<Dequeued> {
        if let Some(code) = self.fail_next_dequeue.take() {
            return Err(errno(code));
        }
        if !self.streaming {
            return Err(errno(libc::EINVAL));
        }
        if self.pending.is_empty() || self.queued.is_empty() {
            return Err(errno(libc::EAGAIN));
        }

        let errored = self.pending.pop_front().unwrap_or_default();
        let slot = self.queued.pop_front().ok_or_else(|| errno(libc::EAGAIN))?;
        let sequence = self.sequence;
        self.sequence += 1;
        self.dequeued.push(slot);

        Ok(Dequeued {
            slot,
            metadata: FrameMetadata {
                sequence,
                timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
                bytes_used: self.format.size,
                errored,
            },
        })
    }

    fn stream_on(&mut self) -> io::Result<()> {
        if self.fail_stream_on {
            return Err(errno(libc::EIO));
        }
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.streaming = false;
        self.queued.clear();
        Ok(())
    }
}

/// Generate YUYV frame data for `format` filled with `pattern`.
///
/// Rows are `format.stride` bytes apart; padding bytes stay zero.
pub fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let mut data = vec![0u8; format.size as usize];
    if format.stride == 0 {
        return data;
    }

    for row in data
        .chunks_exact_mut(format.stride as usize)
        .take(format.height as usize)
    {
        fill_row(row, format.width, pattern);
    }
    data
}

/// YUV values of the 8 color bars: White, Yellow, Cyan, Green, Magenta, Red,
/// Blue, Black.
const COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 128, 128), // White
    (210, 16, 146),  // Yellow
    (170, 166, 16),  // Cyan
    (145, 54, 34),   // Green
    (106, 202, 222), // Magenta
    (81, 90, 240),   // Red
    (41, 240, 110),  // Blue
    (16, 128, 128),  // Black
];

fn fill_row(row: &mut [u8], width: u32, pattern: TestPattern) {
    let bar_width = (width / 8).max(1);

    for (x, pair) in (0..width)
        .step_by(2)
        .zip(row.chunks_exact_mut(4))
    {
        let (y_val, u_val, v_val) = match pattern {
            TestPattern::ColorBars => {
                let bar_idx = (x / bar_width).min(7) as usize;
                COLOR_BARS.get(bar_idx).copied().unwrap_or((16, 128, 128))
            }
            TestPattern::Gradient => {
                #[allow(clippy::cast_possible_truncation)]
                let y_val = ((x * 255) / width) as u8;
                (y_val, 128, 128)
            }
            TestPattern::Solid(y, u, v) => (y, u, v),
        };
        pair.copy_from_slice(&[y_val, u_val, y_val, v_val]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_driver_creation() {
        let mut driver = MockDriver::new();
        let caps = driver.query_capabilities().expect("query should succeed");
        assert_eq!(caps.driver, "mock");
        assert!(caps.can_capture);
        assert!(caps.can_stream);
    }

    #[test]
    fn test_mock_driver_format() {
        let mut driver = MockDriver::new();
        let actual = driver
            .set_format(&Format::new(1280, 720, FourCC::YUYV))
            .expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.height, 720);

        let mut driver = MockDriver::new().with_size_override(640, 480);
        let actual = driver
            .set_format(&Format::new(1280, 720, FourCC::YUYV))
            .expect("set_format should succeed");
        assert_eq!((actual.width, actual.height), (640, 480));
    }

    #[test]
    fn test_dequeue_without_frames_would_block() {
        let mut driver = MockDriver::new();
        driver.request_buffers(2).expect("request should succeed");
        driver.queue_buffer(0).expect("queue should succeed");
        driver.stream_on().expect("stream_on should succeed");
        let err = driver.dequeue_buffer().expect_err("dequeue should fail");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_double_queue_rejected() {
        let mut driver = MockDriver::new();
        driver.request_buffers(2).expect("request should succeed");
        driver.queue_buffer(1).expect("queue should succeed");
        assert!(driver.queue_buffer(1).is_err());
        assert!(driver.queue_buffer(2).is_err());
    }

    #[test]
    fn test_mappings_are_counted() {
        let mut driver = MockDriver::new();
        driver.request_buffers(2).expect("request should succeed");
        let first = driver.map_buffer(0).expect("map should succeed");
        let second = driver.map_buffer(1).expect("map should succeed");
        assert_eq!(driver.live_mappings(), 2);
        drop(first);
        assert_eq!(driver.live_mappings(), 1);
        drop(second);
        assert_eq!(driver.live_mappings(), 0);
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::ColorBars);

        // Check frame size
        assert_eq!(data.len(), (640 * 480 * 2) as usize);

        // First bar should be white (Y=235)
        assert_eq!(data[0], 235);
    }

    #[test]
    fn test_gradient_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Gradient);

        // Left edge should be dark
        assert!(data[0] < 10);

        // Right edge should be bright (check last row, last pixel)
        let last_row_start = (479 * 640 * 2) as usize;
        let last_pixel_y = data[last_row_start + 638 * 2];
        assert!(last_pixel_y > 200);
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));

        // All Y values should be 128
        assert_eq!(data[0], 128);
        assert_eq!(data[2], 128);

        // U should be 64, V should be 192
        assert_eq!(data[1], 64);
        assert_eq!(data[3], 192);
    }

    #[test]
    fn test_padded_stride_leaves_padding_zero() {
        let format = Format {
            stride: 16,
            size: 16 * 2,
            ..Format::new(4, 2, FourCC::YUYV)
        };
        let data = generate_test_frame(&format, TestPattern::Solid(50, 60, 70));
        assert_eq!(&data[..8], &[50, 60, 50, 70, 50, 60, 50, 70]);
        assert!(data[8..16].iter().all(|&b| b == 0));
        assert_eq!(&data[16..24], &[50, 60, 50, 70, 50, 60, 50, 70]);
    }
}
