//! YUYV (4:2:2 packed) to RGB24 conversion.

use crate::traits::{Format, FrameMetadata, YUYV_BYTES_PER_PIXEL};

/// Bytes per pixel of the RGB24 output.
pub const RGB24_DEPTH: u32 = 3;

/// Output buffer length for a `width` x `height` RGB24 frame.
#[must_use]
pub const fn rgb24_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * RGB24_DEPTH as usize
}

/// A converted frame, owned by the caller.
#[derive(Debug, Clone)]
pub struct OutputFrame {
    /// Interleaved RGB pixels, row-major, no padding.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Metadata reported by the driver for the source buffer.
    pub metadata: FrameMetadata,
}

impl OutputFrame {
    /// Convert a raw YUYV buffer laid out as `format` describes.
    #[must_use]
    pub fn from_yuyv(src: &[u8], format: &Format, metadata: FrameMetadata) -> Self {
        Self {
            data: yuyv_to_rgb24(src, format.width, format.height, format.stride),
            width: format.width,
            height: format.height,
            metadata,
        }
    }

    /// Display depth in bytes per pixel.
    #[must_use]
    pub const fn depth(&self) -> u32 {
        RGB24_DEPTH
    }

    /// Get RGB values for a pixel at the specified coordinates.
    ///
    /// Returns `None` if the coordinates fall outside the frame.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * RGB24_DEPTH as usize;
        match self.data.get(offset..offset + 3)? {
            [r, g, b] => Some((*r, *g, *b)),
            _ => None,
        }
    }
}

/// Convert one YUYV frame to a freshly allocated RGB24 buffer.
///
/// `stride` is the source row pitch in bytes. The result is always exactly
/// `width * height * 3` bytes.
#[must_use]
pub fn yuyv_to_rgb24(src: &[u8], width: u32, height: u32, stride: u32) -> Vec<u8> {
    let mut dst = Vec::new();
    yuyv_to_rgb24_into(src, width, height, stride, &mut dst);
    dst
}

/// Convert one YUYV frame into a caller-owned buffer.
///
/// `dst` is resized to `width * height * 3` bytes; its previous contents are
/// discarded. A source shorter than `stride * height` is a caller bug: the
/// missing pixels come out black.
pub fn yuyv_to_rgb24_into(src: &[u8], width: u32, height: u32, stride: u32, dst: &mut Vec<u8>) {
    dst.clear();
    dst.resize(rgb24_len(width, height), 0);
    if width == 0 || height == 0 {
        return;
    }

    let row_bytes = (width * YUYV_BYTES_PER_PIXEL) as usize;
    let out_row_bytes = width as usize * RGB24_DEPTH as usize;

    for (row, out_row) in dst.chunks_exact_mut(out_row_bytes).enumerate() {
        let start = row * stride as usize;
        let Some(rest) = src.get(start..) else {
            break;
        };
        let (in_row, _) = rest.split_at(rest.len().min(row_bytes));

        // [Y0 U Y1 V] -> two RGB pixels sharing U and V
        for (pair, out) in in_row.chunks(4).zip(out_row.chunks_mut(6)) {
            let [y0, u, y1, v] = *pair else {
                break;
            };
            let (r0, g0, b0) = yuv_to_rgb(y0, u, v);
            let (r1, g1, b1) = yuv_to_rgb(y1, u, v);
            for (dst, value) in out.iter_mut().zip([r0, g0, b0, r1, g1, b1]) {
                *dst = value;
            }
        }
    }
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula. Output is clamped to 0-255.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    let clamp = |val: f32| -> u8 {
        if val < 0.0 {
            0
        } else if val > 255.0 {
            255
        } else {
            #[allow(clippy::cast_possible_truncation)]
            #[allow(clippy::cast_sign_loss)]
            {
                val as u8
            }
        }
    };

    (clamp(r), clamp(g), clamp(b))
}
