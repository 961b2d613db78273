//! Frame validation utilities for test pattern verification.
//!
//! These check converted RGB output against the patterns produced by the
//! vivid virtual driver and the simulated driver used in tests.

use thiserror::Error;

use crate::convert::OutputFrame;

/// Expected RGB values for the 8 SMPTE color bars after conversion.
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235), // White
    (235, 235, 11),  // Yellow
    (12, 236, 237),  // Cyan
    (13, 237, 13),   // Green
    (237, 13, 237),  // Magenta
    (238, 14, 13),   // Red
    (15, 15, 239),   // Blue
    (16, 16, 16),    // Black
];

/// Per-channel tolerance for YUV to RGB rounding.
const COLOR_TOLERANCE: u8 = 15;

/// Minimum luminance rise across a frame for it to count as a gradient.
const MIN_GRADIENT_RISE: f32 = 50.0;

/// A frame did not match the expected pattern.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A sample point lies outside the frame.
    #[error("pixel ({x}, {y}) outside {width}x{height} frame")]
    OutOfBounds {
        /// Column sampled.
        x: u32,
        /// Row sampled.
        y: u32,
        /// Frame width.
        width: u32,
        /// Frame height.
        height: u32,
    },

    /// A color bar sample did not match.
    #[error("color bar {bar} mismatch at ({x}, {y}): expected RGB{expected:?}, got RGB{actual:?}")]
    ColorBar {
        /// Bar index, left to right.
        bar: usize,
        /// Column sampled.
        x: u32,
        /// Row sampled.
        y: u32,
        /// Expected color.
        expected: (u8, u8, u8),
        /// Converted color.
        actual: (u8, u8, u8),
    },

    /// Luminance fell from one sample to the next.
    #[error("gradient not increasing at x={x}: luminance {luminance} < previous {previous}")]
    NotMonotonic {
        /// Column sampled.
        x: u32,
        /// Luminance at `x`.
        luminance: f32,
        /// Luminance at the previous sample.
        previous: f32,
    },

    /// The frame is too flat to be a gradient.
    #[error("insufficient luminance change for gradient: {0} (expected at least 50)")]
    FlatGradient(f32),

    /// No frames were given.
    #[error("cannot validate empty frame sequence")]
    EmptySequence,

    /// Sequence numbers skipped or repeated.
    #[error("frame sequence gap at index {index}: expected {expected}, got {actual}")]
    SequenceGap {
        /// Position in the slice.
        index: usize,
        /// Sequence number expected there.
        expected: u32,
        /// Sequence number found.
        actual: u32,
    },
}

fn sample(frame: &OutputFrame, x: u32, y: u32) -> Result<(u8, u8, u8), ValidationError> {
    frame.pixel_at(x, y).ok_or(ValidationError::OutOfBounds {
        x,
        y,
        width: frame.width,
        height: frame.height,
    })
}

/// Validate that a frame shows the 8 vertical SMPTE color bars.
///
/// Each bar is sampled at its center on the middle row.
pub fn validate_color_bars(frame: &OutputFrame) -> Result<(), ValidationError> {
    let bar_width = frame.width / 8;
    let center_y = frame.height / 2;

    for (bar, (x, expected)) in (0u32..)
        .map(|idx| idx * bar_width + bar_width / 2)
        .zip(SMPTE_COLOR_BARS)
        .enumerate()
    {
        let actual = sample(frame, x, center_y)?;
        if !colors_match(actual, expected, COLOR_TOLERANCE) {
            return Err(ValidationError::ColorBar {
                bar,
                x,
                y: center_y,
                expected,
                actual,
            });
        }
    }

    Ok(())
}

/// Validate that a frame shows a left-to-right brightening gradient.
///
/// Luminance is sampled every 10 pixels along the middle row; small dips
/// from rounding are tolerated.
pub fn validate_gradient(frame: &OutputFrame) -> Result<(), ValidationError> {
    let center_y = frame.height / 2;
    let mut first: Option<f32> = None;
    let mut previous: Option<f32> = None;

    for x in (0..frame.width).step_by(10) {
        let luminance = luma(sample(frame, x, center_y)?);

        if let Some(previous) = previous {
            if luminance < previous - 1.0 {
                return Err(ValidationError::NotMonotonic {
                    x,
                    luminance,
                    previous,
                });
            }
        }
        first.get_or_insert(luminance);
        previous = Some(luminance);
    }

    if let (Some(first), Some(last)) = (first, previous) {
        let rise = last - first;
        if rise < MIN_GRADIENT_RISE {
            return Err(ValidationError::FlatGradient(rise));
        }
    }

    Ok(())
}

/// Validate that sequence numbers increase by exactly one.
pub fn validate_frame_sequence(frames: &[OutputFrame]) -> Result<(), ValidationError> {
    if frames.is_empty() {
        return Err(ValidationError::EmptySequence);
    }

    for (index, pair) in frames.windows(2).enumerate() {
        if let [prev, curr] = pair {
            let expected = prev.metadata.sequence.wrapping_add(1);
            if curr.metadata.sequence != expected {
                return Err(ValidationError::SequenceGap {
                    index: index + 1,
                    expected,
                    actual: curr.metadata.sequence,
                });
            }
        }
    }

    Ok(())
}

/// Rec. 601 luma.
fn luma((r, g, b): (u8, u8, u8)) -> f32 {
    0.114f32.mul_add(
        f32::from(b),
        0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
    )
}

fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u8) -> bool {
    actual.0.abs_diff(expected.0) <= tolerance
        && actual.1.abs_diff(expected.1) <= tolerance
        && actual.2.abs_diff(expected.2) <= tolerance
}
