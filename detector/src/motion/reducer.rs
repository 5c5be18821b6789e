use handwave_common::frame::{FrameError, PixelFrame};

/// Mean color of one frame, each channel normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ColorSample {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl ColorSample {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// L1 (Manhattan) distance across the three channels.
    pub fn distance(&self, other: &ColorSample) -> f32 {
        (self.r - other.r).abs() + (self.g - other.g).abs() + (self.b - other.b).abs()
    }
}

/// Reduce a frame to its average color.
///
/// Channel sums are accumulated as integers and divided once at the end, so
/// the result does not drift with frame size.
pub fn average_color(frame: &PixelFrame) -> Result<ColorSample, FrameError> {
    let count = frame.pixel_count();
    if count == 0 {
        return Err(FrameError::Empty);
    }
    if frame.data.len() != count * 3 {
        return Err(FrameError::Invalid(format!(
            "{}x{} frame carries {} bytes",
            frame.width,
            frame.height,
            frame.data.len()
        )));
    }

    let mut sums = [0u64; 3];
    for px in frame.pixels() {
        sums[0] += u64::from(px[0]);
        sums[1] += u64::from(px[1]);
        sums[2] += u64::from(px[2]);
    }

    let denom = count as f64 * 255.0;
    Ok(ColorSample::new(
        (sums[0] as f64 / denom) as f32,
        (sums[1] as f64 / denom) as f32,
        (sums[2] as f64 / denom) as f32,
    ))
}
