use image::ImageReader;
use std::io::Cursor;

const CHANNELS: usize = 3;

/// One captured camera image as tightly packed RGB8, row-major.
///
/// Invariant: `data.len() == width * height * 3`. The constructors enforce it;
/// the reducer re-checks it because the fields are public.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl PixelFrame {
    /// Wrap an RGB8 buffer, checking its length against the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = expected_len(width, height, CHANNELS)?;
        if data.len() != expected {
            return Err(FrameError::Invalid(format!(
                "{width}x{height} RGB frame needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build a frame from packed RGBA8 (the layout most camera APIs hand out).
    /// Alpha is dropped.
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self, FrameError> {
        let expected = expected_len(width, height, 4)?;
        if rgba.len() != expected {
            return Err(FrameError::Invalid(format!(
                "{width}x{height} RGBA frame needs {expected} bytes, got {}",
                rgba.len()
            )));
        }
        let data = rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        Self::new(width, height, data)
    }

    /// Decode an encoded image (JPEG from the camera, or any format `image`
    /// can guess) into RGB8.
    pub fn decode(encoded: &[u8]) -> Result<Self, FrameError> {
        let img = ImageReader::new(Cursor::new(encoded))
            .with_guessed_format()
            .map_err(|e| FrameError::Invalid(format!("unreadable image: {e}")))?
            .decode()
            .map_err(|e| FrameError::Invalid(format!("failed to decode image: {e}")))?;

        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(width, height, rgb.into_raw())
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Iterate the pixels as `[r, g, b]` triples.
    pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
        self.data.chunks_exact(CHANNELS).map(|px| [px[0], px[1], px[2]])
    }
}

fn expected_len(width: u32, height: u32, channels: usize) -> Result<usize, FrameError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| FrameError::Invalid(format!("{width}x{height} frame is too large")))
}

/// A decoded camera frame with capture metadata.
#[derive(Debug, Clone)]
pub struct TimestampedFrame {
    pub frame: PixelFrame,
    pub captured_at_ms: i64,
    pub seq: u64,
}

impl TimestampedFrame {
    pub fn new(frame: PixelFrame, captured_at_ms: i64, seq: u64) -> Self {
        Self {
            frame,
            captured_at_ms,
            seq,
        }
    }

    pub fn captured_at(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp_millis(self.captured_at_ms)
            .unwrap_or_else(chrono::Utc::now)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame has no pixels")]
    Empty,
    #[error("invalid frame: {0}")]
    Invalid(String),
}
