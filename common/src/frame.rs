use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageBuffer, ImageEncoder, Rgba, RgbaImage};
use std::sync::Arc;

const BYTES_PER_PIXEL: usize = 4;

/// An immutable RGBA bitmap sampled from the video source.
///
/// Pixel storage is shared, so cloning a frame (to keep it as the comparison
/// anchor, or to retain it on a slide) never copies the bitmap.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
    captured_at_ms: i64,
}

impl Frame {
    /// Wrap a raw RGBA buffer. The buffer must hold exactly `width * height * 4` bytes.
    pub fn new(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        captured_at_ms: i64,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        let expected = width as usize * height as usize * BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(FrameError::BufferSize {
                expected,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
            captured_at_ms,
        })
    }

    /// Decode an encoded image (PNG, JPEG, BMP, ...) into an RGBA frame.
    pub fn decode(encoded: &[u8], captured_at_ms: i64) -> Result<Self, FrameError> {
        let img = image::load_from_memory(encoded).map_err(FrameError::Decode)?;
        Self::from_image(img.to_rgba8(), captured_at_ms)
    }

    pub fn from_image(img: RgbaImage, captured_at_ms: i64) -> Result<Self, FrameError> {
        let (width, height) = img.dimensions();
        Self::new(width, height, img.into_raw(), captured_at_ms)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// RGBA components of the pixel at (x, y).
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    /// BT.601 luma of the pixel at (x, y).
    pub fn brightness_at(&self, x: u32, y: u32) -> u8 {
        let [r, g, b, _] = self.rgba_at(x, y);
        luma(r, g, b)
    }

    /// Resample to `width` x `height`. The copy keeps this frame's timestamp.
    pub fn resized(&self, width: u32, height: u32) -> Result<Frame, FrameError> {
        if width == self.width && height == self.height {
            return Ok(self.clone());
        }
        let view = self.view()?;
        let resized = image::imageops::resize(&view, width, height, FilterType::Triangle);
        Frame::from_image(resized, self.captured_at_ms)
    }

    /// Encode as PNG, for embedding in exported documents.
    pub fn encode_png(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::new();
        PngEncoder::new(&mut buf)
            .write_image(
                &self.pixels,
                self.width,
                self.height,
                ExtendedColorType::Rgba8,
            )
            .map_err(FrameError::Encode)?;
        Ok(buf)
    }

    fn view(&self) -> Result<ImageBuffer<Rgba<u8>, &[u8]>, FrameError> {
        ImageBuffer::from_raw(self.width, self.height, &self.pixels[..]).ok_or(
            FrameError::BufferSize {
                expected: self.pixel_count() * BYTES_PER_PIXEL,
                got: self.pixels.len(),
            },
        )
    }
}

/// BT.601 luma in integer arithmetic.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    #[error("frame buffer has {got} bytes, expected {expected}")]
    BufferSize { expected: usize, got: usize },
    #[error("failed to decode frame: {0}")]
    Decode(image::ImageError),
    #[error("failed to encode frame: {0}")]
    Encode(image::ImageError),
}
