use slide_capture_common::frame::{luma, Frame, FrameError};

const NUM_BINS: usize = 64;

/// Per-channel normalized distributions (red, green, blue, brightness).
///
/// Each channel is quantized into 64 bins and divided by the pixel count, so
/// every channel sums to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    channels: [[f64; NUM_BINS]; 4],
}

impl Histogram {
    pub fn from_frame(frame: &Frame) -> Self {
        let mut bins = [[0u64; NUM_BINS]; 4];
        for rgba in frame.pixels().chunks_exact(4) {
            let (r, g, b) = (rgba[0], rgba[1], rgba[2]);
            bins[0][bin(r)] += 1;
            bins[1][bin(g)] += 1;
            bins[2][bin(b)] += 1;
            bins[3][bin(luma(r, g, b))] += 1;
        }

        let total_pixels = frame.pixel_count() as f64;
        let mut channels = [[0.0f64; NUM_BINS]; 4];
        for (normalized, counts) in channels.iter_mut().zip(bins.iter()) {
            for (slot, &count) in normalized.iter_mut().zip(counts.iter()) {
                *slot = count as f64 / total_pixels;
            }
        }
        Self { channels }
    }

    /// Histogram intersection averaged over the four channels. 1.0 means identical
    /// distributions, 0.0 means no overlap at all.
    pub fn intersection(&self, other: &Histogram) -> f64 {
        let total: f64 = self
            .channels
            .iter()
            .zip(other.channels.iter())
            .map(|(a, b)| {
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| x.min(*y))
                    .sum::<f64>()
            })
            .sum();
        (total / self.channels.len() as f64).clamp(0.0, 1.0)
    }
}

fn bin(value: u8) -> usize {
    (value as usize * NUM_BINS) / 256
}

/// Similarity of two frames in `[0, 1]`, computed on a `size` x `size` downsample
/// of each so the cost does not depend on the source resolution.
pub fn similarity(a: &Frame, b: &Frame, size: u32) -> Result<f64, FrameError> {
    let a = Histogram::from_frame(&a.resized(size, size)?);
    let b = Histogram::from_frame(&b.resized(size, size)?);
    Ok(a.intersection(&b))
}
