use serde::{Deserialize, Serialize};

/// Structural fingerprint of a frame: edge counts and brightness, independent of colour.
///
/// Small enough to keep on every slide and on the comparison anchor without
/// retaining extra bitmaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutSignature {
    /// Sampled pixels whose vertical neighbour differs sharply (horizontal strokes).
    pub horizontal_line_count: u32,
    /// Sampled pixels whose horizontal neighbour differs sharply (vertical strokes).
    pub vertical_line_count: u32,
    pub estimated_text_regions: u32,
    pub average_brightness: f64,
    /// Edges per sampled pixel.
    pub edge_density: f64,
}

impl LayoutSignature {
    pub fn edge_count(&self) -> u32 {
        self.horizontal_line_count + self.vertical_line_count
    }
}
