use slide_capture_common::config::DetectionConfig;
use slide_capture_common::frame::Frame;
use slide_capture_common::signature::LayoutSignature;

const EDGES_PER_TEXT_REGION: u32 = 100;

/// Derive a [`LayoutSignature`] by sampling every `stride`-th pixel in both
/// dimensions and comparing its brightness with the pixel to its right and the
/// pixel below it.
///
/// Works on the full-resolution frame: thin text strokes disappear when
/// downsampled, which is exactly what this signal has to catch.
pub fn extract(frame: &Frame, stride: u32, edge_threshold: u8) -> LayoutSignature {
    let stride = stride.max(1) as usize;
    let (w, h) = (frame.width(), frame.height());

    let mut horizontal = 0u32;
    let mut vertical = 0u32;
    let mut brightness_sum = 0u64;
    let mut sampled = 0u32;

    for y in (0..h.saturating_sub(1)).step_by(stride) {
        for x in (0..w.saturating_sub(1)).step_by(stride) {
            let here = frame.brightness_at(x, y) as i16;
            let right = frame.brightness_at(x + 1, y) as i16;
            let below = frame.brightness_at(x, y + 1) as i16;

            if (here - right).unsigned_abs() > edge_threshold as u16 {
                vertical += 1;
            }
            if (here - below).unsigned_abs() > edge_threshold as u16 {
                horizontal += 1;
            }
            brightness_sum += here as u64;
            sampled += 1;
        }
    }

    if sampled == 0 {
        return LayoutSignature::default();
    }

    let edges = horizontal + vertical;
    LayoutSignature {
        horizontal_line_count: horizontal,
        vertical_line_count: vertical,
        estimated_text_regions: edges / EDGES_PER_TEXT_REGION,
        average_brightness: brightness_sum as f64 / sampled as f64,
        edge_density: edges as f64 / sampled as f64,
    }
}

/// How far apart two layout signatures are.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutDelta {
    /// |Δ horizontal| + |Δ vertical|
    pub structural_change: u32,
    /// |Δ estimated text regions|
    pub content_change: u32,
    pub layout_fraction: f64,
    pub text_fraction: f64,
    /// Layout moved enough to count as a transition on its own.
    pub strong: bool,
    /// Text regions moved; needs the histogram to agree before it counts.
    pub weak: bool,
}

impl LayoutDelta {
    pub fn between(
        previous: &LayoutSignature,
        current: &LayoutSignature,
        config: &DetectionConfig,
    ) -> Self {
        let structural_change = previous
            .horizontal_line_count
            .abs_diff(current.horizontal_line_count)
            + previous
                .vertical_line_count
                .abs_diff(current.vertical_line_count);
        let content_change = previous
            .estimated_text_regions
            .abs_diff(current.estimated_text_regions);

        let structural_base = previous
            .edge_count()
            .max(current.edge_count())
            .max(config.layout_noise_floor)
            .max(1);
        let text_base = previous
            .estimated_text_regions
            .max(current.estimated_text_regions)
            .max(1);

        let layout_fraction = structural_change as f64 / structural_base as f64;
        let text_fraction = content_change as f64 / text_base as f64;

        Self {
            structural_change,
            content_change,
            layout_fraction,
            text_fraction,
            strong: layout_fraction > config.layout_change_fraction,
            weak: text_fraction > config.text_change_fraction,
        }
    }

    /// Strong layout changes always count; weak text-region changes count only
    /// when the colour histogram also dipped below `corroboration_similarity`.
    pub fn is_significant(&self, similarity: f64, corroboration_similarity: f64) -> bool {
        self.strong || (self.weak && similarity < corroboration_similarity)
    }
}
