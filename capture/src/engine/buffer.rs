use slide_capture_common::frame::Frame;
use slide_capture_common::signature::LayoutSignature;

/// How a slide got into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideOrigin {
    /// Debounced after a detected transition.
    Stable,
    /// Captured shortly after session start so the deck is never empty.
    FirstSlide,
    /// User-triggered capture that bypassed the debounce.
    Manual,
}

/// One confirmed slide. Immutable once created.
#[derive(Debug, Clone)]
pub struct Slide {
    sequence_number: u32,
    image: Frame,
    layout_signature: LayoutSignature,
    captured_at_ms: i64,
    origin: SlideOrigin,
}

impl Slide {
    pub fn new(
        sequence_number: u32,
        image: Frame,
        layout_signature: LayoutSignature,
        origin: SlideOrigin,
    ) -> Self {
        let captured_at_ms = image.captured_at_ms();
        Self {
            sequence_number,
            image,
            layout_signature,
            captured_at_ms,
            origin,
        }
    }

    pub fn sequence_number(&self) -> u32 {
        self.sequence_number
    }

    pub fn image(&self) -> &Frame {
        &self.image
    }

    pub fn layout_signature(&self) -> &LayoutSignature {
        &self.layout_signature
    }

    pub fn captured_at_ms(&self) -> i64 {
        self.captured_at_ms
    }

    pub fn origin(&self) -> SlideOrigin {
        self.origin
    }
}

#[derive(Debug, thiserror::Error)]
#[error("slide sequence violated: expected #{expected}, got #{got}")]
pub struct SequenceError {
    pub expected: u32,
    pub got: u32,
}

/// Ordered, append-only store of the session's slides.
///
/// Sequence numbers run 1..=N without gaps; `append` refuses anything else.
#[derive(Debug, Default)]
pub struct SlideBuffer {
    slides: Vec<Slide>,
}

impl SlideBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence number the next appended slide must carry.
    pub fn next_sequence(&self) -> u32 {
        self.slides.len() as u32 + 1
    }

    pub fn append(&mut self, slide: Slide) -> Result<(), SequenceError> {
        let expected = self.next_sequence();
        if slide.sequence_number != expected {
            return Err(SequenceError {
                expected,
                got: slide.sequence_number,
            });
        }
        self.slides.push(slide);
        Ok(())
    }

    pub fn snapshot(&self) -> &[Slide] {
        &self.slides
    }

    pub fn last(&self) -> Option<&Slide> {
        self.slides.last()
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }

    pub fn clear(&mut self) {
        self.slides.clear();
    }
}
