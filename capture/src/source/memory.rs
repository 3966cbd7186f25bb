use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use slide_capture_common::frame::Frame;

/// A queue of frames pushed by whoever embeds the pipeline.
///
/// Clones share the same queue, so the producer keeps one handle and hands
/// another to the controller.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    frames: Arc<Mutex<VecDeque<Frame>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, frame: Frame) {
        if let Ok(mut frames) = self.frames.lock() {
            frames.push_back(frame);
        }
    }

    pub fn pending(&self) -> usize {
        self.frames.lock().map(|frames| frames.len()).unwrap_or(0)
    }

    pub(super) fn pop(&self) -> Option<Frame> {
        self.frames.lock().ok()?.pop_front()
    }
}
