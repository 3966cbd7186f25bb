use std::sync::Arc;

use slide_capture_common::config::DetectionConfig;
use slide_capture_common::frame::Frame;
use slide_capture_common::signature::LayoutSignature;
use tracing::{error, info, warn};

use crate::detect::classifier::TransitionClassifier;

use super::buffer::{SequenceError, Slide, SlideBuffer, SlideOrigin};
use super::observer::SessionObserver;
use super::state::{Decision, DecisionEngine, EngineState, StabilityProgress, TransitionVerdict};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session is not active")]
    Inactive,
    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// What a single tick did, for callers that want more than the observer sees.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// The frame could not be compared; nothing changed.
    Skipped,
    Seeded,
    Transition(TransitionVerdict),
    Stable { stable_ticks: u32, required: u32 },
    Captured { sequence_number: u32, origin: SlideOrigin },
}

/// One capture run: the decision engine plus the slides it produced.
pub struct Session {
    engine: DecisionEngine,
    buffer: SlideBuffer,
    classifier: Arc<TransitionClassifier>,
    observer: Arc<dyn SessionObserver>,
    active: bool,
    started_at_ms: i64,
}

impl Session {
    pub fn start(
        config: DetectionConfig,
        classifier: Arc<TransitionClassifier>,
        observer: Arc<dyn SessionObserver>,
        now_ms: i64,
    ) -> Self {
        let mut engine = DecisionEngine::new(config);
        engine.arm();
        info!(
            similarity_threshold = engine.config().similarity_threshold,
            required_stability = engine.config().required_stability,
            min_slide_interval_ms = engine.config().min_slide_interval_ms,
            "capture session started"
        );
        observer.status("Capture started");
        observer.slide_count_changed(0);
        Self {
            engine,
            buffer: SlideBuffer::new(),
            classifier,
            observer,
            active: true,
            started_at_ms: now_ms,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn started_at_ms(&self) -> i64 {
        self.started_at_ms
    }

    pub fn slide_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn slides(&self) -> &[Slide] {
        self.buffer.snapshot()
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn progress(&self) -> StabilityProgress {
        self.engine.progress()
    }

    /// Feed one sampled frame through the classifier and the decision engine.
    pub async fn tick(&mut self, frame: Frame) -> Result<TickReport, SessionError> {
        if !self.active {
            return Err(SessionError::Inactive);
        }

        let vote = match self.engine.anchor().cloned() {
            Some(anchor) => self.classifier.vote(&anchor, &frame).await,
            None => None,
        };

        let decision = match self.engine.evaluate(frame, vote) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "frame could not be compared, skipping tick");
                return Ok(TickReport::Skipped);
            }
        };

        let report = match decision {
            Decision::Ignored => TickReport::Skipped,
            Decision::Seeded => TickReport::Seeded,
            Decision::Transition(verdict) => {
                self.observer
                    .status("Slide change detected, waiting for it to settle");
                TickReport::Transition(verdict)
            }
            Decision::Stable { stable_ticks, .. } => TickReport::Stable {
                stable_ticks,
                required: self.engine.config().required_stability,
            },
            Decision::Confirm(confirmation) => {
                let origin = confirmation.origin;
                let sequence_number =
                    self.append(confirmation.frame, confirmation.signature, origin)?;
                TickReport::Captured {
                    sequence_number,
                    origin,
                }
            }
        };

        self.observer.stability(self.engine.progress());
        Ok(report)
    }

    /// Append `frame` right away, bypassing the debounce. Returns its
    /// sequence number.
    pub fn manual_capture(&mut self, frame: Frame) -> Result<u32, SessionError> {
        if !self.active {
            return Err(SessionError::Inactive);
        }
        let now_ms = frame.captured_at_ms();
        let signature = self.engine.signature_of(&frame);
        let sequence_number = self.append(frame, signature, SlideOrigin::Manual)?;
        self.engine.note_manual_capture(now_ms);
        Ok(sequence_number)
    }

    /// End the session and hand over its slides. The buffer is left empty.
    pub fn finish(&mut self) -> Vec<Slide> {
        self.active = false;
        self.engine.disarm();
        let slides = self.buffer.snapshot().to_vec();
        self.buffer.clear();
        info!(slides = slides.len(), "capture session stopped");
        self.observer.status("Capture stopped");
        slides
    }

    /// Stop the session after a fatal error. Slides stay in the buffer but the
    /// session accepts nothing more and must be restarted.
    pub(crate) fn halt(&mut self, reason: &str) {
        error!(reason, slides = self.buffer.len(), "capture session failed");
        self.active = false;
        self.engine.disarm();
        self.observer.failure(reason);
    }

    fn append(
        &mut self,
        frame: Frame,
        signature: LayoutSignature,
        origin: SlideOrigin,
    ) -> Result<u32, SessionError> {
        let sequence_number = self.buffer.next_sequence();
        let slide = Slide::new(sequence_number, frame, signature, origin);
        if let Err(e) = self.buffer.append(slide) {
            self.halt(&e.to_string());
            return Err(e.into());
        }

        info!(sequence_number, origin = ?origin, "slide captured");
        self.observer.slide_count_changed(self.buffer.len());
        self.observer
            .status(&format!("Slide {sequence_number} captured"));
        Ok(sequence_number)
    }
}
