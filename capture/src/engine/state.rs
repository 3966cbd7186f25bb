use slide_capture_common::config::DetectionConfig;
use slide_capture_common::frame::{Frame, FrameError};
use slide_capture_common::signature::LayoutSignature;
use tracing::{debug, info};

use crate::detect::histogram;
use crate::detect::layout::{self, LayoutDelta};

use super::buffer::SlideOrigin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No session running.
    Idle,
    /// Comparing each sample against the anchor, content considered settled.
    Armed,
    /// A transition was seen; waiting for the new content to hold still.
    Settling,
}

#[derive(Debug, Clone)]
struct Observation {
    frame: Frame,
    signature: LayoutSignature,
}

/// Debounce bookkeeping, mutated once per tick and reset on every confirmation.
#[derive(Debug, Clone, Default)]
pub struct StabilityState {
    pub consecutive_stable_ticks: u32,
    pub last_confirmed_at_ms: Option<i64>,
    last_observed: Option<Observation>,
}

/// The fused per-tick verdict plus the raw signals behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionVerdict {
    pub transition: bool,
    pub similarity: f64,
    pub layout: LayoutDelta,
    pub classifier_vote: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityProgress {
    pub state: EngineState,
    pub stable_ticks: u32,
    pub required: u32,
}

/// A frame promoted to slide. The session assigns the sequence number.
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub origin: SlideOrigin,
    pub frame: Frame,
    pub signature: LayoutSignature,
    pub verdict: Option<TransitionVerdict>,
}

#[derive(Debug, Clone)]
pub enum Decision {
    /// Engine is idle; the frame was not looked at.
    Ignored,
    /// First observation of the session, now the comparison anchor.
    Seeded,
    Transition(TransitionVerdict),
    Stable {
        verdict: TransitionVerdict,
        stable_ticks: u32,
    },
    Confirm(Confirmation),
}

/// Fuses histogram similarity, layout delta and the optional classifier vote
/// into one verdict per tick, then debounces stable verdicts into slides.
pub struct DecisionEngine {
    config: DetectionConfig,
    state: EngineState,
    stability: StabilityState,
    /// Timestamp of the first observed frame. Frame time, not wall time.
    started_at_ms: Option<i64>,
    confirmed_any: bool,
}

impl DecisionEngine {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            state: EngineState::Idle,
            stability: StabilityState::default(),
            started_at_ms: None,
            confirmed_any: false,
        }
    }

    /// Start comparing. Any earlier stability state is discarded; the session
    /// clock starts at the next observed frame.
    pub fn arm(&mut self) {
        self.state = EngineState::Armed;
        self.stability = StabilityState::default();
        self.started_at_ms = None;
        self.confirmed_any = false;
        debug!("IDLE→ARMED: decision engine armed");
    }

    pub fn disarm(&mut self) {
        if self.state != EngineState::Idle {
            debug!(state = ?self.state, "decision engine disarmed");
        }
        self.state = EngineState::Idle;
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn stability(&self) -> &StabilityState {
        &self.stability
    }

    pub fn progress(&self) -> StabilityProgress {
        StabilityProgress {
            state: self.state,
            stable_ticks: self.stability.consecutive_stable_ticks,
            required: self.config.required_stability,
        }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// The frame the next sample will be compared against.
    pub fn anchor(&self) -> Option<&Frame> {
        self.stability.last_observed.as_ref().map(|o| &o.frame)
    }

    pub fn signature_of(&self, frame: &Frame) -> LayoutSignature {
        layout::extract(frame, self.config.sample_stride, self.config.edge_threshold)
    }

    /// Record a slide taken outside the debounce. Only the inter-slide clock
    /// moves; the stability counter and state are left alone.
    pub fn note_manual_capture(&mut self, now_ms: i64) {
        self.stability.last_confirmed_at_ms = Some(now_ms);
        self.confirmed_any = true;
    }

    /// Run one tick. `vote` is the classifier's opinion on anchor vs `frame`,
    /// `None` when it abstains.
    ///
    /// On error nothing has been mutated.
    pub fn evaluate(
        &mut self,
        frame: Frame,
        vote: Option<bool>,
    ) -> Result<Decision, FrameError> {
        if self.state == EngineState::Idle {
            return Ok(Decision::Ignored);
        }

        let now_ms = frame.captured_at_ms();
        let signature = self.signature_of(&frame);

        let Some(anchor) = self.stability.last_observed.as_ref() else {
            debug!(now_ms, "first observation, seeding comparison anchor");
            self.started_at_ms.get_or_insert(now_ms);
            self.stability.last_observed = Some(Observation {
                frame: frame.clone(),
                signature,
            });
            if self.first_slide_due(now_ms) {
                return Ok(self.confirm(frame, signature, SlideOrigin::FirstSlide, None));
            }
            return Ok(Decision::Seeded);
        };

        let similarity =
            histogram::similarity(&anchor.frame, &frame, self.config.comparison_size)?;
        let layout = LayoutDelta::between(&anchor.signature, &signature, &self.config);
        let layout_significant =
            layout.is_significant(similarity, self.config.text_corroboration_similarity);

        let transition = similarity < self.config.similarity_threshold
            || layout_significant
            || vote == Some(true);

        let verdict = TransitionVerdict {
            transition,
            similarity,
            layout,
            classifier_vote: vote,
        };

        if transition {
            match self.state {
                EngineState::Armed => info!(
                    similarity,
                    layout_fraction = layout.layout_fraction,
                    text_fraction = layout.text_fraction,
                    classifier_vote = ?vote,
                    "ARMED→SETTLING: transition detected"
                ),
                _ => debug!(
                    similarity,
                    layout_fraction = layout.layout_fraction,
                    "SETTLING: content still changing"
                ),
            }
            self.stability.consecutive_stable_ticks = 0;
            self.stability.last_observed = Some(Observation { frame, signature });
            self.state = EngineState::Settling;
            return Ok(Decision::Transition(verdict));
        }

        self.stability.consecutive_stable_ticks =
            self.stability.consecutive_stable_ticks.saturating_add(1);
        let stable_ticks = self.stability.consecutive_stable_ticks;

        if self.first_slide_due(now_ms) {
            info!(now_ms, "capturing opening slide");
            return Ok(self.confirm(frame, signature, SlideOrigin::FirstSlide, Some(verdict)));
        }

        if self.state == EngineState::Settling && stable_ticks >= self.config.required_stability {
            if self.interval_elapsed(now_ms) {
                info!(
                    stable_ticks,
                    similarity,
                    "SETTLING→ARMED: content stable, confirming slide"
                );
                return Ok(self.confirm(frame, signature, SlideOrigin::Stable, Some(verdict)));
            }
            debug!(
                stable_ticks,
                last_confirmed_at_ms = ?self.stability.last_confirmed_at_ms,
                min_interval_ms = self.config.min_slide_interval_ms,
                "SETTLING: stable but inside minimum slide interval"
            );
        } else {
            debug!(
                stable_ticks,
                required = self.config.required_stability,
                state = ?self.state,
                similarity,
                "stable tick"
            );
        }

        Ok(Decision::Stable {
            verdict,
            stable_ticks,
        })
    }

    fn first_slide_due(&self, now_ms: i64) -> bool {
        self.config.capture_first_slide
            && !self.confirmed_any
            && self
                .started_at_ms
                .is_some_and(|start| now_ms - start >= self.config.first_slide_delay_ms)
    }

    fn interval_elapsed(&self, now_ms: i64) -> bool {
        match self.stability.last_confirmed_at_ms {
            None => true,
            Some(last) => now_ms - last > self.config.min_slide_interval_ms,
        }
    }

    fn confirm(
        &mut self,
        frame: Frame,
        signature: LayoutSignature,
        origin: SlideOrigin,
        verdict: Option<TransitionVerdict>,
    ) -> Decision {
        let now_ms = frame.captured_at_ms();
        self.stability.consecutive_stable_ticks = 0;
        self.stability.last_confirmed_at_ms = Some(now_ms);
        self.stability.last_observed = Some(Observation {
            frame: frame.clone(),
            signature,
        });
        self.state = EngineState::Armed;
        self.confirmed_any = true;
        Decision::Confirm(Confirmation {
            origin,
            frame,
            signature,
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: u32 = 64;

    fn frame_at(at_ms: i64, f: impl Fn(u32, u32) -> u8) -> Frame {
        let mut pixels = Vec::with_capacity((SIZE * SIZE * 4) as usize);
        for y in 0..SIZE {
            for x in 0..SIZE {
                let v = f(x, y);
                pixels.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Frame::new(SIZE, SIZE, pixels, at_ms).unwrap()
    }

    fn dark(at_ms: i64) -> Frame {
        frame_at(at_ms, |_, _| 30)
    }

    fn bright(at_ms: i64) -> Frame {
        frame_at(at_ms, |_, _| 230)
    }

    fn horizontal_stripes(at_ms: i64) -> Frame {
        frame_at(at_ms, |_, y| if y % 8 < 5 { 0 } else { 255 })
    }

    fn vertical_stripes(at_ms: i64) -> Frame {
        frame_at(at_ms, |x, _| if x % 8 < 5 { 0 } else { 255 })
    }

    fn config(required: u32, min_interval_ms: i64) -> DetectionConfig {
        DetectionConfig {
            required_stability: required,
            min_slide_interval_ms: min_interval_ms,
            capture_first_slide: false,
            ..Default::default()
        }
    }

    fn armed(config: DetectionConfig) -> DecisionEngine {
        let mut engine = DecisionEngine::new(config);
        engine.arm();
        engine
    }

    #[test]
    fn idle_engine_ignores_frames() {
        let mut engine = DecisionEngine::new(config(2, 0));
        let decision = engine.evaluate(dark(0), None).unwrap();
        assert!(matches!(decision, Decision::Ignored));
        assert!(engine.anchor().is_none());
    }

    #[test]
    fn first_tick_only_seeds() {
        let mut engine = armed(config(1, 0));
        assert!(matches!(engine.evaluate(dark(0), None).unwrap(), Decision::Seeded));
        assert!(engine.anchor().is_some());
        assert_eq!(engine.state(), EngineState::Armed);
    }

    #[test]
    fn scripted_sequence_confirms_once_at_tick_eight() {
        let mut engine = armed(config(2, 0));
        let mut confirmed_at = Vec::new();
        for tick in 1..=9i64 {
            let frame = if tick <= 5 { dark(tick * 1000) } else { bright(tick * 1000) };
            if let Decision::Confirm(c) = engine.evaluate(frame, None).unwrap() {
                assert_eq!(c.origin, SlideOrigin::Stable);
                confirmed_at.push(tick);
            }
        }
        assert_eq!(confirmed_at, vec![8]);
        assert_eq!(engine.state(), EngineState::Armed);
        assert_eq!(engine.stability().consecutive_stable_ticks, 1);
    }

    #[test]
    fn transition_moves_anchor_to_new_content() {
        let mut engine = armed(config(3, 0));
        engine.evaluate(dark(0), None).unwrap();
        let decision = engine.evaluate(bright(1000), None).unwrap();
        let Decision::Transition(verdict) = &decision else {
            panic!("expected transition, got {decision:?}");
        };
        assert!(verdict.transition);
        assert!(verdict.similarity < 0.92);
        assert_eq!(engine.state(), EngineState::Settling);
        assert_eq!(engine.anchor().unwrap().captured_at_ms(), 1000);
        assert_eq!(engine.stability().consecutive_stable_ticks, 0);
    }

    #[test]
    fn stable_ticks_keep_the_anchor() {
        let mut engine = armed(config(5, 0));
        engine.evaluate(dark(0), None).unwrap();
        engine.evaluate(dark(1000), None).unwrap();
        engine.evaluate(dark(2000), None).unwrap();
        assert_eq!(engine.anchor().unwrap().captured_at_ms(), 0);
        assert_eq!(engine.stability().consecutive_stable_ticks, 2);
    }

    #[test]
    fn confirmations_respect_minimum_interval() {
        let mut engine = armed(config(1, 5000));
        let script = [
            dark(0),
            bright(1000),
            bright(2000),
            dark(3000),
            dark(4000),
            dark(6000),
            dark(7001),
            bright(8000),
            bright(9000),
        ];
        let mut times = Vec::new();
        for frame in script {
            if let Decision::Confirm(c) = engine.evaluate(frame, None).unwrap() {
                times.push(c.frame.captured_at_ms());
            }
        }
        assert_eq!(times, vec![2000, 7001]);
        for pair in times.windows(2) {
            assert!(pair[1] - pair[0] >= 5000);
        }
    }

    #[test]
    fn layout_change_is_a_transition_even_with_equal_histograms() {
        let mut engine = armed(config(1, 0));
        engine.evaluate(horizontal_stripes(0), None).unwrap();
        let decision = engine.evaluate(vertical_stripes(1000), None).unwrap();
        let Decision::Transition(verdict) = &decision else {
            panic!("expected transition, got {decision:?}");
        };
        assert!(verdict.similarity > 0.99);
        assert!(verdict.layout.strong);
    }

    #[test]
    fn classifier_vote_forces_transition() {
        let mut engine = armed(config(1, 0));
        engine.evaluate(dark(0), None).unwrap();
        let decision = engine.evaluate(dark(1000), Some(true)).unwrap();
        assert!(matches!(decision, Decision::Transition(_)));

        let decision = engine.evaluate(dark(2000), Some(false)).unwrap();
        assert!(matches!(decision, Decision::Confirm(_)));
    }

    #[test]
    fn abstaining_classifier_changes_nothing() {
        let mut with_none = armed(config(2, 0));
        let mut with_false = armed(config(2, 0));
        for tick in 0..6i64 {
            let frame = if tick < 2 { dark(tick * 1000) } else { bright(tick * 1000) };
            let a = with_none.evaluate(frame.clone(), None).unwrap();
            let b = with_false.evaluate(frame, Some(false)).unwrap();
            assert_eq!(
                std::mem::discriminant(&a),
                std::mem::discriminant(&b),
                "tick {tick}"
            );
        }
    }

    #[test]
    fn first_slide_captured_after_delay() {
        let mut engine = DecisionEngine::new(DetectionConfig {
            required_stability: 3,
            capture_first_slide: true,
            first_slide_delay_ms: 2000,
            ..Default::default()
        });
        engine.arm();
        assert!(matches!(engine.evaluate(dark(0), None).unwrap(), Decision::Seeded));
        assert!(matches!(engine.evaluate(dark(1000), None).unwrap(), Decision::Stable { .. }));
        let decision = engine.evaluate(dark(2000), None).unwrap();
        let Decision::Confirm(c) = &decision else {
            panic!("expected first slide, got {decision:?}");
        };
        assert_eq!(c.origin, SlideOrigin::FirstSlide);
        // Only once per session.
        assert!(matches!(engine.evaluate(dark(3000), None).unwrap(), Decision::Stable { .. }));
    }

    #[test]
    fn first_slide_delay_runs_on_frame_time() {
        let mut engine = DecisionEngine::new(DetectionConfig {
            capture_first_slide: true,
            first_slide_delay_ms: 2000,
            ..Default::default()
        });
        engine.arm();
        let base = 1_771_407_000_000;
        assert!(matches!(engine.evaluate(dark(base), None).unwrap(), Decision::Seeded));
        assert!(matches!(
            engine.evaluate(dark(base + 1000), None).unwrap(),
            Decision::Stable { .. }
        ));
        let decision = engine.evaluate(dark(base + 2000), None).unwrap();
        assert!(
            matches!(&decision, Decision::Confirm(c) if c.origin == SlideOrigin::FirstSlide),
            "expected first slide, got {decision:?}"
        );
    }

    #[test]
    fn manual_capture_leaves_counter_alone() {
        let mut engine = armed(config(5, 0));
        engine.evaluate(dark(0), None).unwrap();
        engine.evaluate(dark(1000), None).unwrap();
        engine.note_manual_capture(1500);
        assert_eq!(engine.stability().consecutive_stable_ticks, 1);
        assert_eq!(engine.stability().last_confirmed_at_ms, Some(1500));
        assert_eq!(engine.state(), EngineState::Armed);
    }

    #[test]
    fn rearming_resets_stability() {
        let mut engine = armed(config(2, 0));
        engine.evaluate(dark(0), None).unwrap();
        engine.evaluate(bright(1000), None).unwrap();
        engine.arm();
        assert_eq!(engine.state(), EngineState::Armed);
        assert!(engine.anchor().is_none());
        assert_eq!(engine.stability().last_confirmed_at_ms, None);
    }
}
