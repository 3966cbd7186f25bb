use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use slide_capture_common::config::{Config, DetectionConfig};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::detect::classifier::TransitionClassifier;
use crate::engine::observer::{SessionObserver, StabilityProgress};
use crate::engine::session::{Session, SessionError, TickReport};
use crate::export::{ExportError, ExportOutcome, HtmlExporter};
use crate::source::{self, FrameSource};

/// What one timer tick ended up doing.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A previous tick or a manual capture still holds the session.
    Busy,
    /// No session, or it was already stopped.
    Inactive,
    /// The source had nothing to give.
    NoFrame,
    Ticked(TickReport),
    /// The session hit a fatal error and was stopped.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub active: bool,
    pub slides: usize,
    pub progress: StabilityProgress,
}

/// Owns the capture session's lifecycle: the timer task that samples frames,
/// the manual-capture path, and export on stop.
pub struct CaptureController {
    detection: DetectionConfig,
    interval: Duration,
    session: Arc<Mutex<Option<Session>>>,
    source: Arc<Mutex<FrameSource>>,
    classifier: Arc<TransitionClassifier>,
    observer: Arc<dyn SessionObserver>,
    exporter: HtmlExporter,
    timer: Option<JoinHandle<()>>,
}

impl CaptureController {
    pub fn new(
        config: &Config,
        source: FrameSource,
        classifier: Arc<TransitionClassifier>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            detection: config.detection.clone(),
            interval: Duration::from_millis(config.sampler.interval_ms),
            session: Arc::new(Mutex::new(None)),
            source: Arc::new(Mutex::new(source)),
            classifier,
            observer,
            exporter: HtmlExporter::new(config.export.clone()),
            timer: None,
        }
    }

    /// Start a fresh session. A running one is stopped first and its slides
    /// are discarded without export.
    pub async fn start_session(&mut self) {
        self.stop_timer();

        let mut guard = self.session.lock().await;
        if let Some(previous) = guard.as_mut().filter(|s| s.is_active()) {
            let discarded = previous.finish();
            if !discarded.is_empty() {
                warn!(
                    discarded = discarded.len(),
                    "restarting capture, discarding unexported slides"
                );
            }
        }
        *guard = Some(Session::start(
            self.detection.clone(),
            Arc::clone(&self.classifier),
            Arc::clone(&self.observer),
            source::now_ms(),
        ));
        drop(guard);

        self.timer = Some(tokio::spawn(run_timer(
            Arc::clone(&self.session),
            Arc::clone(&self.source),
            self.interval,
        )));
        info!(interval_ms = self.interval.as_millis() as u64, "sampling timer started");
    }

    /// Stop sampling, finalize the session and export its slides.
    pub async fn stop_session(&mut self) -> Result<ExportOutcome, ExportError> {
        self.stop_timer();

        let slides = match self.session.lock().await.take() {
            Some(mut session) if session.is_active() => session.finish(),
            Some(failed) => {
                let discarded = failed.slide_count();
                warn!(discarded, "session had already failed, discarding its slides");
                self.observer.status(&format!(
                    "Discarded {discarded} slides from a failed session"
                ));
                return Ok(ExportOutcome::Skipped);
            }
            None => {
                debug!("stop requested without an active session");
                return Ok(ExportOutcome::Skipped);
            }
        };

        let outcome = self.exporter.export(&slides, Utc::now()).await;
        match &outcome {
            Ok(ExportOutcome::Written { path, slides }) => self
                .observer
                .status(&format!("Saved {slides} slides as {}", path.display())),
            Ok(ExportOutcome::Skipped) => self.observer.status("No slides to save"),
            Err(e) => self.observer.failure(&format!("Export failed: {e}")),
        }
        outcome
    }

    /// Grab a frame now and append it as a slide, bypassing the debounce.
    ///
    /// Waits for an in-flight tick to finish. `Ok(None)` when the source had
    /// no frame to give.
    pub async fn manual_capture(&self) -> Result<Option<u32>, SessionError> {
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .filter(|s| s.is_active())
            .ok_or(SessionError::Inactive)?;

        let frame = match self.source.lock().await.grab().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.observer.status("No frame available for manual capture");
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "manual capture could not sample a frame");
                self.observer.status("Manual capture failed to read a frame");
                return Ok(None);
            }
        };

        let sequence_number = session.manual_capture(frame)?;
        info!(sequence_number, "manual capture");
        Ok(Some(sequence_number))
    }

    /// Run one tick right away, outside the timer.
    pub async fn tick_now(&self) -> TickOutcome {
        run_tick(&self.session, &self.source).await
    }

    pub async fn status(&self) -> Option<SessionStatus> {
        let guard = self.session.lock().await;
        guard.as_ref().map(|s| SessionStatus {
            active: s.is_active(),
            slides: s.slide_count(),
            progress: s.progress(),
        })
    }

    pub async fn is_active(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.is_active())
            .unwrap_or(false)
    }

    pub async fn source_exhausted(&self) -> bool {
        self.source.lock().await.is_exhausted()
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            debug!("sampling timer stopped");
        }
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

async fn run_timer(
    session: Arc<Mutex<Option<Session>>>,
    source: Arc<Mutex<FrameSource>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; sample one interval after start.
    ticker.tick().await;

    let mut total: u64 = 0;
    loop {
        ticker.tick().await;
        if let TickOutcome::Ticked(_) = run_tick(&session, &source).await {
            total += 1;
            if total % 100 == 0 {
                debug!(total, "frames processed");
            }
        }
    }
}

/// One sampling tick. Never waits for the session: if a decision is already
/// in progress the tick is skipped rather than queued.
async fn run_tick(session: &Mutex<Option<Session>>, source: &Mutex<FrameSource>) -> TickOutcome {
    let Ok(mut guard) = session.try_lock() else {
        debug!("previous decision still in progress, skipping tick");
        return TickOutcome::Busy;
    };
    let Some(session) = guard.as_mut().filter(|s| s.is_active()) else {
        return TickOutcome::Inactive;
    };

    let frame = match source.lock().await.grab().await {
        Ok(Some(frame)) => frame,
        Ok(None) => {
            debug!("no frame available, skipping tick");
            return TickOutcome::NoFrame;
        }
        Err(e) => {
            warn!(error = %e, "failed to sample frame, skipping tick");
            return TickOutcome::NoFrame;
        }
    };

    match session.tick(frame).await {
        Ok(report) => TickOutcome::Ticked(report),
        Err(SessionError::Inactive) => TickOutcome::Inactive,
        Err(e) => {
            error!(error = %e, "capture session failed");
            TickOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::buffer::SlideOrigin;
    use crate::engine::observer::{Notification, RecordingObserver};
    use crate::source::MemorySource;
    use slide_capture_common::frame::Frame;
    use std::path::PathBuf;

    fn solid(v: u8, at_ms: i64) -> Frame {
        let pixels = (0..32 * 32).flat_map(|_| [v, v, v, 255]).collect();
        Frame::new(32, 32, pixels, at_ms).unwrap()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "slide-capture-controller-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn config(dir: &std::path::Path, interval_ms: u64) -> Config {
        let mut config = Config::default();
        config.sampler.interval_ms = interval_ms;
        config.detection.required_stability = 2;
        config.detection.min_slide_interval_ms = 0;
        config.detection.capture_first_slide = false;
        config.export.output_dir = dir.to_path_buf();
        config
    }

    fn controller(
        dir: &std::path::Path,
        interval_ms: u64,
    ) -> (CaptureController, MemorySource, Arc<RecordingObserver>) {
        let frames = MemorySource::new();
        let observer = Arc::new(RecordingObserver::new());
        let controller = CaptureController::new(
            &config(dir, interval_ms),
            FrameSource::Memory(frames.clone()),
            Arc::new(TransitionClassifier::disabled()),
            observer.clone(),
        );
        (controller, frames, observer)
    }

    const HOUR_MS: u64 = 3_600_000;

    #[tokio::test]
    async fn stop_right_after_start_skips_export() {
        let dir = scratch_dir("empty");
        let (mut controller, _, observer) = controller(&dir, HOUR_MS);

        controller.start_session().await;
        let outcome = controller.stop_session().await.unwrap();

        assert_eq!(outcome, ExportOutcome::Skipped);
        assert!(!dir.exists());
        assert!(observer
            .events()
            .contains(&Notification::Status("No slides to save".to_string())));
    }

    #[tokio::test]
    async fn manual_capture_is_exported() {
        let dir = scratch_dir("manual");
        let (mut controller, frames, _) = controller(&dir, HOUR_MS);
        controller.start_session().await;

        assert_eq!(controller.manual_capture().await.unwrap(), None);
        frames.push(solid(40, 1_000));
        assert_eq!(controller.manual_capture().await.unwrap(), Some(1));

        let outcome = controller.stop_session().await.unwrap();
        let ExportOutcome::Written { path, slides } = &outcome else {
            panic!("expected a written document, got {outcome:?}");
        };
        assert_eq!(*slides, 1);
        assert!(path.starts_with(&dir));
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn scripted_ticks_confirm_one_slide() {
        let dir = scratch_dir("scripted");
        let (mut controller, frames, _) = controller(&dir, HOUR_MS);
        controller.start_session().await;

        for tick in 1..=9i64 {
            let v = if tick <= 5 { 20 } else { 220 };
            frames.push(solid(v, tick * 1000));
        }
        let mut captured = Vec::new();
        for tick in 1..=9 {
            if let TickOutcome::Ticked(TickReport::Captured { sequence_number, origin }) =
                controller.tick_now().await
            {
                assert_eq!(origin, SlideOrigin::Stable);
                captured.push((tick, sequence_number));
            }
        }
        assert_eq!(captured, vec![(8, 1)]);
        assert_eq!(controller.tick_now().await, TickOutcome::NoFrame);

        let status = controller.status().await.unwrap();
        assert!(status.active);
        assert_eq!(status.slides, 1);

        controller.stop_session().await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn stopped_session_rejects_ticks_and_captures() {
        let dir = scratch_dir("stopped");
        let (mut controller, frames, _) = controller(&dir, HOUR_MS);
        controller.start_session().await;
        controller.stop_session().await.unwrap();

        frames.push(solid(40, 1_000));
        assert_eq!(controller.tick_now().await, TickOutcome::Inactive);
        assert!(matches!(
            controller.manual_capture().await,
            Err(SessionError::Inactive)
        ));
        assert!(!controller.is_active().await);
        assert_eq!(frames.pending(), 1);
    }

    #[tokio::test]
    async fn tick_is_skipped_while_session_is_busy() {
        let dir = scratch_dir("busy");
        let (mut controller, frames, _) = controller(&dir, HOUR_MS);
        controller.start_session().await;
        frames.push(solid(40, 1_000));

        let held = Arc::clone(&controller.session);
        let guard = held.lock().await;
        assert_eq!(controller.tick_now().await, TickOutcome::Busy);
        drop(guard);

        assert_eq!(frames.pending(), 1);
        assert!(matches!(
            controller.tick_now().await,
            TickOutcome::Ticked(TickReport::Seeded)
        ));
    }

    #[tokio::test]
    async fn default_config_captures_one_opening_slide() {
        let dir = scratch_dir("first-slide");
        let mut config = Config::default();
        config.sampler.interval_ms = HOUR_MS;
        config.export.output_dir = dir.clone();
        let frames = MemorySource::new();
        let mut controller = CaptureController::new(
            &config,
            FrameSource::Memory(frames.clone()),
            Arc::new(TransitionClassifier::disabled()),
            Arc::new(RecordingObserver::new()),
        );
        controller.start_session().await;

        // Video-relative timestamps, unrelated to the wall clock.
        for i in 0..20 {
            frames.push(solid(40, i * 1000));
        }
        let mut opening = Vec::new();
        for i in 0..20 {
            if let TickOutcome::Ticked(TickReport::Captured { origin, .. }) =
                controller.tick_now().await
            {
                assert_eq!(origin, SlideOrigin::FirstSlide);
                opening.push(i);
            }
        }
        assert_eq!(opening, vec![2]);
        assert_eq!(controller.status().await.unwrap().slides, 1);

        controller.stop_session().await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn stopping_a_failed_session_reports_discarded_slides() {
        let dir = scratch_dir("failed");
        let (mut controller, frames, observer) = controller(&dir, HOUR_MS);
        controller.start_session().await;
        frames.push(solid(40, 1_000));
        controller.manual_capture().await.unwrap();

        if let Some(session) = controller.session.lock().await.as_mut() {
            session.halt("slide sequence violated");
        }
        assert!(!controller.is_active().await);

        assert_eq!(controller.stop_session().await.unwrap(), ExportOutcome::Skipped);
        assert!(!dir.exists());
        let events = observer.events();
        assert!(events.contains(&Notification::Failure(
            "slide sequence violated".to_string()
        )));
        assert!(events.contains(&Notification::Status(
            "Discarded 1 slides from a failed session".to_string()
        )));
    }

    #[tokio::test]
    async fn restart_discards_unexported_slides() {
        let dir = scratch_dir("restart");
        let (mut controller, frames, _) = controller(&dir, HOUR_MS);
        controller.start_session().await;
        frames.push(solid(40, 1_000));
        controller.manual_capture().await.unwrap();

        controller.start_session().await;
        let status = controller.status().await.unwrap();
        assert!(status.active);
        assert_eq!(status.slides, 0);

        assert_eq!(controller.stop_session().await.unwrap(), ExportOutcome::Skipped);
    }

    #[tokio::test]
    async fn timer_samples_queued_frames() {
        let dir = scratch_dir("timer");
        let (mut controller, frames, _) = controller(&dir, 5);
        for i in 0..3 {
            frames.push(solid(40, i * 1000));
        }
        controller.start_session().await;

        for _ in 0..200 {
            if frames.pending() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(frames.pending(), 0);

        controller.stop_session().await.unwrap();
        let status = controller.status().await;
        assert!(status.is_none());
    }
}
