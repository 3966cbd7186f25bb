use std::sync::Mutex;

use tracing::{debug, error, info};

pub use super::state::StabilityProgress;

/// Receives user-facing notifications from a running session.
///
/// Calls happen on the ticking task; implementations must not block.
pub trait SessionObserver: Send + Sync {
    fn slide_count_changed(&self, count: usize);
    fn status(&self, message: &str);
    fn stability(&self, progress: StabilityProgress);
    fn failure(&self, message: &str);
}

/// Forwards every notification to `tracing`.
#[derive(Debug, Default)]
pub struct LogObserver;

impl SessionObserver for LogObserver {
    fn slide_count_changed(&self, count: usize) {
        info!(slides = count, "slide count changed");
    }

    fn status(&self, message: &str) {
        info!("{message}");
    }

    fn stability(&self, progress: StabilityProgress) {
        debug!(
            state = ?progress.state,
            stable_ticks = progress.stable_ticks,
            required = progress.required,
            "stability progress"
        );
    }

    fn failure(&self, message: &str) {
        error!("{message}");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    SlideCount(usize),
    Status(String),
    Stability(StabilityProgress),
    Failure(String),
}

/// Keeps every notification in order. Handy for tests and for a status dump.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Notification>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    fn push(&self, notification: Notification) {
        if let Ok(mut events) = self.events.lock() {
            events.push(notification);
        }
    }
}

impl SessionObserver for RecordingObserver {
    fn slide_count_changed(&self, count: usize) {
        self.push(Notification::SlideCount(count));
    }

    fn status(&self, message: &str) {
        self.push(Notification::Status(message.to_string()));
    }

    fn stability(&self, progress: StabilityProgress) {
        self.push(Notification::Stability(progress));
    }

    fn failure(&self, message: &str) {
        self.push(Notification::Failure(message.to_string()));
    }
}
