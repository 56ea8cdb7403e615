use std::time::{Duration, Instant};

/// Wall-clock playback position: elapsed time while running, plus the seek base
#[derive(Debug, Clone)]
pub struct PositionClock {
    /// Position when the clock last stopped or was seeked
    base: Duration,
    running_since: Option<Instant>,
    /// Upper bound; zero when the length is unknown
    duration: Duration,
}

impl Default for PositionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionClock {
    pub fn new() -> Self {
        Self {
            base: Duration::ZERO,
            running_since: None,
            duration: Duration::ZERO,
        }
    }

    /// Start counting from zero for a track of `duration`
    pub fn start(&mut self, duration: Duration) {
        self.base = Duration::ZERO;
        self.duration = duration;
        self.running_since = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        self.base = Duration::ZERO;
        self.running_since = None;
    }

    pub fn pause(&mut self) {
        self.base = self.position();
        self.running_since = None;
    }

    pub fn resume(&mut self) {
        if self.running_since.is_none() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }

    /// Jump to `position`, keeping the running state
    pub fn seek(&mut self, position: Duration) {
        self.base = self.clamp(position);
        if self.running_since.is_some() {
            self.running_since = Some(Instant::now());
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn position(&self) -> Duration {
        let elapsed = self
            .running_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        self.clamp(self.base.saturating_add(elapsed))
    }

    fn clamp(&self, position: Duration) -> Duration {
        if self.duration.is_zero() {
            position
        } else {
            position.min(self.duration)
        }
    }
}
