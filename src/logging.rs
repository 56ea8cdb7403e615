use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_HISTORY: usize = 500;

/// Playback event kept in the logger's history
#[derive(Debug, Clone)]
pub struct PlaybackEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: PlaybackEventType,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEventType {
    TrackChanged,
    Paused,
    Resumed,
    Stopped,
    Seek,
    FadeStarted,
    Advance,
    OpenFailed,
    FocusLost,
}

impl PlaybackEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackEventType::TrackChanged => "TRACK_CHANGED",
            PlaybackEventType::Paused => "PAUSED",
            PlaybackEventType::Resumed => "RESUMED",
            PlaybackEventType::Stopped => "STOPPED",
            PlaybackEventType::Seek => "SEEK",
            PlaybackEventType::FadeStarted => "FADE_STARTED",
            PlaybackEventType::Advance => "ADVANCE",
            PlaybackEventType::OpenFailed => "OPEN_FAILED",
            PlaybackEventType::FocusLost => "FOCUS_LOST",
        }
    }
}

/// Bounded history of playback events, mirrored to the `log` facade
#[derive(Debug, Clone)]
pub struct PlaybackLogger {
    events: Arc<Mutex<VecDeque<PlaybackEvent>>>,
    max_events: usize,
}

impl Default for PlaybackLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackLogger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: max_events.max(1),
        }
    }

    /// Install the env_logger backend; level from `CHIPDECK_LOG_LEVEL`, default warn
    pub fn init() -> Result<(), log::SetLoggerError> {
        let log_level = std::env::var("CHIPDECK_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());

        let mut builder = env_logger::Builder::new();
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        let filter = match log_level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "error" => log::LevelFilter::Error,
            "off" => log::LevelFilter::Off,
            _ => log::LevelFilter::Warn,
        };
        builder.filter_level(filter);

        builder.try_init()?;
        info!("Logging initialized with level: {}", filter);
        Ok(())
    }

    pub fn log_event(&self, event_type: PlaybackEventType, details: String) {
        match event_type {
            PlaybackEventType::TrackChanged | PlaybackEventType::Stopped => {
                info!("[{}] {}", event_type.as_str(), details)
            }
            PlaybackEventType::OpenFailed | PlaybackEventType::FocusLost => {
                warn!("[{}] {}", event_type.as_str(), details)
            }
            _ => debug!("[{}] {}", event_type.as_str(), details),
        }

        let mut events = self.events.lock();
        events.push_back(PlaybackEvent {
            timestamp: Utc::now(),
            event_type,
            details,
        });
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn log_track_changed(&self, game: &str, track: &str) {
        self.log_event(
            PlaybackEventType::TrackChanged,
            format!("Now playing '{}' from '{}'", track, game),
        );
    }

    pub fn log_paused(&self, position: Duration) {
        self.log_event(
            PlaybackEventType::Paused,
            format!("Paused at {:.2}s", position.as_secs_f64()),
        );
    }

    pub fn log_resumed(&self, position: Duration) {
        self.log_event(
            PlaybackEventType::Resumed,
            format!("Resumed at {:.2}s", position.as_secs_f64()),
        );
    }

    pub fn log_stopped(&self, reason: &str) {
        self.log_event(PlaybackEventType::Stopped, format!("Stopped: {}", reason));
    }

    pub fn log_seek(&self, from: Duration, to: Duration) {
        self.log_event(
            PlaybackEventType::Seek,
            format!("Seek from {:.2}s to {:.2}s", from.as_secs_f64(), to.as_secs_f64()),
        );
    }

    pub fn log_fade_started(&self, window: Duration, manual: bool) {
        let kind = if manual { "skip" } else { "end-of-track" };
        self.log_event(
            PlaybackEventType::FadeStarted,
            format!("{} fade over {} ms", kind, window.as_millis()),
        );
    }

    pub fn log_advance(&self, game: usize, track: usize) {
        self.log_event(
            PlaybackEventType::Advance,
            format!("Advancing to game {} track {}", game, track),
        );
    }

    pub fn log_open_failed(&self, path: &str, error: &str) {
        self.log_event(
            PlaybackEventType::OpenFailed,
            format!("Could not open '{}': {}", path, error),
        );
    }

    pub fn log_focus_lost(&self, permanent: bool) {
        let details = if permanent {
            "Audio focus lost permanently, releasing session"
        } else {
            "Audio focus lost, pausing"
        };
        self.log_event(PlaybackEventType::FocusLost, details.to_string());
    }

    /// Most recent `count` events, oldest first
    pub fn recent_events(&self, count: usize) -> Vec<PlaybackEvent> {
        let events = self.events.lock();
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn count(&self, event_type: PlaybackEventType) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }
}
