use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sentinel for "duration not resolved yet"
pub const UNKNOWN_DURATION: i64 = -1;

/// A game (album) in the library
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Game {
    pub id: i64,
    /// Canonical folder path, or the container file for multi-track containers
    pub path: String,
    pub name: String,
    pub system: String,
    pub author: String,
    pub year: String,
    pub chips: Vec<String>,
    pub art_path: Option<PathBuf>,
    pub favorite: bool,
    pub source_archive: String,
}

impl Game {
    /// Get the display name, falling back to the last path component
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        std::path::Path::new(&self.path)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string()
    }

    /// Sound chips as a single comma separated line
    pub fn chip_list(&self) -> String {
        self.chips.join(", ")
    }
}

/// A game about to be inserted; the store assigns the id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewGame {
    pub path: String,
    pub name: String,
    pub system: String,
    pub author: String,
    pub year: String,
    pub chips: Vec<String>,
    pub art_path: Option<PathBuf>,
    pub source_archive: String,
}

/// A track belonging to exactly one game
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: i64,
    pub game_id: i64,
    pub title: String,
    pub path: PathBuf,
    pub ordinal: usize,
    /// Length in samples at the configured rate, or `UNKNOWN_DURATION`
    pub duration_samples: i64,
    pub favorite: bool,
    /// Logical song inside a multi-track container; `None` plays the whole file
    pub sub_track: Option<usize>,
}

impl Track {
    /// Duration as wall-clock time, `None` while unresolved
    pub fn duration(&self, sample_rate: u32) -> Option<Duration> {
        if self.duration_samples <= 0 || sample_rate == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            self.duration_samples as f64 / sample_rate as f64,
        ))
    }

    /// Get the display name for this track (title or filename)
    pub fn display_name(&self) -> String {
        if !self.title.is_empty() {
            return self.title.clone();
        }
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string()
    }
}

/// A track about to be inserted
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrack {
    pub title: String,
    pub path: PathBuf,
    pub ordinal: usize,
    pub duration_samples: i64,
    pub sub_track: Option<usize>,
}

/// A tag value with an optional secondary-language alternate
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagValue {
    pub primary: String,
    pub secondary: String,
}

impl TagValue {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: String::new(),
        }
    }

    /// Primary text, or the alternate when only that one is present
    pub fn best(&self) -> &str {
        if self.primary.is_empty() {
            &self.secondary
        } else {
            &self.primary
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }
}

/// Structured metadata reported by an engine
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagSet {
    pub title: TagValue,
    pub game: TagValue,
    pub system: TagValue,
    pub author: TagValue,
    pub date: TagValue,
    pub creator: TagValue,
    pub notes: TagValue,
}

impl TagSet {
    /// Check if the tag set carries any information
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.game.is_empty()
            && self.system.is_empty()
            && self.author.is_empty()
            && self.date.is_empty()
            && self.creator.is_empty()
            && self.notes.is_empty()
    }

    /// Leading four-digit year of the date tag, if any
    pub fn year(&self) -> String {
        let date = self.date.best();
        let digits: String = date.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.len() >= 4 {
            digits[..4].to_string()
        } else {
            date.to_string()
        }
    }
}

/// Loop policy applied when a track finishes
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    Off,
    Track,
    Game,
}

impl LoopMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopMode::Off => "off",
            LoopMode::Track => "track",
            LoopMode::Game => "game",
        }
    }

    /// Next mode in the Off -> Track -> Game cycle
    pub fn cycle(self) -> Self {
        match self {
            LoopMode::Off => LoopMode::Track,
            LoopMode::Track => LoopMode::Game,
            LoopMode::Game => LoopMode::Off,
        }
    }
}

/// Shuffle policy used when looping is off
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleMode {
    #[default]
    Off,
    Game,
    All,
}

impl ShuffleMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShuffleMode::Off => "off",
            ShuffleMode::Game => "game",
            ShuffleMode::All => "all",
        }
    }

    pub fn cycle(self) -> Self {
        match self {
            ShuffleMode::Off => ShuffleMode::Game,
            ShuffleMode::Game => ShuffleMode::All,
            ShuffleMode::All => ShuffleMode::Off,
        }
    }
}

/// Orchestrator state machine
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlayerState {
    #[default]
    Idle,
    Opening,
    Playing,
    Paused,
    FadingOut,
}

impl PlayerState {
    /// Get a human-readable string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerState::Idle => "Idle",
            PlayerState::Opening => "Opening",
            PlayerState::Playing => "Playing",
            PlayerState::Paused => "Paused",
            PlayerState::FadingOut => "Fading out",
        }
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable playback state, published by the orchestrator
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: PlayerState,
    pub game_index: Option<usize>,
    pub track_index: Option<usize>,
    pub game_name: String,
    pub track_title: String,
    pub position: Duration,
    /// Zero when the length is unknown
    pub duration: Duration,
    pub endless_loop: bool,
    pub loop_mode: LoopMode,
    pub shuffle_mode: ShuffleMode,
    pub favorites_only: bool,
    pub tags: TagSet,
}

impl PlaybackSnapshot {
    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlayerState::Playing | PlayerState::FadingOut)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, PlayerState::Paused)
    }

    /// Get progress as a fraction (0.0 to 1.0)
    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            0.0
        } else {
            (self.position.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        }
    }

    /// Format position as MM:SS
    pub fn position_formatted(&self) -> String {
        format_mm_ss(self.position)
    }

    /// Format duration as MM:SS
    pub fn duration_formatted(&self) -> String {
        if self.duration.is_zero() {
            "--:--".to_string()
        } else {
            format_mm_ss(self.duration)
        }
    }
}

fn format_mm_ss(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> Track {
        Track {
            id: 1,
            game_id: 1,
            title: String::new(),
            path: PathBuf::from("/lib/game/01 Title Screen.vgz"),
            ordinal: 0,
            duration_samples: 44100 * 90,
            favorite: false,
            sub_track: None,
        }
    }

    #[test]
    fn test_track_display_name_falls_back_to_file_stem() {
        let mut track = sample_track();
        assert_eq!(track.display_name(), "01 Title Screen");

        track.title = "Opening".to_string();
        assert_eq!(track.display_name(), "Opening");
    }

    #[test]
    fn test_track_duration() {
        let mut track = sample_track();
        assert_eq!(track.duration(44100), Some(Duration::from_secs(90)));

        track.duration_samples = UNKNOWN_DURATION;
        assert_eq!(track.duration(44100), None);
    }

    #[test]
    fn test_tag_value_best() {
        let mut value = TagValue::default();
        value.secondary = "ドラゴンクエスト".to_string();
        assert_eq!(value.best(), "ドラゴンクエスト");

        value.primary = "Dragon Quest".to_string();
        assert_eq!(value.best(), "Dragon Quest");
    }

    #[test]
    fn test_tag_set_year() {
        let mut tags = TagSet::default();
        assert!(tags.is_empty());

        tags.date = TagValue::new("1991/03/15");
        assert_eq!(tags.year(), "1991");

        tags.date = TagValue::new("early 90s");
        assert_eq!(tags.year(), "early 90s");
    }

    #[test]
    fn test_mode_cycles() {
        assert_eq!(LoopMode::Off.cycle(), LoopMode::Track);
        assert_eq!(LoopMode::Game.cycle(), LoopMode::Off);
        assert_eq!(ShuffleMode::Off.cycle(), ShuffleMode::Game);
        assert_eq!(ShuffleMode::All.cycle(), ShuffleMode::Off);
    }

    #[test]
    fn test_snapshot_formatting() {
        let snapshot = PlaybackSnapshot {
            state: PlayerState::Playing,
            position: Duration::from_secs(65),
            duration: Duration::from_secs(185),
            ..Default::default()
        };

        assert!(snapshot.is_playing());
        assert_eq!(snapshot.position_formatted(), "01:05");
        assert_eq!(snapshot.duration_formatted(), "03:05");
        assert!((snapshot.progress() - 65.0 / 185.0).abs() < 0.001);

        let idle = PlaybackSnapshot::default();
        assert_eq!(idle.duration_formatted(), "--:--");
        assert_eq!(idle.progress(), 0.0);
    }

    #[test]
    fn test_snapshot_serialization() {
        let snapshot = PlaybackSnapshot {
            state: PlayerState::Paused,
            game_index: Some(2),
            track_index: Some(4),
            loop_mode: LoopMode::Game,
            shuffle_mode: ShuffleMode::All,
            ..Default::default()
        };

        let serialized = serde_json::to_string(&snapshot).expect("Failed to serialize snapshot");
        let deserialized: PlaybackSnapshot =
            serde_json::from_str(&serialized).expect("Failed to deserialize snapshot");
        assert_eq!(snapshot, deserialized);
    }
}
