use crate::error::{ErrorSeverity, PlayerError};
use crate::library::{Catalog, CatalogGame};
use crate::models::{PlaybackSnapshot, PlayerState, TagSet};
use std::io::{self, Write};
use std::time::Duration;

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Full status box: track, tags, progress and modes
    pub fn display_full_status(snapshot: &PlaybackSnapshot) {
        println!("┌─ Player Status ─────────────────────────────────────────┐");

        if snapshot.track_index.is_none() {
            println!("│ No track loaded");
            println!("│ Status: {}", snapshot.state.as_str());
        } else {
            println!("│ Game: {}", Self::truncate(&snapshot.game_name, 50));
            println!("│ Track: {}", Self::truncate(&snapshot.track_title, 49));
            Self::display_tags(&snapshot.tags);
            Self::display_playback_info(snapshot);
        }

        Self::display_modes(snapshot);
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// One-line status
    pub fn display_compact_status(snapshot: &PlaybackSnapshot) {
        println!("{}", Self::compact_line(snapshot));
    }

    pub fn compact_line(snapshot: &PlaybackSnapshot) -> String {
        if snapshot.track_index.is_none() {
            return format!("{} | No track loaded", snapshot.state.as_str());
        }
        format!(
            "{} | {} - {} | {}/{}",
            Self::format_player_state(snapshot.state),
            Self::truncate(&snapshot.game_name, 25),
            Self::truncate(&snapshot.track_title, 30),
            snapshot.position_formatted(),
            snapshot.duration_formatted(),
        )
    }

    fn display_tags(tags: &TagSet) {
        let rows = [
            ("System", &tags.system),
            ("Author", &tags.author),
            ("Date", &tags.date),
            ("Ripper", &tags.creator),
        ];
        for (label, value) in rows {
            if !value.is_empty() {
                println!("│ {}: {}", label, Self::truncate(value.best(), 48));
            }
        }
    }

    fn display_playback_info(snapshot: &PlaybackSnapshot) {
        println!("│");
        println!("│ Status: {}", Self::format_player_state(snapshot.state));
        println!(
            "│ Position: {} / {}",
            snapshot.position_formatted(),
            snapshot.duration_formatted()
        );

        if !snapshot.duration.is_zero() {
            let progress = snapshot.progress();
            println!(
                "│ Progress: [{}] {:.1}%",
                Self::create_progress_bar(progress, 40),
                progress * 100.0
            );
            let remaining = snapshot.duration.saturating_sub(snapshot.position);
            println!("│ Remaining: {}", Self::format_duration(remaining));
        }
    }

    fn display_modes(snapshot: &PlaybackSnapshot) {
        println!("│");
        println!(
            "│ Loop: {} | Shuffle: {} | Favorites only: {} | Endless: {}",
            snapshot.loop_mode.as_str(),
            snapshot.shuffle_mode.as_str(),
            if snapshot.favorites_only { "on" } else { "off" },
            if snapshot.endless_loop { "on" } else { "off" },
        );
    }

    /// Single updating line for the watch loop
    pub fn display_position_update(snapshot: &PlaybackSnapshot) {
        print!(
            "\r{} [{}] {}/{}",
            Self::format_player_state(snapshot.state),
            Self::create_progress_bar(snapshot.progress(), 30),
            snapshot.position_formatted(),
            snapshot.duration_formatted()
        );
        let _ = io::stdout().flush();
    }

    /// Numbered game list, favorites starred
    pub fn display_games(catalog: &Catalog) {
        if catalog.is_empty() {
            println!("Library is empty. Use 'chipdeck import <archive>' to add games.");
            return;
        }
        println!("Games ({}):", catalog.len());
        for (index, entry) in catalog.games.iter().enumerate() {
            println!("{}", Self::game_line(index, entry));
        }
    }

    pub fn game_line(index: usize, entry: &CatalogGame) -> String {
        let game = &entry.game;
        let mut line = format!(
            "{} {:>3}. {} [id {}]",
            if game.favorite { "*" } else { " " },
            index + 1,
            Self::truncate(&game.display_name(), 40),
            game.id
        );
        if !game.system.is_empty() {
            line.push_str(&format!(" - {}", game.system));
        }
        if !game.year.is_empty() {
            line.push_str(&format!(" ({})", game.year));
        }
        line.push_str(&format!(", {} tracks", entry.tracks.len()));
        line
    }

    pub fn display_tracks(entry: &CatalogGame, sample_rate: u32) {
        let game = &entry.game;
        println!("{}", game.display_name());
        if !game.author.is_empty() {
            println!("  by {}", game.author);
        }
        if !game.chips.is_empty() {
            println!("  chips: {}", game.chip_list());
        }
        for track in &entry.tracks {
            let length = track
                .duration(sample_rate)
                .map(Self::format_duration)
                .unwrap_or_else(|| "--:--".to_string());
            println!(
                "{} {:>3}. {} [{}] (id {})",
                if track.favorite { "*" } else { " " },
                track.ordinal + 1,
                Self::truncate(&track.display_name(), 44),
                length,
                track.id
            );
        }
    }

    /// Mixer devices as (name, volume)
    pub fn display_devices(devices: &[(String, u16)]) {
        if devices.is_empty() {
            println!("No sound chips reported for this track");
            return;
        }
        for (index, (name, volume)) in devices.iter().enumerate() {
            println!("  {}: {} (volume {:#x})", index + 1, name, volume);
        }
    }

    /// Text bar graph of spectrum magnitudes folded into `columns`
    pub fn spectrum_bars(bins: &[f32], columns: usize, height: usize) -> Vec<String> {
        if bins.is_empty() || columns == 0 || height == 0 {
            return Vec::new();
        }
        let per_column = (bins.len() / columns).max(1);
        let levels: Vec<usize> = bins
            .chunks(per_column)
            .take(columns)
            .map(|chunk| {
                let peak = chunk.iter().cloned().fold(0.0f32, f32::max).clamp(0.0, 1.0);
                (peak * height as f32).round() as usize
            })
            .collect();

        (1..=height)
            .rev()
            .map(|row| {
                levels
                    .iter()
                    .map(|&level| if level >= row { '█' } else { ' ' })
                    .collect()
            })
            .collect()
    }

    pub fn display_spectrum(bins: &[f32]) {
        for line in Self::spectrum_bars(bins, 48, 8) {
            println!("│{}│", line);
        }
    }

    /// Boxed error with severity
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!(
            "┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon,
            severity.as_str()
        );
        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }
        Self::display_error_context(error);
        eprintln!("└─────────────────────────────────────────────────────────┘");

        if !error.is_recoverable() {
            eprintln!();
            eprintln!("⚠  This error requires manual intervention to resolve.");
        }
    }

    fn display_error_context(error: &PlayerError) {
        use crate::error::{ImportError, PlaybackError};

        let hint = match error {
            PlayerError::Playback(PlaybackError::EmptyLibrary) => {
                Some("Import an archive first: 'chipdeck import <archive>'")
            }
            PlayerError::Playback(PlaybackError::InvalidGame { .. }) => {
                Some("Use 'chipdeck games' to see game numbers")
            }
            PlayerError::Import(ImportError::UnknownArchive { .. }) => {
                Some("Supported archives: ZIP and RAR")
            }
            PlayerError::Config(_) => Some("Configuration will use default values"),
            _ => None,
        };
        if let Some(hint) = hint {
            eprintln!("│");
            eprintln!("│ {}", hint);
        }
    }

    /// Wrap text to fit within specified width
    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.chars().count() + word.chars().count() < width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current_line));
                current_line = word.to_string();
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
        lines
    }

    /// Single-line error for non-interactive use
    pub fn display_simple_error(error: &PlayerError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());
    }

    /// Format duration as MM:SS or HH:MM:SS for longer tracks
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }

    /// Truncate to `max_len` characters with an ellipsis
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    pub fn format_player_state(state: PlayerState) -> String {
        match state {
            PlayerState::Playing => "▶ Playing".to_string(),
            PlayerState::FadingOut => "▶ Fading".to_string(),
            PlayerState::Paused => "⏸ Paused".to_string(),
            PlayerState::Opening => "… Opening".to_string(),
            PlayerState::Idle => "⏹ Idle".to_string(),
        }
    }
}
