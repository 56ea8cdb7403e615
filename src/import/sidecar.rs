//! `.gameinfo` / `.trackinfo` metadata shipped next to MSX containers.

use std::collections::HashMap;
use std::time::Duration;

/// Curated game-level metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameInfo {
    /// Sub-tracks to expose, in play order
    pub tracks_to_play: Option<Vec<usize>>,
    pub vendor: String,
    pub year: String,
}

/// Curated per-sub-track metadata
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub track_id: usize,
    pub title: String,
    pub duration: Duration,
    pub loop_point: Option<Duration>,
    pub repeat: bool,
}

/// Parse `key:value` lines; unknown keys and malformed values are skipped
pub fn parse_gameinfo(content: &str) -> GameInfo {
    let mut info = GameInfo::default();

    for line in content.trim_start_matches('\u{feff}').lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key.trim().to_ascii_lowercase().as_str() {
            "tracks_to_play" => {
                let mut tracks = Vec::new();
                for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    match item.parse::<usize>() {
                        Ok(track) => tracks.push(track),
                        Err(_) => log::warn!("Ignoring track id '{}' in gameinfo", item),
                    }
                }
                info.tracks_to_play = Some(tracks);
            }
            "vendor" => info.vendor = value.to_string(),
            "year" => info.year = value.to_string(),
            _ => {}
        }
    }

    info
}

/// Parse `track_id,title,duration,loop_point,repeat` CSV rows keyed by track id
pub fn parse_trackinfo(content: &str) -> HashMap<usize, TrackInfo> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes());

    let mut tracks = HashMap::new();
    for (line, record) in reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                log::warn!("Skipping trackinfo row {}: {}", line + 1, e);
                continue;
            }
        };

        let Some(track_id) = record.get(0).and_then(|s| s.parse::<usize>().ok()) else {
            log::warn!("Skipping trackinfo row {} without a track id", line + 1);
            continue;
        };

        let info = TrackInfo {
            track_id,
            title: record.get(1).unwrap_or_default().to_string(),
            duration: record.get(2).and_then(parse_seconds).unwrap_or_default(),
            loop_point: record
                .get(3)
                .and_then(parse_seconds)
                .filter(|d| !d.is_zero()),
            repeat: record.get(4).map(parse_flag).unwrap_or(false),
        };
        tracks.insert(track_id, info);
    }

    tracks
}

/// Seconds as `12`, `12.5` or `m:ss`
fn parse_seconds(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let seconds = match value.split_once(':') {
        Some((minutes, seconds)) => {
            minutes.trim().parse::<u64>().ok()? as f64 * 60.0 + seconds.trim().parse::<f64>().ok()?
        }
        None => value.parse::<f64>().ok()?,
    };

    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "y" | "yes" | "true" | "1"
    )
}
