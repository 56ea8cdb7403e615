use super::native::TrackerCore;
use super::{DurationHint, EngineBackend};
use crate::error::EngineError;
use crate::format::FormatKind;
use crate::models::{TagSet, TagValue};
use std::ops::Range;
use std::path::Path;

/// Module-player backend.
///
/// Modules loop forever inside the core, so this backend never reports an end;
/// playback length comes from the duration policy and the fade.
pub struct TrackerBackend {
    core: Box<dyn TrackerCore>,
    sample_rate: u32,
    loaded: bool,
}

impl TrackerBackend {
    pub fn new(core: Box<dyn TrackerCore>, sample_rate: u32) -> Self {
        Self {
            core,
            sample_rate,
            loaded: false,
        }
    }

    fn current_hint(&self) -> DurationHint {
        let seconds = self.core.duration_seconds();
        if seconds.is_finite() && seconds > 0.0 {
            DurationHint::with_length((seconds * self.sample_rate as f64) as u64)
        } else {
            DurationHint::unknown()
        }
    }
}

impl EngineBackend for TrackerBackend {
    fn kind(&self) -> FormatKind {
        FormatKind::Tracker
    }

    fn open(&mut self, path: &Path) -> Result<DurationHint, EngineError> {
        self.close();

        self.core.load(path).map_err(|e| EngineError::Rejected {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.loaded = true;
        self.core.set_repeat_count(-1);

        Ok(self.current_hint())
    }

    fn close(&mut self) {
        if self.loaded {
            self.core.unload();
            self.loaded = false;
        }
    }

    fn fill(&mut self, buffer: &mut [i16]) -> usize {
        if !self.loaded {
            return 0;
        }
        let frames = buffer.len() / 2;
        self.core
            .read_interleaved_stereo(self.sample_rate, buffer)
            .min(frames)
    }

    fn seek(&mut self, sample: u64) -> Option<u64> {
        if !self.loaded || self.sample_rate == 0 {
            return None;
        }
        let rate = self.sample_rate as f64;
        let mut seconds = sample as f64 / rate;
        let length = self.core.duration_seconds();
        if length > 0.0 {
            seconds = seconds.min(length);
        }
        self.core.set_position_seconds(seconds);
        Some((seconds * rate).round() as u64)
    }

    fn is_ended(&self) -> bool {
        false
    }

    fn tags(&self) -> TagSet {
        if !self.loaded {
            return TagSet::default();
        }
        TagSet {
            title: TagValue::new(self.core.metadata("title")),
            author: TagValue::new(self.core.metadata("artist")),
            date: TagValue::new(self.core.metadata("date")),
            creator: TagValue::new(self.core.metadata("tracker")),
            notes: TagValue::new(self.core.metadata("message")),
            ..TagSet::default()
        }
    }

    fn sub_track_count(&self) -> usize {
        if self.loaded {
            self.core.subsong_count().max(1)
        } else {
            1
        }
    }

    fn sub_track_range(&self) -> Range<usize> {
        0..self.sub_track_count()
    }

    fn select_sub_track(&mut self, index: usize) -> Result<DurationHint, EngineError> {
        if !self.loaded {
            return Err(EngineError::NotOpen);
        }
        let range = self.sub_track_range();
        if !range.contains(&index) {
            return Err(EngineError::SubTrackOutOfRange {
                index,
                first: range.start,
                end: range.end,
            });
        }
        self.core
            .select_subsong(index)
            .map_err(|e| EngineError::Rejected {
                path: format!("subsong {}", index),
                reason: e.to_string(),
            })?;
        Ok(self.current_hint())
    }

    fn current_sub_track(&self) -> usize {
        if self.loaded {
            self.core.current_subsong()
        } else {
            0
        }
    }

    fn set_playback_speed(&mut self, speed: f64) {
        if self.loaded && speed > 0.0 {
            self.core.set_tempo_factor(speed);
        }
    }
}

impl Drop for TrackerBackend {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{FakeEngines, FakeSong};
    use crate::engine::NativeEngines;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_tracker_never_ends() {
        let engines = FakeEngines::new().with_song(
            "tune.xm",
            FakeSong {
                frames: 100,
                length_secs: Some(75),
                sub_tracks: 0..3,
                ..FakeSong::default()
            },
        );
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tune.xm");
        fs::write(&path, b"Extended Module: ").unwrap();

        let mut backend = TrackerBackend::new(engines.tracker().unwrap(), 44100);
        let hint = backend.open(&path).unwrap();
        assert_eq!(hint.length, Some(75 * 44100));

        let mut buffer = vec![0i16; 512];
        backend.fill(&mut buffer);
        backend.fill(&mut buffer);
        assert!(!backend.is_ended());

        assert_eq!(backend.sub_track_range(), 0..3);
        backend.select_sub_track(2).unwrap();
        assert_eq!(backend.current_sub_track(), 2);
        assert_eq!(backend.device_count(), 0);
    }

    #[test]
    fn test_tracker_reject_maps_to_engine_error() {
        let engines = FakeEngines::new().with_song(
            "broken.mod",
            FakeSong {
                reject: true,
                ..FakeSong::default()
            },
        );
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.mod");
        fs::write(&path, b"junk").unwrap();

        let mut backend = TrackerBackend::new(engines.tracker().unwrap(), 44100);
        assert!(matches!(
            backend.open(&path),
            Err(EngineError::Rejected { .. })
        ));
        assert_eq!(engines.live(), 0);
    }
}
