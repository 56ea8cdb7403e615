use super::native::{KssCore, KssHeader};
use super::{DurationHint, EngineBackend};
use crate::error::EngineError;
use crate::format::FormatKind;
use crate::models::{TagSet, TagValue};
use std::ops::Range;
use std::path::Path;

/// Frames rendered per step while fast-forwarding to a seek target
const SEEK_CHUNK_FRAMES: usize = 4096;

/// MSX sound-driver backend.
///
/// The driver cannot seek, so seeking restarts the song when moving backwards
/// and renders silently up to the target.
pub struct KssBackend {
    core: Box<dyn KssCore>,
    sample_rate: u32,
    header: Option<KssHeader>,
    current: usize,
    position: u64,
}

impl KssBackend {
    pub fn new(core: Box<dyn KssCore>, sample_rate: u32) -> Self {
        Self {
            core,
            sample_rate,
            header: None,
            current: 0,
            position: 0,
        }
    }

    fn restart(&mut self, song: usize) {
        self.core.reset(song);
        self.current = song;
        self.position = 0;
    }
}

impl EngineBackend for KssBackend {
    fn kind(&self) -> FormatKind {
        FormatKind::Msx
    }

    fn open(&mut self, path: &Path) -> Result<DurationHint, EngineError> {
        self.close();

        let header = self
            .core
            .load(path, self.sample_rate)
            .map_err(|e| EngineError::Rejected {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let first = header.first_song;
        self.header = Some(header);
        self.restart(first);

        // Drivers carry no length information
        Ok(DurationHint::unknown())
    }

    fn close(&mut self) {
        if self.header.take().is_some() {
            self.core.unload();
            self.position = 0;
        }
    }

    fn fill(&mut self, buffer: &mut [i16]) -> usize {
        if self.header.is_none() {
            return 0;
        }
        self.core.calc(buffer);
        let frames = buffer.len() / 2;
        self.position += frames as u64;
        frames
    }

    fn seek(&mut self, sample: u64) -> Option<u64> {
        if self.header.is_none() {
            return None;
        }
        if sample < self.position {
            self.restart(self.current);
        }

        let mut scratch = vec![0i16; SEEK_CHUNK_FRAMES * 2];
        while self.position < sample && !self.core.stop_flag() {
            let frames = ((sample - self.position) as usize).min(SEEK_CHUNK_FRAMES);
            self.core.calc(&mut scratch[..frames * 2]);
            self.position += frames as u64;
        }
        Some(self.position)
    }

    fn is_ended(&self) -> bool {
        self.header.is_none() || self.core.stop_flag()
    }

    fn tags(&self) -> TagSet {
        match &self.header {
            Some(header) => TagSet {
                game: TagValue::new(header.title.trim()),
                system: TagValue::new("MSX"),
                ..TagSet::default()
            },
            None => TagSet::default(),
        }
    }

    fn device_count(&self) -> usize {
        self.header.as_ref().map(|h| h.chips.len()).unwrap_or(0)
    }

    fn device_name(&self, index: usize) -> Option<String> {
        self.header.as_ref().and_then(|h| h.chips.get(index).cloned())
    }

    fn device_volume(&self, index: usize) -> u16 {
        if index < self.device_count() {
            self.core.device_volume(index)
        } else {
            super::DEFAULT_DEVICE_VOLUME
        }
    }

    fn set_device_volume(&mut self, index: usize, volume: u16) {
        if index < self.device_count() {
            self.core.set_device_volume(index, volume);
        }
    }

    fn sub_track_count(&self) -> usize {
        self.sub_track_range().len().max(1)
    }

    fn sub_track_range(&self) -> Range<usize> {
        match &self.header {
            Some(header) if header.last_song >= header.first_song => {
                header.first_song..header.last_song + 1
            }
            _ => 0..1,
        }
    }

    fn select_sub_track(&mut self, index: usize) -> Result<DurationHint, EngineError> {
        if self.header.is_none() {
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
        self.restart(index);
        Ok(DurationHint::unknown())
    }

    fn current_sub_track(&self) -> usize {
        self.current
    }

    fn set_playback_speed(&mut self, speed: f64) {
        if self.header.is_some() && speed > 0.0 {
            self.core.set_speed(speed);
        }
    }
}

impl Drop for KssBackend {
    fn drop(&mut self) {
        self.close();
    }
}
