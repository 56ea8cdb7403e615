use super::native::{ChipCore, ChipTrackInfo};
use super::{DurationHint, EngineBackend, DEFAULT_DEVICE_VOLUME};
use crate::error::EngineError;
use crate::format::FormatKind;
use crate::models::{TagSet, TagValue};
use std::ops::Range;
use std::path::Path;

/// Backend for CPU-driven multi-song formats (NSF, GBS, SPC, ...)
pub struct ChipBackend {
    core: Box<dyn ChipCore>,
    sample_rate: u32,
    open: bool,
    current: usize,
    endless: bool,
    /// Length of the current song, where the built-in fade belongs
    fade_ms: Option<u64>,
}

impl ChipBackend {
    pub fn new(core: Box<dyn ChipCore>, sample_rate: u32) -> Self {
        Self {
            core,
            sample_rate,
            open: false,
            current: 0,
            endless: false,
            fade_ms: None,
        }
    }

    fn ms_to_samples(&self, ms: u32) -> u64 {
        ms as u64 * self.sample_rate as u64 / 1000
    }

    fn hint_for(&self, info: &ChipTrackInfo) -> DurationHint {
        DurationHint {
            length: info.length_ms.map(|ms| self.ms_to_samples(ms)),
            intro: info.intro_ms.map(|ms| self.ms_to_samples(ms)),
            loop_len: info.loop_ms.map(|ms| self.ms_to_samples(ms)),
        }
    }

    fn start(&mut self, index: usize) -> Result<DurationHint, EngineError> {
        self.core
            .start_track(index)
            .map_err(|e| EngineError::Rejected {
                path: format!("song {}", index),
                reason: e.to_string(),
            })?;
        self.current = index;

        let hint = match self.core.track_info(index) {
            Ok(info) => {
                self.fade_ms = info.length_ms.map(u64::from);
                self.hint_for(&info)
            }
            Err(e) => {
                log::warn!("No track info for song {}: {}", index, e);
                self.fade_ms = None;
                DurationHint::unknown()
            }
        };

        // Track starts reset emulator options
        self.apply_loop_options();
        Ok(hint)
    }

    /// Endless play turns off silence detection and the built-in fade
    fn apply_loop_options(&mut self) {
        self.core.ignore_silence(self.endless);
        if self.endless {
            self.core.set_fade(None);
        } else if let Some(ms) = self.fade_ms {
            self.core.set_fade(Some(ms));
        }
    }
}

impl EngineBackend for ChipBackend {
    fn kind(&self) -> FormatKind {
        FormatKind::MultiTrackChip
    }

    fn open(&mut self, path: &Path) -> Result<DurationHint, EngineError> {
        self.close();

        self.core
            .open(path, self.sample_rate)
            .map_err(|e| EngineError::Rejected {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        self.open = true;

        match self.start(0) {
            Ok(hint) => Ok(hint),
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        if self.open {
            self.core.close();
            self.open = false;
            self.current = 0;
        }
    }

    fn fill(&mut self, buffer: &mut [i16]) -> usize {
        if !self.open {
            return 0;
        }
        // The emulator always produces the full request
        match self.core.play(buffer) {
            Ok(()) => buffer.len() / 2,
            Err(e) => {
                log::warn!("Chip emulator stopped rendering: {}", e);
                0
            }
        }
    }

    fn seek(&mut self, sample: u64) -> Option<u64> {
        if !self.open || self.sample_rate == 0 {
            return None;
        }
        let ms = sample * 1000 / self.sample_rate as u64;
        match self.core.seek_ms(ms) {
            Ok(()) => Some(ms * self.sample_rate as u64 / 1000),
            Err(e) => {
                log::debug!("Seek to {}ms ignored: {}", ms, e);
                None
            }
        }
    }

    fn is_ended(&self) -> bool {
        !self.open || self.core.track_ended()
    }

    fn tags(&self) -> TagSet {
        if !self.open {
            return TagSet::default();
        }
        match self.core.track_info(self.current) {
            Ok(info) => TagSet {
                title: TagValue::new(info.song),
                game: TagValue::new(info.game),
                system: TagValue::new(info.system),
                author: TagValue::new(info.author),
                date: TagValue::new(info.copyright),
                creator: TagValue::new(info.dumper),
                notes: TagValue::new(info.comment),
            },
            Err(_) => TagSet::default(),
        }
    }

    fn device_count(&self) -> usize {
        if self.open {
            self.core.voice_count()
        } else {
            0
        }
    }

    fn device_name(&self, index: usize) -> Option<String> {
        (index < self.device_count()).then(|| self.core.voice_name(index))
    }

    /// Voices can only be muted, so volume reads back as 0 or the default
    fn device_volume(&self, index: usize) -> u16 {
        if index < self.device_count() && self.core.is_voice_muted(index) {
            0
        } else {
            DEFAULT_DEVICE_VOLUME
        }
    }

    fn set_device_volume(&mut self, index: usize, volume: u16) {
        if index < self.device_count() {
            self.core.mute_voice(index, volume == 0);
        }
    }

    fn sub_track_count(&self) -> usize {
        if self.open {
            self.core.track_count()
        } else {
            1
        }
    }

    fn sub_track_range(&self) -> Range<usize> {
        0..self.sub_track_count()
    }

    fn select_sub_track(&mut self, index: usize) -> Result<DurationHint, EngineError> {
        if !self.open {
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
        self.start(index)
    }

    fn current_sub_track(&self) -> usize {
        self.current
    }

    fn set_playback_speed(&mut self, speed: f64) {
        if self.open && speed > 0.0 {
            self.core.set_tempo(speed);
        }
    }

    fn set_endless_loop(&mut self, endless: bool) {
        self.endless = endless;
        if self.open {
            self.apply_loop_options();
        }
    }
}

impl Drop for ChipBackend {
    fn drop(&mut self) {
        self.close();
    }
}
