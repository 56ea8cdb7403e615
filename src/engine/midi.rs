use super::native::{MidiCore, MIDI_CHANNELS};
use super::{DurationHint, EngineBackend, DEFAULT_DEVICE_VOLUME};
use crate::error::EngineError;
use crate::format::FormatKind;
use crate::models::{TagSet, TagValue};
use std::path::Path;

const MAX_CONTROLLER_VOLUME: u32 = 127;

/// Software-synth backend; the 16 MIDI channels are its mixer devices
pub struct MidiBackend {
    core: Box<dyn MidiCore>,
    sample_rate: u32,
    loaded: bool,
    scratch: Vec<f32>,
}

impl MidiBackend {
    pub fn new(core: Box<dyn MidiCore>, sample_rate: u32) -> Self {
        Self {
            core,
            sample_rate,
            loaded: false,
            scratch: Vec::new(),
        }
    }
}

fn float_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

impl EngineBackend for MidiBackend {
    fn kind(&self) -> FormatKind {
        FormatKind::Midi
    }

    fn open(&mut self, path: &Path) -> Result<DurationHint, EngineError> {
        self.close();

        self.core
            .load(path, self.sample_rate)
            .map_err(|e| EngineError::Rejected {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        self.loaded = true;

        let seconds = self.core.length_seconds();
        if seconds.is_finite() && seconds > 0.0 {
            Ok(DurationHint::with_length(
                (seconds * self.sample_rate as f64) as u64,
            ))
        } else {
            Ok(DurationHint::unknown())
        }
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
        if self.scratch.len() < buffer.len() {
            self.scratch.resize(buffer.len(), 0.0);
        }
        let scratch = &mut self.scratch[..buffer.len()];
        scratch.fill(0.0);

        let frames = self.core.render(scratch).min(buffer.len() / 2);
        for (out, sample) in buffer[..frames * 2].iter_mut().zip(scratch.iter()) {
            *out = float_to_i16(*sample);
        }
        frames
    }

    fn seek(&mut self, sample: u64) -> Option<u64> {
        if !self.loaded || self.sample_rate == 0 {
            return None;
        }
        let rate = self.sample_rate as f64;
        let mut seconds = sample as f64 / rate;
        let length = self.core.length_seconds();
        if length > 0.0 {
            seconds = seconds.min(length);
        }
        self.core.seek_seconds(seconds);
        Some((seconds * rate).round() as u64)
    }

    fn is_ended(&self) -> bool {
        !self.loaded || self.core.finished()
    }

    fn tags(&self) -> TagSet {
        if !self.loaded {
            return TagSet::default();
        }
        let (name, copyright) = self.core.text();
        TagSet {
            title: TagValue::new(name.trim()),
            author: TagValue::new(copyright.trim()),
            ..TagSet::default()
        }
    }

    fn device_count(&self) -> usize {
        if self.loaded {
            MIDI_CHANNELS
        } else {
            0
        }
    }

    fn device_name(&self, index: usize) -> Option<String> {
        (index < self.device_count()).then(|| format!("Channel {}", index + 1))
    }

    fn device_volume(&self, index: usize) -> u16 {
        if index >= self.device_count() {
            return DEFAULT_DEVICE_VOLUME;
        }
        let controller = self.core.channel_volume(index) as u32;
        (controller * DEFAULT_DEVICE_VOLUME as u32 / MAX_CONTROLLER_VOLUME) as u16
    }

    fn set_device_volume(&mut self, index: usize, volume: u16) {
        if index < self.device_count() {
            let controller = (volume as u32 * MAX_CONTROLLER_VOLUME / DEFAULT_DEVICE_VOLUME as u32)
                .min(MAX_CONTROLLER_VOLUME);
            self.core.set_channel_volume(index, controller as u8);
        }
    }

    fn set_playback_speed(&mut self, speed: f64) {
        if self.loaded && speed > 0.0 {
            self.core.set_tempo_scale(speed);
        }
    }

    fn set_endless_loop(&mut self, endless: bool) {
        if self.loaded {
            self.core.set_looping(endless);
        }
    }
}

impl Drop for MidiBackend {
    fn drop(&mut self) {
        self.close();
    }
}
