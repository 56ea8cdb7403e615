//! Interfaces of the native decoder libraries.
//!
//! Each family of chiptune decoder ships with its own API shape. These traits
//! mirror those shapes as closely as possible; the adapters in the sibling
//! modules translate them into the uniform [`EngineBackend`](super::EngineBackend)
//! operation set. A [`NativeEngines`] provider hands out fresh core instances.

use crate::engine::resolver::FileResolver;
use crate::error::EngineError;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a native decoder
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct NativeError {
    pub code: i32,
    pub message: String,
}

impl NativeError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub type NativeResult<T> = Result<T, NativeError>;

/// One stereo frame in the VGM core's 24-bit fixed-point format
pub type WideFrame = [i32; 2];

/// A sound chip instance reported by the VGM core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VgmDeviceInfo {
    pub id: u32,
    pub name: String,
    pub volume: u16,
}

/// Register-dump player (VGM/VGZ)
pub trait VgmCore: Send {
    fn set_sample_rate(&mut self, rate: u32);

    /// Load a file; the core asks `resolver` for any ROM or sample data it references
    fn load(&mut self, path: &Path, resolver: Arc<dyn FileResolver>) -> NativeResult<()>;

    fn unload(&mut self);

    /// Render into `frames`, returning how many were produced
    fn render(&mut self, frames: &mut [WideFrame]) -> usize;

    fn seek_sample(&mut self, sample: u64);

    fn has_ended(&self) -> bool;

    /// Intro plus one pass of the loop, in samples
    fn total_samples(&self) -> u64;

    /// Loop section length in samples, 0 for non-looping files
    fn loop_samples(&self) -> u64;

    /// Flat `[key, value, key, value, ...]` tag list
    fn tags(&self) -> Vec<String>;

    /// May list several instances of the same chip id
    fn devices(&self) -> Vec<VgmDeviceInfo>;

    fn set_device_volume(&mut self, id: u32, volume: u16);

    fn set_speed(&mut self, speed: f64);
}

/// Per-song information from a CPU-driven chip emulator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChipTrackInfo {
    pub length_ms: Option<u32>,
    pub intro_ms: Option<u32>,
    pub loop_ms: Option<u32>,
    pub song: String,
    pub game: String,
    pub system: String,
    pub author: String,
    pub copyright: String,
    pub comment: String,
    pub dumper: String,
}

/// NSF / GBS / SPC / HES / AY style emulator
pub trait ChipCore: Send {
    fn open(&mut self, path: &Path, sample_rate: u32) -> NativeResult<()>;

    fn close(&mut self);

    fn track_count(&self) -> usize;

    fn start_track(&mut self, index: usize) -> NativeResult<()>;

    fn track_info(&self, index: usize) -> NativeResult<ChipTrackInfo>;

    /// Fill interleaved stereo samples
    fn play(&mut self, samples: &mut [i16]) -> NativeResult<()>;

    fn track_ended(&self) -> bool;

    fn seek_ms(&mut self, ms: u64) -> NativeResult<()>;

    /// Stop the emulator from ending a song on detected silence
    fn ignore_silence(&mut self, ignore: bool);

    /// Start of the built-in fade, `None` disables it
    fn set_fade(&mut self, start_ms: Option<u64>);

    fn voice_count(&self) -> usize;

    fn voice_name(&self, index: usize) -> String;

    fn is_voice_muted(&self, index: usize) -> bool;

    fn mute_voice(&mut self, index: usize, mute: bool);

    fn set_tempo(&mut self, tempo: f64);
}

/// Module player (MOD/XM/S3M/IT)
pub trait TrackerCore: Send {
    fn load(&mut self, path: &Path) -> NativeResult<()>;

    fn unload(&mut self);

    /// -1 repeats forever, 0 plays once
    fn set_repeat_count(&mut self, count: i32);

    /// Fill interleaved stereo samples, returning frames produced
    fn read_interleaved_stereo(&mut self, sample_rate: u32, buffer: &mut [i16]) -> usize;

    fn duration_seconds(&self) -> f64;

    fn set_position_seconds(&mut self, seconds: f64);

    /// Metadata lookup by key (`title`, `artist`, `tracker`, `date`, `message`)
    fn metadata(&self, key: &str) -> String;

    fn subsong_count(&self) -> usize;

    fn select_subsong(&mut self, index: usize) -> NativeResult<()>;

    fn current_subsong(&self) -> usize;

    fn set_tempo_factor(&mut self, factor: f64);
}

/// Header of an MSX sound-driver container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KssHeader {
    pub title: String,
    pub first_song: usize,
    /// Inclusive
    pub last_song: usize,
    pub chips: Vec<String>,
}

/// KSS and related MSX driver player
pub trait KssCore: Send {
    fn load(&mut self, path: &Path, sample_rate: u32) -> NativeResult<KssHeader>;

    fn unload(&mut self);

    /// Restart playback at `song`
    fn reset(&mut self, song: usize);

    /// Fill interleaved stereo samples
    fn calc(&mut self, buffer: &mut [i16]);

    /// Set once the driver stops or loops past its end marker
    fn stop_flag(&self) -> bool;

    fn device_volume(&self, device: usize) -> u16;

    fn set_device_volume(&mut self, device: usize, volume: u16);

    fn set_speed(&mut self, speed: f64);
}

/// Number of channels a MIDI synth exposes
pub const MIDI_CHANNELS: usize = 16;

/// Software MIDI synthesizer
pub trait MidiCore: Send {
    fn load(&mut self, path: &Path, sample_rate: u32) -> NativeResult<()>;

    fn unload(&mut self);

    /// Render interleaved stereo floats in -1.0..=1.0, returning frames produced
    fn render(&mut self, buffer: &mut [f32]) -> usize;

    fn length_seconds(&self) -> f64;

    fn seek_seconds(&mut self, seconds: f64);

    fn finished(&self) -> bool;

    fn set_looping(&mut self, looping: bool);

    /// Channel volume controller value, 0..=127
    fn channel_volume(&self, channel: usize) -> u8;

    fn set_channel_volume(&mut self, channel: usize, volume: u8);

    fn set_tempo_scale(&mut self, scale: f64);

    /// Track-name and copyright meta events
    fn text(&self) -> (String, String);
}

/// Hands out fresh native decoder instances.
///
/// Every method defaults to [`EngineError::EngineUnavailable`], so a build
/// only overrides the families it links in.
pub trait NativeEngines: Send + Sync {
    fn vgm(&self) -> Result<Box<dyn VgmCore>, EngineError> {
        Err(EngineError::EngineUnavailable { engine: "VGM" })
    }

    fn chip(&self) -> Result<Box<dyn ChipCore>, EngineError> {
        Err(EngineError::EngineUnavailable { engine: "chip" })
    }

    fn tracker(&self) -> Result<Box<dyn TrackerCore>, EngineError> {
        Err(EngineError::EngineUnavailable { engine: "tracker" })
    }

    fn kss(&self) -> Result<Box<dyn KssCore>, EngineError> {
        Err(EngineError::EngineUnavailable { engine: "MSX" })
    }

    fn midi(&self) -> Result<Box<dyn MidiCore>, EngineError> {
        Err(EngineError::EngineUnavailable { engine: "MIDI" })
    }
}

/// Provider with no decoders linked in
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEngines;

impl NativeEngines for UnavailableEngines {}
