//! Scripted stand-ins for the native decoders.
//!
//! A [`FakeEngines`] provider hands out cores that all share one set of
//! counters, so tests can observe how many decoder instances are loaded at
//! once and whether two calls ever ran into a core concurrently.

use super::native::*;
use super::resolver::{FileResolver, RomDirResolver};
use super::{DurationPolicy, EngineFactory};
use crate::error::EngineError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sample value every fake core renders
pub const FAKE_LEVEL: i16 = 1000;

/// Rate the fakes assume when converting seconds
pub const FAKE_RATE: u64 = 44100;

/// What a fake core reports for one file name
#[derive(Debug, Clone)]
pub struct FakeSong {
    /// Frames rendered before the song ends
    pub frames: u64,
    pub length_secs: Option<u64>,
    pub intro_secs: Option<u64>,
    pub loop_secs: Option<u64>,
    pub title: String,
    pub game: String,
    pub system: String,
    pub author: String,
    pub date: String,
    pub chips: Vec<String>,
    pub sub_tracks: Range<usize>,
    pub reject: bool,
    /// Renders nothing and never reports an end; chip `play` errors
    pub stall: bool,
}

impl Default for FakeSong {
    fn default() -> Self {
        Self {
            frames: FAKE_RATE * 60,
            length_secs: None,
            intro_secs: None,
            loop_secs: None,
            title: "Fake Song".to_string(),
            game: "Fake Game".to_string(),
            system: "Fake System".to_string(),
            author: "Fake Composer".to_string(),
            date: "1989".to_string(),
            chips: vec!["YM2612".to_string(), "SN76489".to_string()],
            sub_tracks: 0..1,
            reject: false,
            stall: false,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    songs: Mutex<HashMap<String, FakeSong>>,
    live: AtomicUsize,
    max_live: AtomicUsize,
    opened: AtomicUsize,
    busy: AtomicBool,
    violations: AtomicUsize,
    ignore_silence: AtomicBool,
    fade_disabled: AtomicBool,
    position: AtomicU64,
    render_delay_us: AtomicU64,
}

/// Provider of scripted cores for all five families
#[derive(Debug, Clone, Default)]
pub struct FakeEngines {
    shared: Arc<Shared>,
}

impl FakeEngines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the song reported for `file_name` (case-insensitive)
    pub fn with_song(self, file_name: &str, song: FakeSong) -> Self {
        self.shared
            .songs
            .lock()
            .insert(file_name.to_ascii_lowercase(), song);
        self
    }

    /// Sleep inside every render call
    pub fn with_render_delay(self, delay: Duration) -> Self {
        self.shared
            .render_delay_us
            .store(delay.as_micros() as u64, Ordering::SeqCst);
        self
    }

    pub fn factory(&self, policy: DurationPolicy) -> EngineFactory {
        let resolver: Arc<dyn FileResolver> = Arc::new(RomDirResolver::default());
        EngineFactory::new(Arc::new(self.clone()), resolver, policy)
    }

    /// Cores currently holding a loaded file
    pub fn live(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously loaded cores observed
    pub fn max_live(&self) -> usize {
        self.shared.max_live.load(Ordering::SeqCst)
    }

    /// Total successful loads
    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Calls that entered a core while another call was still inside one
    pub fn violations(&self) -> usize {
        self.shared.violations.load(Ordering::SeqCst)
    }

    pub fn ignoring_silence(&self) -> bool {
        self.shared.ignore_silence.load(Ordering::SeqCst)
    }

    /// Whether the last built-in fade setting turned the fade off
    pub fn native_fade_disabled(&self) -> bool {
        self.shared.fade_disabled.load(Ordering::SeqCst)
    }

    /// Playback position of the most recently driven core, in frames
    pub fn position(&self) -> u64 {
        self.shared.position.load(Ordering::SeqCst)
    }

    fn core(&self) -> Box<FakeCore> {
        Box::new(FakeCore {
            shared: self.shared.clone(),
            song: None,
            position: 0,
            sub_track: 0,
            muted: Vec::new(),
            volumes: Vec::new(),
            looping: false,
        })
    }
}

impl NativeEngines for FakeEngines {
    fn vgm(&self) -> Result<Box<dyn VgmCore>, EngineError> {
        Ok(self.core())
    }

    fn chip(&self) -> Result<Box<dyn ChipCore>, EngineError> {
        Ok(self.core())
    }

    fn tracker(&self) -> Result<Box<dyn TrackerCore>, EngineError> {
        Ok(self.core())
    }

    fn kss(&self) -> Result<Box<dyn KssCore>, EngineError> {
        Ok(self.core())
    }

    fn midi(&self) -> Result<Box<dyn MidiCore>, EngineError> {
        Ok(self.core())
    }
}

struct CallGuard {
    shared: Arc<Shared>,
    entered: bool,
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        if self.entered {
            self.shared.busy.store(false, Ordering::SeqCst);
        }
    }
}

/// One scripted decoder instance; implements every family's interface
struct FakeCore {
    shared: Arc<Shared>,
    song: Option<FakeSong>,
    position: u64,
    sub_track: usize,
    muted: Vec<bool>,
    volumes: Vec<u16>,
    looping: bool,
}

impl FakeCore {
    fn enter(&self) -> CallGuard {
        let entered = self
            .shared
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if !entered {
            self.shared.violations.fetch_add(1, Ordering::SeqCst);
        }
        CallGuard {
            shared: self.shared.clone(),
            entered,
        }
    }

    fn acquire(&mut self, path: &Path) -> NativeResult<FakeSong> {
        let _guard = self.enter();
        self.release_inner();

        if !path.is_file() {
            return Err(NativeError::new(-1, "file not found"));
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let song = self
            .shared
            .songs
            .lock()
            .get(&name)
            .cloned()
            .unwrap_or_default();
        if song.reject {
            return Err(NativeError::new(-2, "invalid data"));
        }

        let live = self.shared.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_live.fetch_max(live, Ordering::SeqCst);
        self.shared.opened.fetch_add(1, Ordering::SeqCst);

        self.song = Some(song.clone());
        self.position = 0;
        self.sub_track = song.sub_tracks.start;
        self.muted = vec![false; song.chips.len()];
        self.volumes = vec![super::DEFAULT_DEVICE_VOLUME; song.chips.len()];
        self.shared.position.store(0, Ordering::SeqCst);
        Ok(song)
    }

    fn release(&mut self) {
        let _guard = self.enter();
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.song.take().is_some() {
            self.shared.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Advance the song by up to `frames`, returning how many were produced
    fn produce(&mut self, frames: usize) -> usize {
        let _guard = self.enter();
        let delay = self.shared.render_delay_us.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_micros(delay));
        }

        let total = match &self.song {
            Some(song) if song.stall => return 0,
            Some(song) => song.frames,
            None => return 0,
        };
        let produced = if self.looping {
            frames as u64
        } else {
            total.saturating_sub(self.position).min(frames as u64)
        };
        self.position += produced;
        self.shared.position.store(self.position, Ordering::SeqCst);
        produced as usize
    }

    fn set_position(&mut self, frames: u64) {
        let _guard = self.enter();
        self.position = frames;
        self.shared.position.store(frames, Ordering::SeqCst);
    }

    fn ended(&self) -> bool {
        match &self.song {
            Some(song) if song.stall => false,
            Some(song) => !self.looping && self.position >= song.frames,
            None => true,
        }
    }

    fn secs(value: Option<u64>) -> u64 {
        value.unwrap_or(0) * FAKE_RATE
    }

    fn fill_pcm(buffer: &mut [i16], frames: usize) {
        buffer.fill(0);
        buffer[..frames * 2].fill(FAKE_LEVEL);
    }
}

impl Drop for FakeCore {
    fn drop(&mut self) {
        self.release_inner();
    }
}

impl VgmCore for FakeCore {
    fn set_sample_rate(&mut self, _rate: u32) {}

    fn load(&mut self, path: &Path, _resolver: Arc<dyn FileResolver>) -> NativeResult<()> {
        self.acquire(path).map(|_| ())
    }

    fn unload(&mut self) {
        self.release();
    }

    fn render(&mut self, frames: &mut [WideFrame]) -> usize {
        let produced = self.produce(frames.len());
        let level = (FAKE_LEVEL as i32) << 8;
        for frame in frames[..produced].iter_mut() {
            *frame = [level, level];
        }
        produced
    }

    fn seek_sample(&mut self, sample: u64) {
        self.set_position(sample);
    }

    fn has_ended(&self) -> bool {
        self.ended()
    }

    fn total_samples(&self) -> u64 {
        match &self.song {
            Some(song) if song.length_secs.is_some() => Self::secs(song.length_secs),
            Some(song) => song.frames,
            None => 0,
        }
    }

    fn loop_samples(&self) -> u64 {
        self.song.as_ref().map(|s| Self::secs(s.loop_secs)).unwrap_or(0)
    }

    fn tags(&self) -> Vec<String> {
        let song = match &self.song {
            Some(song) => song,
            None => return Vec::new(),
        };
        vec![
            "TITLE".to_string(),
            song.title.clone(),
            "GAME".to_string(),
            song.game.clone(),
            "SYSTEM".to_string(),
            song.system.clone(),
            "ARTIST".to_string(),
            song.author.clone(),
            "DATE".to_string(),
            song.date.clone(),
        ]
    }

    fn devices(&self) -> Vec<VgmDeviceInfo> {
        let song = match &self.song {
            Some(song) => song,
            None => return Vec::new(),
        };
        song.chips
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let first = song.chips.iter().position(|c| c == name).unwrap_or(index);
                VgmDeviceInfo {
                    id: first as u32,
                    name: name.clone(),
                    volume: self.volumes.get(first).copied().unwrap_or(0x100),
                }
            })
            .collect()
    }

    fn set_device_volume(&mut self, id: u32, volume: u16) {
        if let Some(slot) = self.volumes.get_mut(id as usize) {
            *slot = volume;
        }
    }

    fn set_speed(&mut self, _speed: f64) {}
}

impl ChipCore for FakeCore {
    fn open(&mut self, path: &Path, _sample_rate: u32) -> NativeResult<()> {
        self.acquire(path).map(|_| ())
    }

    fn close(&mut self) {
        self.release();
    }

    fn track_count(&self) -> usize {
        self.song.as_ref().map(|s| s.sub_tracks.end).unwrap_or(0)
    }

    fn start_track(&mut self, index: usize) -> NativeResult<()> {
        if index >= ChipCore::track_count(self) {
            return Err(NativeError::new(-3, "bad track"));
        }
        self.sub_track = index;
        self.set_position(0);
        Ok(())
    }

    fn track_info(&self, _index: usize) -> NativeResult<ChipTrackInfo> {
        let song = self
            .song
            .as_ref()
            .ok_or_else(|| NativeError::new(-4, "not open"))?;
        let ms = |secs: Option<u64>| secs.map(|s| (s * 1000) as u32);
        Ok(ChipTrackInfo {
            length_ms: ms(song.length_secs),
            intro_ms: ms(song.intro_secs),
            loop_ms: ms(song.loop_secs),
            song: song.title.clone(),
            game: song.game.clone(),
            system: song.system.clone(),
            author: song.author.clone(),
            copyright: song.date.clone(),
            comment: String::new(),
            dumper: String::new(),
        })
    }

    fn play(&mut self, samples: &mut [i16]) -> NativeResult<()> {
        if self.song.as_ref().is_some_and(|s| s.stall) {
            return Err(NativeError::new(-5, "emulation halted"));
        }
        let produced = self.produce(samples.len() / 2);
        Self::fill_pcm(samples, produced);
        Ok(())
    }

    fn track_ended(&self) -> bool {
        self.ended()
    }

    fn seek_ms(&mut self, ms: u64) -> NativeResult<()> {
        self.set_position(ms * FAKE_RATE / 1000);
        Ok(())
    }

    fn ignore_silence(&mut self, ignore: bool) {
        self.shared.ignore_silence.store(ignore, Ordering::SeqCst);
    }

    fn set_fade(&mut self, start_ms: Option<u64>) {
        self.shared
            .fade_disabled
            .store(start_ms.is_none(), Ordering::SeqCst);
    }

    fn voice_count(&self) -> usize {
        self.song.as_ref().map(|s| s.chips.len()).unwrap_or(0)
    }

    fn voice_name(&self, index: usize) -> String {
        self.song
            .as_ref()
            .and_then(|s| s.chips.get(index).cloned())
            .unwrap_or_default()
    }

    fn is_voice_muted(&self, index: usize) -> bool {
        self.muted.get(index).copied().unwrap_or(false)
    }

    fn mute_voice(&mut self, index: usize, mute: bool) {
        if let Some(slot) = self.muted.get_mut(index) {
            *slot = mute;
        }
    }

    fn set_tempo(&mut self, _tempo: f64) {}
}

impl TrackerCore for FakeCore {
    fn load(&mut self, path: &Path) -> NativeResult<()> {
        self.acquire(path).map(|_| ())
    }

    fn unload(&mut self) {
        self.release();
    }

    fn set_repeat_count(&mut self, count: i32) {
        self.looping = count < 0;
    }

    fn read_interleaved_stereo(&mut self, _sample_rate: u32, buffer: &mut [i16]) -> usize {
        let produced = self.produce(buffer.len() / 2);
        Self::fill_pcm(buffer, produced);
        produced
    }

    fn duration_seconds(&self) -> f64 {
        match &self.song {
            Some(song) => song
                .length_secs
                .map(|s| s as f64)
                .unwrap_or(song.frames as f64 / FAKE_RATE as f64),
            None => 0.0,
        }
    }

    fn set_position_seconds(&mut self, seconds: f64) {
        self.set_position((seconds * FAKE_RATE as f64) as u64);
    }

    fn metadata(&self, key: &str) -> String {
        let song = match &self.song {
            Some(song) => song,
            None => return String::new(),
        };
        match key {
            "title" => song.title.clone(),
            "artist" => song.author.clone(),
            "date" => song.date.clone(),
            _ => String::new(),
        }
    }

    fn subsong_count(&self) -> usize {
        self.song.as_ref().map(|s| s.sub_tracks.len()).unwrap_or(0)
    }

    fn select_subsong(&mut self, index: usize) -> NativeResult<()> {
        self.sub_track = index;
        self.set_position(0);
        Ok(())
    }

    fn current_subsong(&self) -> usize {
        self.sub_track
    }

    fn set_tempo_factor(&mut self, _factor: f64) {}
}

impl KssCore for FakeCore {
    fn load(&mut self, path: &Path, _sample_rate: u32) -> NativeResult<KssHeader> {
        let song = self.acquire(path)?;
        Ok(KssHeader {
            title: song.game.clone(),
            first_song: song.sub_tracks.start,
            last_song: song.sub_tracks.end.saturating_sub(1),
            chips: song.chips.clone(),
        })
    }

    fn unload(&mut self) {
        self.release();
    }

    fn reset(&mut self, song: usize) {
        self.sub_track = song;
        self.set_position(0);
    }

    fn calc(&mut self, buffer: &mut [i16]) {
        let produced = self.produce(buffer.len() / 2);
        Self::fill_pcm(buffer, produced);
    }

    fn stop_flag(&self) -> bool {
        self.ended()
    }

    fn device_volume(&self, device: usize) -> u16 {
        self.volumes.get(device).copied().unwrap_or(0x100)
    }

    fn set_device_volume(&mut self, device: usize, volume: u16) {
        if let Some(slot) = self.volumes.get_mut(device) {
            *slot = volume;
        }
    }

    fn set_speed(&mut self, _speed: f64) {}
}

impl MidiCore for FakeCore {
    fn load(&mut self, path: &Path, _sample_rate: u32) -> NativeResult<()> {
        self.acquire(path)?;
        self.volumes = vec![127; MIDI_CHANNELS];
        Ok(())
    }

    fn unload(&mut self) {
        self.release();
    }

    fn render(&mut self, buffer: &mut [f32]) -> usize {
        let produced = self.produce(buffer.len() / 2);
        let level = FAKE_LEVEL as f32 / i16::MAX as f32;
        buffer.fill(0.0);
        buffer[..produced * 2].fill(level);
        produced
    }

    fn length_seconds(&self) -> f64 {
        TrackerCore::duration_seconds(self)
    }

    fn seek_seconds(&mut self, seconds: f64) {
        self.set_position((seconds * FAKE_RATE as f64) as u64);
    }

    fn finished(&self) -> bool {
        self.ended()
    }

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn channel_volume(&self, channel: usize) -> u8 {
        self.volumes.get(channel).map(|v| (*v).min(127) as u8).unwrap_or(127)
    }

    fn set_channel_volume(&mut self, channel: usize, volume: u8) {
        if let Some(slot) = self.volumes.get_mut(channel) {
            *slot = volume as u16;
        }
    }

    fn set_tempo_scale(&mut self, _scale: f64) {}

    fn text(&self) -> (String, String) {
        match &self.song {
            Some(song) => (song.title.clone(), song.author.clone()),
            None => (String::new(), String::new()),
        }
    }
}
