//! Uniform decoder interface over the five native engine families.

pub mod native;
pub mod resolver;

mod chip;
mod kss;
mod midi;
mod tracker;
mod vgm;

#[cfg(test)]
pub mod testing;

use crate::config::DurationConfig;
use crate::error::EngineError;
use crate::format::{classify_path, FormatKind};
use crate::models::TagSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use chip::ChipBackend;
pub use kss::KssBackend;
pub use midi::MidiBackend;
pub use native::{NativeEngines, UnavailableEngines};
pub use resolver::{FileResolver, RomDirResolver};
pub use tracker::TrackerBackend;
pub use vgm::VgmBackend;

/// Default volume reported for a mixer device the engine knows nothing about
pub const DEFAULT_DEVICE_VOLUME: u16 = 0x100;

/// Length information an engine reports when a song is opened, in samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationHint {
    /// Explicit total length
    pub length: Option<u64>,
    pub intro: Option<u64>,
    pub loop_len: Option<u64>,
}

impl DurationHint {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_length(length: u64) -> Self {
        Self {
            length: Some(length),
            ..Self::default()
        }
    }
}

/// Operation set every decoder adapter provides.
///
/// Operations a family cannot perform are no-ops or report neutral values;
/// callers never need to special-case the backend kind.
pub trait EngineBackend: Send {
    fn kind(&self) -> FormatKind;

    /// Load `path` and report what the engine knows about its length
    fn open(&mut self, path: &Path) -> Result<DurationHint, EngineError>;

    /// Release native resources; safe to call more than once
    fn close(&mut self);

    /// Fill interleaved stereo PCM, returning the number of frames written
    fn fill(&mut self, buffer: &mut [i16]) -> usize;

    /// Move to `sample`, returning where the engine actually landed.
    ///
    /// `None` means the request was ignored and the position is unchanged.
    fn seek(&mut self, sample: u64) -> Option<u64>;

    fn is_ended(&self) -> bool;

    /// Metadata of the open song; malformed tag blocks yield empty values
    fn tags(&self) -> TagSet;

    fn device_count(&self) -> usize {
        0
    }

    fn device_name(&self, _index: usize) -> Option<String> {
        None
    }

    fn device_volume(&self, _index: usize) -> u16 {
        DEFAULT_DEVICE_VOLUME
    }

    fn set_device_volume(&mut self, _index: usize, _volume: u16) {}

    fn sub_track_count(&self) -> usize {
        1
    }

    /// Valid sub-track indices of the open container
    fn sub_track_range(&self) -> Range<usize> {
        0..self.sub_track_count()
    }

    fn select_sub_track(&mut self, index: usize) -> Result<DurationHint, EngineError> {
        let range = self.sub_track_range();
        if range.contains(&index) {
            Ok(DurationHint::unknown())
        } else {
            Err(EngineError::SubTrackOutOfRange {
                index,
                first: range.start,
                end: range.end,
            })
        }
    }

    fn current_sub_track(&self) -> usize {
        0
    }

    fn set_playback_speed(&mut self, _speed: f64) {}

    fn set_endless_loop(&mut self, _endless: bool) {}
}

/// The uniform length rule applied to every engine's [`DurationHint`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationPolicy {
    sample_rate: u32,
    min_plausible_secs: u64,
    fallback_secs: u64,
    loop_repeats: u64,
    sidecar_loop_repeats: u64,
}

impl DurationPolicy {
    pub fn new(config: &DurationConfig, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            min_plausible_secs: config.min_plausible_secs,
            fallback_secs: config.fallback_secs,
            loop_repeats: config.loop_repeats as u64,
            sidecar_loop_repeats: config.sidecar_loop_repeats as u64,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Resolve a hint to a length in samples
    pub fn resolve(&self, hint: &DurationHint) -> i64 {
        let rate = self.sample_rate as u64;

        if let Some(length) = hint.length {
            if length >= self.min_plausible_secs * rate {
                return length as i64;
            }
        }

        if let (Some(intro), Some(loop_len)) = (hint.intro, hint.loop_len) {
            let total = intro + self.loop_repeats * loop_len;
            if total > 0 {
                return total as i64;
            }
        }

        (self.fallback_secs * rate) as i64
    }

    /// Curated length from sidecar metadata: intro plus repeated loop
    pub fn resolve_curated(&self, intro: Duration, loop_len: Option<Duration>, repeat: bool) -> i64 {
        let mut seconds = intro.as_secs_f64();
        if repeat {
            if let Some(loop_len) = loop_len {
                seconds += self.sidecar_loop_repeats as f64 * loop_len.as_secs_f64();
            }
        }
        self.seconds_to_samples(seconds)
    }

    pub fn seconds_to_samples(&self, seconds: f64) -> i64 {
        (seconds * self.sample_rate as f64).round() as i64
    }
}

/// Builds backends for a file's format family
#[derive(Clone)]
pub struct EngineFactory {
    engines: Arc<dyn NativeEngines>,
    resolver: Arc<dyn FileResolver>,
    policy: DurationPolicy,
}

impl EngineFactory {
    pub fn new(
        engines: Arc<dyn NativeEngines>,
        resolver: Arc<dyn FileResolver>,
        policy: DurationPolicy,
    ) -> Self {
        Self {
            engines,
            resolver,
            policy,
        }
    }

    pub fn policy(&self) -> &DurationPolicy {
        &self.policy
    }

    pub fn sample_rate(&self) -> u32 {
        self.policy.sample_rate
    }

    /// Construct an unopened backend for `kind`
    pub fn create(&self, kind: FormatKind) -> Result<Box<dyn EngineBackend>, EngineError> {
        let rate = self.policy.sample_rate;
        let backend: Box<dyn EngineBackend> = match kind {
            FormatKind::Vgm => Box::new(VgmBackend::new(
                self.engines.vgm()?,
                self.resolver.clone(),
                rate,
            )),
            FormatKind::MultiTrackChip => Box::new(ChipBackend::new(self.engines.chip()?, rate)),
            FormatKind::Tracker => Box::new(TrackerBackend::new(self.engines.tracker()?, rate)),
            FormatKind::Msx => Box::new(KssBackend::new(self.engines.kss()?, rate)),
            FormatKind::Midi => Box::new(MidiBackend::new(self.engines.midi()?, rate)),
            FormatKind::Archive(_) | FormatKind::Unsupported => {
                return Err(EngineError::UnsupportedFormat {
                    file: kind.name().to_string(),
                })
            }
        };
        Ok(backend)
    }

    /// Open a session on `path`, selecting `sub_track` when given
    pub fn open_session(
        &self,
        path: &Path,
        sub_track: Option<usize>,
    ) -> Result<EngineSession, EngineError> {
        let kind = classify_path(path);
        if !kind.is_playable() {
            return Err(EngineError::UnsupportedFormat {
                file: path.display().to_string(),
            });
        }

        std::fs::metadata(path).map_err(|source| EngineError::Unreadable {
            path: path.display().to_string(),
            source,
        })?;

        let mut backend = self.create(kind)?;
        let hint = backend.open(path)?;

        // From here on the session owns the backend and closes it on any early return
        let mut session = EngineSession {
            backend,
            kind,
            path: path.to_path_buf(),
            sample_rate: self.policy.sample_rate,
            policy: self.policy,
            open: true,
            duration_samples: self.policy.resolve(&hint),
            tags: TagSet::default(),
            sub_track,
            rendered: 0,
        };

        match sub_track {
            Some(index) => session.select_sub_track(index)?,
            None => session.tags = session.backend.tags(),
        }

        log::debug!(
            "Opened {} session on {} (sub-track {:?}, {} samples)",
            kind.name(),
            path.display(),
            sub_track,
            session.duration_samples
        );
        Ok(session)
    }
}

impl std::fmt::Debug for EngineFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineFactory")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// One open decoder bound to one file or sub-track.
///
/// The backend is closed when the session is closed or dropped.
pub struct EngineSession {
    backend: Box<dyn EngineBackend>,
    kind: FormatKind,
    path: PathBuf,
    sample_rate: u32,
    policy: DurationPolicy,
    open: bool,
    duration_samples: i64,
    tags: TagSet,
    sub_track: Option<usize>,
    rendered: u64,
}

impl EngineSession {
    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn sub_track(&self) -> Option<usize> {
        self.sub_track
    }

    /// Resolved length in samples
    pub fn duration_samples(&self) -> i64 {
        self.duration_samples
    }

    pub fn duration(&self) -> Duration {
        if self.duration_samples <= 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.duration_samples as f64 / self.sample_rate as f64)
    }

    /// Replace the resolved length, e.g. with a curated library value
    pub fn override_duration(&mut self, samples: i64) {
        if samples > 0 {
            self.duration_samples = samples;
        }
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Frames rendered since open or the last seek, offset by the seek target
    pub fn rendered_samples(&self) -> u64 {
        self.rendered
    }

    pub fn fill(&mut self, buffer: &mut [i16]) -> usize {
        if !self.open {
            return 0;
        }
        let frames = self.backend.fill(buffer);
        self.rendered += frames as u64;
        frames
    }

    /// Seek the backend; the rendered position follows where it landed
    pub fn seek(&mut self, sample: u64) -> Option<u64> {
        if !self.open {
            return None;
        }
        let landed = self.backend.seek(sample)?;
        self.rendered = landed;
        Some(landed)
    }

    pub fn is_ended(&self) -> bool {
        !self.open || self.backend.is_ended()
    }

    pub fn device_count(&self) -> usize {
        self.backend.device_count()
    }

    pub fn device_name(&self, index: usize) -> Option<String> {
        self.backend.device_name(index)
    }

    pub fn device_volume(&self, index: usize) -> u16 {
        self.backend.device_volume(index)
    }

    pub fn set_device_volume(&mut self, index: usize, volume: u16) {
        self.backend.set_device_volume(index, volume);
    }

    pub fn sub_track_count(&self) -> usize {
        self.backend.sub_track_count()
    }

    pub fn sub_track_range(&self) -> Range<usize> {
        self.backend.sub_track_range()
    }

    pub fn current_sub_track(&self) -> usize {
        self.backend.current_sub_track()
    }

    /// Switch the open container to another sub-track, re-resolving length and tags
    pub fn select_sub_track(&mut self, index: usize) -> Result<(), EngineError> {
        if !self.open {
            return Err(EngineError::NotOpen);
        }
        let hint = self.backend.select_sub_track(index)?;
        self.duration_samples = self.policy.resolve(&hint);
        self.tags = self.backend.tags();
        self.sub_track = Some(index);
        self.rendered = 0;
        Ok(())
    }

    pub fn set_playback_speed(&mut self, speed: f64) {
        self.backend.set_playback_speed(speed);
    }

    pub fn set_endless_loop(&mut self, endless: bool) {
        self.backend.set_endless_loop(endless);
    }

    pub fn close(&mut self) {
        if self.open {
            self.backend.close();
            self.open = false;
            log::debug!("Closed session on {}", self.path.display());
        }
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("open", &self.open)
            .field("duration_samples", &self.duration_samples)
            .field("sub_track", &self.sub_track)
            .finish()
    }
}

/// Saturate a 24-bit fixed-point sample to 16 bits
pub(crate) fn wide_to_i16(sample: i32) -> i16 {
    (sample >> 8).clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
