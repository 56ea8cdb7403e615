use super::native::{VgmCore, VgmDeviceInfo, WideFrame};
use super::resolver::FileResolver;
use super::{wide_to_i16, DurationHint, EngineBackend, DEFAULT_DEVICE_VOLUME};
use crate::error::EngineError;
use crate::format::FormatKind;
use crate::models::{TagSet, TagValue};
use std::path::Path;
use std::sync::Arc;

/// Register-dump backend.
///
/// The core keeps reporting its end normally; endless playback is handled by
/// the caller ignoring [`EngineBackend::is_ended`].
pub struct VgmBackend {
    core: Box<dyn VgmCore>,
    resolver: Arc<dyn FileResolver>,
    sample_rate: u32,
    loaded: bool,
    devices: Vec<VgmDeviceInfo>,
    scratch: Vec<WideFrame>,
}

impl VgmBackend {
    pub fn new(core: Box<dyn VgmCore>, resolver: Arc<dyn FileResolver>, sample_rate: u32) -> Self {
        Self {
            core,
            resolver,
            sample_rate,
            loaded: false,
            devices: Vec::new(),
            scratch: Vec::new(),
        }
    }
}

impl EngineBackend for VgmBackend {
    fn kind(&self) -> FormatKind {
        FormatKind::Vgm
    }

    fn open(&mut self, path: &Path) -> Result<DurationHint, EngineError> {
        self.close();

        self.core.set_sample_rate(self.sample_rate);
        self.core
            .load(path, self.resolver.clone())
            .map_err(|e| EngineError::Rejected {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        self.loaded = true;
        self.devices = unique_devices(self.core.devices());

        let total = self.core.total_samples();
        let loop_len = self.core.loop_samples();
        Ok(DurationHint {
            length: (total > 0).then_some(total),
            intro: (loop_len > 0).then(|| total.saturating_sub(loop_len)),
            loop_len: (loop_len > 0).then_some(loop_len),
        })
    }

    fn close(&mut self) {
        if self.loaded {
            self.core.unload();
            self.loaded = false;
            self.devices.clear();
        }
    }

    fn fill(&mut self, buffer: &mut [i16]) -> usize {
        if !self.loaded {
            return 0;
        }

        let frames = buffer.len() / 2;
        if self.scratch.len() < frames {
            self.scratch.resize(frames, [0, 0]);
        }
        let scratch = &mut self.scratch[..frames];
        scratch.fill([0, 0]);

        let rendered = self.core.render(scratch).min(frames);
        for (out, frame) in buffer.chunks_exact_mut(2).zip(scratch[..rendered].iter()) {
            out[0] = wide_to_i16(frame[0]);
            out[1] = wide_to_i16(frame[1]);
        }
        rendered
    }

    fn seek(&mut self, sample: u64) -> Option<u64> {
        if !self.loaded {
            return None;
        }
        let total = self.core.total_samples();
        let target = if total > 0 { sample.min(total) } else { sample };
        self.core.seek_sample(target);
        Some(target)
    }

    fn is_ended(&self) -> bool {
        !self.loaded || self.core.has_ended()
    }

    fn tags(&self) -> TagSet {
        if !self.loaded {
            return TagSet::default();
        }
        parse_tag_list(&self.core.tags())
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn device_name(&self, index: usize) -> Option<String> {
        self.devices.get(index).map(|d| d.name.clone())
    }

    fn device_volume(&self, index: usize) -> u16 {
        self.devices
            .get(index)
            .map(|d| d.volume)
            .unwrap_or(DEFAULT_DEVICE_VOLUME)
    }

    fn set_device_volume(&mut self, index: usize, volume: u16) {
        if let Some(device) = self.devices.get_mut(index) {
            self.core.set_device_volume(device.id, volume);
            device.volume = volume;
        }
    }

    fn set_playback_speed(&mut self, speed: f64) {
        if self.loaded && speed > 0.0 {
            self.core.set_speed(speed);
        }
    }
}

impl Drop for VgmBackend {
    fn drop(&mut self) {
        self.close();
    }
}

/// Collapse repeated chip ids to their first entry
fn unique_devices(devices: Vec<VgmDeviceInfo>) -> Vec<VgmDeviceInfo> {
    let mut unique: Vec<VgmDeviceInfo> = Vec::with_capacity(devices.len());
    for device in devices {
        if !unique.iter().any(|d| d.id == device.id) {
            unique.push(device);
        }
    }
    unique
}

/// Map a flat `[key, value, ...]` list onto a [`TagSet`]; unknown keys and a
/// dangling key are ignored
fn parse_tag_list(list: &[String]) -> TagSet {
    let mut tags = TagSet::default();

    for pair in list.chunks_exact(2) {
        let value = pair[1].trim().to_string();
        let (field, secondary): (&mut TagValue, bool) = match pair[0].to_ascii_uppercase().as_str() {
            "TITLE" => (&mut tags.title, false),
            "TITLE-JPN" => (&mut tags.title, true),
            "GAME" => (&mut tags.game, false),
            "GAME-JPN" => (&mut tags.game, true),
            "SYSTEM" => (&mut tags.system, false),
            "SYSTEM-JPN" => (&mut tags.system, true),
            "ARTIST" => (&mut tags.author, false),
            "ARTIST-JPN" => (&mut tags.author, true),
            "DATE" => (&mut tags.date, false),
            "ENCODED_BY" => (&mut tags.creator, false),
            "COMMENT" => (&mut tags.notes, false),
            _ => continue,
        };
        if secondary {
            field.secondary = value;
        } else {
            field.primary = value;
        }
    }

    tags
}
